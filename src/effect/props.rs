//! Effect description files: `key = value` lines.
//!
//! ```text
//! # comment
//! shaders = 2
//! shader0 = "crt.soft"
//! scale_type0 = viewport   // trailing comments after quoted values only
//! ```
//!
//! Keys ending in digits are split into a base name and a counter, so `shader00` and `shader0`
//! name the same entry.

use std::collections::HashMap;
use std::fmt;

use crate::foundation::error::{ScanoutError, ScanoutResult};

/// A property key: base name plus an optional numeric suffix.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PropKey {
    base: String,
    counter: Option<u32>,
}

impl PropKey {
    /// Key without a counter.
    pub fn plain(base: &str) -> Self {
        Self {
            base: base.to_owned(),
            counter: None,
        }
    }

    /// `base` followed by `counter`, e.g. `shader3`.
    pub fn indexed(base: &str, counter: u32) -> Self {
        Self {
            base: base.to_owned(),
            counter: Some(counter),
        }
    }

    /// Split trailing digits off `name`. Names that are all digits, or whose suffix does not
    /// fit in a `u32`, are kept whole.
    pub fn parse(name: &str) -> Self {
        let digits = name.len() - name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
        let split = name.len() - digits;
        if digits == 0 || split == 0 {
            return Self::plain(name);
        }
        match name[split..].parse::<u32>() {
            Ok(counter) if counter != u32::MAX => Self::indexed(&name[..split], counter),
            _ => Self::plain(name),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn counter(&self) -> Option<u32> {
        self.counter
    }
}

impl fmt::Display for PropKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.counter {
            Some(n) => write!(f, "{}{n}", self.base),
            None => f.write_str(&self.base),
        }
    }
}

/// Parsed effect description.
#[derive(Clone, Debug, Default)]
pub struct EffectProps {
    props: HashMap<PropKey, String>,
}

impl EffectProps {
    /// Parse description text. Errors carry the 1-based line number.
    pub fn parse(text: &str) -> ScanoutResult<Self> {
        let mut props = HashMap::new();

        for (i, raw) in text.lines().enumerate() {
            let line_no = i + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
                continue;
            }

            let Some(eq) = line.find(['#', '=']).filter(|&p| line.as_bytes()[p] == b'=') else {
                return Err(ScanoutError::parse(line_no, "expected '=' after key"));
            };

            let key = line[..eq].trim();
            if key.is_empty() {
                return Err(ScanoutError::parse(line_no, "expected key"));
            }

            let rest = line[eq + 1..].trim_start();
            if rest.is_empty() || rest.starts_with('#') {
                return Err(ScanoutError::parse(line_no, "expected value"));
            }

            let value = if let Some(quoted) = rest.strip_prefix('"') {
                let Some(end) = quoted.find('"') else {
                    return Err(ScanoutError::parse(
                        line_no,
                        "missing '\"' at end of value string",
                    ));
                };
                let tail = quoted[end + 1..].trim();
                if !tail.is_empty() && !tail.starts_with('#') && !tail.starts_with("//") {
                    return Err(ScanoutError::parse(line_no, "expected end of line"));
                }
                &quoted[..end]
            } else {
                rest.split('#').next().unwrap_or_default().trim()
            };

            let key = PropKey::parse(key);
            if props.contains_key(&key) {
                return Err(ScanoutError::parse(line_no, format!("duplicate key '{key}'")));
            }
            props.insert(key, value.to_owned());
        }

        Ok(Self { props })
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    pub fn get(&self, key: &PropKey) -> Option<&str> {
        self.props.get(key).map(String::as_str)
    }

    /// Value of `base` with no counter.
    pub fn get_plain(&self, base: &str) -> Option<&str> {
        self.get(&PropKey::plain(base))
    }

    /// Value of `base<counter>`.
    pub fn get_indexed(&self, base: &str, counter: u32) -> Option<&str> {
        self.get(&PropKey::indexed(base, counter))
    }

    /// Leading decimal integer of the value, like `strtol`. Missing keys are `None`; values that
    /// overflow `i32` are an error.
    pub fn get_int(&self, key: &PropKey) -> ScanoutResult<Option<i32>> {
        let Some(s) = self.get(key) else {
            return Ok(None);
        };
        let s = s.trim_start();
        let sign_len = usize::from(s.starts_with(['+', '-']));
        let digits = s[sign_len..]
            .bytes()
            .take_while(u8::is_ascii_digit)
            .count();
        if digits == 0 {
            return Ok(Some(0));
        }
        s[..sign_len + digits]
            .parse::<i32>()
            .map(Some)
            .map_err(|_| ScanoutError::validation(format!("expected integer for '{key}'")))
    }

    /// Anything but `false` and `0` is true.
    pub fn get_bool(&self, key: &PropKey, default: bool) -> bool {
        match self.get(key) {
            Some(v) => v != "false" && v != "0",
            None => default,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/effect/props.rs"]
mod tests;
