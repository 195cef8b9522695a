use crate::foundation::error::{ScanoutError, ScanoutResult};

/// Most history frames `PREVn` may reach back.
pub const MAX_PREV_INDEX: u32 = 6;

/// A texture spec grid cell named by a shader: pass `pass`'s input, `element` frames back.
///
/// Grid row 0 is the original source; row `n` is the output of pass `n - 1`, which is also the
/// input of pass `n`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameRef {
    pub pass: u32,
    pub element: u32,
}

impl FrameRef {
    pub const fn new(pass: u32, element: u32) -> Self {
        Self { pass, element }
    }

    /// Resolve a frame name as seen from pass `current`.
    ///
    /// | name | grid cell |
    /// |------|-----------|
    /// | `IN` | `(current, 0)` |
    /// | `ORIG` | `(0, 0)` |
    /// | `PREV`, `PREVn` (n in 1..=6) | `(0, n + 1)` |
    /// | `PASSPREV`, `PASSPREVn` | `(current - n - 1, 0)` |
    /// | `PASSn` (1 <= n < current) | `(n, 0)` |
    ///
    /// A leading `$` is ignored. Unrelated names are `Ok(None)`; out-of-range indices are a
    /// validation error.
    pub fn parse(name: &str, current: u32) -> ScanoutResult<Option<Self>> {
        let name = name.strip_prefix('$').unwrap_or(name);
        if name == "IN" {
            return Ok(Some(Self::new(current, 0)));
        }
        if name.len() < 4 {
            return Ok(None);
        }
        if name == "ORIG" {
            return Ok(Some(Self::new(0, 0)));
        }

        let base = name.trim_end_matches(|c: char| c.is_ascii_digit());
        let index = if base.len() < name.len() {
            match name[base.len()..].parse::<u32>() {
                Ok(n) => Some(n),
                Err(_) => return Ok(None),
            }
        } else {
            None
        };
        let invalid = || {
            ScanoutError::validation(format!(
                "invalid reference from pass {current} to parameter '{name}'"
            ))
        };

        match (base, index) {
            ("PREV", Some(n)) if !(1..=MAX_PREV_INDEX).contains(&n) => Err(invalid()),
            ("PREV", n) => Ok(Some(Self::new(0, n.unwrap_or(0) + 1))),
            ("PASSPREV", Some(0)) => Err(invalid()),
            ("PASSPREV", n) => {
                let n = n.unwrap_or(0);
                if n >= current {
                    return Err(invalid());
                }
                Ok(Some(Self::new(current - (n + 1), 0)))
            }
            ("PASS", Some(n)) if n >= 1 && n < current => Ok(Some(Self::new(n, 0))),
            ("PASS", _) => Err(invalid()),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/effect/frame_ref.rs"]
mod tests;
