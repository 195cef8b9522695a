//! Driver-level settings loadable from JSON.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::effect::EffectBackendKind;
use crate::foundation::error::{ScanoutError, ScanoutResult};
use crate::render::{BloomV2Settings, NodeContextOpts};

/// Everything a driver configures before building a node graph. Missing fields take defaults.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub node_context: NodeContextOpts,
    pub bloom_v2: BloomV2Settings,
    /// Effect description to load at startup.
    pub custom_effect: Option<PathBuf>,
    pub effect_backend: EffectBackendKind,
}

impl DisplaySettings {
    pub fn from_json_str(s: &str) -> ScanoutResult<Self> {
        serde_json::from_str(s)
            .map_err(|e| ScanoutError::validation(format!("display settings: {e}")))
    }

    pub fn from_path(path: &Path) -> ScanoutResult<Self> {
        let f = File::open(path)
            .with_context(|| format!("open display settings '{}'", path.display()))?;
        let settings = serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse display settings '{}'", path.display()))?;
        Ok(settings)
    }
}

#[cfg(test)]
#[path = "../tests/unit/settings.rs"]
mod tests;
