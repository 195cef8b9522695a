/// Convenience result type used across scanout.
pub type ScanoutResult<T> = Result<T, ScanoutError>;

/// Top-level error taxonomy used by engine APIs.
///
/// Per-frame paths (`draw`, `execute_*`) never surface these; they record failures into the
/// owning command list's error flag instead. Init-time and load-time paths return them.
#[derive(thiserror::Error, Debug)]
pub enum ScanoutError {
    /// A GPU object could not be created, or a format is unsupported by the device.
    #[error("device error: {0}")]
    Device(String),

    /// Missing or malformed external content (effect files, textures, program bytecode).
    #[error("asset error: {0}")]
    Asset(String),

    /// Syntax errors in a custom effect description.
    #[error("parse error (line {line}): {message}")]
    Parse {
        /// 1-based line number in the source file.
        line: usize,
        /// Human-readable description of the problem.
        message: String,
    },

    /// Invalid caller-provided parameters or references.
    #[error("validation error: {0}")]
    Validation(String),

    /// The graphics device was lost and must be reset before further use.
    #[error("device lost")]
    DeviceLost,

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ScanoutError {
    /// Build a [`ScanoutError::Device`] value.
    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }

    /// Build a [`ScanoutError::Asset`] value.
    pub fn asset(msg: impl Into<String>) -> Self {
        Self::Asset(msg.into())
    }

    /// Build a [`ScanoutError::Parse`] value.
    pub fn parse(line: usize, msg: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: msg.into(),
        }
    }

    /// Build a [`ScanoutError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether this error came from the device rather than from content.
    pub fn is_device_failure(&self) -> bool {
        matches!(self, Self::Device(_) | Self::DeviceLost)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
