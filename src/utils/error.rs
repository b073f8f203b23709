//! Error types for the plot generator.
//!
//! Process-level failures (`ProcessLaunch`, `ProcessCrash`) fail every waiting
//! command; the remaining variants are local to the request that produced them.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the generator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeneratorError {
    /// Renderer binary missing or could not be spawned
    #[error("Failed to launch renderer: {0}")]
    ProcessLaunch(String),

    /// Renderer exited while it was expected to be running
    #[error("Renderer stopped unexpectedly: {0}")]
    ProcessCrash(String),

    /// Request issued while the renderer is not running
    #[error("Renderer is not running")]
    NotRunning,

    /// Request references an image type that was never registered
    #[error("Image type is not registered: {0}")]
    UnregisteredType(String),

    /// Renderer answered a command with an error response
    #[error("Renderer error: {0}")]
    Render(String),

    /// Cached artifact missing or unwritable
    #[error("Cache file error for {path}: {reason}")]
    CacheIo { path: PathBuf, reason: String },

    /// Image type registration could not be understood
    #[error("Invalid command template: {0}")]
    InvalidTemplate(String),

    /// Configuration file or value problem
    #[error("Configuration error: {0}")]
    Config(String),

    /// File IO error
    #[error("IO error: {0}")]
    Io(String),

    /// The owning event loop has gone away
    #[error("Generator channel closed")]
    ChannelClosed,
}

/// Convenience result type for generator operations.
pub type GeneratorResult<T> = Result<T, GeneratorError>;

impl GeneratorError {
    pub fn launch<T: Into<String>>(msg: T) -> Self {
        Self::ProcessLaunch(msg.into())
    }

    pub fn crash<T: Into<String>>(msg: T) -> Self {
        Self::ProcessCrash(msg.into())
    }

    pub fn render<T: Into<String>>(msg: T) -> Self {
        Self::Render(msg.into())
    }

    pub fn template<T: Into<String>>(msg: T) -> Self {
        Self::InvalidTemplate(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }

    pub fn cache_io(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CacheIo {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<io::Error> for GeneratorError {
    fn from(err: io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for GeneratorError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidTemplate(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_io_names_the_file() {
        let err = GeneratorError::cache_io("/tmp/img-1.png", "renderer produced no file");
        assert_eq!(
            err.to_string(),
            "Cache file error for /tmp/img-1.png: renderer produced no file"
        );
    }

    #[test]
    fn io_errors_convert() {
        let err: GeneratorError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err, GeneratorError::Io("gone".into()));
    }
}
