use std::path::{Path, PathBuf};
use thiserror::Error;

/// Boxed error returned by caller-supplied handlers. Anything error-like
/// works; the engine wraps it in [`SearchError::Handler`] and aborts.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during search and metadata extraction
#[derive(Error, Debug)]
pub enum SearchError {
    /// The query named one mode but carried the other mode's spec (or none).
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("IO error on {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The archive is not a readable container, or its container
    /// descriptor / package manifest chain is broken.
    #[error("Format error in {path}: {message}")]
    FormatError { path: PathBuf, message: String },

    #[error("No container descriptor and no package manifest in {0}")]
    ManifestNotFound(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Handler error: {0}")]
    Handler(HandlerError),
}

impl SearchError {
    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::InvalidQuery(msg.into())
    }

    pub fn invalid_pattern(pattern: impl Into<String>, source: regex::Error) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            source,
        }
    }

    /// Maps a filesystem error onto the taxonomy, keeping the path and
    /// distinguishing the not-found and permission cases.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::FileNotFound(path),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path),
            _ => Self::IoError { path, source },
        }
    }

    /// Builds a format error, annotating the archive size when a stat
    /// succeeded.
    pub fn format(path: &Path, size: Option<u64>, message: impl Into<String>) -> Self {
        let message = match size {
            Some(bytes) => format!("{} (size: {bytes} bytes)", message.into()),
            None => message.into(),
        };
        Self::FormatError {
            path: path.to_path_buf(),
            message,
        }
    }

    pub fn handler(err: HandlerError) -> Self {
        Self::Handler(err)
    }

    /// True for the cooperative-cancellation variants.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}
