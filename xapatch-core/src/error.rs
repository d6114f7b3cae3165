use thiserror::Error;

/// Errors that can occur while reading, patching, or writing a disc image.
#[derive(Debug, Error)]
pub enum CdError {
    /// I/O error on the underlying stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended in the middle of a read
    #[error("Unexpected end of disc image at sector {sector}")]
    UnexpectedEof { sector: u32 },

    /// The image violates the sector or filesystem format
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// The image uses a feature this crate does not handle
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// Not enough free sectors anywhere on the disc to grow a region
    #[error("Not enough space on the disc: needed {needed} more sectors, {available} available")]
    CapacityExceeded { needed: u32, available: u32 },

    /// A caller-supplied argument was rejected
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No file or directory exists at the requested path
    #[error("{0} does not exist")]
    NotFound(String),

    /// The requested path exists but is not a directory
    #[error("{0} is not a directory")]
    NotADirectory(String),

    /// Settings or manifest could not be loaded
    #[error("Config error: {0}")]
    Config(String),
}

/// Coarse classification of [`CdError`] for callers that only need to branch
/// on the category of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    FormatViolation,
    UnsupportedFeature,
    CapacityExceeded,
    InvalidArgument,
    NotFound,
    Config,
}

impl CdError {
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Io,
            Self::UnexpectedEof { .. } | Self::InvalidFormat(_) => ErrorKind::FormatViolation,
            Self::Unsupported(_) => ErrorKind::UnsupportedFeature,
            Self::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::NotFound(_) | Self::NotADirectory(_) => ErrorKind::NotFound,
            Self::Config(_) => ErrorKind::Config,
        }
    }
}
