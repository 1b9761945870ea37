use thiserror::Error;

pub type Result<T> = std::result::Result<T, SkepError>;

#[derive(Debug, Error)]
pub enum SkepError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {message}")]
    Store { status: Option<u16>, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("manifest serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("decryption failed: wrong passphrase or corrupted data")]
    DecryptionFailed,

    #[error("key derivation error: {0}")]
    KeyDerivation(String),

    #[error("unknown compression tag: {0}")]
    UnknownCompressionTag(u8),

    #[error("decompression error: {0}")]
    Decompression(String),

    #[error("file not found in manifest: '{0}'")]
    FileNotFound(String),

    #[error("remote object not found: '{0}'")]
    ObjectNotFound(String),

    #[error("integrity error: {0}")]
    Corrupt(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl SkepError {
    /// Build a store error from an optional HTTP-style status code and a message.
    pub fn store(status: impl Into<Option<u16>>, message: impl Into<String>) -> Self {
        SkepError::Store {
            status: status.into(),
            message: message.into(),
        }
    }

    /// Whether retrying this error may succeed.
    ///
    /// Store errors without a status are transport-level failures (connection
    /// reset, timeout) and count as transient, as do 5xx-class statuses plus
    /// 408 and 429. 4xx-class statuses are permanent for that unit of work.
    pub fn is_transient(&self) -> bool {
        match self {
            SkepError::Store { status: None, .. } => true,
            SkepError::Store {
                status: Some(code), ..
            } => *code == 408 || *code == 429 || *code >= 500,
            SkepError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SkepError::Cancelled)
    }
}
