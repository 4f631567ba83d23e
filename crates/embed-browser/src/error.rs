//! Browser bridge errors

use embed_xpcom::XpcomError;

/// Errors surfaced to the toolkit by browser operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BrowserError {
    #[error(transparent)]
    Xpcom(#[from] XpcomError),

    #[error("Embedding runtime not initialized")]
    NotInitialized,

    #[error("Embedding runtime already initialized")]
    AlreadyInitialized,

    #[error("Browser is disposed")]
    Disposed,

    #[error("Cannot shut down with {0} live browsers")]
    BrowsersAlive(usize),

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Result alias for browser operations
pub type Result<T> = std::result::Result<T, BrowserError>;
