//! Error types shared by providers, caches and the write path

use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, ContentError>;

/// Classification of a [`ContentError`], independent of any wrapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    ValidationFailed,
    ProviderUnavailable,
    OperationDisallowed,
    PartialFailure,
    Cancelled,
}

/// Errors raised by content providers and the services around them
#[derive(Error, Debug)]
pub enum ContentError {
    /// Item or directory absent
    #[error("{what} not found: {key}")]
    NotFound { what: &'static str, key: String },

    /// Concurrency token mismatch on write
    #[error("Conflict on {path}: expected {expected}, found {}", actual.as_deref().unwrap_or("<none>"))]
    Conflict {
        path: String,
        expected: String,
        actual: Option<String>,
    },

    /// Required metadata missing, disallowed file extension, malformed input
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Backend transport or authentication failure
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Operation forbidden by policy (read-only provider, root deletion)
    #[error("Operation not allowed: {0}")]
    OperationDisallowed(String),

    /// A directory deletion stopped partway; the backend is partially modified
    #[error("Partial delete of {path}: {} entries removed before {failed_path} failed: {source}", deleted.len())]
    PartialDelete {
        path: String,
        deleted: Vec<String>,
        failed_path: String,
        #[source]
        source: Box<ContentError>,
    },

    /// The caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Uniform wrapper for every error leaving a provider
    #[error("{operation} failed on provider '{provider_id}': {source}")]
    ProviderOperationFailed {
        operation: &'static str,
        provider_id: String,
        #[source]
        source: Box<ContentError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Decode error: {0}")]
    Decode(String),
}

impl ContentError {
    pub fn not_found(what: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            key: key.into(),
        }
    }

    pub fn conflict(
        path: impl Into<String>,
        expected: impl Into<String>,
        actual: Option<String>,
    ) -> Self {
        Self::Conflict {
            path: path.into(),
            expected: expected.into(),
            actual,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::ProviderUnavailable(message.into())
    }

    pub fn disallowed(message: impl Into<String>) -> Self {
        Self::OperationDisallowed(message.into())
    }

    /// Wrap this error as having happened inside `operation` on `provider_id`.
    ///
    /// Errors that are already wrapped are returned untouched so the innermost
    /// provider keeps ownership of the operation name.
    pub fn in_operation(self, operation: &'static str, provider_id: &str) -> Self {
        match self {
            wrapped @ Self::ProviderOperationFailed { .. } => wrapped,
            other => Self::ProviderOperationFailed {
                operation,
                provider_id: provider_id.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The error with any provider wrapper removed
    pub fn root(&self) -> &ContentError {
        match self {
            Self::ProviderOperationFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// Classify the error, looking through provider wrappers
    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::ValidationFailed(_) => ErrorKind::ValidationFailed,
            Self::OperationDisallowed(_) => ErrorKind::OperationDisallowed,
            Self::PartialDelete { .. } => ErrorKind::PartialFailure,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Io(e) if e.kind() == std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            Self::ProviderUnavailable(_)
            | Self::Io(_)
            | Self::Http(_)
            | Self::Decode(_)
            | Self::ProviderOperationFailed { .. } => ErrorKind::ProviderUnavailable,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Content that was fetched but could not be decoded as text
    pub fn is_decode(&self) -> bool {
        match self.root() {
            Self::Decode(_) => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::InvalidData,
            _ => false,
        }
    }
}

impl From<serde_yaml::Error> for ContentError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

impl From<serde_json::Error> for ContentError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}
