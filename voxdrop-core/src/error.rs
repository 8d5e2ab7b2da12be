use std::time::Duration;

use thiserror::Error;

/// Result type for pipeline operations
pub type UploadResult<T> = Result<T, UploadError>;

/// Result type for remote store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by a [`RemoteStore`](crate::RemoteStore) implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Stream truncated: {0}")]
    Truncated(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Store unavailable (status {status}): {message}")]
    Unavailable { status: u16, message: String },

    #[error("Not authenticated: {0}")]
    Unauthenticated(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl StoreError {
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection(message.into())
    }

    pub fn truncated<S: Into<String>>(message: S) -> Self {
        Self::Truncated(message.into())
    }

    pub fn unavailable<S: Into<String>>(status: u16, message: S) -> Self {
        Self::Unavailable {
            status,
            message: message.into(),
        }
    }

    pub fn permission_denied<S: Into<String>>(message: S) -> Self {
        Self::PermissionDenied(message.into())
    }

    pub fn not_found<S: Into<String>>(id: S) -> Self {
        Self::NotFound(id.into())
    }

    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol(message.into())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Which store call produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorePhase {
    /// Read-only metadata probe of the destination container
    Probe,
    /// Object creation (the chunked transfer itself)
    Transfer,
    /// Permission grant or link lookup after a successful transfer
    Publish,
}

/// How a failure should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Recoverable by retrying (network or server side)
    Transient,
    /// Retrying will not help (request, auth or quota level)
    Fatal,
    /// Destination is unreachable or misconfigured
    Configuration,
}

impl ErrorClass {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient)
    }
}

/// Classify a store error for the phase it happened in.
///
/// Every probe failure is a configuration problem: a destination that cannot
/// be read must not consume retry budget.
pub fn classify(phase: StorePhase, error: &StoreError) -> ErrorClass {
    if phase == StorePhase::Probe {
        return ErrorClass::Configuration;
    }

    match error {
        StoreError::Connection(_)
        | StoreError::Truncated(_)
        | StoreError::Timeout
        | StoreError::RateLimited(_)
        | StoreError::Unavailable { .. } => ErrorClass::Transient,
        // local staging reads do not recover on retry
        StoreError::Io(_)
        | StoreError::Unauthenticated(_)
        | StoreError::PermissionDenied(_)
        | StoreError::NotFound(_)
        | StoreError::InvalidRequest(_)
        | StoreError::QuotaExceeded(_)
        | StoreError::Protocol(_) => ErrorClass::Fatal,
    }
}

/// Errors surfaced to the caller of the upload pipeline
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Destination container {container} is not accessible: {source}. Check the id and share the container with the uploading account")]
    Configuration {
        container: String,
        #[source]
        source: StoreError,
    },

    #[error("Upload failed: {source}")]
    Fatal {
        #[source]
        source: StoreError,
    },

    #[error("Upload failed after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: StoreError },

    #[error("Upload did not finish within {after:?}")]
    DeadlineExceeded { after: Duration },

    #[error("Unsupported file: {name} (accepted: .m4a, .mp3, .wav)")]
    UnsupportedFormat { name: String },

    #[error("Invalid upload request: {message}")]
    InvalidRequest { message: String },

    #[error("Staging error: {source}")]
    Staging {
        #[from]
        source: std::io::Error,
    },
}

impl UploadError {
    pub fn configuration<S: Into<String>>(container: S, source: StoreError) -> Self {
        Self::Configuration {
            container: container.into(),
            source,
        }
    }

    pub fn fatal(source: StoreError) -> Self {
        Self::Fatal { source }
    }

    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn unsupported_format<S: Into<String>>(name: S) -> Self {
        Self::UnsupportedFormat { name: name.into() }
    }

    /// Whether this error came from the destination check
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}
