//! Error types and wire-status classification.
//!
//! The classifier drives the retry loop: `UNAVAILABLE`, `DEADLINE_EXCEEDED`,
//! `RESOURCE_EXHAUSTED`, and `ABORTED` are retryable; `UNAVAILABLE` alone also
//! signals a lost connection and kicks the connection manager.

use std::fmt;

/// gRPC status codes with their standard numeric values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Code {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Code {
    /// Map a numeric wire code back to a `Code`. Out-of-range values become `Unknown`.
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => Code::Ok,
            1 => Code::Cancelled,
            3 => Code::InvalidArgument,
            4 => Code::DeadlineExceeded,
            5 => Code::NotFound,
            6 => Code::AlreadyExists,
            7 => Code::PermissionDenied,
            8 => Code::ResourceExhausted,
            9 => Code::FailedPrecondition,
            10 => Code::Aborted,
            11 => Code::OutOfRange,
            12 => Code::Unimplemented,
            13 => Code::Internal,
            14 => Code::Unavailable,
            15 => Code::DataLoss,
            16 => Code::Unauthenticated,
            _ => Code::Unknown,
        }
    }

    /// Numeric wire value.
    pub fn value(self) -> i32 {
        self as i32
    }

    /// True for transient codes worth another attempt.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Code::Unavailable | Code::DeadlineExceeded | Code::ResourceExhausted | Code::Aborted
        )
    }

    /// True when the failure means the underlying channel is gone.
    ///
    /// A connection-lost code is always retryable, but additionally tells the
    /// connection manager to drop and rebuild the handle.
    pub fn is_connection_error(self) -> bool {
        matches!(self, Code::Unavailable)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The single error carrier surfaced to callers of the client.
///
/// `message` is the wire `details` when present, else the wire `message`.
/// [`ClientError::grpc_code`] is an alias of [`ClientError::code`] kept for
/// caller compatibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientError {
    code: Code,
    message: String,
}

impl ClientError {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    /// The sentinel raised when the service cannot be reached and no cached
    /// response exists. The message text is load-bearing for callers.
    pub fn unavailable(service_name: &str) -> Self {
        Self::new(Code::Unavailable, format!("{} is not available", service_name))
    }

    /// Raised when an operation is attempted on a closed client.
    pub fn shutting_down(service_name: &str) -> Self {
        Self::new(Code::Cancelled, format!("{} client is shutting down", service_name))
    }

    pub fn code(&self) -> Code {
        self.code
    }

    /// Alias of [`ClientError::code`].
    pub fn grpc_code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    pub fn is_connection_error(&self) -> bool {
        self.code.is_connection_error()
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code.value())
    }
}

impl std::error::Error for ClientError {}

/// Configuration rejected at construction time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("serviceName must be a non-empty string")]
    MissingServiceName,
    #[error("grpcUrl must be a non-empty string")]
    MissingUrl,
    #[error("maxCacheSize must be in [{min}, {max}] (got {got})")]
    CacheSizeOutOfRange { got: usize, min: usize, max: usize },
    #[error("fallbackCacheTtlMs must be in [{min}, {max}] (got {got})")]
    CacheTtlOutOfRange { got: u64, min: u64, max: u64 },
}

/// Cache operations rejected by validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("cache key must be a non-empty string")]
    InvalidKey,
    #[error("ttlMs must be in [{min}, {max}] (got {got})")]
    InvalidTtl { got: u64, min: u64, max: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_codes_match_classifier_table() {
        assert!(Code::Unavailable.is_retryable());
        assert!(Code::DeadlineExceeded.is_retryable());
        assert!(Code::ResourceExhausted.is_retryable());
        assert!(Code::Aborted.is_retryable());

        assert!(!Code::InvalidArgument.is_retryable());
        assert!(!Code::NotFound.is_retryable());
        assert!(!Code::Internal.is_retryable());
        assert!(!Code::Unauthenticated.is_retryable());
        assert!(!Code::Ok.is_retryable());
    }

    #[test]
    fn only_unavailable_is_connection_error() {
        assert!(Code::Unavailable.is_connection_error());
        assert!(!Code::DeadlineExceeded.is_connection_error());
        assert!(!Code::ResourceExhausted.is_connection_error());
        assert!(!Code::Aborted.is_connection_error());
        assert!(!Code::Internal.is_connection_error());
    }

    #[test]
    fn numeric_round_trip() {
        for value in [0, 1, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16] {
            assert_eq!(Code::from_i32(value).value(), value);
        }
        assert_eq!(Code::from_i32(2), Code::Unknown);
        assert_eq!(Code::from_i32(99), Code::Unknown);
        assert_eq!(Code::from_i32(-1), Code::Unknown);
    }

    #[test]
    fn unavailable_sentinel_message() {
        let err = ClientError::unavailable("user-service");
        assert_eq!(err.message(), "user-service is not available");
        assert_eq!(err.code(), Code::Unavailable);
        assert_eq!(err.grpc_code(), err.code());
    }

    #[test]
    fn display_includes_numeric_code() {
        let err = ClientError::new(Code::InvalidArgument, "bad id");
        let msg = format!("{}", err);
        assert!(msg.contains("bad id"));
        assert!(msg.contains('3'));
    }
}
