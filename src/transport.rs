//! Transport seam: the contract the core relies on, nothing more.
//!
//! Schema loading, message codecs, and channel internals all live behind
//! these traits. Production implementations wrap a real gRPC binding; tests
//! plug in scripted fakes.

use crate::error::{ClientError, Code};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::TransportOptions;

/// Ordered wire metadata key/value pairs.
pub type Metadata = Vec<(String, String)>;

/// Low-level connectivity as reported by the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Ready,
    Connecting,
    Idle,
    TransientFailure,
    Shutdown,
}

/// A failed transport operation: numeric wire code, message, and optional
/// server-provided details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub code: Code,
    pub message: String,
    pub details: Option<String>,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), details: None }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.details {
            Some(details) => write!(f, "{}: {} ({})", self.code, self.message, details),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

impl std::error::Error for Status {}

impl From<Status> for ClientError {
    /// Surface mapping: `details` wins over `message` when present.
    fn from(status: Status) -> Self {
        let message = status.details.unwrap_or(status.message);
        ClientError::new(status.code, message)
    }
}

/// One established channel to the remote service.
///
/// The connection manager owns exactly one of these at a time and replaces it
/// wholesale on reconnect.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Resolves once the underlying channel is ready, or fails when `timeout`
    /// elapses first.
    async fn wait_for_ready(&self, timeout: Duration) -> Result<(), Status>;

    /// Non-blocking connectivity poll.
    fn state(&self) -> ChannelState;

    /// Invoke a unary method. The transport enforces the deadline and raises
    /// `DEADLINE_EXCEEDED` itself.
    async fn invoke(
        &self,
        method: &str,
        request: Value,
        metadata: &Metadata,
        timeout: Duration,
    ) -> Result<Value, Status>;

    /// Release transport resources. Idempotent.
    fn close(&self);
}

/// Synchronously constructs channels from the configured descriptor.
pub trait ChannelFactory: Send + Sync {
    fn create(&self, options: &TransportOptions) -> Result<Arc<dyn Channel>, Status>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_maps_details_over_message() {
        let status = Status::new(Code::InvalidArgument, "3 INVALID_ARGUMENT").with_details("bad id");
        let err = ClientError::from(status);
        assert_eq!(err.message(), "bad id");
        assert_eq!(err.code(), Code::InvalidArgument);
        assert_eq!(err.grpc_code().value(), 3);
    }

    #[test]
    fn status_without_details_keeps_message() {
        let status = Status::new(Code::Unavailable, "connect ECONNREFUSED");
        let err = ClientError::from(status);
        assert_eq!(err.message(), "connect ECONNREFUSED");
        assert_eq!(err.code(), Code::Unavailable);
    }

    #[test]
    fn status_display_mentions_details() {
        let status = Status::new(Code::NotFound, "not found").with_details("no user 7");
        let text = format!("{}", status);
        assert!(text.contains("NotFound"));
        assert!(text.contains("no user 7"));
    }
}
