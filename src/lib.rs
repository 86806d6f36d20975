#![forbid(unsafe_code)]

//! # grpc-resilient
//!
//! A resilient core for gRPC clients: one instance per remote service, with
//! managed connectivity, retries, stale-while-unavailable caching, and call
//! metrics.
//!
//! ## Features
//!
//! - **Connection lifecycle**: lazy connect, readiness wait, background
//!   channel monitoring, reconnection with capped + jittered backoff
//! - **Retrying calls** with per-attempt deadlines and exponential backoff
//! - **Fallback cache**: bounded LRU with TTL that serves stale entries while
//!   the upstream is down
//! - **Metrics** with a cached snapshot, plus a health report
//! - **Lifecycle events** via typed publish/subscribe
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use async_trait::async_trait;
//! use serde_json::{json, Value};
//! use grpc_resilient::{
//!     CallOptions, Channel, ChannelFactory, ChannelState, ClientConfig, Metadata,
//!     ResilientClient, Status, TransportOptions,
//! };
//!
//! // A toy transport; production factories wrap a real gRPC binding.
//! struct EchoChannel;
//!
//! #[async_trait]
//! impl Channel for EchoChannel {
//!     async fn wait_for_ready(&self, _timeout: Duration) -> Result<(), Status> {
//!         Ok(())
//!     }
//!     fn state(&self) -> ChannelState {
//!         ChannelState::Ready
//!     }
//!     async fn invoke(
//!         &self,
//!         method: &str,
//!         request: Value,
//!         _metadata: &Metadata,
//!         _timeout: Duration,
//!     ) -> Result<Value, Status> {
//!         Ok(json!({ "method": method, "echo": request }))
//!     }
//!     fn close(&self) {}
//! }
//!
//! struct EchoFactory;
//!
//! impl ChannelFactory for EchoFactory {
//!     fn create(&self, _options: &TransportOptions) -> Result<Arc<dyn Channel>, Status> {
//!         Ok(Arc::new(EchoChannel))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder("user-service", "grpc://localhost:50051")
//!         .enable_fallback_cache(true)
//!         .build()?;
//!     let client = ResilientClient::new(config, Arc::new(EchoFactory))?;
//!
//!     let response = client
//!         .call("GetUser", json!({ "id": 1 }), CallOptions::default())
//!         .await?;
//!     assert_eq!(response["method"], "GetUser");
//!
//!     let health = client.get_health();
//!     assert!(health.healthy);
//!     client.close();
//!     Ok(())
//! }
//! ```

mod backoff;
mod cache;
mod cache_key;
mod client;
mod clock;
mod config;
mod connection;
mod error;
mod events;
mod metrics;
mod sleeper;
mod transport;

// Re-exports
pub use backoff::{ReconnectBackoff, RetryBackoff, RECONNECT_JITTER_MS};
pub use cache::FallbackCache;
pub use cache_key::cache_key;
pub use client::{CallOptions, HealthReport, ResilientClient};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    ClientConfig, ClientConfigBuilder, Credentials, TransportOptions, DEFAULT_MAX_MESSAGE_SIZE,
    MAX_CACHE_SIZE, MAX_CACHE_TTL_MS, MIN_CACHE_SIZE, MIN_CACHE_TTL_MS,
};
pub use connection::{ConnectionManager, ConnectionState};
pub use error::{CacheError, ClientError, Code, ConfigError};
pub use events::{ClientEvent, EventBus, EventKind, Subscription};
pub use metrics::{MetricsSnapshot, MetricsTracker};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use transport::{Channel, ChannelFactory, ChannelState, Metadata, Status};

pub mod prelude;
