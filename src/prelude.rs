//! Convenience re-exports for the common path.
//!
//! ```rust
//! use grpc_resilient::prelude::*;
//! ```

pub use crate::{
    CallOptions, Channel, ChannelFactory, ChannelState, ClientConfig, ClientError, ClientEvent,
    Code, ConnectionState, EventKind, Metadata, MetricsSnapshot, ResilientClient, Status,
    TransportOptions,
};
