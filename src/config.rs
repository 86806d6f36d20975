//! Client configuration and the transport descriptor passed to factories.

use crate::error::ConfigError;
use std::time::Duration;

/// Bounds enforced on the fallback cache capacity.
pub const MIN_CACHE_SIZE: usize = 1;
pub const MAX_CACHE_SIZE: usize = 100_000;

/// Bounds enforced on cache TTLs, in milliseconds.
pub const MIN_CACHE_TTL_MS: u64 = 10;
pub const MAX_CACHE_TTL_MS: u64 = 86_400_000;

/// Default max message size in both directions (5 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 5 * 1024 * 1024;

/// Channel credentials, passed through to the transport factory untouched.
///
/// Loading and parsing certificate material is the embedding application's
/// concern; the core only routes the handle.
#[derive(Debug, Clone, Default)]
pub enum Credentials {
    #[default]
    Insecure,
    Tls {
        ca_pem: Option<Vec<u8>>,
        cert_pem: Option<Vec<u8>>,
        key_pem: Option<Vec<u8>>,
    },
}

/// Opaque descriptor handed to the transport factory. The core never
/// interprets these fields.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub url: String,
    pub credentials: Credentials,
    pub keepalive_time: Duration,
    pub keepalive_timeout: Duration,
    pub max_send_message_size: usize,
    pub max_receive_message_size: usize,
    /// Schema location (e.g. a .proto path), when the transport loads one.
    pub proto_path: Option<String>,
    pub package: Option<String>,
    pub service: Option<String>,
}

/// Immutable configuration for one [`crate::ResilientClient`] instance.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub service_name: String,
    pub grpc_url: String,
    pub timeout: Duration,
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub initial_reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
    /// `None` means unbounded reconnection.
    pub max_reconnect_attempts: Option<u32>,
    pub keepalive_time: Duration,
    pub keepalive_timeout: Duration,
    pub enable_fallback_cache: bool,
    pub fallback_cache_ttl: Duration,
    pub max_cache_size: usize,
    pub credentials: Credentials,
    pub proto_path: Option<String>,
    pub package: Option<String>,
    pub service: Option<String>,
}

impl ClientConfig {
    pub fn builder(
        service_name: impl Into<String>,
        grpc_url: impl Into<String>,
    ) -> ClientConfigBuilder {
        ClientConfigBuilder::new(service_name, grpc_url)
    }

    /// Assemble the descriptor the transport factory receives.
    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            url: self.grpc_url.clone(),
            credentials: self.credentials.clone(),
            keepalive_time: self.keepalive_time,
            keepalive_timeout: self.keepalive_timeout,
            max_send_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_receive_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            proto_path: self.proto_path.clone(),
            package: self.package.clone(),
            service: self.service.clone(),
        }
    }
}

pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new(service_name: impl Into<String>, grpc_url: impl Into<String>) -> Self {
        Self {
            config: ClientConfig {
                service_name: service_name.into(),
                grpc_url: grpc_url.into(),
                timeout: Duration::from_millis(5_000),
                retry_count: 3,
                retry_delay: Duration::from_millis(1_000),
                initial_reconnect_delay: Duration::from_millis(1_000),
                max_reconnect_delay: Duration::from_millis(30_000),
                max_reconnect_attempts: None,
                keepalive_time: Duration::from_millis(30_000),
                keepalive_timeout: Duration::from_millis(10_000),
                enable_fallback_cache: false,
                fallback_cache_ttl: Duration::from_millis(60_000),
                max_cache_size: 100,
                credentials: Credentials::Insecure,
                proto_path: None,
                package: None,
                service: None,
            },
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn retry_count(mut self, count: u32) -> Self {
        self.config.retry_count = count;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    pub fn initial_reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.initial_reconnect_delay = delay;
        self
    }

    pub fn max_reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.max_reconnect_delay = delay;
        self
    }

    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.max_reconnect_attempts = Some(attempts);
        self
    }

    pub fn keepalive_time(mut self, time: Duration) -> Self {
        self.config.keepalive_time = time;
        self
    }

    pub fn keepalive_timeout(mut self, timeout: Duration) -> Self {
        self.config.keepalive_timeout = timeout;
        self
    }

    pub fn enable_fallback_cache(mut self, enabled: bool) -> Self {
        self.config.enable_fallback_cache = enabled;
        self
    }

    pub fn fallback_cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.fallback_cache_ttl = ttl;
        self
    }

    pub fn max_cache_size(mut self, size: usize) -> Self {
        self.config.max_cache_size = size;
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.config.credentials = credentials;
        self
    }

    pub fn proto_path(mut self, path: impl Into<String>) -> Self {
        self.config.proto_path = Some(path.into());
        self
    }

    pub fn package(mut self, package: impl Into<String>) -> Self {
        self.config.package = Some(package.into());
        self
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.config.service = Some(service.into());
        self
    }

    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        let config = self.config;
        if config.service_name.trim().is_empty() {
            return Err(ConfigError::MissingServiceName);
        }
        if config.grpc_url.trim().is_empty() {
            return Err(ConfigError::MissingUrl);
        }
        if !(MIN_CACHE_SIZE..=MAX_CACHE_SIZE).contains(&config.max_cache_size) {
            return Err(ConfigError::CacheSizeOutOfRange {
                got: config.max_cache_size,
                min: MIN_CACHE_SIZE,
                max: MAX_CACHE_SIZE,
            });
        }
        let ttl_ms = config.fallback_cache_ttl.as_millis() as u64;
        if !(MIN_CACHE_TTL_MS..=MAX_CACHE_TTL_MS).contains(&ttl_ms) {
            return Err(ConfigError::CacheTtlOutOfRange {
                got: ttl_ms,
                min: MIN_CACHE_TTL_MS,
                max: MAX_CACHE_TTL_MS,
            });
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ClientConfig::builder("users", "grpc://localhost:50051").build().unwrap();
        assert_eq!(config.timeout, Duration::from_millis(5_000));
        assert_eq!(config.retry_count, 3);
        assert_eq!(config.retry_delay, Duration::from_millis(1_000));
        assert_eq!(config.initial_reconnect_delay, Duration::from_millis(1_000));
        assert_eq!(config.max_reconnect_delay, Duration::from_millis(30_000));
        assert_eq!(config.max_reconnect_attempts, None);
        assert_eq!(config.keepalive_time, Duration::from_millis(30_000));
        assert_eq!(config.keepalive_timeout, Duration::from_millis(10_000));
        assert!(!config.enable_fallback_cache);
        assert_eq!(config.fallback_cache_ttl, Duration::from_millis(60_000));
        assert_eq!(config.max_cache_size, 100);
    }

    #[test]
    fn rejects_blank_identity() {
        assert_eq!(
            ClientConfig::builder("   ", "grpc://x").build().unwrap_err(),
            ConfigError::MissingServiceName
        );
        assert_eq!(
            ClientConfig::builder("users", "").build().unwrap_err(),
            ConfigError::MissingUrl
        );
    }

    #[test]
    fn rejects_out_of_range_cache_settings() {
        let err = ClientConfig::builder("users", "grpc://x").max_cache_size(0).build().unwrap_err();
        assert!(matches!(err, ConfigError::CacheSizeOutOfRange { got: 0, .. }));

        let err = ClientConfig::builder("users", "grpc://x")
            .max_cache_size(100_001)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::CacheSizeOutOfRange { got: 100_001, .. }));

        let err = ClientConfig::builder("users", "grpc://x")
            .fallback_cache_ttl(Duration::from_millis(5))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::CacheTtlOutOfRange { got: 5, .. }));

        let err = ClientConfig::builder("users", "grpc://x")
            .fallback_cache_ttl(Duration::from_millis(86_400_001))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::CacheTtlOutOfRange { .. }));
    }

    #[test]
    fn transport_options_carry_descriptor_fields() {
        let config = ClientConfig::builder("users", "grpc://localhost:50051")
            .proto_path("protos/users.proto")
            .package("acme.users.v1")
            .service("UserService")
            .build()
            .unwrap();
        let options = config.transport_options();
        assert_eq!(options.url, "grpc://localhost:50051");
        assert_eq!(options.max_send_message_size, DEFAULT_MAX_MESSAGE_SIZE);
        assert_eq!(options.max_receive_message_size, DEFAULT_MAX_MESSAGE_SIZE);
        assert_eq!(options.proto_path.as_deref(), Some("protos/users.proto"));
        assert_eq!(options.package.as_deref(), Some("acme.users.v1"));
        assert_eq!(options.service.as_deref(), Some("UserService"));
    }
}
