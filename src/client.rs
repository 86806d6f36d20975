//! The public client: retrying call orchestration over a managed connection,
//! with fallback-cache reads on terminal failure and metrics on every call.

use crate::backoff::RetryBackoff;
use crate::cache::FallbackCache;
use crate::cache_key::cache_key;
use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::{ClientError, ConfigError};
use crate::events::{ClientEvent, EventBus, EventKind, Subscription};
use crate::metrics::{MetricsSnapshot, MetricsTracker};
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::transport::{ChannelFactory, Metadata};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sentinel for "no call has completed yet".
const NO_LATENCY: u64 = u64::MAX;

/// Per-call options. Everything defaults to the configured behavior.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Overrides the configured per-attempt timeout.
    pub timeout: Option<Duration>,
    /// Sent as `accept-language` metadata when present.
    pub locale: Option<String>,
    /// Sent as `x-client-url` metadata when present.
    pub client_url: Option<String>,
    /// Limit the call to a single attempt.
    pub skip_retry: bool,
    /// Use this cache key instead of deriving one from (method, request).
    pub cache_key: Option<String>,
    /// Bypass the fallback cache for this call.
    pub skip_cache: bool,
    /// Extra metadata pairs appended after the injected ones.
    pub metadata: Metadata,
}

/// Point-in-time health view, embedding the current metrics snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub state: ConnectionState,
    pub healthy: bool,
    pub latency_ms: Option<u64>,
    pub last_connected_at: Option<u64>,
    pub last_error_at: Option<u64>,
    pub last_error: Option<String>,
    pub reconnect_attempts: u32,
    pub metrics: MetricsSnapshot,
}

/// Resilient unary-call client for one remote service.
///
/// Service-specific wrappers stay thin: they hold one of these and forward
/// typed requests through [`ResilientClient::call`] by method name.
pub struct ResilientClient {
    config: Arc<ClientConfig>,
    connection: ConnectionManager,
    cache: Option<FallbackCache>,
    metrics: Arc<MetricsTracker>,
    events: Arc<EventBus>,
    sleeper: Arc<dyn Sleeper>,
    retry_backoff: RetryBackoff,
    last_latency_ms: AtomicU64,
}

impl ResilientClient {
    pub fn new(
        config: ClientConfig,
        factory: Arc<dyn ChannelFactory>,
    ) -> Result<Self, ConfigError> {
        Self::with_timers(config, factory, Arc::new(SystemClock), Arc::new(TokioSleeper))
    }

    /// Construction with injectable time sources. Production code wants
    /// [`ResilientClient::new`]; tests pass manual clocks and fake sleepers.
    pub fn with_timers(
        config: ClientConfig,
        factory: Arc<dyn ChannelFactory>,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self, ConfigError> {
        let config = Arc::new(config);
        let cache = if config.enable_fallback_cache {
            Some(FallbackCache::new(
                &config.service_name,
                config.max_cache_size,
                config.fallback_cache_ttl,
                clock.clone(),
            )?)
        } else {
            None
        };
        let events = Arc::new(EventBus::new());
        let connection = ConnectionManager::new(
            config.clone(),
            factory,
            events.clone(),
            clock.clone(),
            sleeper.clone(),
        );
        Ok(Self {
            retry_backoff: RetryBackoff::new(config.retry_delay),
            metrics: Arc::new(MetricsTracker::new(clock)),
            config,
            connection,
            cache,
            events,
            sleeper,
            last_latency_ms: AtomicU64::new(NO_LATENCY),
        })
    }

    /// Invoke a unary method with retries, per-attempt timeouts, and fallback
    /// cache reads on terminal failure.
    pub async fn call(
        &self,
        method: &str,
        request: Value,
        options: CallOptions,
    ) -> Result<Value, ClientError> {
        if self.connection.is_shutting_down() {
            return Err(ClientError::shutting_down(&self.config.service_name));
        }

        let effective_key =
            options.cache_key.clone().unwrap_or_else(|| cache_key(method, &request));
        let use_cache = self.cache.is_some() && !options.skip_cache;
        let max_attempts =
            if options.skip_retry { 1 } else { self.config.retry_count.saturating_add(1) };
        let timeout = options.timeout.unwrap_or(self.config.timeout);
        let metadata = build_metadata(&options);

        self.metrics.record_call_start();
        let mut last_error: Option<ClientError> = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                self.metrics.record_retry();
            }
            if !self.connection.ensure_connected().await {
                return self.unavailable_fallback(method, &effective_key, use_cache);
            }
            let Some(channel) = self.connection.channel() else {
                return self.unavailable_fallback(method, &effective_key, use_cache);
            };

            let start = Instant::now();
            match channel.invoke(method, request.clone(), &metadata, timeout).await {
                Ok(response) => {
                    let latency = start.elapsed().as_millis() as u64;
                    self.metrics.record_success(latency);
                    self.last_latency_ms.store(latency, Ordering::Relaxed);
                    if use_cache {
                        if let Some(cache) = &self.cache {
                            let _ = cache.set(&effective_key, response.clone(), None);
                        }
                    }
                    return Ok(response);
                }
                Err(status) => {
                    let err = ClientError::from(status);
                    tracing::warn!(
                        service = %self.config.service_name,
                        method,
                        attempt,
                        error = %err,
                        "call attempt failed"
                    );
                    let retryable = err.is_retryable();
                    let connection_lost = err.is_connection_error();
                    last_error = Some(err);
                    if !retryable || attempt + 1 >= max_attempts {
                        break;
                    }
                    if connection_lost {
                        self.connection.handle_connection_lost();
                    }
                    self.sleeper.sleep(self.retry_backoff.delay(attempt)).await;
                }
            }
        }

        self.metrics.record_failure();
        let err = last_error.expect("retry loop exits with an error recorded");
        if use_cache {
            if let Some(cache) = &self.cache {
                if let Some(value) = cache.get(&effective_key) {
                    self.metrics.record_cache_hit();
                    tracing::warn!(
                        service = %self.config.service_name,
                        method,
                        key = %effective_key,
                        error = %err,
                        "serving cached response after retry exhaustion"
                    );
                    return Ok(value);
                }
            }
            self.metrics.record_cache_miss();
        }
        Err(err)
    }

    /// Terminal path when the connection cannot be established at all.
    fn unavailable_fallback(
        &self,
        method: &str,
        key: &str,
        use_cache: bool,
    ) -> Result<Value, ClientError> {
        self.metrics.record_failure();
        if use_cache {
            if let Some(cache) = &self.cache {
                if let Some(value) = cache.get(key) {
                    self.metrics.record_cache_hit();
                    tracing::info!(
                        service = %self.config.service_name,
                        method,
                        key,
                        "service unavailable; serving cached response"
                    );
                    return Ok(value);
                }
            }
            self.metrics.record_cache_miss();
        }
        Err(ClientError::unavailable(&self.config.service_name))
    }

    pub async fn ensure_connected(&self) -> bool {
        self.connection.ensure_connected().await
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Shut down: stop reconnection, release the channel, drop cached
    /// entries, and detach all event listeners.
    pub fn close(&self) {
        self.connection.close();
        if let Some(cache) = &self.cache {
            cache.clear();
        }
        self.events.clear();
    }

    pub fn get_health(&self) -> HealthReport {
        let state = self.connection.state();
        let last_latency = self.last_latency_ms.load(Ordering::Relaxed);
        HealthReport {
            state,
            healthy: state == ConnectionState::Connected,
            latency_ms: (last_latency != NO_LATENCY).then_some(last_latency),
            last_connected_at: self.connection.last_connected_at(),
            last_error_at: self.connection.last_error_at(),
            last_error: self.connection.last_error().map(|e| e.message().to_string()),
            reconnect_attempts: self.connection.reconnect_attempts(),
            metrics: (*self.metrics.get_metrics()).clone(),
        }
    }

    pub fn get_metrics(&self) -> Arc<MetricsSnapshot> {
        self.metrics.get_metrics()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    pub fn success_rate(&self) -> u64 {
        self.metrics.success_rate()
    }

    pub fn cache_hit_rate(&self) -> u64 {
        self.metrics.cache_hit_rate()
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    /// Direct access to the fallback cache, when enabled. Lets embedding code
    /// pre-seed entries or run periodic `cleanup`.
    pub fn cache(&self) -> Option<&FallbackCache> {
        self.cache.as_ref()
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(kind, handler)
    }

    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.events.unsubscribe(subscription)
    }

    /// Hook for wrappers that implement their own breaker policy: bumps the
    /// trip counter and notifies subscribers. The core never trips itself.
    pub fn record_circuit_breaker_trip(&self) {
        self.metrics.record_circuit_breaker_trip();
        self.events.emit(&ClientEvent::CircuitBreakerTrip {
            service_name: self.config.service_name.clone(),
        });
    }

    pub fn service_name(&self) -> &str {
        &self.config.service_name
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl std::fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClient")
            .field("service", &self.config.service_name)
            .field("state", &self.connection.state())
            .finish()
    }
}

fn build_metadata(options: &CallOptions) -> Metadata {
    let mut metadata = Metadata::new();
    if let Some(locale) = &options.locale {
        metadata.push(("accept-language".to_string(), locale.clone()));
    }
    if let Some(client_url) = &options.client_url {
        metadata.push(("x-client-url".to_string(), client_url.clone()));
    }
    metadata.extend(options.metadata.iter().cloned());
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_injection_order() {
        let options = CallOptions {
            locale: Some("de-DE".into()),
            client_url: Some("https://app.example".into()),
            metadata: vec![("x-request-id".into(), "abc".into())],
            ..Default::default()
        };
        assert_eq!(
            build_metadata(&options),
            vec![
                ("accept-language".to_string(), "de-DE".to_string()),
                ("x-client-url".to_string(), "https://app.example".to_string()),
                ("x-request-id".to_string(), "abc".to_string()),
            ]
        );
    }

    #[test]
    fn metadata_omits_unset_fields() {
        assert!(build_metadata(&CallOptions::default()).is_empty());

        let options = CallOptions { locale: Some("en".into()), ..Default::default() };
        assert_eq!(build_metadata(&options), vec![("accept-language".to_string(), "en".to_string())]);
    }
}
