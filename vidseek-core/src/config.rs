//! Centralized configuration for Vidseek.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::path::PathBuf;
use std::time::Duration;

use crate::retry::{RetryPolicy, RetryStrategy};

/// Central configuration for all Vidseek components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct VidseekConfig {
    pub network: NetworkConfig,
    pub session: SessionConfig,
    pub server: ServerConfig,
    pub consumer: ConsumerConfig,
}

/// Upstream HTTP behavior shared by search and detail fetches.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Hard timeout for a single attempt against an upstream
    pub attempt_timeout: Duration,
    /// Retries after the first attempt (transport failure, timeout, 5xx only)
    pub max_retries: u32,
    /// Delay between attempts
    pub retry_delay: Duration,
    /// User agent for upstream requests
    pub user_agent: &'static str,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(8),
            max_retries: 1,
            retry_delay: Duration::from_millis(500),
            user_agent: "vidseek/0.1.0",
        }
    }
}

impl NetworkConfig {
    /// Builds the retry policy every upstream call is wrapped in.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempt_timeout: self.attempt_timeout,
            max_retries: self.max_retries,
            strategy: RetryStrategy::FixedDelay {
                delay: self.retry_delay,
            },
        }
    }
}

/// Limits applied to one streaming search session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Overall deadline for a session; `complete` is forced when it passes
    pub session_timeout: Duration,
    /// Highest page number fetched per source during fan-out (None = every
    /// reported page)
    pub max_pages_per_source: Option<u32>,
    /// Maximum simultaneous upstream requests (None = unbounded)
    pub max_concurrent_fetches: Option<usize>,
    /// Capacity of the event channel between orchestrator and transport
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_secs(30),
            max_pages_per_source: None,
            max_concurrent_fetches: None,
            event_buffer: 64,
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to bind
    pub bind: String,
    /// JSON file holding the source registry
    pub sources_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            sources_file: None,
        }
    }
}

/// Client-side stream consumption settings.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Silence after which the consumer declares the stream done
    pub watchdog: Duration,
    /// Minimum fuzzy similarity for a title that fails the substring checks
    pub min_similarity: f64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            watchdog: Duration::from_secs(3),
            min_similarity: 0.6,
        }
    }
}

impl VidseekConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults. Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(ms) = env_number::<u64>("VIDSEEK_ATTEMPT_TIMEOUT_MS") {
            config.network.attempt_timeout = Duration::from_millis(ms);
        }
        if let Some(retries) = env_number::<u32>("VIDSEEK_MAX_RETRIES") {
            config.network.max_retries = retries;
        }
        if let Some(ms) = env_number::<u64>("VIDSEEK_RETRY_DELAY_MS") {
            config.network.retry_delay = Duration::from_millis(ms);
        }

        if let Some(seconds) = env_number::<u64>("VIDSEEK_SESSION_TIMEOUT_SECS") {
            config.session.session_timeout = Duration::from_secs(seconds);
        }
        if let Some(pages) = env_number::<u32>("VIDSEEK_MAX_PAGES") {
            // 0 means uncapped
            config.session.max_pages_per_source = (pages > 0).then_some(pages);
        }
        if let Some(limit) = env_number::<usize>("VIDSEEK_MAX_CONCURRENT") {
            // 0 means unbounded
            config.session.max_concurrent_fetches = (limit > 0).then_some(limit);
        }

        if let Ok(bind) = std::env::var("VIDSEEK_BIND") {
            config.server.bind = bind;
        }
        if let Ok(path) = std::env::var("VIDSEEK_SOURCES_FILE") {
            config.server.sources_file = Some(PathBuf::from(path));
        }

        if let Some(ms) = env_number::<u64>("VIDSEEK_WATCHDOG_MS") {
            config.consumer.watchdog = Duration::from_millis(ms);
        }

        config
    }

    /// Creates a configuration optimized for testing.
    ///
    /// Short timeouts keep failure-path tests fast while still exercising
    /// one retry.
    pub fn for_testing() -> Self {
        Self {
            network: NetworkConfig {
                attempt_timeout: Duration::from_millis(500),
                max_retries: 1,
                retry_delay: Duration::from_millis(20),
                ..Default::default()
            },
            session: SessionConfig {
                session_timeout: Duration::from_secs(10),
                ..Default::default()
            },
            server: ServerConfig {
                bind: "127.0.0.1:0".to_string(),
                sources_file: None,
            },
            consumer: ConsumerConfig::default(),
        }
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = VidseekConfig::default();

        assert_eq!(config.network.attempt_timeout, Duration::from_secs(8));
        assert_eq!(config.network.max_retries, 1);
        assert_eq!(config.session.max_pages_per_source, None);
        assert_eq!(config.session.max_concurrent_fetches, None);
        assert_eq!(config.consumer.watchdog, Duration::from_secs(3));
        assert_eq!(config.server.bind, "127.0.0.1:3000");
    }

    #[test]
    fn test_retry_policy_from_network_config() {
        let policy = NetworkConfig::default().retry_policy();

        assert_eq!(policy.max_attempts(), 2);
        assert_eq!(policy.attempt_timeout, Duration::from_secs(8));
        assert_eq!(policy.strategy.calculate_delay(1), Duration::from_millis(500));
    }

    #[test]
    fn test_env_override() {
        unsafe {
            std::env::set_var("VIDSEEK_ATTEMPT_TIMEOUT_MS", "1500");
            std::env::set_var("VIDSEEK_MAX_RETRIES", "2");
            std::env::set_var("VIDSEEK_MAX_PAGES", "3");
            std::env::set_var("VIDSEEK_MAX_CONCURRENT", "8");
            std::env::set_var("VIDSEEK_SOURCES_FILE", "/tmp/sources.json");
            std::env::set_var("VIDSEEK_WATCHDOG_MS", "not-a-number");
        }

        let config = VidseekConfig::from_env();

        assert_eq!(config.network.attempt_timeout, Duration::from_millis(1500));
        assert_eq!(config.network.max_retries, 2);
        assert_eq!(config.session.max_pages_per_source, Some(3));
        assert_eq!(config.session.max_concurrent_fetches, Some(8));
        assert_eq!(
            config.server.sources_file,
            Some(PathBuf::from("/tmp/sources.json"))
        );
        assert_eq!(config.consumer.watchdog, Duration::from_secs(3));

        // Cleanup
        unsafe {
            std::env::remove_var("VIDSEEK_ATTEMPT_TIMEOUT_MS");
            std::env::remove_var("VIDSEEK_MAX_RETRIES");
            std::env::remove_var("VIDSEEK_MAX_PAGES");
            std::env::remove_var("VIDSEEK_MAX_CONCURRENT");
            std::env::remove_var("VIDSEEK_SOURCES_FILE");
            std::env::remove_var("VIDSEEK_WATCHDOG_MS");
        }
    }
}
