//! Configuration for the negotiation client.

use std::time::Duration;
use url::Url;

/// Environment variable naming the relay endpoint for fallback transport.
pub const ENV_RELAY_URL: &str = "PAYCALL_RELAY_URL";

/// Environment variable overriding the finality timeout, in seconds.
pub const ENV_FINALITY_TIMEOUT_SECS: &str = "PAYCALL_FINALITY_TIMEOUT_SECS";

/// Default bound on the wait for transaction finality.
pub const DEFAULT_FINALITY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid {ENV_RELAY_URL}: {0}")]
    InvalidRelayUrl(#[source] url::ParseError),
    #[error("Invalid {ENV_FINALITY_TIMEOUT_SECS}: {0}")]
    InvalidFinalityTimeout(String),
}

/// Negotiation client settings.
#[derive(Debug, Clone)]
pub struct NegotiationConfig {
    /// Bound on the wait for transaction finality. Elapsing it fails the
    /// negotiation with a timeout, distinct from a rejected transaction.
    pub finality_timeout: Duration,
    /// Relay endpoint used for the single transport fallback, if any.
    pub relay_url: Option<Url>,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        NegotiationConfig {
            finality_timeout: DEFAULT_FINALITY_TIMEOUT,
            relay_url: None,
        }
    }
}

impl NegotiationConfig {
    /// Reads settings from the environment, using defaults for anything
    /// unset. Malformed values are errors, not silent defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let relay_url = match std::env::var(ENV_RELAY_URL) {
            Ok(raw) if !raw.trim().is_empty() => {
                Some(Url::parse(raw.trim()).map_err(ConfigError::InvalidRelayUrl)?)
            }
            _ => None,
        };
        let finality_timeout = match std::env::var(ENV_FINALITY_TIMEOUT_SECS) {
            Ok(raw) => {
                let secs = raw
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| ConfigError::InvalidFinalityTimeout(raw.clone()))?;
                Duration::from_secs(secs)
            }
            Err(_) => DEFAULT_FINALITY_TIMEOUT,
        };
        Ok(NegotiationConfig {
            finality_timeout,
            relay_url,
        })
    }

    pub fn with_relay_url(mut self, relay_url: Url) -> Self {
        self.relay_url = Some(relay_url);
        self
    }

    pub fn with_finality_timeout(mut self, timeout: Duration) -> Self {
        self.finality_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = NegotiationConfig::default();
        assert_eq!(config.finality_timeout, Duration::from_secs(60));
        assert!(config.relay_url.is_none());
    }

    #[test]
    fn builder_overrides() {
        let config = NegotiationConfig::default()
            .with_relay_url(Url::parse("https://relay.example/proxy-agent").unwrap())
            .with_finality_timeout(Duration::from_secs(5));
        assert_eq!(config.finality_timeout, Duration::from_secs(5));
        assert_eq!(
            config.relay_url.unwrap().as_str(),
            "https://relay.example/proxy-agent"
        );
    }
}
