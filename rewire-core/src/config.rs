//! Session configuration.

use std::env;

/// Configuration for a [`MockSession`](crate::MockSession).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Session name, attached to every log event of the session.
    name: String,
    /// Whether handles keep a log of observed calls.
    record_calls: bool,
    /// Whether `verify()` re-raises a failure the code under test swallowed.
    rethrow_swallowed: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "rewire".to_string(),
            record_calls: true,
            rethrow_swallowed: true,
        }
    }
}

impl SessionConfig {
    /// Create a new builder.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Create configuration from environment variables.
    ///
    /// Environment variables:
    /// - `REWIRE_SESSION_NAME`: session name (defaults to "rewire")
    /// - `REWIRE_RECORD_CALLS`: "false" or "0" to disable call logs
    /// - `REWIRE_RETHROW_SWALLOWED`: "false" or "0" to let `verify()` ignore swallowed failures
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            name: env::var("REWIRE_SESSION_NAME").unwrap_or(defaults.name),
            record_calls: env_flag("REWIRE_RECORD_CALLS").unwrap_or(defaults.record_calls),
            rethrow_swallowed: env_flag("REWIRE_RETHROW_SWALLOWED")
                .unwrap_or(defaults.rethrow_swallowed),
        }
    }

    /// Get the session name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if call logs are kept.
    pub fn record_calls(&self) -> bool {
        self.record_calls
    }

    /// Check if swallowed failures are re-raised by `verify()`.
    pub fn rethrow_swallowed(&self) -> bool {
        self.rethrow_swallowed
    }
}

/// Builder for SessionConfig.
#[derive(Debug, Clone, Default)]
pub struct SessionConfigBuilder {
    name: Option<String>,
    record_calls: Option<bool>,
    rethrow_swallowed: Option<bool>,
}

impl SessionConfigBuilder {
    /// Set the session name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Keep or drop per-handle call logs.
    pub fn record_calls(mut self, record: bool) -> Self {
        self.record_calls = Some(record);
        self
    }

    /// Re-raise swallowed failures at verify.
    pub fn rethrow_swallowed(mut self, rethrow: bool) -> Self {
        self.rethrow_swallowed = Some(rethrow);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> SessionConfig {
        let defaults = SessionConfig::default();
        SessionConfig {
            name: self.name.unwrap_or(defaults.name),
            record_calls: self.record_calls.unwrap_or(defaults.record_calls),
            rethrow_swallowed: self.rethrow_swallowed.unwrap_or(defaults.rethrow_swallowed),
        }
    }
}

/// Read a boolean environment flag. Unset or unparsable values yield `None`.
pub(crate) fn env_flag(key: &str) -> Option<bool> {
    env::var(key).ok().and_then(|s| parse_flag(&s))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.name(), "rewire");
        assert!(config.record_calls());
        assert!(config.rethrow_swallowed());
    }

    #[test]
    fn test_config_builder() {
        let config = SessionConfig::builder()
            .name("checkout-tests")
            .record_calls(false)
            .build();

        assert_eq!(config.name(), "checkout-tests");
        assert!(!config.record_calls());
        assert!(config.rethrow_swallowed());
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" 0 "), Some(false));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_config_from_env() {
        // Test that from_env doesn't panic with missing env vars
        let config = SessionConfig::from_env();
        assert!(!config.name().is_empty());
    }
}
