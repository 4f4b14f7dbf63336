//! Environment-backed runtime configuration for `lobbychat-console`.

use std::{env, fmt};

use lobby_runtime::RuntimeConfig;

const DEFAULT_MEMBER_ID: u64 = 76_561_197_960_265_729;
const DEFAULT_CREATED_LOBBY_LIMIT: u32 = 4;
const DEFAULT_CHAT_MAX_LINES: usize = 200;

/// Runtime configuration used by the console app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleConfig {
    /// Member identity the loopback backend acts as.
    pub member_id: u64,
    /// Member capacity of lobbies created from this client.
    pub created_lobby_limit: u32,
    /// Chat pane retention cap.
    pub chat_max_lines: usize,
}

/// Configuration parsing failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    key: &'static str,
    value: String,
    reason: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid value '{}' for {}: {}",
            self.value, self.key, self.reason
        )
    }
}

impl std::error::Error for ConfigError {}

impl ConsoleConfig {
    /// Parse configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let member_id = parse_or_default("LOBBYCHAT_MEMBER_ID", DEFAULT_MEMBER_ID, &mut lookup)?;
        let created_lobby_limit = parse_or_default(
            "LOBBYCHAT_LOBBY_LIMIT",
            DEFAULT_CREATED_LOBBY_LIMIT,
            &mut lookup,
        )?;
        let chat_max_lines =
            parse_or_default("LOBBYCHAT_CHAT_LINES", DEFAULT_CHAT_MAX_LINES, &mut lookup)?;

        if created_lobby_limit == 0 {
            return Err(ConfigError {
                key: "LOBBYCHAT_LOBBY_LIMIT",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }
        if chat_max_lines == 0 {
            return Err(ConfigError {
                key: "LOBBYCHAT_CHAT_LINES",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }

        Ok(Self {
            member_id,
            created_lobby_limit,
            chat_max_lines,
        })
    }

    /// Runtime tuning derived from this configuration.
    pub fn runtime(&self) -> RuntimeConfig {
        RuntimeConfig {
            created_lobby_limit: self.created_lobby_limit,
            ..RuntimeConfig::default()
        }
    }
}

fn parse_or_default<T, F>(key: &'static str, default: T, lookup: &mut F) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
    F: FnMut(&str) -> Option<String>,
{
    let Some(raw) = lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty()) else {
        return Ok(default);
    };

    raw.parse::<T>().map_err(|err| ConfigError {
        key,
        value: raw,
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_environment() {
        let config = ConsoleConfig::from_lookup(|_| None).expect("defaults must parse");
        assert_eq!(config.created_lobby_limit, DEFAULT_CREATED_LOBBY_LIMIT);
        assert_eq!(config.chat_max_lines, DEFAULT_CHAT_MAX_LINES);
    }

    #[test]
    fn environment_overrides_are_parsed() {
        let config = ConsoleConfig::from_lookup(|key| match key {
            "LOBBYCHAT_MEMBER_ID" => Some("42".to_owned()),
            "LOBBYCHAT_LOBBY_LIMIT" => Some("8".to_owned()),
            _ => None,
        })
        .expect("overrides must parse");

        assert_eq!(config.member_id, 42);
        assert_eq!(config.created_lobby_limit, 8);
        assert_eq!(config.runtime().created_lobby_limit, 8);
    }

    #[test]
    fn invalid_values_are_rejected_with_key_context() {
        let err = ConsoleConfig::from_lookup(|key| match key {
            "LOBBYCHAT_LOBBY_LIMIT" => Some("not-a-number".to_owned()),
            _ => None,
        })
        .expect_err("garbage must be rejected");
        assert!(err.to_string().contains("LOBBYCHAT_LOBBY_LIMIT"));
    }

    #[test]
    fn zero_lobby_limit_is_rejected() {
        let err = ConsoleConfig::from_lookup(|key| match key {
            "LOBBYCHAT_LOBBY_LIMIT" => Some("0".to_owned()),
            _ => None,
        })
        .expect_err("zero capacity is unusable");
        assert!(err.to_string().contains("at least 1"));
    }
}
