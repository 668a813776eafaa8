//! Server configuration read from the environment

use crate::types::GameConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BIND: &str = "0.0.0.0:6574";
pub const DEFAULT_REVEAL_DELAY_MS: u64 = 3000;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub bind: SocketAddr,
    /// Time between a card flip and the dish claim
    pub reveal_delay: Duration,
    /// Snapshot imported at startup
    pub snapshot: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 6574)),
            reveal_delay: Duration::from_millis(DEFAULT_REVEAL_DELAY_MS),
            snapshot: None,
        }
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl AppConfig {
    /// Load config from environment variables, falling back to defaults on
    /// missing or malformed values
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind = match env_var("COOKOFF_BIND") {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!(
                    "Invalid COOKOFF_BIND '{}': {}; using {}",
                    raw,
                    e,
                    DEFAULT_BIND
                );
                defaults.bind
            }),
            None => defaults.bind,
        };

        let reveal_delay = match env_var("COOKOFF_REVEAL_DELAY_MS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(ms) => Duration::from_millis(ms),
                Err(e) => {
                    tracing::warn!(
                        "Invalid COOKOFF_REVEAL_DELAY_MS '{}': {}; using {}ms",
                        raw,
                        e,
                        DEFAULT_REVEAL_DELAY_MS
                    );
                    defaults.reveal_delay
                }
            },
            None => defaults.reveal_delay,
        };

        Self {
            bind,
            reveal_delay,
            snapshot: env_var("COOKOFF_SNAPSHOT").map(PathBuf::from),
        }
    }

    pub fn game_config(&self) -> GameConfig {
        GameConfig {
            reveal_delay: self.reveal_delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: [&str; 3] = ["COOKOFF_BIND", "COOKOFF_REVEAL_DELAY_MS", "COOKOFF_SNAPSHOT"];

    fn clear() {
        for key in KEYS {
            std::env::remove_var(key);
        }
    }

    fn set(key: &str, value: &str) {
        std::env::set_var(key, value);
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear();
        let config = AppConfig::from_env();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.bind.to_string(), DEFAULT_BIND);
        assert_eq!(config.game_config().reveal_delay, Duration::from_secs(3));
    }

    #[test]
    #[serial]
    fn test_overrides() {
        clear();
        set("COOKOFF_BIND", "127.0.0.1:9000");
        set("COOKOFF_REVEAL_DELAY_MS", "250");
        set("COOKOFF_SNAPSHOT", "/tmp/cookoff.json");

        let config = AppConfig::from_env();
        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.reveal_delay, Duration::from_millis(250));
        assert_eq!(config.snapshot, Some(PathBuf::from("/tmp/cookoff.json")));
        clear();
    }

    #[test]
    #[serial]
    fn test_malformed_values_fall_back() {
        clear();
        set("COOKOFF_BIND", "not an address");
        set("COOKOFF_REVEAL_DELAY_MS", "-5");

        let config = AppConfig::from_env();
        assert_eq!(config, AppConfig::default());
        clear();
    }
}
