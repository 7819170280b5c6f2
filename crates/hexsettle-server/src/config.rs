//! Server configuration read from the environment.

use anyhow::Context;
use hexsettle_core::GameConfig;
use hexsettle_core::game::{MAX_PLAYERS, MIN_PLAYERS};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to (`SERVER_ADDR`)
    pub addr: SocketAddr,
    /// `VICTORY_POINTS_TO_WIN`
    pub victory_points_to_win: u32,
    /// How long players get to discard after a 7 (`DISCARD_TIMEOUT_SECS`)
    pub discard_timeout: Duration,
    /// Seats per session (`MAX_PLAYERS`), clamped to what the engine supports
    pub max_players: u8,
    /// Bound of each session's mailbox (`MAILBOX_CAPACITY`)
    pub mailbox_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            victory_points_to_win: 10,
            discard_timeout: Duration::from_secs(60),
            max_players: 4,
            mailbox_capacity: 64,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let max_players: u8 = parse_or(&lookup, "MAX_PLAYERS", defaults.max_players)?;
        let mailbox_capacity: usize = parse_or(&lookup, "MAILBOX_CAPACITY", defaults.mailbox_capacity)?;

        Ok(Self {
            addr: parse_or(&lookup, "SERVER_ADDR", defaults.addr)?,
            victory_points_to_win: parse_or(&lookup, "VICTORY_POINTS_TO_WIN", defaults.victory_points_to_win)?,
            discard_timeout: Duration::from_secs(parse_or(
                &lookup,
                "DISCARD_TIMEOUT_SECS",
                defaults.discard_timeout.as_secs(),
            )?),
            max_players: max_players.clamp(MIN_PLAYERS as u8, MAX_PLAYERS as u8),
            // tokio panics on a zero-capacity channel
            mailbox_capacity: mailbox_capacity.max(1),
        })
    }

    /// Rules handed to every new session
    pub fn game_config(&self) -> GameConfig {
        GameConfig {
            victory_points_to_win: self.victory_points_to_win,
            ..GameConfig::default()
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("invalid {key}: {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.addr.to_string(), "0.0.0.0:8080");
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("SERVER_ADDR", "127.0.0.1:9000"),
            ("VICTORY_POINTS_TO_WIN", "12"),
            ("DISCARD_TIMEOUT_SECS", "5"),
            ("MAX_PLAYERS", "9"),
        ]))
        .unwrap();

        assert_eq!(config.addr.port(), 9000);
        assert_eq!(config.victory_points_to_win, 12);
        assert_eq!(config.discard_timeout, Duration::from_secs(5));
        assert_eq!(config.max_players, 6);
        assert_eq!(config.game_config().victory_points_to_win, 12);
    }

    #[test]
    fn test_invalid_value_is_an_error() {
        let err = ServerConfig::from_lookup(lookup(&[("MAILBOX_CAPACITY", "lots")])).unwrap_err();
        assert!(err.to_string().contains("MAILBOX_CAPACITY"));
    }
}
