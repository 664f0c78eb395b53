use crate::error::{GameError, GameResult};
use crate::words::WordList;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Tunables for one room. Bind address comes from the command line, the
/// rest from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub round_duration: Duration,
    pub break_duration: Duration,
    pub min_players: usize,
    /// Per-connection outbound packets allowed in flight before the
    /// connection is considered stalled.
    pub outbound_queue: usize,
    pub words_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            round_duration: Duration::from_secs(60),
            break_duration: Duration::from_secs(5),
            min_players: 2,
            outbound_queue: 256,
            words_file: None,
        }
    }
}

impl ServerConfig {
    /// Reads `ROUND_SECONDS`, `BREAK_SECONDS`, `MIN_PLAYERS`,
    /// `OUTBOUND_QUEUE` and `WORDS_FILE`, keeping defaults for unset ones.
    pub fn from_env() -> GameResult<Self> {
        let defaults = Self::default();
        let config = Self {
            round_duration: Duration::from_secs(env_or(
                "ROUND_SECONDS",
                defaults.round_duration.as_secs(),
            )?),
            break_duration: Duration::from_secs(env_or(
                "BREAK_SECONDS",
                defaults.break_duration.as_secs(),
            )?),
            min_players: env_or("MIN_PLAYERS", defaults.min_players)?,
            outbound_queue: env_or("OUTBOUND_QUEUE", defaults.outbound_queue)?,
            words_file: env::var_os("WORDS_FILE").map(PathBuf::from),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> GameResult<()> {
        if self.round_duration.as_secs() == 0 || self.break_duration.as_secs() == 0 {
            return Err(GameError::Config(
                "round and break durations must be at least one second".to_string(),
            ));
        }
        let longest = Duration::from_secs(u64::from(u32::MAX));
        if self.round_duration > longest || self.break_duration > longest {
            return Err(GameError::Config(format!(
                "round and break durations must not exceed {} seconds",
                u32::MAX
            )));
        }
        if self.min_players < 2 {
            return Err(GameError::Config(
                "a room needs at least two players".to_string(),
            ));
        }
        if self.outbound_queue == 0 {
            return Err(GameError::Config(
                "outbound queue must hold at least one packet".to_string(),
            ));
        }
        Ok(())
    }

    pub fn load_words(&self) -> GameResult<WordList> {
        match &self.words_file {
            Some(path) => WordList::from_file(path),
            None => Ok(WordList::default()),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> GameResult<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| GameError::Config(format!("{} has invalid value `{}`", key, raw))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServerConfig::default();
        assert_eq!(config.round_duration, Duration::from_secs(60));
        assert_eq!(config.break_duration, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_round() {
        let config = ServerConfig {
            round_duration: Duration::ZERO,
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(GameError::Config(_))));
    }

    #[test]
    fn test_rejects_durations_beyond_countdown_range() {
        let config = ServerConfig {
            round_duration: Duration::from_secs(1 << 32),
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(GameError::Config(_))));

        let config = ServerConfig {
            break_duration: Duration::from_secs(u64::from(u32::MAX)),
            ..ServerConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_single_player_room() {
        let config = ServerConfig {
            min_players: 1,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builtin_words_without_file() {
        let words = ServerConfig::default().load_words().unwrap();
        assert!(!words.is_empty());
    }
}
