use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::AccountId;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub points_per_stream: i64,
    pub revenue_per_stream: i64,
    pub replay_window: ReplayWindow,
    pub winner_share: Decimal,
    pub platform_account: AccountId,
    pub signup_bonus: i64,
    pub scheduler_interval_ms: u64,
    pub settlement_retry_max_ms: u64,
}

/// How long a (listener, song, battle) play blocks a repeat from scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayWindow {
    /// Use the declared duration of the song being played.
    SongDuration,
    /// Fixed window in milliseconds, regardless of song.
    FixedMs(i64),
}

impl ReplayWindow {
    /// Window length in milliseconds for a song of `song_duration_secs`.
    pub fn window_ms(&self, song_duration_secs: i64) -> i64 {
        match self {
            ReplayWindow::SongDuration => song_duration_secs.max(1).saturating_mul(1000),
            ReplayWindow::FixedMs(ms) => *ms,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = parse_or(&env_map, "PORT", 8080u16, "must be a valid u16")?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let points_per_stream =
            parse_or(&env_map, "POINTS_PER_STREAM", 10i64, "must be a valid i64")?;
        if points_per_stream <= 0 {
            return Err(ConfigError::InvalidValue(
                "POINTS_PER_STREAM".to_string(),
                "must be positive".to_string(),
            ));
        }

        let revenue_per_stream =
            parse_or(&env_map, "STREAM_REVENUE_PER_STREAM", 1i64, "must be a valid i64")?;
        if revenue_per_stream < 0 {
            return Err(ConfigError::InvalidValue(
                "STREAM_REVENUE_PER_STREAM".to_string(),
                "must not be negative".to_string(),
            ));
        }

        let replay_window = match env_map
            .get("REPLAY_WINDOW")
            .map(|s| s.trim())
            .unwrap_or("song")
        {
            "song" => ReplayWindow::SongDuration,
            other => match other.parse::<i64>() {
                Ok(ms) if ms >= 0 => ReplayWindow::FixedMs(ms),
                _ => {
                    return Err(ConfigError::InvalidValue(
                        "REPLAY_WINDOW".to_string(),
                        format!("must be song or a non-negative millisecond count, got {}", other),
                    ))
                }
            },
        };

        let winner_share = env_map
            .get("WINNER_SHARE")
            .map(|s| s.as_str())
            .unwrap_or("0.70");
        let winner_share = Decimal::from_str(winner_share)
            .ok()
            .filter(|d| *d >= Decimal::ZERO && *d <= Decimal::ONE)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "WINNER_SHARE".to_string(),
                    "must be a decimal between 0 and 1".to_string(),
                )
            })?;

        let platform_account = env_map
            .get("PLATFORM_ACCOUNT_ID")
            .map(|s| s.as_str())
            .unwrap_or("platform");
        let platform_account = AccountId::from_str(platform_account).map_err(|e| {
            ConfigError::InvalidValue("PLATFORM_ACCOUNT_ID".to_string(), e.to_string())
        })?;

        let signup_bonus = parse_or(&env_map, "SIGNUP_BONUS", 100i64, "must be a valid i64")?;
        if signup_bonus < 0 {
            return Err(ConfigError::InvalidValue(
                "SIGNUP_BONUS".to_string(),
                "must not be negative".to_string(),
            ));
        }

        let scheduler_interval_ms =
            parse_or(&env_map, "SCHEDULER_INTERVAL_MS", 1000u64, "must be a valid u64")?;
        let settlement_retry_max_ms =
            parse_or(&env_map, "SETTLEMENT_RETRY_MAX_MS", 30_000u64, "must be a valid u64")?;

        Ok(Config {
            port,
            database_path,
            points_per_stream,
            revenue_per_stream,
            replay_window,
            winner_share,
            platform_account,
            signup_bonus,
            scheduler_interval_ms,
            settlement_retry_max_ms,
        })
    }
}

fn parse_or<T: FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: T,
    message: &str,
) -> Result<T, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(key.to_string(), message.to_string())),
    }
}
