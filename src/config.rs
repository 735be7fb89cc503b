//! Application-level configuration loading for the game session parameters.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "LUCKY_NINE_BACK_CONFIG_PATH";
/// Play window applied when nothing else is configured, in seconds.
const DEFAULT_SESSION_DURATION_SECS: u64 = 100;
/// Capacity applied when nothing else is configured.
const DEFAULT_MAX_PLAYERS: u32 = 10;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
///
/// Values are read once at session creation time and frozen into the session
/// row, so changing the configuration never affects a session already open.
pub struct AppConfig {
    session_duration_secs: u64,
    max_players: u32,
}

impl AppConfig {
    /// Load the configuration from disk, then apply environment overrides
    /// (`GAME_DURATION`, `MAX_USERS_PER_SESSION`), falling back to baked-in
    /// defaults for anything missing or invalid.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let mut config = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        duration_secs = config.session_duration_secs,
                        max_players = config.max_players,
                        "loaded game configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        if let Some(duration) = positive_env_u64("GAME_DURATION") {
            config.session_duration_secs = duration;
        }
        if let Some(max_players) = positive_env_u32("MAX_USERS_PER_SESSION") {
            config.max_players = max_players;
        }

        config
    }

    /// Length of the play window for newly created sessions, in seconds.
    pub fn session_duration_secs(&self) -> u64 {
        self.session_duration_secs
    }

    /// Capacity for newly created sessions.
    pub fn max_players(&self) -> u32 {
        self.max_players
    }

    /// Build a configuration with explicit values, bypassing disk and
    /// environment lookups.
    #[cfg(test)]
    pub(crate) fn for_tests(session_duration_secs: u64, max_players: u32) -> Self {
        Self {
            session_duration_secs,
            max_players,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            session_duration_secs: DEFAULT_SESSION_DURATION_SECS,
            max_players: DEFAULT_MAX_PLAYERS,
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    session_duration_secs: Option<u64>,
    max_players: Option<u32>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            session_duration_secs: value
                .session_duration_secs
                .filter(|secs| *secs > 0)
                .unwrap_or(defaults.session_duration_secs),
            max_players: value
                .max_players
                .filter(|count| *count > 0)
                .unwrap_or(defaults.max_players),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn positive_env_u64(var: &str) -> Option<u64> {
    let raw = env::var(var).ok()?;
    match raw.parse::<u64>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            warn!(var, raw, "ignoring non-positive or unparsable override");
            None
        }
    }
}

fn positive_env_u32(var: &str) -> Option<u32> {
    let raw = env::var(var).ok()?;
    match raw.parse::<u32>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            warn!(var, raw, "ignoring non-positive or unparsable override");
            None
        }
    }
}
