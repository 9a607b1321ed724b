//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Host password for the tournament control endpoints
    pub host_password: String,
    /// Allowed client origins for CORS (empty = any)
    pub client_origins: Vec<String>,

    /// REST table endpoint for per-match bot stats
    pub stats_store_url: Option<String>,
    /// API key for the stats store
    pub stats_store_key: Option<String>,

    /// Controller URLs for host-added house bots
    pub strategies: StrategyUrls,

    /// Simulation tunables
    pub game: GameConfig,
}

/// Controller addresses of the built-in house bots
#[derive(Clone, Debug, Default)]
pub struct StrategyUrls {
    pub attack: Option<String>,
    pub dodge: Option<String>,
    pub slow: Option<String>,
    pub error: Option<String>,
}

impl StrategyUrls {
    /// Look up a strategy by name; `None` when unknown
    pub fn get(&self, strategy: &str) -> Option<Option<&str>> {
        let url = match strategy {
            "attack" => &self.attack,
            "dodge" => &self.dodge,
            "slow" => &self.slow,
            "error" => &self.error,
            _ => return None,
        };
        Some(url.as_deref())
    }
}

/// Per-match simulation settings
#[derive(Clone, Debug, PartialEq)]
pub struct GameConfig {
    /// Wall-clock budget of one tick
    pub tick_duration: Duration,
    /// Minimum ticks between two successful moves of a tank
    pub tank_speed_ticks: u32,
    pub field_width: i32,
    pub field_height: i32,
    /// Tick ceiling of a match
    pub max_ticks: u64,
    /// Per-controller reply deadline
    pub action_timeout: Duration,
    /// Manhattan visibility radius
    pub fog_radius: i32,
    /// Generate walls and water at match start
    pub obstacles: bool,
    /// Per-tick probability of a power-up spawn
    pub power_up_spawn_chance: f64,
    /// Ticks a picked-up power-up stays active
    pub power_up_duration: u32,
    /// Pause between two matches of a tournament
    pub inter_match_delay: Duration,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tick_duration: Duration::from_millis(600),
            tank_speed_ticks: 2,
            field_width: 15,
            field_height: 15,
            max_ticks: 120,
            action_timeout: Duration::from_millis(1000),
            fog_radius: 20,
            obstacles: false,
            power_up_spawn_chance: 0.017,
            power_up_duration: 30,
            inter_match_delay: Duration::from_millis(5000),
        }
    }
}

impl GameConfig {
    /// Defaults overridden by any of the game environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let millis = |d: Duration| d.as_millis() as u64;

        let config = Self {
            tick_duration: Duration::from_millis(parse_or(
                "TICK_DURATION_MS",
                millis(defaults.tick_duration),
            )?),
            tank_speed_ticks: parse_or("TANK_SPEED_TICKS", defaults.tank_speed_ticks)?,
            field_width: parse_or("FIELD_WIDTH", defaults.field_width)?,
            field_height: parse_or("FIELD_HEIGHT", defaults.field_height)?,
            max_ticks: parse_or("MAX_TICKS", defaults.max_ticks)?,
            action_timeout: Duration::from_millis(parse_or(
                "ACTION_TIMEOUT_MS",
                millis(defaults.action_timeout),
            )?),
            fog_radius: parse_or("FOG_RADIUS", defaults.fog_radius)?,
            obstacles: parse_or("OBSTACLES", defaults.obstacles)?,
            power_up_spawn_chance: parse_or("POWER_UP_SPAWN_CHANCE", defaults.power_up_spawn_chance)?,
            power_up_duration: parse_or("POWER_UP_DURATION", defaults.power_up_duration)?,
            inter_match_delay: Duration::from_millis(parse_or(
                "INTER_MATCH_DELAY_MS",
                millis(defaults.inter_match_delay),
            )?),
        };

        if config.field_width <= 0 || config.field_height <= 0 {
            return Err(ConfigError::Invalid("FIELD_WIDTH/FIELD_HEIGHT"));
        }
        if !(0.0..=1.0).contains(&config.power_up_spawn_chance) {
            return Err(ConfigError::Invalid("POWER_UP_SPAWN_CHANCE"));
        }

        Ok(config)
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string())
        };

        let client_origins = env::var("CLIENT_ORIGIN")
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            host_password: env::var("HOST_PASSWORD")
                .map_err(|_| ConfigError::Missing("HOST_PASSWORD"))?,
            client_origins,

            stats_store_url: env::var("STATS_STORE_URL").ok(),
            stats_store_key: env::var("STATS_STORE_KEY").ok(),

            strategies: StrategyUrls {
                attack: env::var("STRATEGY_ATTACK_URL").ok(),
                dodge: env::var("STRATEGY_DODGE_URL").ok(),
                slow: env::var("STRATEGY_SLOW_URL").ok(),
                error: env::var("STRATEGY_ERROR_URL").ok(),
            },

            game: GameConfig::from_env()?,
        })
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_lookup_distinguishes_unknown_from_unset() {
        let urls = StrategyUrls {
            attack: Some("http://attack.local/action".to_string()),
            ..Default::default()
        };
        assert_eq!(urls.get("attack"), Some(Some("http://attack.local/action")));
        assert_eq!(urls.get("dodge"), Some(None));
        assert_eq!(urls.get("teleport"), None);
    }

    #[test]
    fn game_env_overrides_and_validation() {
        // Only test in the crate that touches the process environment
        env::set_var("FIELD_WIDTH", "9");
        env::set_var("ACTION_TIMEOUT_MS", "250");
        let config = GameConfig::from_env().unwrap();
        assert_eq!(config.field_width, 9);
        assert_eq!(config.action_timeout, Duration::from_millis(250));
        assert_eq!(config.field_height, 15);

        env::set_var("FIELD_WIDTH", "wide");
        assert!(matches!(
            GameConfig::from_env(),
            Err(ConfigError::Invalid("FIELD_WIDTH"))
        ));

        env::remove_var("FIELD_WIDTH");
        env::remove_var("ACTION_TIMEOUT_MS");
    }
}
