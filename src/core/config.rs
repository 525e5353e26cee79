use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::core::error::BotError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub market: MarketConfig,
    pub cache: CacheConfig,
    pub limits: LimitsConfig,
    pub data: DataConfig,
    pub process: ProcessConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    /// Bot API token. Required; comes from the environment in practice.
    pub token: String,
    pub api_url: String,
    pub poll_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MarketConfig {
    /// Region routing value the card endpoint expects, verbatim.
    pub dest: String,
    pub locale: String,
    pub timeout_secs: u64,
    /// How many text reviews to request per article.
    pub reviews_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    pub card_ttl_secs: i64,
    pub reviews_ttl_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    pub rate_window_secs: i64,
    pub rate_max_requests: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    pub dir: String,
    pub db_url: String,
}

/// The two boolean switches the runtime image sets for every process.
/// Outside a container both default to off.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProcessConfig {
    /// Skip writes to the derived-data cache; the filesystem stays
    /// read-mostly and stale entries cannot accumulate.
    pub cache_writes_disabled: bool,
    /// Log to stderr, flushed per event, so a crashing process cannot
    /// lose its final lines.
    pub unbuffered_logs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram: TelegramConfig {
                token: "".to_string(),
                api_url: "https://api.telegram.org".to_string(),
                poll_timeout_secs: 30,
            },
            market: MarketConfig {
                dest: "-1216601,-115136,-421732,123585595".to_string(),
                locale: "ru".to_string(),
                timeout_secs: 12,
                reviews_limit: 120,
            },
            cache: CacheConfig {
                card_ttl_secs: 600,
                reviews_ttl_secs: 3600,
            },
            limits: LimitsConfig {
                rate_window_secs: 60,
                rate_max_requests: 6,
            },
            data: DataConfig {
                dir: "data".to_string(),
                db_url: "sqlite://data/antifake.db".to_string(),
            },
            process: ProcessConfig {
                cache_writes_disabled: false,
                unbuffered_logs: false,
            },
        }
    }
}

impl Config {
    /// Defaults, then the TOML file, then `ANTIFAKE_`-prefixed environment
    /// variables with `__` separating nesting levels.
    pub fn load(path: &str) -> Result<Self, BotError> {
        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("ANTIFAKE_").split("__"))
            .extract()
            .map_err(|e| BotError::ConfigError {
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BotError> {
        if self.telegram.token.trim().is_empty() {
            return Err(BotError::ConfigError {
                reason: "telegram.token is empty; set ANTIFAKE_TELEGRAM__TOKEN".to_string(),
            });
        }
        Ok(())
    }
}
