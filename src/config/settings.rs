use poise::serenity_prelude::UserId;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{BotError, Result};

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Which persistence backend the bot writes verification records to
#[derive(Debug, Clone, PartialEq)]
pub enum StoreBackend {
    /// Single JSON document on disk
    File(PathBuf),
    /// Process-local maps, lost on restart
    Memory,
}

/// Pacing between per-user API calls in batch operations
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacingConfig {
    /// Wait after each user during `/backup`
    pub backup_delay: Duration,
    /// Wait after each membership lookup during `/verified`
    pub stats_delay: Duration,
    /// When set, allow bursts of this size before pacing kicks in
    pub burst: Option<u32>,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            backup_delay: Duration::from_millis(1000),
            stats_delay: Duration::from_millis(300),
            burst: None,
        }
    }
}

/// Bot settings loaded from the environment
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub bot_token: String,
    pub client_id: String,
    pub client_secret: String,
    pub base_url: String,
    pub api_base: String,
    pub verified_role_id: String,
    pub admin_id: UserId,
    pub store: StoreBackend,
    pub port: u16,
    pub tls: Option<TlsPaths>,
    pub pacing: PacingConfig,
    pub member_check_timeout: Duration,
    pub member_write_timeout: Duration,
}

/// Certificate and key used when serving HTTPS
#[derive(Debug, Clone, PartialEq)]
pub struct TlsPaths {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl BotConfig {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| -> Option<String> {
            keys.iter().find_map(|k| {
                lookup(k)
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
            })
        };
        let required = |keys: &[&str]| -> Result<String> {
            first(keys).ok_or_else(|| BotError::MissingEnv {
                name: keys[0].to_string(),
            })
        };

        let bot_token = required(&["DISCORD_TOKEN", "BOT_TOKEN"])?;
        let client_id = required(&["DISCORD_CLIENT_ID", "CLIENT_ID"])?;
        let client_secret = required(&["DISCORD_CLIENT_SECRET", "CLIENT_SECRET"])?;

        let base_url = first(&["WEB_BASE_URL", "RAILWAY_URL"])
            .unwrap_or_else(|| "http://localhost:8080".to_string())
            .trim_end_matches('/')
            .to_string();
        let api_base = first(&["DISCORD_API_BASE"])
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        let verified_role_id = required(&["VERIFIED_ROLE_ID"])?;
        parse_snowflake("VERIFIED_ROLE_ID", &verified_role_id)?;

        let admin_raw = required(&["ADMIN_ID"])?;
        let admin_id = UserId::new(parse_snowflake("ADMIN_ID", &admin_raw)?);

        let store = match first(&["STORE_BACKEND"]).as_deref() {
            None | Some("file") => StoreBackend::File(PathBuf::from(
                first(&["DATA_FILE"]).unwrap_or_else(|| "bot_data.json".to_string()),
            )),
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(BotError::InvalidEnv {
                    name: "STORE_BACKEND".to_string(),
                    value: other.to_string(),
                })
            }
        };

        let port = parse_or("PORT", first(&["PORT"]), 8080u16)?;

        let tls = match (first(&["TLS_CERT_PATH"]), first(&["TLS_KEY_PATH"])) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            }),
            _ => None,
        };

        let defaults = PacingConfig::default();
        let pacing = PacingConfig {
            backup_delay: Duration::from_millis(parse_or(
                "BACKUP_DELAY_MS",
                first(&["BACKUP_DELAY_MS"]),
                defaults.backup_delay.as_millis() as u64,
            )?),
            stats_delay: Duration::from_millis(parse_or(
                "STATS_DELAY_MS",
                first(&["STATS_DELAY_MS"]),
                defaults.stats_delay.as_millis() as u64,
            )?),
            burst: first(&["PACING_BURST"])
                .map(|v| parse_or("PACING_BURST", Some(v), 1u32))
                .transpose()?
                .filter(|b| *b > 1),
        };

        let member_check_timeout = Duration::from_secs(parse_or(
            "MEMBER_CHECK_TIMEOUT_SECS",
            first(&["MEMBER_CHECK_TIMEOUT_SECS"]),
            5u64,
        )?);
        let member_write_timeout = Duration::from_secs(parse_or(
            "MEMBER_WRITE_TIMEOUT_SECS",
            first(&["MEMBER_WRITE_TIMEOUT_SECS"]),
            10u64,
        )?);

        Ok(Self {
            bot_token,
            client_id,
            client_secret,
            base_url,
            api_base,
            verified_role_id,
            admin_id,
            store,
            port,
            tls,
            pacing,
            member_check_timeout,
            member_write_timeout,
        })
    }

    pub fn redirect_uri(&self) -> String {
        format!("{}/callback", self.base_url)
    }
}

fn parse_snowflake(name: &str, value: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .ok_or_else(|| BotError::InvalidEnv {
            name: name.to_string(),
            value: value.to_string(),
        })
}

fn parse_or<T: std::str::FromStr>(name: &str, value: Option<String>, default: T) -> Result<T> {
    match value {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| BotError::InvalidEnv {
            name: name.to_string(),
            value: v,
        }),
    }
}
