use std::env;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackendKind {
    Memory,
    Redis,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub port: u16,
    /// Prefix every JSON route is nested under, e.g. `/api` or `/api/v1`.
    pub api_prefix: String,
    pub cache_backend: CacheBackendKind,
    pub redis_url: Option<String>,
    pub cache_short_ttl: Duration,
    pub cache_long_ttl: Duration,
    pub session_ttl_hours: i64,
    pub ws_room_history: usize,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub bcrypt_cost: u32,
}

impl Config {
    /// Reads the configuration from the process environment. Call
    /// `dotenvy::dotenv()` first if a `.env` file should be honoured.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        let redis_url = get("REDIS_URL");

        let cache_backend = match get("CACHE_BACKEND").as_deref() {
            Some("memory") => CacheBackendKind::Memory,
            Some("redis") => CacheBackendKind::Redis,
            None if redis_url.is_some() => CacheBackendKind::Redis,
            None => CacheBackendKind::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "CACHE_BACKEND",
                    value: other.to_string(),
                })
            }
        };
        if cache_backend == CacheBackendKind::Redis && redis_url.is_none() {
            return Err(ConfigError::Missing("REDIS_URL"));
        }

        let mut api_prefix = get("API_PREFIX").unwrap_or_else(|| "/api".to_string());
        if !api_prefix.starts_with('/') {
            api_prefix.insert(0, '/');
        }
        while api_prefix.len() > 1 && api_prefix.ends_with('/') {
            api_prefix.pop();
        }

        Ok(Self {
            database_url: get("DATABASE_URL"),
            jwt_secret,
            port: parse_or(&get, "PORT", 3000)?,
            api_prefix,
            cache_backend,
            redis_url,
            cache_short_ttl: Duration::from_secs(parse_or(&get, "CACHE_SHORT_TTL_SECS", 60)?),
            cache_long_ttl: Duration::from_secs(parse_or(&get, "CACHE_LONG_TTL_SECS", 3600)?),
            session_ttl_hours: parse_or(&get, "SESSION_TTL_HOURS", 24)?,
            ws_room_history: parse_or(&get, "WS_ROOM_HISTORY", 50)?,
            admin_email: get("ADMIN_EMAIL"),
            admin_password: get("ADMIN_PASSWORD"),
            bcrypt_cost: parse_or(&get, "BCRYPT_COST", bcrypt::DEFAULT_COST)?,
        })
    }
}

fn parse_or<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => Ok(default),
    }
}
