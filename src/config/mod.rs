use serde::{Deserialize, Serialize};

use crate::analytics::regions::HOME_REGION;
use crate::analytics::CompositionPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api_server: ServerConfig,
    pub cache: CacheConfig,
    pub stats: StatsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
    /// Nothing persists across restarts
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum month documents kept in the read cache; 0 disables the cache
    pub max_entries: u64,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Region label counted as "home"
    pub home_region: String,
    /// Age after which a stored month is recomputed on refresh
    pub refresh_interval_secs: u64,
    pub composition_policy: CompositionPolicy,
}

impl StatsConfig {
    const fn default_refresh_interval_secs() -> u64 {
        3600
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            home_region: HOME_REGION.to_string(),
            refresh_interval_secs: Self::default_refresh_interval_secs(),
            composition_policy: CompositionPolicy::Strict,
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn refresh_interval_from(raw: Option<String>) -> u64 {
    let default = StatsConfig::default_refresh_interval_secs();
    let Some(raw) = raw else {
        return default;
    };

    match raw.trim().parse::<u64>() {
        Ok(secs) => secs,
        Err(e) => {
            tracing::warn!(
                "Invalid STATS_REFRESH_INTERVAL_SECS '{raw}' ({e}), falling back to {default}s"
            );
            default
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend = match env_or("DATABASE_BACKEND", "sqlite").to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            "memory" => DatabaseBackend::Memory,
            "sqlite" => DatabaseBackend::Sqlite,
            other => {
                tracing::warn!(
                    "Unknown DATABASE_BACKEND '{other}', falling back to 'sqlite'. Supported values: sqlite, postgres, memory"
                );
                DatabaseBackend::Sqlite
            }
        };

        let database_url = env_or("DATABASE_URL", "sqlite://./choir-stats.db?mode=rwc");
        let max_connections = env_or("DATABASE_MAX_CONNECTIONS", "5").parse::<u32>()?;

        let api_host = env_or("API_HOST", "127.0.0.1");
        let api_port = env_or("API_PORT", "8080").parse::<u16>()?;

        let cache_max_entries = env_or("CACHE_MAX_ENTRIES", "1000").parse::<u64>()?;
        let cache_ttl_secs = env_or("CACHE_TTL_SECS", "300").parse::<u64>()?;

        let home_region = env_or("STATS_HOME_REGION", HOME_REGION);
        let refresh_interval_secs =
            refresh_interval_from(std::env::var("STATS_REFRESH_INTERVAL_SECS").ok());

        let composition_policy = match env_or("STATS_COMPOSITION_POLICY", "strict")
            .to_lowercase()
            .as_str()
        {
            "strict" => CompositionPolicy::Strict,
            "lenient" => CompositionPolicy::Lenient,
            other => {
                tracing::warn!(
                    "Unknown STATS_COMPOSITION_POLICY '{other}', falling back to 'strict'. Supported values: strict, lenient"
                );
                CompositionPolicy::Strict
            }
        };

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
            },
            api_server: ServerConfig {
                host: api_host,
                port: api_port,
            },
            cache: CacheConfig {
                max_entries: cache_max_entries,
                ttl_secs: cache_ttl_secs,
            },
            stats: StatsConfig {
                home_region,
                refresh_interval_secs,
                composition_policy,
            },
        })
    }
}
