//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Which Account Store implementation backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(ConfigError::InvalidValue("STORAGE_BACKEND")),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Storage backend (postgres, memory)
    pub storage_backend: StorageBackend,

    /// Database connection URL; required for the postgres backend
    pub database_url: Option<String>,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// HS256 signing secret for session tokens
    pub jwt_secret: String,

    /// Session token lifetime in seconds
    pub jwt_ttl_secs: i64,

    /// Coins granted to an account on first login
    pub initial_coins: i64,

    /// Optional JSON catalog; the built-in merch table is used otherwise
    pub catalog_path: Option<PathBuf>,

    /// Allowed CORS origins; `*` allows any
    pub cors_allowed_origins: Vec<String>,

    /// Reconciliation job period in seconds; 0 disables the job
    pub reconcile_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let storage_backend: StorageBackend = env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .parse()?;

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingEnv("DATABASE_URL"));
        }

        let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", 10)?;

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = parse_or("PORT", 8080)?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let jwt_secret = env::var("JWT_SECRET")
            .ok()
            .filter(|secret| !secret.is_empty())
            .ok_or(ConfigError::MissingEnv("JWT_SECRET"))?;

        let jwt_ttl_secs: i64 = parse_or("JWT_TTL_SECS", 86_400)?;
        if jwt_ttl_secs <= 0 {
            return Err(ConfigError::InvalidValue("JWT_TTL_SECS"));
        }

        let initial_coins: i64 = parse_or("INITIAL_COINS", 1000)?;
        if initial_coins < 0 {
            return Err(ConfigError::InvalidValue("INITIAL_COINS"));
        }

        let catalog_path = env::var("CATALOG_PATH")
            .ok()
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let reconcile_interval_secs = parse_or("RECONCILE_INTERVAL_SECS", 0)?;

        Ok(Self {
            storage_backend,
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            jwt_secret,
            jwt_ttl_secs,
            initial_coins,
            catalog_path,
            cors_allowed_origins,
            reconcile_interval_secs,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Socket address string to bind
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
