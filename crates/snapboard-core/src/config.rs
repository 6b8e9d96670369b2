//! Configuration module
//!
//! Configuration is read from the environment (with `.env` support) once at process
//! start and passed by reference to the services that need it.

use std::env;
use std::time::Duration;

use crate::constants::{DEFAULT_ALLOWED_CONTENT_TYPES, DEFAULT_MAX_FILE_SIZE_MB};

const SERVER_PORT: u16 = 4000;
const MEDIA_STORE_TIMEOUT_SECS: u64 = 60;
const RATE_LIMIT_WINDOW_MS: u64 = 60_000;
const HTTP_RATE_LIMIT_PER_MINUTE: u32 = 100;
const METADATA_RATE_LIMIT_PER_MINUTE: u32 = 30;
const BATCH_RATE_LIMIT_PER_MINUTE: u32 = 5;
const CACHE_TTL_SECS: u64 = 300;
const CACHE_MAX_ENTRIES: usize = 1000;
const RETRY_MAX_RETRIES: u32 = 3;
const RETRY_DELAY_MS: u64 = 1000;
const RETRY_MAX_JITTER_MS: u64 = 1000;
const TRUSTED_PROXY_COUNT: usize = 1;

/// Backing store for rate-limit counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitBackend {
    /// Per-process map. Resets on restart.
    Memory,
    /// Shared Postgres table for multi-instance deployments.
    Postgres,
}

impl RateLimitBackend {
    fn parse(value: &str) -> Result<Self, anyhow::Error> {
        match value.trim().to_lowercase().as_str() {
            "memory" => Ok(RateLimitBackend::Memory),
            "postgres" | "postgresql" => Ok(RateLimitBackend::Postgres),
            other => Err(anyhow::anyhow!(
                "RATE_LIMIT_BACKEND must be 'memory' or 'postgres', got '{}'",
                other
            )),
        }
    }
}

/// Connection settings for the external media store.
#[derive(Clone, Debug)]
pub struct MediaStoreConfig {
    pub api_url: String,
    pub delivery_url: String,
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub root_folder: String,
    pub timeout_secs: u64,
}

/// Rate limiting settings.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub backend: RateLimitBackend,
    pub window_ms: u64,
    pub fail_open: bool,
    pub database_url: Option<String>,
    pub api_per_window: u32,
    pub metadata_per_window: u32,
    pub batch_per_window: u32,
    pub trusted_proxy_count: usize,
}

/// Cache and retry settings for the store facade.
#[derive(Clone, Debug)]
pub struct CacheRetryConfig {
    pub cache_ttl_secs: u64,
    pub cache_max_entries: usize,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub max_jitter_ms: u64,
}

/// Upload intake limits.
#[derive(Clone, Debug)]
pub struct UploadConfig {
    pub max_file_size_bytes: usize,
    pub allowed_content_types: Vec<String>,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    pub environment: String,
    pub cors_origins: Vec<String>,
    pub webhook_secret: Option<String>,
    pub media_store: MediaStoreConfig,
    pub rate_limit: RateLimitConfig,
    pub cache_retry: CacheRetryConfig,
    pub upload: UploadConfig,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|s| s.trim().to_lowercase())
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn csv_lowercase(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let media_store = MediaStoreConfig {
            api_url: env::var("MEDIA_STORE_URL")
                .unwrap_or_else(|_| "https://api.cloudinary.com/v1_1".to_string())
                .trim_end_matches('/')
                .to_string(),
            delivery_url: env::var("MEDIA_DELIVERY_URL")
                .unwrap_or_else(|_| "https://res.cloudinary.com".to_string())
                .trim_end_matches('/')
                .to_string(),
            cloud_name: env::var("MEDIA_STORE_CLOUD_NAME")
                .map_err(|_| anyhow::anyhow!("MEDIA_STORE_CLOUD_NAME must be set"))?,
            api_key: env::var("MEDIA_STORE_API_KEY")
                .map_err(|_| anyhow::anyhow!("MEDIA_STORE_API_KEY must be set"))?,
            api_secret: env::var("MEDIA_STORE_API_SECRET")
                .map_err(|_| anyhow::anyhow!("MEDIA_STORE_API_SECRET must be set"))?,
            root_folder: env::var("MEDIA_ROOT_FOLDER").unwrap_or_else(|_| "photos".to_string()),
            timeout_secs: env_or("MEDIA_STORE_TIMEOUT_SECS", MEDIA_STORE_TIMEOUT_SECS),
        };

        let rate_limit = RateLimitConfig {
            backend: RateLimitBackend::parse(
                &env::var("RATE_LIMIT_BACKEND").unwrap_or_else(|_| "memory".to_string()),
            )?,
            window_ms: env_or("RATE_LIMIT_WINDOW_MS", RATE_LIMIT_WINDOW_MS),
            fail_open: env_bool("RATE_LIMIT_FAIL_OPEN", false),
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            api_per_window: env_or("HTTP_RATE_LIMIT_PER_MINUTE", HTTP_RATE_LIMIT_PER_MINUTE),
            metadata_per_window: env_or(
                "METADATA_RATE_LIMIT_PER_MINUTE",
                METADATA_RATE_LIMIT_PER_MINUTE,
            ),
            batch_per_window: env_or("BATCH_RATE_LIMIT_PER_MINUTE", BATCH_RATE_LIMIT_PER_MINUTE),
            trusted_proxy_count: env_or("TRUSTED_PROXY_COUNT", TRUSTED_PROXY_COUNT),
        };

        let cache_retry = CacheRetryConfig {
            cache_ttl_secs: env_or("CACHE_TTL_SECS", CACHE_TTL_SECS),
            cache_max_entries: env_or("CACHE_MAX_ENTRIES", CACHE_MAX_ENTRIES),
            max_retries: env_or("RETRY_MAX_RETRIES", RETRY_MAX_RETRIES),
            retry_delay_ms: env_or("RETRY_DELAY_MS", RETRY_DELAY_MS),
            max_jitter_ms: env_or("RETRY_MAX_JITTER_MS", RETRY_MAX_JITTER_MS),
        };

        let upload = UploadConfig {
            max_file_size_bytes: env_or("MAX_FILE_SIZE_MB", DEFAULT_MAX_FILE_SIZE_MB) * 1024 * 1024,
            allowed_content_types: csv_lowercase(
                &env::var("ALLOWED_CONTENT_TYPES")
                    .unwrap_or_else(|_| DEFAULT_ALLOWED_CONTENT_TYPES.to_string()),
            ),
        };

        let config = Config {
            server_port: env::var("PORT")
                .unwrap_or_else(|_| SERVER_PORT.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            environment,
            cors_origins,
            webhook_secret: env::var("WEBHOOK_SECRET").ok().filter(|s| !s.is_empty()),
            media_store,
            rate_limit,
            cache_retry,
            upload,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.is_production() && self.cors_origins.iter().any(|o| o == "*") {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }

        if self.rate_limit.backend == RateLimitBackend::Postgres {
            match self.rate_limit.database_url.as_deref() {
                Some(url) if url.starts_with("postgres://") || url.starts_with("postgresql://") => {}
                Some(_) => {
                    return Err(anyhow::anyhow!(
                        "DATABASE_URL must be a valid PostgreSQL connection string"
                    ))
                }
                None => {
                    return Err(anyhow::anyhow!(
                        "DATABASE_URL must be set when RATE_LIMIT_BACKEND=postgres"
                    ))
                }
            }
        }

        if self.rate_limit.window_ms == 0 {
            return Err(anyhow::anyhow!("RATE_LIMIT_WINDOW_MS must be greater than 0"));
        }

        if self.cache_retry.cache_max_entries == 0 {
            return Err(anyhow::anyhow!("CACHE_MAX_ENTRIES must be greater than 0"));
        }

        if self.upload.allowed_content_types.is_empty() {
            return Err(anyhow::anyhow!("ALLOWED_CONTENT_TYPES must not be empty"));
        }

        if let Some(bad) = self
            .upload
            .allowed_content_types
            .iter()
            .find(|ct| !ct.starts_with("image/"))
        {
            return Err(anyhow::anyhow!(
                "ALLOWED_CONTENT_TYPES may only contain image types, got '{}'",
                bad
            ));
        }

        if self.is_production() && self.webhook_secret.is_none() {
            tracing::warn!("WEBHOOK_SECRET is not set; webhook signatures will not be verified");
        }

        Ok(())
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit.window_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_retry.cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            server_port: 4000,
            environment: "development".to_string(),
            cors_origins: vec!["*".to_string()],
            webhook_secret: None,
            media_store: MediaStoreConfig {
                api_url: "http://localhost:9000".to_string(),
                delivery_url: "http://localhost:9001".to_string(),
                cloud_name: "demo".to_string(),
                api_key: "key".to_string(),
                api_secret: "secret".to_string(),
                root_folder: "photos".to_string(),
                timeout_secs: 5,
            },
            rate_limit: RateLimitConfig {
                backend: RateLimitBackend::Memory,
                window_ms: 60_000,
                fail_open: false,
                database_url: None,
                api_per_window: 100,
                metadata_per_window: 30,
                batch_per_window: 5,
                trusted_proxy_count: 1,
            },
            cache_retry: CacheRetryConfig {
                cache_ttl_secs: 300,
                cache_max_entries: 1000,
                max_retries: 3,
                retry_delay_ms: 1000,
                max_jitter_ms: 1000,
            },
            upload: UploadConfig {
                max_file_size_bytes: 10 * 1024 * 1024,
                allowed_content_types: csv_lowercase(DEFAULT_ALLOWED_CONTENT_TYPES),
            },
        }
    }

    #[test]
    fn test_valid_development_config() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_wildcard_cors_rejected_in_production() {
        let mut config = test_config();
        config.environment = "production".to_string();
        assert!(config.validate().is_err());

        config.cors_origins = vec!["https://snapboard.example".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_postgres_backend_requires_database_url() {
        let mut config = test_config();
        config.rate_limit.backend = RateLimitBackend::Postgres;
        assert!(config.validate().is_err());

        config.rate_limit.database_url = Some("mysql://nope".to_string());
        assert!(config.validate().is_err());

        config.rate_limit.database_url = Some("postgres://localhost/snapboard".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_non_image_content_types_rejected() {
        let mut config = test_config();
        config.upload.allowed_content_types.push("video/mp4".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!(
            RateLimitBackend::parse(" Memory ").unwrap(),
            RateLimitBackend::Memory
        );
        assert_eq!(
            RateLimitBackend::parse("postgresql").unwrap(),
            RateLimitBackend::Postgres
        );
        assert!(RateLimitBackend::parse("redis").is_err());
    }
}
