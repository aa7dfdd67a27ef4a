//! ABOUTME: Configuration management with validation and environment loading
//! ABOUTME: Handles all application settings from environment variables and files

use config::{Config as ConfigBuilder, Environment, File};
use cx_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

/// Main configuration struct
#[derive(Debug, Clone, Deserialize, Serialize, Validate, Default)]
#[serde(default)]
pub struct Config {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub database: DatabaseConfig,
    #[validate(nested)]
    pub security: SecurityConfig,
    #[validate(nested)]
    pub smtp: Option<SmtpConfig>,
    /// Default log level when RUST_LOG is unset
    #[validate(length(min = 1))]
    pub log_level: String,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1, max = 65535))]
    pub port: u16,
    /// Deployment environment name ("production", "development", "test")
    #[validate(length(min = 1))]
    pub env: String,
    /// Allowed CORS origin for the SPA
    #[validate(length(min = 1))]
    pub cors_origin: String,
    /// Drain budget for graceful shutdown, in seconds
    #[validate(range(min = 1, max = 300))]
    pub shutdown_drain_secs: u64,
    #[validate(nested)]
    pub rate_limit: RateLimitConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            env: "development".to_string(),
            cors_origin: "http://localhost:5173".to_string(),
            shutdown_drain_secs: 30,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn is_production(&self) -> bool {
        self.env == "production"
    }
}

/// Rate limiting configuration (IP-based)
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct RateLimitConfig {
    /// Maximum requests per window
    #[validate(range(min = 1, max = 10000))]
    pub max_requests: u32,
    /// Rate limiting window duration in seconds
    #[validate(range(min = 1, max = 3600))]
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_seconds: 60,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct DatabaseConfig {
    /// SQLite database path
    #[validate(length(min = 1))]
    pub url: String,
    #[validate(range(min = 1, max = 100))]
    pub max_connections: u32,
    #[validate(range(min = 1, max = 100))]
    pub min_connections: u32,
    /// Timeout for acquiring a pooled connection, in seconds
    #[validate(range(min = 1, max = 300))]
    pub acquire_timeout_secs: u64,
    /// Timeout for an individual query, in seconds
    #[validate(range(min = 1, max = 300))]
    pub query_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "codionix.db".to_string(),
            max_connections: 20,
            min_connections: 1,
            acquire_timeout_secs: 10,
            query_timeout_secs: 10,
        }
    }
}

/// Security configuration with secret redaction
#[derive(Clone, Deserialize, Serialize, Validate)]
pub struct SecurityConfig {
    #[validate(length(min = 32))]
    pub jwt_secret: String,
    /// Access token lifetime in seconds
    #[validate(range(min = 60, max = 86400))]
    pub access_token_ttl_secs: u64,
    /// Refresh token lifetime in seconds
    #[validate(range(min = 3600, max = 2592000))]
    pub refresh_token_ttl_secs: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        // Generate a random JWT secret by default for security
        use std::time::{SystemTime, UNIX_EPOCH};
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();

        Self {
            jwt_secret: format!("INSECURE-RANDOM-{}-CHANGE-IN-PRODUCTION", timestamp),
            access_token_ttl_secs: 900,       // 15 minutes
            refresh_token_ttl_secs: 604800,   // 7 days
        }
    }
}

impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("jwt_secret", &"[REDACTED]")
            .field("access_token_ttl_secs", &self.access_token_ttl_secs)
            .field("refresh_token_ttl_secs", &self.refresh_token_ttl_secs)
            .finish()
    }
}

/// SMTP configuration with secret redaction
#[derive(Clone, Deserialize, Serialize, Validate)]
pub struct SmtpConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1, max = 65535))]
    pub port: u16,
    #[validate(length(min = 1))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
    #[validate(email)]
    pub from_address: String,
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables and optional .env file
    pub fn load() -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        // Set defaults first
        builder = builder
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.env", "development")?
            .set_default("server.cors_origin", "http://localhost:5173")?
            .set_default("server.shutdown_drain_secs", 30)?
            .set_default("server.rate_limit.max_requests", 100)?
            .set_default("server.rate_limit.window_seconds", 60)?
            .set_default("database.url", "codionix.db")?
            .set_default("database.max_connections", 20)?
            .set_default("database.min_connections", 1)?
            .set_default("database.acquire_timeout_secs", 10)?
            .set_default("database.query_timeout_secs", 10)?
            .set_default("security.access_token_ttl_secs", 900)?
            .set_default("security.refresh_token_ttl_secs", 604800)?
            .set_default("log_level", "info")?;

        // Handle nested environment variables that don't work with the standard separator
        if let Ok(jwt_secret) = std::env::var("CODIONIX_SECURITY_JWT_SECRET") {
            builder = builder.set_override("security.jwt_secret", jwt_secret)?;
        } else {
            let default_jwt_secret = format!(
                "INSECURE-RANDOM-{}-CHANGE-IN-PRODUCTION",
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_nanos()
            );
            builder = builder.set_default("security.jwt_secret", default_jwt_secret)?;
        }

        let overrides = [
            ("CODIONIX_SERVER_CORS_ORIGIN", "server.cors_origin"),
            ("CODIONIX_SERVER_SHUTDOWN_DRAIN_SECS", "server.shutdown_drain_secs"),
            ("CODIONIX_SERVER_RATE_LIMIT_MAX_REQUESTS", "server.rate_limit.max_requests"),
            ("CODIONIX_SERVER_RATE_LIMIT_WINDOW_SECONDS", "server.rate_limit.window_seconds"),
            ("CODIONIX_DATABASE_MAX_CONNECTIONS", "database.max_connections"),
            ("CODIONIX_DATABASE_MIN_CONNECTIONS", "database.min_connections"),
            ("CODIONIX_DATABASE_ACQUIRE_TIMEOUT_SECS", "database.acquire_timeout_secs"),
            ("CODIONIX_DATABASE_QUERY_TIMEOUT_SECS", "database.query_timeout_secs"),
            ("CODIONIX_SECURITY_ACCESS_TOKEN_TTL_SECS", "security.access_token_ttl_secs"),
            ("CODIONIX_SECURITY_REFRESH_TOKEN_TTL_SECS", "security.refresh_token_ttl_secs"),
            ("CODIONIX_LOG_LEVEL", "log_level"),
        ];
        for (var, key) in overrides {
            if let Ok(value) = std::env::var(var) {
                builder = builder.set_override(key, value)?;
            }
        }

        // Try to load from .env file if it exists (optional)
        if std::path::Path::new(".env").exists() {
            builder = builder.add_source(File::with_name(".env").required(false));
        }

        // Load from environment variables with CODIONIX_ prefix (highest priority)
        builder = builder.add_source(
            Environment::with_prefix("CODIONIX")
                .try_parsing(true)
                .separator("_"),
        );

        let config = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to build config: {}", e)))?;

        let parsed: Config = config
            .try_deserialize()
            .map_err(|e| Error::Config(format!("Failed to deserialize config: {}", e)))?;

        // Validate the configuration; the validator error lists every failing field
        parsed
            .validate()
            .map_err(|e| Error::Config(format!("Config validation failed: {}", e)))?;

        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Use a mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env() {
        let vars = [
            "CODIONIX_SERVER_HOST",
            "CODIONIX_SERVER_PORT",
            "CODIONIX_SERVER_CORS_ORIGIN",
            "CODIONIX_DATABASE_URL",
            "CODIONIX_DATABASE_MAX_CONNECTIONS",
            "CODIONIX_SECURITY_JWT_SECRET",
            "CODIONIX_LOG_LEVEL",
        ];
        for key in vars {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_config_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        let config = Config::load().expect("Should load with defaults");

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.shutdown_drain_secs, 30);
        assert_eq!(config.database.url, "codionix.db");
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.database.query_timeout_secs, 10);
        assert_eq!(config.security.access_token_ttl_secs, 900);
        assert_eq!(config.log_level, "info");
        assert!(!config.server.is_production());
    }

    #[test]
    fn test_config_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("CODIONIX_SERVER_HOST", "0.0.0.0");
        env::set_var("CODIONIX_SERVER_PORT", "9000");
        env::set_var("CODIONIX_DATABASE_MAX_CONNECTIONS", "50");
        env::set_var(
            "CODIONIX_SECURITY_JWT_SECRET",
            "valid32characterjwtsecretfortest",
        );

        let config = Config::load().expect("Should load from env");

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.database.max_connections, 50);

        clear_env();
    }

    #[test]
    fn test_config_validation_failure() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("CODIONIX_DATABASE_MAX_CONNECTIONS", "500"); // Invalid - too big

        let result = Config::load();
        assert!(result.is_err());

        clear_env();
    }

    #[test]
    fn test_jwt_secret_too_short() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("CODIONIX_SECURITY_JWT_SECRET", "short");

        let result = Config::load();
        assert!(result.is_err());

        clear_env();
    }

    #[test]
    fn test_secret_redaction() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        let config = Config::load().expect("Should load with defaults");
        let debug_output = format!("{:?}", config);

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("INSECURE-RANDOM"));
    }
}
