use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::workflows::registration::SchemaPreset;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub registration: RegistrationConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let schema_name =
            env::var("REGISTRATION_SCHEMA").unwrap_or_else(|_| "documents".to_string());
        let schema = SchemaPreset::from_name(&schema_name)
            .ok_or(ConfigError::UnknownSchema(schema_name))?;
        let shake_ms = env::var("REGISTRATION_SHAKE_MS")
            .unwrap_or_else(|_| "500".to_string())
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidShakeDuration)?;
        let idle_secs = env::var("REGISTRATION_SESSION_IDLE_SECS")
            .unwrap_or_else(|_| "1800".to_string())
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidSessionIdle)?;

        let base_url = env::var("STORAGE_BASE_URL")
            .ok()
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            registration: RegistrationConfig {
                schema,
                shake_duration: Duration::from_millis(shake_ms),
                session_idle_timeout: Duration::from_secs(idle_secs),
            },
            storage: StorageConfig {
                base_url,
                api_key: env::var("STORAGE_API_KEY").unwrap_or_default(),
                bucket: env::var("STORAGE_BUCKET")
                    .unwrap_or_else(|_| "registrations".to_string()),
                table: env::var("STORAGE_TABLE")
                    .unwrap_or_else(|_| "wlug_registrations".to_string()),
            },
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Form layout, feedback timing and session lifetime for registrations.
#[derive(Debug, Clone)]
pub struct RegistrationConfig {
    pub schema: SchemaPreset,
    pub shake_duration: Duration,
    /// Sessions untouched for this long are dropped.
    pub session_idle_timeout: Duration,
}

/// Hosted object storage and record table. Without a base URL the service
/// falls back to in-memory stores.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub base_url: Option<String>,
    pub api_key: String,
    pub bucket: String,
    pub table: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    UnknownSchema(String),
    InvalidShakeDuration,
    InvalidSessionIdle,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::UnknownSchema(name) => write!(
                f,
                "REGISTRATION_SCHEMA '{}' is not one of: documents, classic",
                name
            ),
            ConfigError::InvalidShakeDuration => {
                write!(f, "REGISTRATION_SHAKE_MS must be a whole number of milliseconds")
            }
            ConfigError::InvalidSessionIdle => write!(
                f,
                "REGISTRATION_SESSION_IDLE_SECS must be a whole number of seconds"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::UnknownSchema(_)
            | ConfigError::InvalidShakeDuration
            | ConfigError::InvalidSessionIdle => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "REGISTRATION_SCHEMA",
            "REGISTRATION_SHAKE_MS",
            "REGISTRATION_SESSION_IDLE_SECS",
            "STORAGE_BASE_URL",
            "STORAGE_API_KEY",
            "STORAGE_BUCKET",
            "STORAGE_TABLE",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.registration.schema, SchemaPreset::Documents);
        assert_eq!(config.registration.shake_duration, Duration::from_millis(500));
        assert_eq!(
            config.registration.session_idle_timeout,
            Duration::from_secs(1800)
        );
        assert!(config.storage.base_url.is_none());
        assert_eq!(config.storage.table, "wlug_registrations");
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }

    #[test]
    fn reads_storage_and_schema_overrides() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("REGISTRATION_SCHEMA", "classic");
        env::set_var("STORAGE_BASE_URL", "https://storage.example.org/");
        env::set_var("STORAGE_BUCKET", "applicants");
        env::set_var("REGISTRATION_SESSION_IDLE_SECS", "90");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(
            config.registration.session_idle_timeout,
            Duration::from_secs(90)
        );
        assert_eq!(config.registration.schema, SchemaPreset::Classic);
        assert_eq!(
            config.storage.base_url.as_deref(),
            Some("https://storage.example.org")
        );
        assert_eq!(config.storage.bucket, "applicants");
        reset_env();
    }

    #[test]
    fn rejects_unknown_schema() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("REGISTRATION_SCHEMA", "wizardly");
        match AppConfig::load() {
            Err(ConfigError::UnknownSchema(name)) => assert_eq!(name, "wizardly"),
            other => panic!("expected unknown schema error, got {other:?}"),
        }
        reset_env();
    }
}
