use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

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
    pub storage: StorageConfig,
    pub ubble: UbbleConfig,
    pub gdpr: GdprConfig,
    pub support_email: String,
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

        let storage = StorageConfig {
            data_path: path_var("APP_DATA_PATH", "data/store.json"),
            gdpr_extract_folder: path_var("GDPR_EXTRACT_FOLDER", "data/gdpr"),
            id_pictures_folder: path_var("ID_PICTURES_FOLDER", "data/id_pictures"),
            snapshot_interval: Duration::from_secs(number_var("APP_SNAPSHOT_INTERVAL_SECS", 30)?.max(1)),
        };

        let api_url_base =
            env::var("API_URL_BASE").unwrap_or_else(|_| "http://localhost".to_string());
        let ubble = UbbleConfig {
            api_url: env::var("UBBLE_API_URL").unwrap_or_else(|_| "https://api.ubble.ai".to_string()),
            client_id: env::var("UBBLE_CLIENT_ID").unwrap_or_default(),
            client_secret: env::var("UBBLE_CLIENT_SECRET").unwrap_or_default(),
            request_timeout: Duration::from_secs(number_var("UBBLE_REQUEST_TIMEOUT_SECS", 10)?),
            webhook_url: format!(
                "{}/webhooks/ubble/application_status",
                api_url_base.trim_end_matches('/')
            ),
        };

        let gdpr = GdprConfig {
            max_extracts_per_day: number_var("GDPR_MAX_EXTRACT_PER_DAY", 50)? as u32,
            extract_validity_days: number_var("GDPR_EXTRACT_VALIDITY_DAYS", 7)? as i64,
        };

        let support_email =
            env::var("SUPPORT_EMAIL").unwrap_or_else(|_| "support@passculture.app".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            storage,
            ubble,
            gdpr,
            support_email,
        })
    }
}

fn path_var(name: &str, default: &str) -> PathBuf {
    PathBuf::from(env::var(name).unwrap_or_else(|_| default.to_string()))
}

fn number_var(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidNumber { name }),
        Err(_) => Ok(default),
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

/// Where the store snapshot and object-storage folders live.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_path: PathBuf,
    pub gdpr_extract_folder: PathBuf,
    pub id_pictures_folder: PathBuf,
    /// How often the running server saves the store snapshot.
    pub snapshot_interval: Duration,
}

/// Identity provider connection settings.
#[derive(Debug, Clone)]
pub struct UbbleConfig {
    pub api_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub request_timeout: Duration,
    pub webhook_url: String,
}

#[derive(Debug, Clone, Copy)]
pub struct GdprConfig {
    pub max_extracts_per_day: u32,
    pub extract_validity_days: i64,
}

impl Default for GdprConfig {
    fn default() -> Self {
        Self {
            max_extracts_per_day: 50,
            extract_validity_days: 7,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { name: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { name } => {
                write!(f, "{name} must be a non-negative integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidNumber { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
