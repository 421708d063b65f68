//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Default upload size limit (10 MiB)
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit JSON log lines (`LOG_FORMAT=json`)
    pub log_json: bool,

    /// SQLite connection string
    pub database_url: String,
    /// Pool size
    pub database_max_connections: u32,

    /// HMAC secret for bearer tokens
    pub jwt_secret: String,

    /// Allowed client origins for CORS (comma-separated)
    pub client_origin: String,

    /// Root directory for customer uploads
    pub upload_dir: PathBuf,
    /// Largest accepted upload
    pub max_upload_bytes: usize,

    /// Spreadsheet read by the customer import script
    pub customer_import_path: PathBuf,

    /// WhatsApp Cloud API, enabled only when fully configured
    pub whatsapp: Option<WhatsAppConfig>,
}

#[derive(Clone, Debug)]
pub struct WhatsAppConfig {
    pub api_url: String,
    pub phone_number_id: String,
    pub access_token: String,
    /// App secret used to sign webhook payloads
    pub app_secret: String,
    /// Token echoed back during webhook verification
    pub verify_token: String,
}

impl Config {
    /// Load configuration for the server
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(true)
    }

    /// Configuration for the one-off scripts, which need no server secrets
    pub fn for_scripts() -> Result<Self, ConfigError> {
        Self::load(false)
    }

    fn load(require_server_secrets: bool) -> Result<Self, ConfigError> {
        let server_secret = |name: &'static str| -> Result<String, ConfigError> {
            match env::var(name) {
                Ok(value) => Ok(value),
                Err(_) if require_server_secrets => Err(ConfigError::Missing(name)),
                Err(_) => Ok(String::new()),
            }
        };

        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_json: env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")),

            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://agency.db?mode=rwc".to_string()),
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 5)?,

            jwt_secret: server_secret("JWT_SECRET")?,
            client_origin: server_secret("CLIENT_ORIGIN")?,

            upload_dir: env::var("UPLOAD_DIR")
                .unwrap_or_else(|_| "./uploads".to_string())
                .into(),
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,

            customer_import_path: env::var("CUSTOMER_IMPORT_PATH")
                .unwrap_or_else(|_| "./data/clientes.xlsx".to_string())
                .into(),

            whatsapp: WhatsAppConfig::from_env(),
        })
    }
}

impl WhatsAppConfig {
    fn from_env() -> Option<Self> {
        Some(Self {
            api_url: env::var("WHATSAPP_API_URL")
                .unwrap_or_else(|_| "https://graph.facebook.com/v19.0".to_string()),
            phone_number_id: env::var("WHATSAPP_PHONE_NUMBER_ID").ok()?,
            access_token: env::var("WHATSAPP_ACCESS_TOKEN").ok()?,
            app_secret: env::var("WHATSAPP_APP_SECRET").ok()?,
            verify_token: env::var("WHATSAPP_VERIFY_TOKEN").ok()?,
        })
    }
}

fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidNumber(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Environment variable {0} must be a number")]
    InvalidNumber(&'static str),
}

#[cfg(test)]
impl Config {
    /// Configuration for router tests
    pub fn for_tests(upload_dir: PathBuf) -> Self {
        Self {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "debug".to_string(),
            log_json: false,
            database_url: "sqlite::memory:".to_string(),
            database_max_connections: 1,
            jwt_secret: "test-secret".to_string(),
            client_origin: "http://localhost:5173".to_string(),
            upload_dir,
            max_upload_bytes: 1024 * 1024,
            customer_import_path: PathBuf::from("./data/clientes.xlsx"),
            whatsapp: None,
        }
    }
}
