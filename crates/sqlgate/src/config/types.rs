//! Configuration types

use serde::Deserialize;
use std::time::Duration;

use crate::credentials::Credentials;
use crate::transport::Endpoint;

/// Upper bound for the database connect timeout, in seconds.
pub const MAX_TIMEOUT_SECS: u64 = 3600;

/// Root configuration structure
///
/// ```yaml
/// service:
///   url: "tcp://0.0.0.0:8002"
///
/// database:
///   host: "db.internal"
///   port: 3306
///   name: "seascape_sds"
///   timeout_secs: 10
///   credentials:
///     username: "root"
///     password: "${DB_PASSWORD}"
///
/// vault:
///   address: "https://vault.internal:8200"
///   approle:
///     role_id: "${VAULT_ROLE_ID}"
///     secret_id: "${VAULT_SECRET_ID}"
///   database_path: "database/creds/sds"
/// ```
///
/// Without a `vault` section the service connects once with the default
/// credentials and never rotates them.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Endpoints served by this process
    #[serde(default)]
    pub service: ServiceConfig,

    /// Database connection parameters
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Secret store used for credential rotation
    #[serde(default)]
    pub vault: Option<VaultConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Whether credentials are rotated through the secret store
    pub fn rotation_enabled(&self) -> bool {
        self.vault.is_some()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        Endpoint::parse(&self.service.url).map_err(|e| format!("Invalid service url: {}", e))?;

        match Endpoint::parse(&self.service.control_endpoint) {
            Ok(Endpoint::Inproc(_)) => {}
            Ok(_) => {
                return Err(format!(
                    "Control endpoint '{}' must be an inproc:// endpoint",
                    self.service.control_endpoint
                ))
            }
            Err(e) => return Err(format!("Invalid control endpoint: {}", e)),
        }

        if self.database.timeout_secs == 0 {
            return Err("Database timeout must be greater than zero".to_string());
        }
        if self.database.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(format!(
                "Database timeout {}s exceeds the maximum of {}s",
                self.database.timeout_secs, MAX_TIMEOUT_SECS
            ));
        }
        if self.database.host.is_empty() {
            return Err("Database host must not be empty".to_string());
        }

        if let Some(vault) = &self.vault {
            vault.validate()?;
        }

        Ok(())
    }
}

/// Service endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Public request/reply endpoint
    #[serde(default = "default_service_url")]
    pub url: String,
    /// In-process endpoint receiving new credentials
    #[serde(default = "default_control_endpoint")]
    pub control_endpoint: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            url: default_service_url(),
            control_endpoint: default_control_endpoint(),
        }
    }
}

/// Database connection parameters
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default = "default_db_name")]
    pub name: String,
    /// Connect and ping deadline, 1..=3600 seconds
    #[serde(default = "default_db_timeout")]
    pub timeout_secs: u64,
    /// Used only when rotation is disabled
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

impl DatabaseConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            name: default_db_name(),
            timeout_secs: default_db_timeout(),
            credentials: CredentialsConfig::default(),
        }
    }
}

/// Static database credentials
#[derive(Clone, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default = "default_db_username")]
    pub username: String,
    #[serde(default = "default_db_password")]
    pub password: String,
}

impl CredentialsConfig {
    pub fn to_credentials(&self) -> Credentials {
        Credentials::new(self.username.clone(), self.password.clone())
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            username: default_db_username(),
            password: default_db_password(),
        }
    }
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Vault connection and authentication
#[derive(Clone, Deserialize)]
pub struct VaultConfig {
    /// Base address, e.g. `https://vault.internal:8200`
    pub address: String,
    /// Static token login
    #[serde(default)]
    pub token: Option<String>,
    /// AppRole login, preferred over `token` when both are set
    #[serde(default)]
    pub approle: Option<AppRoleConfig>,
    /// Secret path of the database credentials, without the `v1/` prefix
    #[serde(default = "default_vault_database_path")]
    pub database_path: String,
    /// Also watch the auth token lease and log in again when it expires
    #[serde(default)]
    pub secure: bool,
}

impl VaultConfig {
    fn validate(&self) -> Result<(), String> {
        if self.address.is_empty() {
            return Err("Vault address must not be empty".to_string());
        }
        if self.token.is_none() && self.approle.is_none() {
            return Err("Vault requires either a token or an approle login".to_string());
        }
        if self.database_path.trim_matches('/').is_empty() {
            return Err("Vault database_path must not be empty".to_string());
        }
        Ok(())
    }
}

impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("address", &self.address)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("approle", &self.approle)
            .field("database_path", &self.database_path)
            .field("secure", &self.secure)
            .finish()
    }
}

/// AppRole login parameters
#[derive(Clone, Deserialize)]
pub struct AppRoleConfig {
    pub role_id: String,
    pub secret_id: String,
}

impl std::fmt::Debug for AppRoleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppRoleConfig")
            .field("role_id", &self.role_id)
            .field("secret_id", &"[REDACTED]")
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or an EnvFilter directive
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_service_url() -> String {
    "tcp://127.0.0.1:8002".to_string()
}

fn default_control_endpoint() -> String {
    crate::control::CONTROL_ENDPOINT.to_string()
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    3306
}

fn default_db_name() -> String {
    "seascape_sds".to_string()
}

fn default_db_timeout() -> u64 {
    10
}

fn default_db_username() -> String {
    "root".to_string()
}

fn default_db_password() -> String {
    "tiger".to_string()
}

fn default_vault_database_path() -> String {
    "database/creds/sds".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}
