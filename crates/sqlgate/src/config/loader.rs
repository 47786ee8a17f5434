//! Configuration loader

use super::{AppRoleConfig, Config, VaultConfig};
use crate::error::{GatewayError, Result};
use std::path::Path;

/// Load configuration from a YAML file
///
/// Also applies SDS_* env var overrides after loading.
pub fn load_config(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path)?;
    load_config_from_str(&contents)
}

/// Load configuration from a YAML string (useful for testing)
///
/// Also applies SDS_* env var overrides after loading.
pub fn load_config_from_str(yaml: &str) -> Result<Config> {
    let mut config: Config = serde_yaml::from_str(yaml)?;
    finish(&mut config)?;
    Ok(config)
}

/// Build the configuration from defaults and SDS_* env vars only
pub fn load_config_from_env() -> Result<Config> {
    let mut config = Config::default();
    finish(&mut config)?;
    Ok(config)
}

fn finish(config: &mut Config) -> Result<()> {
    resolve_config_env_vars(config);
    apply_env_overrides(config);
    config.validate().map_err(GatewayError::Config)
}

/// Apply SDS_* environment variable overrides to a config.
///
/// Supported env vars:
/// - `SDS_SERVICE_URL` - Public request/reply endpoint
/// - `SDS_CONTROL_ENDPOINT` - In-process credential endpoint
/// - `SDS_DATABASE_HOST`, `SDS_DATABASE_PORT`, `SDS_DATABASE_NAME`
/// - `SDS_DATABASE_TIMEOUT` - Connect deadline in seconds
/// - `SDS_DATABASE_USERNAME`, `SDS_DATABASE_PASSWORD` - Default credentials
/// - `SDS_VAULT_ADDRESS` - Enables rotation when set
/// - `SDS_VAULT_TOKEN`, `SDS_VAULT_APPROLE_ROLE_ID`, `SDS_VAULT_APPROLE_SECRET_ID`
/// - `SDS_VAULT_DATABASE_PATH`
/// - `SDS_VAULT_SECURE` - `true` to watch the auth token lease
/// - `SDS_LOG_LEVEL` - Log level
pub fn apply_env_overrides(config: &mut Config) {
    apply_overrides(config, |key| std::env::var(key).ok());
}

fn apply_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("SDS_SERVICE_URL") {
        debug!("Overriding service url from SDS_SERVICE_URL");
        config.service.url = val;
    }
    if let Some(val) = lookup("SDS_CONTROL_ENDPOINT") {
        debug!("Overriding control endpoint from SDS_CONTROL_ENDPOINT");
        config.service.control_endpoint = val;
    }
    if let Some(val) = lookup("SDS_DATABASE_HOST") {
        debug!("Overriding database host from SDS_DATABASE_HOST");
        config.database.host = val;
    }
    if let Some(val) = lookup("SDS_DATABASE_PORT") {
        if let Ok(port) = val.parse::<u16>() {
            debug!("Overriding database port from SDS_DATABASE_PORT");
            config.database.port = port;
        }
    }
    if let Some(val) = lookup("SDS_DATABASE_NAME") {
        debug!("Overriding database name from SDS_DATABASE_NAME");
        config.database.name = val;
    }
    if let Some(val) = lookup("SDS_DATABASE_TIMEOUT") {
        if let Ok(secs) = val.parse::<u64>() {
            debug!("Overriding database timeout from SDS_DATABASE_TIMEOUT");
            config.database.timeout_secs = secs;
        }
    }
    if let Some(val) = lookup("SDS_DATABASE_USERNAME") {
        debug!("Overriding database username from SDS_DATABASE_USERNAME");
        config.database.credentials.username = val;
    }
    if let Some(val) = lookup("SDS_DATABASE_PASSWORD") {
        debug!("Overriding database password from SDS_DATABASE_PASSWORD");
        config.database.credentials.password = val;
    }

    if let Some(address) = lookup("SDS_VAULT_ADDRESS") {
        debug!("Overriding vault address from SDS_VAULT_ADDRESS");
        match config.vault {
            Some(ref mut vault) => vault.address = address,
            None => {
                config.vault = Some(VaultConfig {
                    address,
                    token: None,
                    approle: None,
                    database_path: "database/creds/sds".to_string(),
                    secure: false,
                })
            }
        }
    }
    if let Some(ref mut vault) = config.vault {
        if let Some(val) = lookup("SDS_VAULT_TOKEN") {
            debug!("Overriding vault token from SDS_VAULT_TOKEN");
            vault.token = Some(val);
        }
        let role_id = lookup("SDS_VAULT_APPROLE_ROLE_ID");
        let secret_id = lookup("SDS_VAULT_APPROLE_SECRET_ID");
        match (role_id, secret_id) {
            (Some(role_id), Some(secret_id)) => {
                debug!("Overriding vault approle from SDS_VAULT_APPROLE_*");
                vault.approle = Some(AppRoleConfig { role_id, secret_id });
            }
            (role_id, secret_id) => {
                if let Some(ref mut approle) = vault.approle {
                    if let Some(role_id) = role_id {
                        approle.role_id = role_id;
                    }
                    if let Some(secret_id) = secret_id {
                        approle.secret_id = secret_id;
                    }
                }
            }
        }
        if let Some(val) = lookup("SDS_VAULT_DATABASE_PATH") {
            debug!("Overriding vault database path from SDS_VAULT_DATABASE_PATH");
            vault.database_path = val;
        }
        if let Some(val) = lookup("SDS_VAULT_SECURE") {
            debug!("Overriding vault secure flag from SDS_VAULT_SECURE");
            vault.secure = val.eq_ignore_ascii_case("true");
        }
    }

    if let Some(val) = lookup("SDS_LOG_LEVEL") {
        debug!("Overriding log level from SDS_LOG_LEVEL");
        config.logging.level = val;
    }
}

/// Resolve environment variables in a string value
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - curly brace syntax
/// - `$VAR_NAME` - simple syntax (whole value must be the variable reference)
///
/// If the environment variable is not set, the original value is preserved.
fn resolve_env_var(value: &str) -> String {
    let var_name = if value.starts_with("${") && value.ends_with('}') {
        &value[2..value.len() - 1]
    } else if value.starts_with('$') && !value.contains(' ') && value.len() > 1 {
        &value[1..]
    } else {
        return value.to_string();
    };

    match std::env::var(var_name) {
        Ok(env_value) => {
            debug!("Resolved env var {} from config", var_name);
            env_value
        }
        Err(_) => {
            debug!("Env var {} not set, keeping original value", var_name);
            value.to_string()
        }
    }
}

/// Resolve environment variables in all config fields that support it
fn resolve_config_env_vars(config: &mut Config) {
    let db = &mut config.database;
    db.host = resolve_env_var(&db.host);
    db.name = resolve_env_var(&db.name);
    db.credentials.username = resolve_env_var(&db.credentials.username);
    db.credentials.password = resolve_env_var(&db.credentials.password);

    if let Some(ref mut vault) = config.vault {
        vault.address = resolve_env_var(&vault.address);
        if let Some(ref token) = vault.token {
            vault.token = Some(resolve_env_var(token));
        }
        if let Some(ref mut approle) = vault.approle {
            approle.role_id = resolve_env_var(&approle.role_id);
            approle.secret_id = resolve_env_var(&approle.secret_id);
        }
    }
}
