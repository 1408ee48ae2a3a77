use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::principal::Role;

pub const MIN_SIGNING_SECRET_LEN: usize = 32;
const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub identity: IdentityConfig,
    pub credential: CredentialConfig,
    pub lifecycle: LifecycleConfig,
    pub realtime: RealtimeConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct IdentityConfig {
    pub signing_secret: SecretString,
    pub token_ttl_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CredentialConfig {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LifecycleConfig {
    pub approval_chain: Vec<Role>,
    pub enforce_chain_order: bool,
    /// Zero disables deferred cleanup of rejected and cancelled requests.
    pub finalized_retention_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RealtimeConfig {
    pub channel_capacity: usize,
    pub join_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub signing_secret: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://outpass.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            identity: IdentityConfig {
                signing_secret: String::new().into(),
                token_ttl_secs: 7 * 24 * 60 * 60,
            },
            credential: CredentialConfig { ttl_secs: 3600, sweep_interval_secs: 60 },
            lifecycle: LifecycleConfig {
                approval_chain: vec![Role::Mentor, Role::Hod],
                enforce_chain_order: true,
                finalized_retention_secs: 300,
            },
            realtime: RealtimeConfig { channel_capacity: 64, join_timeout_secs: 10 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("outpass.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(identity) = patch.identity {
            if let Some(signing_secret_value) = identity.signing_secret {
                self.identity.signing_secret = secret_value(signing_secret_value);
            }
            if let Some(token_ttl_secs) = identity.token_ttl_secs {
                self.identity.token_ttl_secs = token_ttl_secs;
            }
        }

        if let Some(credential) = patch.credential {
            if let Some(ttl_secs) = credential.ttl_secs {
                self.credential.ttl_secs = ttl_secs;
            }
            if let Some(sweep_interval_secs) = credential.sweep_interval_secs {
                self.credential.sweep_interval_secs = sweep_interval_secs;
            }
        }

        if let Some(lifecycle) = patch.lifecycle {
            if let Some(chain) = lifecycle.approval_chain {
                self.lifecycle.approval_chain = parse_chain("lifecycle.approval_chain", &chain)?;
            }
            if let Some(enforce_chain_order) = lifecycle.enforce_chain_order {
                self.lifecycle.enforce_chain_order = enforce_chain_order;
            }
            if let Some(finalized_retention_secs) = lifecycle.finalized_retention_secs {
                self.lifecycle.finalized_retention_secs = finalized_retention_secs;
            }
        }

        if let Some(realtime) = patch.realtime {
            if let Some(channel_capacity) = realtime.channel_capacity {
                self.realtime.channel_capacity = channel_capacity;
            }
            if let Some(join_timeout_secs) = realtime.join_timeout_secs {
                self.realtime.join_timeout_secs = join_timeout_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("OUTPASS_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("OUTPASS_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("OUTPASS_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("OUTPASS_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("OUTPASS_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("OUTPASS_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("OUTPASS_SERVER_PORT") {
            self.server.port = parse_u16("OUTPASS_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("OUTPASS_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("OUTPASS_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("OUTPASS_IDENTITY_SIGNING_SECRET") {
            self.identity.signing_secret = secret_value(value);
        }
        if let Some(value) = read_env("OUTPASS_IDENTITY_TOKEN_TTL_SECS") {
            self.identity.token_ttl_secs = parse_u64("OUTPASS_IDENTITY_TOKEN_TTL_SECS", &value)?;
        }

        if let Some(value) = read_env("OUTPASS_CREDENTIAL_TTL_SECS") {
            self.credential.ttl_secs = parse_u64("OUTPASS_CREDENTIAL_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("OUTPASS_CREDENTIAL_SWEEP_INTERVAL_SECS") {
            self.credential.sweep_interval_secs =
                parse_u64("OUTPASS_CREDENTIAL_SWEEP_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env("OUTPASS_LIFECYCLE_APPROVAL_CHAIN") {
            let names: Vec<String> = value.split(',').map(|name| name.trim().to_string()).collect();
            self.lifecycle.approval_chain =
                parse_chain("OUTPASS_LIFECYCLE_APPROVAL_CHAIN", &names)?;
        }
        if let Some(value) = read_env("OUTPASS_LIFECYCLE_ENFORCE_CHAIN_ORDER") {
            self.lifecycle.enforce_chain_order =
                parse_bool("OUTPASS_LIFECYCLE_ENFORCE_CHAIN_ORDER", &value)?;
        }
        if let Some(value) = read_env("OUTPASS_LIFECYCLE_FINALIZED_RETENTION_SECS") {
            self.lifecycle.finalized_retention_secs =
                parse_u64("OUTPASS_LIFECYCLE_FINALIZED_RETENTION_SECS", &value)?;
        }

        if let Some(value) = read_env("OUTPASS_REALTIME_CHANNEL_CAPACITY") {
            self.realtime.channel_capacity =
                parse_usize("OUTPASS_REALTIME_CHANNEL_CAPACITY", &value)?;
        }
        if let Some(value) = read_env("OUTPASS_REALTIME_JOIN_TIMEOUT_SECS") {
            self.realtime.join_timeout_secs =
                parse_u64("OUTPASS_REALTIME_JOIN_TIMEOUT_SECS", &value)?;
        }

        let log_level = read_env("OUTPASS_LOGGING_LEVEL").or_else(|| read_env("OUTPASS_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("OUTPASS_LOGGING_FORMAT").or_else(|| read_env("OUTPASS_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(signing_secret) = overrides.signing_secret {
            self.identity.signing_secret = secret_value(signing_secret);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_identity(&self.identity)?;
        validate_credential(&self.credential)?;
        validate_lifecycle(&self.lifecycle)?;
        validate_realtime(&self.realtime)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("outpass.toml"), PathBuf::from("config/outpass.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn parse_chain(key: &str, names: &[String]) -> Result<Vec<Role>, ConfigError> {
    names
        .iter()
        .map(|name| {
            Role::parse(name).ok_or_else(|| ConfigError::InvalidEnvOverride {
                key: key.to_string(),
                value: name.clone(),
            })
        })
        .collect()
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_identity(identity: &IdentityConfig) -> Result<(), ConfigError> {
    let secret = identity.signing_secret.expose_secret();
    if secret.trim().is_empty() {
        return Err(ConfigError::Validation(
            "identity.signing_secret is required. Set OUTPASS_IDENTITY_SIGNING_SECRET to a random string of at least 32 characters".to_string(),
        ));
    }
    if secret.len() < MIN_SIGNING_SECRET_LEN {
        return Err(ConfigError::Validation(format!(
            "identity.signing_secret must be at least {MIN_SIGNING_SECRET_LEN} characters long"
        )));
    }

    if identity.token_ttl_secs == 0 || identity.token_ttl_secs > MAX_TTL_SECS {
        return Err(ConfigError::Validation(format!(
            "identity.token_ttl_secs must be in range 1..={MAX_TTL_SECS}"
        )));
    }

    Ok(())
}

fn validate_credential(credential: &CredentialConfig) -> Result<(), ConfigError> {
    if credential.ttl_secs == 0 || credential.ttl_secs > MAX_TTL_SECS {
        return Err(ConfigError::Validation(format!(
            "credential.ttl_secs must be in range 1..={MAX_TTL_SECS}"
        )));
    }

    if credential.sweep_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "credential.sweep_interval_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_lifecycle(lifecycle: &LifecycleConfig) -> Result<(), ConfigError> {
    let chain = &lifecycle.approval_chain;
    if chain.is_empty() {
        return Err(ConfigError::Validation(
            "lifecycle.approval_chain must contain at least one role".to_string(),
        ));
    }

    for (index, role) in chain.iter().enumerate() {
        if !role.is_approver() {
            return Err(ConfigError::Validation(format!(
                "lifecycle.approval_chain contains `{role}`, which cannot approve requests (expected mentor|hod)"
            )));
        }
        if chain[..index].contains(role) {
            return Err(ConfigError::Validation(format!(
                "lifecycle.approval_chain lists `{role}` more than once"
            )));
        }
        let is_final = index + 1 == chain.len();
        if !is_final && role.intermediate_status().is_none() {
            return Err(ConfigError::Validation(format!(
                "lifecycle.approval_chain: `{role}` can only be the last step"
            )));
        }
    }

    if lifecycle.finalized_retention_secs > MAX_TTL_SECS {
        return Err(ConfigError::Validation(format!(
            "lifecycle.finalized_retention_secs must be in range 0..={MAX_TTL_SECS}"
        )));
    }

    Ok(())
}

fn validate_realtime(realtime: &RealtimeConfig) -> Result<(), ConfigError> {
    if realtime.channel_capacity == 0 {
        return Err(ConfigError::Validation(
            "realtime.channel_capacity must be greater than zero".to_string(),
        ));
    }

    if realtime.join_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "realtime.join_timeout_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    identity: Option<IdentityPatch>,
    credential: Option<CredentialPatch>,
    lifecycle: Option<LifecyclePatch>,
    realtime: Option<RealtimePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct IdentityPatch {
    signing_secret: Option<String>,
    token_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CredentialPatch {
    ttl_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LifecyclePatch {
    approval_chain: Option<Vec<String>>,
    enforce_chain_order: Option<bool>,
    finalized_retention_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RealtimePatch {
    channel_capacity: Option<usize>,
    join_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
