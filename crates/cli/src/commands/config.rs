use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use outpass_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

struct Field {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let chain =
        config.lifecycle.approval_chain.iter().map(|role| role.as_str()).collect::<Vec<_>>();

    vec![
        Field {
            key: "database.url",
            env_key: "OUTPASS_DATABASE_URL",
            value: config.database.url.clone(),
        },
        Field {
            key: "database.max_connections",
            env_key: "OUTPASS_DATABASE_MAX_CONNECTIONS",
            value: config.database.max_connections.to_string(),
        },
        Field {
            key: "database.timeout_secs",
            env_key: "OUTPASS_DATABASE_TIMEOUT_SECS",
            value: config.database.timeout_secs.to_string(),
        },
        Field {
            key: "server.bind_address",
            env_key: "OUTPASS_SERVER_BIND_ADDRESS",
            value: config.server.bind_address.clone(),
        },
        Field {
            key: "server.port",
            env_key: "OUTPASS_SERVER_PORT",
            value: config.server.port.to_string(),
        },
        Field {
            key: "server.graceful_shutdown_secs",
            env_key: "OUTPASS_SERVER_GRACEFUL_SHUTDOWN_SECS",
            value: config.server.graceful_shutdown_secs.to_string(),
        },
        Field {
            key: "identity.signing_secret",
            env_key: "OUTPASS_IDENTITY_SIGNING_SECRET",
            value: redact_secret(config.identity.signing_secret.expose_secret()),
        },
        Field {
            key: "identity.token_ttl_secs",
            env_key: "OUTPASS_IDENTITY_TOKEN_TTL_SECS",
            value: config.identity.token_ttl_secs.to_string(),
        },
        Field {
            key: "credential.ttl_secs",
            env_key: "OUTPASS_CREDENTIAL_TTL_SECS",
            value: config.credential.ttl_secs.to_string(),
        },
        Field {
            key: "credential.sweep_interval_secs",
            env_key: "OUTPASS_CREDENTIAL_SWEEP_INTERVAL_SECS",
            value: config.credential.sweep_interval_secs.to_string(),
        },
        Field {
            key: "lifecycle.approval_chain",
            env_key: "OUTPASS_LIFECYCLE_APPROVAL_CHAIN",
            value: chain.join(","),
        },
        Field {
            key: "lifecycle.enforce_chain_order",
            env_key: "OUTPASS_LIFECYCLE_ENFORCE_CHAIN_ORDER",
            value: config.lifecycle.enforce_chain_order.to_string(),
        },
        Field {
            key: "lifecycle.finalized_retention_secs",
            env_key: "OUTPASS_LIFECYCLE_FINALIZED_RETENTION_SECS",
            value: config.lifecycle.finalized_retention_secs.to_string(),
        },
        Field {
            key: "realtime.channel_capacity",
            env_key: "OUTPASS_REALTIME_CHANNEL_CAPACITY",
            value: config.realtime.channel_capacity.to_string(),
        },
        Field {
            key: "realtime.join_timeout_secs",
            env_key: "OUTPASS_REALTIME_JOIN_TIMEOUT_SECS",
            value: config.realtime.join_timeout_secs.to_string(),
        },
        Field {
            key: "logging.level",
            env_key: "OUTPASS_LOGGING_LEVEL",
            value: config.logging.level.clone(),
        },
        Field {
            key: "logging.format",
            env_key: "OUTPASS_LOGGING_FORMAT",
            value: format!("{:?}", config.logging.format),
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("outpass.toml"), PathBuf::from("config/outpass.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    format!("<redacted, {} chars>", trimmed.chars().count())
}
