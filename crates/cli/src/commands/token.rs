use chrono::Utc;
use outpass_core::config::{AppConfig, LoadOptions};
use outpass_core::domain::principal::{Principal, Role};
use outpass_core::identity::SignedTokenIdentity;
use serde_json::json;

use crate::commands::CommandResult;

#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub id: String,
    pub name: String,
    pub role: String,
    pub branch: Option<String>,
    pub section: Option<String>,
}

pub fn run(request: TokenRequest) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "issue-token",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let Some(role) = Role::parse(&request.role) else {
        return CommandResult::failure(
            "issue-token",
            "invalid_role",
            format!("unknown role `{}`", request.role),
            2,
        );
    };

    let mut principal = Principal::new(request.id, request.name, role);
    if let Some(branch) = request.branch {
        principal = principal.with_branch(branch);
    }
    if let Some(section) = request.section {
        principal = principal.with_section(section);
    }

    let identity =
        SignedTokenIdentity::new(config.identity.signing_secret, config.identity.token_ttl_secs);
    match identity.issue(&principal, Utc::now()) {
        Ok(token) => CommandResult::success_with(
            "issue-token",
            format!("token issued for {} ({})", principal.id, role.as_str()),
            json!({ "token": token, "expires_in_secs": config.identity.token_ttl_secs }),
        ),
        Err(error) => CommandResult::failure("issue-token", "signing", error.to_string(), 7),
    }
}
