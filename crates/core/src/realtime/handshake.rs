use serde::Deserialize;
use thiserror::Error;

use crate::domain::principal::{Principal, Role};
use crate::identity::{AuthError, Identity};
use crate::realtime::rooms::{Room, RoomRouter};

/// First frame a realtime client must send.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Join {
        token: String,
        role: String,
        #[serde(default)]
        branch: Option<String>,
        #[serde(default)]
        section: Option<String>,
    },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum JoinRejected {
    #[error("join frame is malformed")]
    MalformedFrame,
    #[error("join credential rejected: {0}")]
    Unauthenticated(#[from] AuthError),
    #[error("declared {field} does not match the authenticated principal")]
    Mismatch { field: &'static str },
}

impl JoinRejected {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MalformedFrame => "malformed_frame",
            Self::Unauthenticated(error) => error.reason(),
            Self::Mismatch { .. } => "declaration_mismatch",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Admission {
    pub principal: Principal,
    pub rooms: Vec<Room>,
}

/// Authenticates a raw join frame. Rooms always come from the verified
/// principal; the declared values only have to agree with it.
pub async fn admit(identity: &dyn Identity, raw: &str) -> Result<Admission, JoinRejected> {
    let ClientFrame::Join { token, role, branch, section } =
        serde_json::from_str(raw).map_err(|_| JoinRejected::MalformedFrame)?;

    let principal = identity.authenticate(&token).await?;

    if Role::parse(&role) != Some(principal.role) {
        return Err(JoinRejected::Mismatch { field: "role" });
    }
    if !declaration_agrees(branch.as_deref(), principal.branch.as_deref()) {
        return Err(JoinRejected::Mismatch { field: "branch" });
    }
    if !declaration_agrees(section.as_deref(), principal.section.as_deref()) {
        return Err(JoinRejected::Mismatch { field: "section" });
    }

    let rooms = RoomRouter::rooms_for(&principal);
    Ok(Admission { principal, rooms })
}

fn declaration_agrees(declared: Option<&str>, actual: Option<&str>) -> bool {
    match declared.map(str::trim).filter(|value| !value.is_empty()) {
        None => true,
        Some(declared) => actual.map(str::trim) == Some(declared),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::{admit, JoinRejected};
    use crate::domain::principal::{Principal, Role};
    use crate::identity::{AuthError, SignedTokenIdentity};
    use crate::realtime::rooms::Room;

    fn identity() -> SignedTokenIdentity {
        SignedTokenIdentity::new("0123456789abcdef0123456789abcdef".to_string().into(), 3600)
    }

    fn mentor_token(identity: &SignedTokenIdentity) -> String {
        let mentor =
            Principal::new("men-1", "Meera", Role::Mentor).with_branch("CSE").with_section("A");
        identity.issue(&mentor, Utc::now()).expect("issue")
    }

    #[tokio::test]
    async fn mentor_joins_own_section_room() {
        let identity = identity();
        let frame = json!({
            "type": "join",
            "token": mentor_token(&identity),
            "role": "mentor",
            "branch": "CSE",
            "section": "A",
        })
        .to_string();

        let admission = admit(&identity, &frame).await.expect("admitted");
        assert_eq!(
            admission.rooms,
            vec![Room::Mentor { branch: "CSE".to_string(), section: "A".to_string() }]
        );
    }

    #[tokio::test]
    async fn invalid_credential_is_rejected() {
        let identity = identity();
        let frame = json!({"type": "join", "token": "nope", "role": "mentor"}).to_string();

        let rejected = admit(&identity, &frame).await.expect_err("rejected");
        assert_eq!(rejected, JoinRejected::Unauthenticated(AuthError::Malformed));
    }

    #[tokio::test]
    async fn declared_org_unit_must_match_principal() {
        let identity = identity();
        let frame = json!({
            "type": "join",
            "token": mentor_token(&identity),
            "role": "mentor",
            "branch": "CSE",
            "section": "B",
        })
        .to_string();

        let rejected = admit(&identity, &frame).await.expect_err("rejected");
        assert_eq!(rejected, JoinRejected::Mismatch { field: "section" });

        let frame = json!({"type": "join", "token": mentor_token(&identity), "role": "hod"})
            .to_string();
        let rejected = admit(&identity, &frame).await.expect_err("rejected");
        assert_eq!(rejected.reason(), "declaration_mismatch");
    }

    #[tokio::test]
    async fn non_join_frames_are_malformed() {
        let identity = identity();
        let rejected = admit(&identity, r#"{"type":"subscribe","room":"dev"}"#)
            .await
            .expect_err("rejected");
        assert_eq!(rejected, JoinRejected::MalformedFrame);
    }
}
