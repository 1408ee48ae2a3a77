use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::principal::{Principal, PrincipalId, Role};

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("credential is malformed")]
    Malformed,
    #[error("credential signature does not match")]
    BadSignature,
    #[error("credential has expired")]
    Expired,
    #[error("credential names an unknown role")]
    UnknownRole,
}

impl AuthError {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::BadSignature => "bad_signature",
            Self::Expired => "expired",
            Self::UnknownRole => "unknown_role",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(error: jsonwebtoken::errors::Error) -> Self {
        match error.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::BadSignature,
            _ => Self::Malformed,
        }
    }
}

/// Resolves an opaque bearer credential to the acting principal.
#[async_trait]
pub trait Identity: Send + Sync {
    async fn authenticate(&self, credential: &str) -> Result<Principal, AuthError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct Claims {
    sub: String,
    name: String,
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    section: Option<String>,
    iat: i64,
    exp: i64,
}

/// HS256 JSON Web Tokens carrying the principal's role and org unit.
#[derive(Clone)]
pub struct SignedTokenIdentity {
    secret: SecretString,
    ttl: Duration,
}

impl SignedTokenIdentity {
    pub fn new(secret: SecretString, ttl_secs: u64) -> Self {
        let ttl = Duration::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX / 1_000));
        Self { secret, ttl }
    }

    pub fn issue(&self, principal: &Principal, now: DateTime<Utc>) -> Result<String, AuthError> {
        let claims = Claims {
            sub: principal.id.0.clone(),
            name: principal.name.clone(),
            role: principal.role.as_str().to_string(),
            branch: principal.branch.clone(),
            section: principal.section.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        let key = EncodingKey::from_secret(self.secret.expose_secret().as_bytes());
        Ok(jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &key)?)
    }

    /// Checks signature and `exp` against the wall clock, with no leeway.
    pub fn verify(&self, credential: &str) -> Result<Principal, AuthError> {
        let key = DecodingKey::from_secret(self.secret.expose_secret().as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let claims = jsonwebtoken::decode::<Claims>(credential.trim(), &key, &validation)?.claims;
        let role = Role::parse(&claims.role).ok_or(AuthError::UnknownRole)?;

        Ok(Principal {
            id: PrincipalId(claims.sub),
            name: claims.name,
            role,
            branch: claims.branch,
            section: claims.section,
        })
    }
}

#[async_trait]
impl Identity for SignedTokenIdentity {
    async fn authenticate(&self, credential: &str) -> Result<Principal, AuthError> {
        self.verify(credential)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use jsonwebtoken::{Algorithm, EncodingKey, Header};
    use serde_json::json;

    use super::{AuthError, Identity, SignedTokenIdentity};
    use crate::domain::principal::{Principal, Role};

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn identity() -> SignedTokenIdentity {
        SignedTokenIdentity::new(SECRET.to_string().into(), 3600)
    }

    #[tokio::test]
    async fn issued_credential_authenticates_to_same_principal() {
        let identity = identity();
        let mentor =
            Principal::new("men-1", "Meera", Role::Mentor).with_branch("CSE").with_section("A");

        let token = identity.issue(&mentor, Utc::now()).expect("issue");
        assert_eq!(token.split('.').count(), 3);
        let principal = identity.authenticate(&token).await.expect("authenticate");

        assert_eq!(principal, mentor);
    }

    #[test]
    fn tampered_or_foreign_credentials_are_rejected() {
        let identity = identity();
        let student = Principal::new("stu-1", "Asha", Role::Student);
        let token = identity.issue(&student, Utc::now()).expect("issue");

        let other =
            SignedTokenIdentity::new("ffffffffffffffffffffffffffffffff".to_string().into(), 3600);
        assert_eq!(other.verify(&token), Err(AuthError::BadSignature));

        let dev = Principal::new("stu-1", "Asha", Role::Dev);
        let foreign = other.issue(&dev, Utc::now()).expect("issue");
        let parts: Vec<&str> = token.split('.').collect();
        let foreign_parts: Vec<&str> = foreign.split('.').collect();
        let spliced = format!("{}.{}.{}", parts[0], foreign_parts[1], parts[2]);
        assert_eq!(identity.verify(&spliced), Err(AuthError::BadSignature));

        assert_eq!(identity.verify("garbage"), Err(AuthError::Malformed));
        assert_eq!(identity.verify("zz.zz.zz"), Err(AuthError::Malformed));
    }

    #[test]
    fn expired_credentials_are_rejected() {
        let identity = identity();
        let hod = Principal::new("hod-1", "Harish", Role::Hod).with_branch("CSE");

        let fresh = identity.issue(&hod, Utc::now() - Duration::minutes(59)).expect("issue");
        assert!(identity.verify(&fresh).is_ok());

        let stale = identity.issue(&hod, Utc::now() - Duration::hours(2)).expect("issue");
        assert_eq!(identity.verify(&stale), Err(AuthError::Expired));
    }

    #[test]
    fn unknown_role_in_signed_claims_is_reported() {
        let claims = json!({
            "sub": "x-1",
            "name": "X",
            "role": "principal",
            "iat": Utc::now().timestamp(),
            "exp": (Utc::now() + Duration::hours(1)).timestamp(),
        });
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .expect("encode");

        assert_eq!(identity().verify(&token), Err(AuthError::UnknownRole));
    }
}
