use thiserror::Error;

use crate::store::StoreError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("state conflict: {0}")]
    StateConflict(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

impl DomainError {
    /// Stable machine-readable reason surfaced to callers.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::AccessDenied(_) => "access_denied",
            Self::NotFound(_) => "not_found",
            Self::StateConflict(_) => "state_conflict",
            Self::InvariantViolation(_) => "invariant_violation",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        Self::Persistence(value.to_string())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { reason: &'static str, message: String, correlation_id: String },
    #[error("unauthorized: {message}")]
    Unauthorized { reason: &'static str, message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { reason: &'static str, message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { reason: &'static str, message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { reason: &'static str, message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { reason: &'static str, message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { reason: &'static str, message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason: "unauthenticated",
            message: message.into(),
            correlation_id: "unassigned".to_owned(),
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Unauthorized { .. } => "Authentication is required.",
            Self::Forbidden { .. } => "You are not allowed to perform this action.",
            Self::NotFound { .. } => "The requested resource does not exist.",
            Self::Conflict { .. } => "The request is not in a state that allows this action.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::BadRequest { reason, .. }
            | Self::Unauthorized { reason, .. }
            | Self::Forbidden { reason, .. }
            | Self::NotFound { reason, .. }
            | Self::Conflict { reason, .. }
            | Self::ServiceUnavailable { reason, .. }
            | Self::Internal { reason, .. } => reason,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Unauthorized { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        let correlation_id = correlation_id.into();
        match &mut self {
            Self::BadRequest { correlation_id: id, .. }
            | Self::Unauthorized { correlation_id: id, .. }
            | Self::Forbidden { correlation_id: id, .. }
            | Self::NotFound { correlation_id: id, .. }
            | Self::Conflict { correlation_id: id, .. }
            | Self::ServiceUnavailable { correlation_id: id, .. }
            | Self::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        self
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        InterfaceError::from(self).with_correlation_id(correlation_id)
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(error) => {
                let reason = error.reason();
                let message = error.to_string();
                match error {
                    DomainError::Validation(_) | DomainError::InvariantViolation(_) => {
                        Self::BadRequest { reason, message, correlation_id }
                    }
                    DomainError::AccessDenied(_) => Self::Forbidden { reason, message, correlation_id },
                    DomainError::NotFound(_) => Self::NotFound { reason, message, correlation_id },
                    DomainError::StateConflict(_) => Self::Conflict { reason, message, correlation_id },
                }
            }
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { reason: "persistence", message, correlation_id }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { reason: "configuration", message, correlation_id }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, DomainError, InterfaceError};
    use crate::store::StoreError;

    #[test]
    fn validation_error_maps_to_bad_request_interface_error() {
        let interface =
            ApplicationError::from(DomainError::Validation("reason must not be empty".to_owned()))
                .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                reason: "validation_error",
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn state_conflict_maps_to_conflict_with_reason() {
        let interface = ApplicationError::from(DomainError::StateConflict(
            "no pending step for role hod".to_owned(),
        ))
        .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::Conflict { .. }));
        assert_eq!(interface.reason(), "state_conflict");
        assert_eq!(interface.correlation_id(), "req-2");
    }

    #[test]
    fn access_denied_and_not_found_map_to_distinct_variants() {
        let denied =
            InterfaceError::from(ApplicationError::from(DomainError::AccessDenied("x".to_owned())));
        let missing =
            InterfaceError::from(ApplicationError::from(DomainError::NotFound("y".to_owned())));

        assert!(matches!(denied, InterfaceError::Forbidden { reason: "access_denied", .. }));
        assert!(matches!(missing, InterfaceError::NotFound { reason: "not_found", .. }));
    }

    #[test]
    fn store_error_maps_to_service_unavailable() {
        let interface = ApplicationError::from(StoreError::Backend("database is locked".to_owned()))
            .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface = ApplicationError::Configuration("missing signing secret".to_owned())
            .into_interface("req-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
