pub mod audit;
pub mod config;
pub mod crypto;
pub mod domain;
pub mod errors;
pub mod identity;
pub mod lifecycle;
pub mod notifier;
pub mod realtime;
pub mod scheduler;
pub mod store;
pub mod token;

pub use audit::{AuditEntry, AuditLog, AuditPage, AuditTarget, InMemoryAuditLog};
pub use domain::credential::{
    Credential, CredentialId, CredentialProjection, InvalidReason, Verification,
};
pub use domain::job::{JobId, JobKind, JobState, ScheduledJob};
pub use domain::principal::{Principal, PrincipalId, Role};
pub use domain::request::{
    ApprovalStep, LeaveWindow, NewRequest, Request, RequestId, RequestStatus, StepStatus,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use identity::{AuthError, Identity, SignedTokenIdentity};
pub use lifecycle::{LifecycleEngine, LifecycleEvent, LifecycleSettings, TransitionOutcome};
pub use notifier::Notifier;
pub use realtime::{Envelope, EventBus, Room, RoomRouter, Subscription};
pub use scheduler::{JobScheduler, MaintenanceReport};
pub use store::{InMemoryStore, OutpassStore, RequestFilter, StepTransition, StoreError};
pub use token::TokenService;
