pub mod engine;
pub mod transitions;

pub use engine::{LifecycleEngine, LifecycleEvent, LifecycleSettings, TransitionOutcome};
pub use transitions::{is_allowed_edge, plan_cancel, plan_decision, Decision, StepPlan};
