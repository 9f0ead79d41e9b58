pub mod orchestrator;
pub mod reconciliation;

pub use orchestrator::{InitiatePayment, OrchestrationService, VerifiedTransaction};
pub use reconciliation::Reconciler;
