pub mod allowance;
pub mod commit;
pub mod eligibility;
pub mod engine;
pub mod pipeline;
pub mod slots;

pub use allowance::calculate_allowance;
pub use commit::{CommitCoordinator, CommitOutcome};
pub use eligibility::resolve_eligible;
pub use engine::run_assignment;
pub use pipeline::{
    ExecuteResponse, PostingPipeline, PostingRunRequest, PreviewResponse, RollbackResponse,
};
pub use slots::derive_slots;
