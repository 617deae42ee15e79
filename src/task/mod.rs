//! Task module - search tasks, their records, and the orchestrator.
//!
//! A task is one query/region submission. Its record is written pending at
//! submission and rewritten exactly once with a terminal status:
//! - Types enforce the `Pending -> {Completed, Failed}` transition
//! - The orchestrator is the only writer of a task's record
//! - Pipeline stages are plain async functions over injected collaborators

mod orchestrator;
mod record;

pub use orchestrator::{
    Orchestrator, OrchestratorSettings, PipelineError, TaskCounters, TaskCountersSnapshot,
    TaskHandle,
};
pub use record::{
    CandidateError, ProductCandidate, Query, QueryError, TaskId, TaskRecord, TaskStatus,
    TransitionError,
};
