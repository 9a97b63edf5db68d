//! Pure data types for deltamake — build specs, source entries, differential
//! records, and the status enums shared between the scheduler and the CLI.
//!
//! This crate is a leaf dependency: no process handling, no terminal, no
//! threads. It exists so that consumers can work with deltamake's data model
//! without pulling in the engine.

pub mod diff;
pub mod source;
pub mod spec;
pub mod status;

// Flat re-exports for convenience
pub use diff::{DiffError, DiffRecord};
pub use source::SourceEntry;
pub use spec::{BuildSpec, OutputKind};
pub use status::{RunOutcome, SchedulerStatus, WorkerStatus};
