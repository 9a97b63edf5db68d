//! deltamake-core: the engine behind the `deltamake` build driver.
//!
//! This crate provides:
//!
//! - **Terminal**: ANSI terminal capability — leveled log, cursor control,
//!   size queries, synchronous shell execution
//! - **Process**: fork/exec of shell-hosted commands with duplex output
//!   capture through `poll(2)` and orderly reaping
//! - **Scheduler**: barrier-aware parallel executor over a fixed worker set,
//!   with a live dashboard and two-stage interrupt handling
//! - **Solution**: the configuration model, the factory registry for
//!   solution kinds, and the incremental build planner

pub mod process;
pub mod scheduler;
pub mod solution;
pub mod terminal;

pub use process::{Capture, ProcessRunner, RunError};
pub use scheduler::{Scheduler, TaskList, MIN_TITLE_WIDTH};
pub use solution::{
    load_solution, register_defaults, BuildError, BuildJob, ConfigError, PlanContext, Solution,
    SolutionFactory, SolutionRegistry, DIFF_FILENAME, SOLUTION_FILENAME,
};
pub use terminal::{LogLevel, Terminal};
