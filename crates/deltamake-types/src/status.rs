//! Status enums shared between the scheduler, its workers, and the CLI.

/// State of one worker thread, sampled by the scheduler every tick.
///
/// Stored as an atomic u8 in the worker slot; the `from_u8`/`as_u8` pair is
/// the wire format for that atomic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerStatus {
    /// Spinning until the scheduler writes a task into the slot.
    WaitTask = 0,
    /// Executing the task currently in the slot.
    Working = 1,
    /// The task returned failure; the thread has exited.
    Fail = 2,
    /// The thread has exited cleanly.
    Stopped = 3,
}

impl WorkerStatus {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::WaitTask,
            1 => Self::Working,
            2 => Self::Fail,
            _ => Self::Stopped,
        }
    }
}

/// Scheduler lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerStatus {
    /// Accepting task appends; not running.
    Idle,
    /// Tick loop active, task list frozen.
    Running,
    /// Draining: workers finish their current task and stop.
    Stopping,
    /// Draining with force: running child processes are killed.
    Killing,
}

/// How a scheduler run ended; the CLI maps this to the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every task ran and succeeded.
    Completed,
    /// At least one task failed.
    Failed,
    /// An interrupt signal stopped or killed the run.
    Interrupted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_status_round_trips_through_u8() {
        for status in [
            WorkerStatus::WaitTask,
            WorkerStatus::Working,
            WorkerStatus::Fail,
            WorkerStatus::Stopped,
        ] {
            assert_eq!(WorkerStatus::from_u8(status.as_u8()), status);
        }
    }
}
