//! Scheduler tasks: shell commands and rendezvous barriers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crate::process::{Capture, ProcessRunner};

/// Display title of every barrier.
pub const BARRIER_TITLE: &str = "== barrier ==";

/// How long a worker sleeps between barrier polls.
const BARRIER_POLL: Duration = Duration::from_millis(10);

/// A unit of work handed to a worker.
///
/// Two variants with a tiny shared contract: a title for the dashboard and
/// an `execute` that reports success. Tasks are shared as `Arc<Task>`
/// between the scheduler (which owns the ordered list) and the worker
/// currently executing them.
#[derive(Debug)]
pub enum Task {
    Command(CommandTask),
    Barrier(BarrierTask),
}

impl Task {
    pub fn title(&self) -> &str {
        match self {
            Task::Command(command) => command.title(),
            Task::Barrier(_) => BARRIER_TITLE,
        }
    }

    /// Run the task on the calling worker thread. Blocks until done.
    pub fn execute(&self) -> bool {
        match self {
            Task::Command(command) => command.execute(),
            Task::Barrier(barrier) => barrier.execute(),
        }
    }
}

/// A shell command run through the process runner.
#[derive(Debug)]
pub struct CommandTask {
    title: String,
    command: String,
    fail_if_nonzero: bool,
    runner: ProcessRunner,
}

impl CommandTask {
    pub fn new(title: impl Into<String>, command: impl Into<String>, fail_if_nonzero: bool) -> Self {
        Self {
            title: title.into(),
            command: command.into(),
            fail_if_nonzero,
            runner: ProcessRunner::new(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Captured output of the most recent run; empty before the first run.
    pub fn captured(&self) -> Capture {
        self.runner.captured()
    }

    /// Kill the running child process, if any. Called by the scheduler
    /// thread while the worker blocks inside `execute`.
    pub fn kill(&self) {
        self.runner.kill();
    }

    fn execute(&self) -> bool {
        match self.runner.run(&self.command) {
            Ok(status) => !self.fail_if_nonzero || status == 0,
            Err(_) => false,
        }
    }
}

/// Cooperative rendezvous: every worker must arrive before any may pass.
#[derive(Debug)]
pub struct BarrierTask {
    counter: AtomicUsize,
    target: usize,
}

impl BarrierTask {
    /// `target` is the worker count at scheduler start.
    pub fn new(target: usize) -> Self {
        Self {
            counter: AtomicUsize::new(0),
            target,
        }
    }

    /// All workers have arrived (or the barrier was skipped).
    pub fn is_done(&self) -> bool {
        self.counter.load(Ordering::SeqCst) >= self.target
    }

    /// Force the rendezvous open. Used by the scheduler when abandoning
    /// pending barriers during a stop.
    pub fn skip(&self) {
        self.counter.store(self.target, Ordering::SeqCst);
    }

    fn execute(&self) -> bool {
        self.counter.fetch_add(1, Ordering::SeqCst);
        while self.counter.load(Ordering::SeqCst) < self.target {
            thread::sleep(BARRIER_POLL);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_success_respects_fail_if_nonzero() {
        assert!(CommandTask::new("t", "exit 2", false).execute());
        assert!(!CommandTask::new("t", "exit 2", true).execute());
        assert!(CommandTask::new("t", "true", true).execute());
    }

    #[test]
    fn barrier_completes_when_all_arrive() {
        let barrier = BarrierTask::new(1);
        assert!(!barrier.is_done());
        assert!(barrier.execute());
        assert!(barrier.is_done());
    }

    #[test]
    fn skip_opens_the_barrier() {
        let barrier = BarrierTask::new(4);
        barrier.skip();
        assert!(barrier.is_done());
        // A late arrival passes straight through.
        assert!(barrier.execute());
    }

    #[test]
    fn barrier_title_is_fixed() {
        let task = Task::Barrier(BarrierTask::new(2));
        assert_eq!(task.title(), BARRIER_TITLE);
    }
}
