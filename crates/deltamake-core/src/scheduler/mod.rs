//! Task scheduler — a barrier-aware parallel executor over a fixed worker set.
//!
//! The scheduler owns the ordered task list and the workers. One driver
//! thread runs the tick loop: it hands tasks to idle workers, serializes
//! barriers (every worker must arrive before the list advances), repaints
//! the dashboard between ticks, and reacts to interrupt deliveries: one
//! Ctrl-C drains the pool gracefully, a second kills running children.
//!
//! ```text
//! [\] parser                          [|] codegen
//! [*]                                 [=]
//! [ 12/48 ]
//! ```
//!
//! Tasks are appended while Idle, frozen once Running, and dropped when
//! `start` returns.

mod signal;
pub mod task;
pub mod worker;

pub use task::{BarrierTask, CommandTask, Task, BARRIER_TITLE};
pub use worker::{Worker, WorkerShared};

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use deltamake_types::{RunOutcome, SchedulerStatus, WorkerStatus};

use crate::terminal::{LogLevel, Terminal};
use signal::InterruptGuard;

/// Minimum width of a worker title cell; wider terminals stretch the cells.
pub const MIN_TITLE_WIDTH: usize = 32;

/// Dashboard refresh / assignment poll interval.
const TICK: Duration = Duration::from_millis(80);

/// Append-side view of the scheduler's task list, consumed by the planner.
/// Both appends refuse, with a warning, unless the scheduler is idle.
pub trait TaskList {
    fn add_command(&mut self, title: &str, command: &str, fail_if_nonzero: bool);
    fn add_barrier(&mut self);
    fn task_count(&self) -> usize;
}

pub struct Scheduler {
    terminal: Arc<Terminal>,
    tasks: Vec<Arc<Task>>,
    next_task: usize,
    workers: Vec<Worker>,
    status: SchedulerStatus,
    spinner: usize,
    top_offset: usize,
    failed: bool,
    interrupted: bool,
}

impl Scheduler {
    pub fn new(terminal: Arc<Terminal>) -> Self {
        Self {
            terminal,
            tasks: Vec::new(),
            next_task: 0,
            workers: Vec::new(),
            status: SchedulerStatus::Idle,
            spinner: 0,
            top_offset: 0,
            failed: false,
            interrupted: false,
        }
    }

    /// Allocate `workers` slots. Threads are spawned by `start`.
    pub fn init(&mut self, workers: usize) {
        self.workers = (0..workers).map(|_| Worker::new()).collect();
    }

    /// Run the task list to completion (or to a stop/kill) and report how
    /// the run ended. Also installs the two-stage interrupt handler for the
    /// duration of the run.
    pub fn start(&mut self) -> RunOutcome {
        if self.tasks.is_empty() {
            self.terminal
                .warning("Scheduler task list is empty! Abort start.");
            return RunOutcome::Completed;
        }

        self.failed = false;
        self.interrupted = false;

        let mut guard = match InterruptGuard::install() {
            Ok(guard) => Some(guard),
            Err(err) => {
                tracing::warn!("cannot install SIGINT handler: {err}");
                None
            }
        };

        for worker in &mut self.workers {
            worker.spawn();
        }

        self.terminal.show_cursor(false);
        self.status = SchedulerStatus::Running;

        loop {
            thread::sleep(TICK);
            self.consume_interrupts(&mut guard);

            let mut stopped = 0;
            for index in 0..self.workers.len() {
                match self.workers[index].shared.status() {
                    WorkerStatus::Working => {
                        if self.status != SchedulerStatus::Running {
                            let slot = self.workers[index].shared.lock_task();
                            if let Some(Task::Barrier(barrier)) = slot.as_deref() {
                                barrier.skip();
                            }
                        }
                        if self.status == SchedulerStatus::Killing {
                            self.kill_worker_task(index);
                        }
                    }
                    WorkerStatus::WaitTask => self.assign_task(index),
                    WorkerStatus::Fail => {
                        if self.status != SchedulerStatus::Stopping {
                            self.stop();
                        }
                        self.failed = true;
                        stopped += 1;
                    }
                    WorkerStatus::Stopped => stopped += 1,
                }
            }

            if stopped == self.workers.len() {
                break;
            }

            self.render();
        }

        // Failed workers get their captured output dumped; the rest are
        // promoted to Stopped for the final paint.
        for index in 0..self.workers.len() {
            if self.workers[index].shared.status() == WorkerStatus::Fail {
                self.flush_command_output(index);
            } else {
                self.workers[index].shared.set_status(WorkerStatus::Stopped);
            }
        }
        self.render();

        for worker in &mut self.workers {
            if let Some(handle) = worker.thread.take() {
                let _ = handle.join();
            }
        }

        self.status = SchedulerStatus::Idle;
        self.render();

        self.workers.clear();
        self.tasks.clear();
        self.next_task = 0;

        self.terminal.show_cursor(true);
        self.terminal.flush();
        drop(guard);

        if self.interrupted {
            RunOutcome::Interrupted
        } else if self.failed {
            RunOutcome::Failed
        } else {
            RunOutcome::Completed
        }
    }

    /// Stop handing out tasks; workers drain their current task and exit.
    /// Idempotent.
    pub fn stop(&mut self) {
        self.status = SchedulerStatus::Stopping;
        self.next_task = self.tasks.len();
    }

    /// Stop, and additionally kill the child process of every worker still
    /// inside a command task.
    pub fn kill(&mut self) {
        self.stop();
        self.status = SchedulerStatus::Killing;
    }

    /// One delivery means stop, two mean kill; after the second the previous
    /// handler is restored so a third delivery reaches it.
    fn consume_interrupts(&mut self, guard: &mut Option<InterruptGuard>) {
        let Some(active) = guard.as_mut() else {
            return;
        };

        let deliveries = active.interrupts();
        if deliveries == 0 {
            return;
        }

        self.interrupted = true;
        if deliveries >= 2 {
            if self.status != SchedulerStatus::Killing {
                self.kill();
            }
            active.demote();
        } else if self.status == SchedulerStatus::Running {
            self.stop();
        }
    }

    /// Kill the command child of one worker and force the worker to Fail so
    /// the stop counter can make progress.
    fn kill_worker_task(&mut self, index: usize) {
        let shared = &self.workers[index].shared;
        let slot = shared.lock_task();
        if let Some(Task::Command(command)) = slot.as_deref() {
            command.kill();
        }
        drop(slot);
        shared.set_status(WorkerStatus::Fail);
    }

    /// Hand the next task to an idle worker. At the end of the list the slot
    /// is cleared instead; the worker sees the null task and stops. An
    /// unfinished barrier is handed out without advancing `next_task`, so
    /// every idle worker joins the same rendezvous.
    fn assign_task(&mut self, index: usize) {
        if self.next_task == self.tasks.len() {
            let shared = &self.workers[index].shared;
            *shared.lock_task() = None;
            shared.set_status(WorkerStatus::Working);
            return;
        }

        // The previous command's output goes out before the slot is reused.
        self.flush_command_output(index);

        let current = Arc::clone(&self.tasks[self.next_task]);
        *self.workers[index].shared.lock_task() = Some(Arc::clone(&current));

        match &*current {
            Task::Barrier(barrier) => {
                if barrier.is_done() {
                    self.next_task += 1;
                }
            }
            Task::Command(_) => self.next_task += 1,
        }

        self.workers[index].shared.set_status(WorkerStatus::Working);
    }

    /// Present a finished command's captured output without corrupting the
    /// dashboard: clear the block, print the titled output, shrink the
    /// top offset by the rows the output consumed, repaint below it.
    fn flush_command_output(&mut self, index: usize) {
        let flushed = {
            let slot = self.workers[index].shared.lock_task();
            let Some(Task::Command(command)) = slot.as_deref() else {
                return;
            };
            let capture = command.captured();
            if capture.stdout.is_empty() && capture.stderr.is_empty() {
                return;
            }
            (command.title().to_string(), capture)
        };
        let (title, capture) = flushed;

        let terminal = Arc::clone(&self.terminal);
        terminal.move_up(self.top_offset);
        terminal.move_left(terminal.columns());
        terminal.clear_down();
        terminal.flush();

        let before = terminal.cursor_position();
        let mut printed_rows = 0;

        if !capture.stdout.is_empty() {
            let text = String::from_utf8_lossy(&capture.stdout);
            let text = text.trim_end_matches('\n');
            printed_rows += text.lines().count().max(1);
            terminal.log(LogLevel::Info, &format!("{title} | {text}"));
        }
        if !capture.stderr.is_empty() {
            let text = String::from_utf8_lossy(&capture.stderr);
            let text = text.trim_end_matches('\n');
            printed_rows += text.lines().count().max(1);
            terminal.log(LogLevel::Error, &format!("{title} | {text}"));
        }

        terminal.flush();
        let after = terminal.cursor_position();

        // A same-row reply means the output still took (at least) one row.
        let consumed = match (before, after) {
            (Some((_, from)), Some((_, to))) => (to as i64 - from as i64).max(1) as usize,
            _ => printed_rows.max(1),
        };

        self.top_offset = self.top_offset.saturating_sub(consumed);
        terminal.move_down(self.top_offset);

        self.render();
    }

    /// Repaint the dashboard block in place.
    fn render(&mut self) {
        self.spinner = self.spinner.wrapping_add(1);

        let terminal = Arc::clone(&self.terminal);
        terminal.update_size();

        let columns = terminal.columns().max(1);
        let min_cell = 4 + MIN_TITLE_WIDTH; // "[X] " plus the title
        let per_line = (columns / min_cell).max(1);
        let lines = self.workers.len().div_ceil(per_line) + 1;
        let title_width = MIN_TITLE_WIDTH + columns.saturating_sub(per_line * min_cell) / per_line;

        // Grow the display area downward before drawing into it.
        if lines > self.top_offset {
            for _ in 0..lines - self.top_offset {
                terminal.write("\n");
            }
            self.top_offset = lines;
        }

        terminal.move_up(self.top_offset);
        terminal.move_left(columns);

        let mut in_line = 0;
        for worker in &self.workers {
            let glyph = self.glyph(worker.shared.status());
            let slot = worker.shared.lock_task();
            let title = slot.as_deref().map(Task::title).unwrap_or("");
            terminal.write(&format!(
                "[{glyph}] {:<title_width$}",
                truncate(title, title_width)
            ));
            drop(slot);

            in_line += 1;
            if in_line == per_line {
                in_line = 0;
                terminal.write("\r\n");
            }
        }
        if in_line != 0 {
            terminal.write("\r\n");
        }

        match self.status {
            SchedulerStatus::Idle => {
                terminal.clear_down();
                terminal.write("Ready.\r\n");
            }
            SchedulerStatus::Running => {
                terminal.write(&format!(
                    "[{:3}/{:<3}]\r\n",
                    self.next_task,
                    self.tasks.len()
                ));
            }
            SchedulerStatus::Stopping => terminal.write("Stopping workers...\r\n"),
            SchedulerStatus::Killing => terminal.write("Killing remaining tasks...\r\n"),
        }

        terminal.flush();
    }

    fn glyph(&self, status: WorkerStatus) -> char {
        const SPINNER: [char; 4] = ['-', '\\', '|', '/'];
        match status {
            WorkerStatus::WaitTask => '*',
            WorkerStatus::Working => SPINNER[self.spinner % SPINNER.len()],
            WorkerStatus::Fail => 'X',
            WorkerStatus::Stopped => '=',
        }
    }

    fn refuse_append(&self) -> bool {
        let running = self.status != SchedulerStatus::Idle;
        if running {
            self.terminal.warning("Scheduler is running!");
        }
        running
    }
}

impl TaskList for Scheduler {
    fn add_command(&mut self, title: &str, command: &str, fail_if_nonzero: bool) {
        if self.refuse_append() {
            return;
        }

        self.terminal.detail(&format!("{title}:\n\t{command}"));
        self.tasks.push(Arc::new(Task::Command(CommandTask::new(
            title,
            command,
            fail_if_nonzero,
        ))));
    }

    fn add_barrier(&mut self) {
        if self.refuse_append() {
            return;
        }

        self.terminal.detail(BARRIER_TITLE);
        self.tasks.push(Arc::new(Task::Barrier(BarrierTask::new(
            self.workers.len(),
        ))));
    }

    fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

/// Clip a title to the current cell width.
fn truncate(text: &str, width: usize) -> &str {
    match text.char_indices().nth(width) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_clips_long_titles() {
        assert_eq!(truncate("abcdef", 4), "abcd");
        assert_eq!(truncate("abc", 4), "abc");
        assert_eq!(truncate("", 4), "");
    }

    #[test]
    fn task_count_tracks_appends() {
        let mut scheduler = Scheduler::new(Arc::new(Terminal::new(false)));
        scheduler.init(2);
        assert_eq!(scheduler.task_count(), 0);

        scheduler.add_command("a", "true", true);
        scheduler.add_barrier();
        scheduler.add_command("b", "true", false);
        assert_eq!(scheduler.task_count(), 3);
    }

    #[test]
    fn empty_list_refuses_to_start() {
        let mut scheduler = Scheduler::new(Arc::new(Terminal::new(false)));
        scheduler.init(1);
        assert_eq!(scheduler.start(), RunOutcome::Completed);
    }
}
