//! Worker slots and the worker thread routine.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use deltamake_types::WorkerStatus;

use super::task::Task;

/// State shared between the scheduler and one worker thread.
///
/// The task slot is written only by the scheduler, under the mutex; the
/// worker reads it after observing a status other than `WaitTask`. The
/// status is an atomic so the scheduler can sample it every tick without
/// taking the lock.
#[derive(Debug)]
pub struct WorkerShared {
    status: AtomicU8,
    task: Mutex<Option<Arc<Task>>>,
}

impl WorkerShared {
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(WorkerStatus::WaitTask.as_u8()),
            task: Mutex::new(None),
        }
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    pub fn set_status(&self, status: WorkerStatus) {
        self.status.store(status.as_u8(), Ordering::SeqCst);
    }

    pub fn lock_task(&self) -> MutexGuard<'_, Option<Arc<Task>>> {
        self.task.lock().expect("worker slot mutex poisoned")
    }
}

impl Default for WorkerShared {
    fn default() -> Self {
        Self::new()
    }
}

/// One scheduler-owned worker: the shared slot plus the thread handle.
#[derive(Debug)]
pub struct Worker {
    pub shared: Arc<WorkerShared>,
    pub thread: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(WorkerShared::new()),
            thread: None,
        }
    }

    pub fn spawn(&mut self) {
        let shared = Arc::clone(&self.shared);
        self.thread = Some(thread::spawn(move || worker_main(shared)));
    }
}

impl Default for Worker {
    fn default() -> Self {
        Self::new()
    }
}

/// The worker loop. Never dequeues tasks itself: the scheduler writes the
/// next task into the slot and flips the status to `Working`.
fn worker_main(shared: Arc<WorkerShared>) {
    loop {
        shared.set_status(WorkerStatus::WaitTask);

        while shared.status() == WorkerStatus::WaitTask {
            thread::yield_now();
        }

        // A cleared slot is the stop signal.
        let task = shared.lock_task().clone();
        let Some(task) = task else {
            break;
        };

        if !task.execute() {
            shared.set_status(WorkerStatus::Fail);
            return;
        }
    }

    shared.set_status(WorkerStatus::Stopped);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::task::CommandTask;
    use std::time::Duration;

    fn wait_for(shared: &WorkerShared, status: WorkerStatus) {
        for _ in 0..500 {
            if shared.status() == status {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("worker never reached {status:?}");
    }

    #[test]
    fn null_task_stops_the_worker() {
        let mut worker = Worker::new();
        worker.spawn();
        wait_for(&worker.shared, WorkerStatus::WaitTask);

        *worker.shared.lock_task() = None;
        worker.shared.set_status(WorkerStatus::Working);

        wait_for(&worker.shared, WorkerStatus::Stopped);
        worker.thread.take().unwrap().join().unwrap();
    }

    #[test]
    fn failed_task_latches_fail() {
        let mut worker = Worker::new();
        worker.spawn();
        wait_for(&worker.shared, WorkerStatus::WaitTask);

        let task = Arc::new(Task::Command(CommandTask::new("boom", "exit 1", true)));
        *worker.shared.lock_task() = Some(task);
        worker.shared.set_status(WorkerStatus::Working);

        wait_for(&worker.shared, WorkerStatus::Fail);
        worker.thread.take().unwrap().join().unwrap();
    }
}
