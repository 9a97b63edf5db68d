//! Child-process runner: spawn one shell-hosted command, capture both output
//! streams to completion, reap, and report the exit status.
//!
//! The runner is deliberately low-level: `pipe(2)` plus `fork(2)` plus
//! `execv("/bin/sh", "-c", …)`, with a blocking `poll(2)` multiplex over the
//! two read ends. Keeping the child pid in hand lets a concurrently running
//! scheduler thread kill the child while the worker is parked in `poll`.

use std::ffi::CString;
use std::fs::File;
use std::io::Read;
use std::os::fd::{AsFd, AsRawFd};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};
use thiserror::Error;

/// Read chunk size for draining the capture pipes.
const PIPE_READ_CHUNK: usize = 4096;

/// Errors from running a command. The same diagnostic is also appended to
/// the stderr capture buffer so it shows up in the scheduler's failure dump.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("{call} failed: {source}")]
    Sys {
        call: &'static str,
        source: Errno,
    },
    #[error("command contains an interior NUL byte")]
    BadCommand(#[from] std::ffi::NulError),
    #[error("child did not terminate normally")]
    AbnormalExit,
}

/// Captured output of one command run.
#[derive(Debug, Clone, Default)]
pub struct Capture {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_status: Option<i32>,
}

/// Runs one command at a time; reusable across runs.
///
/// The current child pid is kept in an atomic so `kill` can be called from
/// another thread while `run` blocks in `poll`.
#[derive(Debug, Default)]
pub struct ProcessRunner {
    pid: AtomicI32,
    capture: Mutex<Capture>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `sh -c <command>`, capture stdout and stderr until both close,
    /// reap the child, and return its exit status.
    pub fn run(&self, command: &str) -> Result<i32, RunError> {
        *self.lock_capture() = Capture::default();

        // Everything the child needs is allocated before the fork; the child
        // only performs async-signal-safe calls.
        let shell = CString::new("/bin/sh")?;
        let argv0 = CString::new("sh")?;
        let dash_c = CString::new("-c")?;
        let script = CString::new(command)?;

        let (out_read, out_write) = self.syscall("pipe", unistd::pipe())?;
        let (err_read, err_write) = self.syscall("pipe", unistd::pipe())?;

        // SAFETY: the child branch calls only async-signal-safe functions
        // before exec.
        match self.syscall("fork", unsafe { unistd::fork() })? {
            ForkResult::Child => {
                // The interrupt signal belongs to the driver; children are
                // stopped by an explicit SIGKILL when the user insists.
                // SAFETY: replacing the SIGINT disposition with SIG_IGN.
                let _ = unsafe { signal::signal(Signal::SIGINT, SigHandler::SigIgn) };

                let _ = unistd::dup2(out_write.as_raw_fd(), libc::STDOUT_FILENO);
                let _ = unistd::dup2(err_write.as_raw_fd(), libc::STDERR_FILENO);
                drop(out_read);
                drop(err_read);
                drop(out_write);
                drop(err_write);

                let _ = unistd::execv(&shell, &[&argv0, &dash_c, &script]);
                // Exec failed; exit the way popen(3) does.
                // SAFETY: _exit is async-signal-safe.
                unsafe { libc::_exit(127) }
            }
            ForkResult::Parent { child } => {
                self.pid.store(child.as_raw(), Ordering::SeqCst);
                drop(out_write);
                drop(err_write);

                let out_read = File::from(out_read);
                let err_read = File::from(err_read);
                let pumped = self.pump(&out_read, &err_read);

                // Always reap, even if the pump failed, so no zombie is left
                // behind. waitpid restarts on interruption.
                let status = loop {
                    match waitpid(child, None) {
                        Ok(status) => break Ok(status),
                        Err(Errno::EINTR) => continue,
                        Err(err) => break Err(err),
                    }
                };
                self.pid.store(0, Ordering::SeqCst);

                pumped?;
                match self.syscall("waitpid", status)? {
                    WaitStatus::Exited(_, code) => {
                        self.lock_capture().exit_status = Some(code);
                        Ok(code)
                    }
                    _ => {
                        self.diagnose("child did not terminate normally");
                        Err(RunError::AbnormalExit)
                    }
                }
            }
        }
    }

    /// Send SIGKILL to the current child, if any. Safe to call from another
    /// thread; a no-op between runs.
    pub fn kill(&self) {
        let pid = self.pid.load(Ordering::SeqCst);
        if pid > 0 {
            let _ = signal::kill(Pid::from_raw(pid), Signal::SIGKILL);
        }
    }

    /// Snapshot of the captured output of the most recent run.
    pub fn captured(&self) -> Capture {
        self.lock_capture().clone()
    }

    /// Drain both pipes until the stdout end reports hangup or error.
    /// Stderr is drained opportunistically on every pass.
    fn pump(&self, out_read: &File, err_read: &File) -> Result<(), RunError> {
        loop {
            let (out_events, err_events) = {
                let mut fds = [
                    PollFd::new(out_read.as_fd(), PollFlags::POLLIN),
                    PollFd::new(err_read.as_fd(), PollFlags::POLLIN),
                ];
                match poll(&mut fds, PollTimeout::NONE) {
                    Ok(_) => {}
                    Err(Errno::EINTR) => continue,
                    Err(err) => {
                        self.diagnose("poll() failed");
                        return Err(RunError::Sys {
                            call: "poll",
                            source: err,
                        });
                    }
                }
                (fds[0].revents(), fds[1].revents())
            };

            if !self.drain(out_read, out_events, false)? {
                break;
            }
            let _ = self.drain(err_read, err_events, true)?;
        }

        Ok(())
    }

    /// Read pending bytes from one pipe into its capture buffer. Returns
    /// false once the descriptor reports hangup or error with nothing left
    /// to read.
    fn drain(
        &self,
        pipe: &File,
        events: Option<PollFlags>,
        is_stderr: bool,
    ) -> Result<bool, RunError> {
        let Some(events) = events else {
            return Ok(true);
        };
        if events.is_empty() {
            return Ok(true);
        }

        if events.contains(PollFlags::POLLIN) {
            let mut chunk = [0u8; PIPE_READ_CHUNK];
            let mut reader = pipe;
            let count = match reader.read(&mut chunk) {
                Ok(count) => count,
                Err(err) => {
                    self.diagnose("read() failed");
                    return Err(RunError::Sys {
                        call: "read",
                        source: Errno::from_raw(err.raw_os_error().unwrap_or(0)),
                    });
                }
            };

            if count > 0 {
                let mut capture = self.lock_capture();
                let buffer = if is_stderr {
                    &mut capture.stderr
                } else {
                    &mut capture.stdout
                };
                buffer.extend_from_slice(&chunk[..count]);
            }
            return Ok(count > 0 || !events.intersects(PollFlags::POLLHUP | PollFlags::POLLERR));
        }

        // POLLHUP or POLLERR with no readable data: this stream is done.
        Ok(false)
    }

    fn syscall<T>(&self, call: &'static str, result: nix::Result<T>) -> Result<T, RunError> {
        result.map_err(|err| {
            self.diagnose(&format!("{call}() failed"));
            RunError::Sys { call, source: err }
        })
    }

    /// Record a short failure note where the scheduler's failure dump will
    /// find it.
    fn diagnose(&self, note: &str) {
        let mut capture = self.lock_capture();
        if !capture.stderr.is_empty() {
            capture.stderr.push(b'\n');
        }
        capture.stderr.extend_from_slice(note.as_bytes());
    }

    fn lock_capture(&self) -> std::sync::MutexGuard<'_, Capture> {
        self.capture.lock().expect("capture mutex poisoned")
    }
}
