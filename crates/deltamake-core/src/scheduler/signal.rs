//! Two-stage interrupt handling.
//!
//! The handler itself is as small as a signal handler must be: it bumps a
//! process-wide atomic counter and returns. The scheduler's tick loop reads
//! the counter; one delivery means stop, two mean kill. When the second
//! delivery is consumed the scheduler restores the previously installed
//! handler, so a third Ctrl-C reaches whatever was there before (normally
//! the default terminator).

use std::sync::atomic::{AtomicU32, Ordering};

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

static INTERRUPTS: AtomicU32 = AtomicU32::new(0);

extern "C" fn note_interrupt(_: libc::c_int) {
    INTERRUPTS.fetch_add(1, Ordering::SeqCst);
}

/// Installed on `Scheduler::start` entry; restores the previous SIGINT
/// disposition when dropped (or earlier, via `demote`).
#[derive(Debug)]
pub struct InterruptGuard {
    previous: SigAction,
    demoted: bool,
}

impl InterruptGuard {
    /// Replace the SIGINT handler with the counting handler, saving the
    /// previous disposition.
    pub fn install() -> nix::Result<Self> {
        INTERRUPTS.store(0, Ordering::SeqCst);

        let action = SigAction::new(
            SigHandler::Handler(note_interrupt),
            SaFlags::empty(),
            SigSet::empty(),
        );
        // SAFETY: note_interrupt only touches an atomic.
        let previous = unsafe { signal::sigaction(Signal::SIGINT, &action) }?;

        Ok(Self {
            previous,
            demoted: false,
        })
    }

    /// Interrupt deliveries observed since install.
    pub fn interrupts(&self) -> u32 {
        INTERRUPTS.load(Ordering::SeqCst)
    }

    /// Hand SIGINT back to the previous owner. Called by the tick loop once
    /// the second delivery has been consumed, so a third one is no longer
    /// ours.
    pub fn demote(&mut self) {
        if self.demoted {
            return;
        }
        // SAFETY: restores a disposition that was valid before install.
        let _ = unsafe { signal::sigaction(Signal::SIGINT, &self.previous) };
        self.demoted = true;
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        self.demote();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raise_is_counted_and_drop_restores() {
        let guard = InterruptGuard::install().unwrap();
        assert_eq!(guard.interrupts(), 0);

        signal::raise(Signal::SIGINT).unwrap();
        assert_eq!(guard.interrupts(), 1);

        signal::raise(Signal::SIGINT).unwrap();
        assert_eq!(guard.interrupts(), 2);

        drop(guard);
        // The counting handler is gone; a fresh install starts from zero.
        let guard = InterruptGuard::install().unwrap();
        assert_eq!(guard.interrupts(), 0);
    }
}
