//! Terminal capability — the one place that talks to the tty.
//!
//! Everything user-visible flows through here: the leveled log with ANSI
//! severity colors, cursor movement for the scheduler's dashboard, size and
//! cursor-position queries, and the synchronous shell execution used by
//! pre/post hooks and the link step. The scheduler is the only writer while
//! a run is active, so no locking is needed beyond atomics for the cached
//! size.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::UNIX_EPOCH;

use nix::sys::termios::{self, LocalFlags, SetArg};

const CSI_RED: &str = "\x1b[0;31m";
const CSI_YELLOW: &str = "\x1b[0;33m";
const CSI_CYAN: &str = "\x1b[0;36m";
const CSI_RESET: &str = "\x1b[0m";

/// Severity of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Always shown, uncolored.
    Info,
    /// Shown only with `--verbose`, cyan.
    Detail,
    /// Yellow.
    Warning,
    /// Red, routed to stderr.
    Error,
}

/// ANSI terminal wrapper.
pub struct Terminal {
    verbose: bool,
    columns: AtomicU16,
    rows: AtomicU16,
}

impl Terminal {
    pub fn new(verbose: bool) -> Self {
        let terminal = Self {
            verbose,
            columns: AtomicU16::new(0),
            rows: AtomicU16::new(0),
        };
        terminal.update_size();
        terminal
    }

    /// Re-query the window size. Falls back to 80×24 when stdout is not a
    /// tty (pipes, tests).
    pub fn update_size(&self) {
        let mut ws = libc::winsize {
            ws_row: 0,
            ws_col: 0,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };

        // SAFETY: TIOCGWINSZ only writes into the winsize out-parameter.
        let rc = unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &mut ws) };
        if rc != 0 || ws.ws_col == 0 {
            ws.ws_col = 80;
            ws.ws_row = 24;
        }

        self.columns.store(ws.ws_col, Ordering::Relaxed);
        self.rows.store(ws.ws_row, Ordering::Relaxed);
    }

    pub fn columns(&self) -> usize {
        self.columns.load(Ordering::Relaxed) as usize
    }

    pub fn rows(&self) -> usize {
        self.rows.load(Ordering::Relaxed) as usize
    }

    pub fn move_up(&self, offset: usize) {
        if offset != 0 {
            self.out(&format!("\x1b[{offset}A"));
        }
    }

    pub fn move_down(&self, offset: usize) {
        if offset != 0 {
            self.out(&format!("\x1b[{offset}B"));
        }
    }

    pub fn move_right(&self, offset: usize) {
        if offset != 0 {
            self.out(&format!("\x1b[{offset}C"));
        }
    }

    pub fn move_left(&self, offset: usize) {
        if offset != 0 {
            self.out(&format!("\x1b[{offset}D"));
        }
    }

    /// Clear from the cursor to the end of the screen.
    pub fn clear_down(&self) {
        self.out("\x1b[0J");
    }

    /// Clear from the cursor to the end of the line.
    pub fn clear_line_end(&self) {
        self.out("\x1b[0K");
    }

    pub fn show_cursor(&self, show: bool) {
        self.out(if show { "\x1b[?25h" } else { "\x1b[?25l" });
    }

    pub fn flush(&self) {
        let _ = io::stdout().flush();
    }

    /// Write raw bytes to stdout, no color, no newline.
    pub fn write(&self, msg: &str) {
        self.out(msg);
    }

    /// Write one line at the given severity. Detail lines are dropped unless
    /// verbose mode is on; errors go to stderr.
    pub fn log(&self, level: LogLevel, msg: &str) {
        if level == LogLevel::Detail && !self.verbose {
            return;
        }

        let color = match level {
            LogLevel::Info => "",
            LogLevel::Detail => CSI_CYAN,
            LogLevel::Warning => CSI_YELLOW,
            LogLevel::Error => CSI_RED,
        };

        if level == LogLevel::Error {
            let _ = writeln!(io::stderr(), "{color}{msg}{CSI_RESET}");
        } else {
            self.out(&format!("{color}{msg}{CSI_RESET}\n"));
        }
    }

    pub fn info(&self, msg: &str) {
        self.log(LogLevel::Info, msg);
    }

    pub fn detail(&self, msg: &str) {
        self.log(LogLevel::Detail, msg);
    }

    pub fn warning(&self, msg: &str) {
        self.log(LogLevel::Warning, msg);
    }

    pub fn error(&self, msg: &str) {
        self.log(LogLevel::Error, msg);
    }

    /// Ask the terminal where the cursor is: `(column, row)`, 1-based.
    ///
    /// Writes `ESC[6n` and reads the `ESC[row;colR` reply from stdin with
    /// canonical mode and echo off. Returns `None` when stdin is not a tty
    /// (tests, pipes); callers fall back to counting lines themselves.
    pub fn cursor_position(&self) -> Option<(u16, u16)> {
        // SAFETY: isatty only inspects the descriptor.
        if unsafe { libc::isatty(libc::STDIN_FILENO) } == 0 {
            return None;
        }

        let stdin = io::stdin();
        let saved = termios::tcgetattr(&stdin).ok()?;
        let mut raw = saved.clone();
        raw.local_flags.remove(LocalFlags::ICANON | LocalFlags::ECHO);
        termios::tcsetattr(&stdin, SetArg::TCSANOW, &raw).ok()?;

        self.out("\x1b[6n");
        self.flush();

        let mut reply = Vec::with_capacity(16);
        {
            let mut lock = stdin.lock();
            let mut byte = [0u8; 1];
            while reply.len() < 32 {
                match lock.read(&mut byte) {
                    Ok(0) | Err(_) => break,
                    Ok(_) if byte[0] == b'R' => break,
                    Ok(_) => reply.push(byte[0]),
                }
            }
        }

        // Canonical mode comes back no matter how the read went.
        let _ = termios::tcsetattr(&stdin, SetArg::TCSANOW, &saved);

        // Reply shape: ESC [ row ; col
        let text = String::from_utf8_lossy(&reply);
        let body = text.rsplit('[').next()?;
        let (row, col) = body.split_once(';')?;
        Some((col.trim().parse().ok()?, row.trim().parse().ok()?))
    }

    /// Run a command synchronously through the shell and return its exit
    /// status. Signal-terminated children report status 0.
    pub fn exec_system(&self, command: &str) -> io::Result<i32> {
        let status = Command::new("sh").arg("-c").arg(command).status()?;
        Ok(status.code().unwrap_or(0))
    }

    /// Last modification time of `path`, whole seconds since the epoch.
    pub fn mtime(&self, path: &Path) -> io::Result<i64> {
        let modified = fs::metadata(path)?.modified()?;
        let seconds = modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Ok(seconds)
    }

    fn out(&self, s: &str) {
        let _ = io::stdout().write_all(s.as_bytes());
    }
}
