//! UI utilities for Ferry CLI.

use std::io::{self, Write};
use std::sync::Arc;

use ferry_core::report::{Reporter, SharedReporter};

/// Prints progress and messages to the terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleReporter {
    quiet: bool,
}

impl ConsoleReporter {
    /// Create a reporter; a quiet one prints only errors.
    #[must_use]
    pub const fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    /// Wrap in a shared handle.
    #[must_use]
    pub fn shared(self) -> SharedReporter {
        Arc::new(self)
    }
}

impl Reporter for ConsoleReporter {
    fn report_progress(&self, current: u64, total: u64) {
        if self.quiet || total == 0 {
            return;
        }

        let mut stdout = io::stdout().lock();
        let _ = write!(stdout, "\r  {}", progress_line(current, total));
        if current >= total {
            let _ = writeln!(stdout);
        }
        let _ = stdout.flush();
    }

    fn report_info(&self, message: &str) {
        if !self.quiet {
            println!("  {message}");
        }
    }

    fn report_error(&self, message: &str) {
        eprintln!("  Error: {message}");
    }
}

/// Render `[ 42.86%] chunk 3/7` with a fixed-width percentage.
#[allow(clippy::cast_precision_loss)]
pub fn progress_line(current: u64, total: u64) -> String {
    let pct = if total == 0 {
        100.0
    } else {
        current as f64 / total as f64 * 100.0
    };
    format!("[{:>6.2}%] chunk {}/{}", pct, current, total)
}

/// Print the version banner.
pub fn banner(quiet: bool) {
    if quiet {
        return;
    }
    println!();
    println!("Ferry v{}", ferry_core::VERSION);
    println!("{}", "-".repeat(37));
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_line() {
        assert_eq!(progress_line(3, 7), "[ 42.86%] chunk 3/7");
        assert_eq!(progress_line(7, 7), "[100.00%] chunk 7/7");
        assert_eq!(progress_line(0, 0), "[100.00%] chunk 0/0");
    }
}
