//! Terminal output for agent-monitor
//!
//! Log text goes to stdout untouched. Status messages go to stderr so the
//! log can be piped.

use colored::Colorize;
use std::io::Write;

/// Context for output rendering
pub struct OutputContext {
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { quiet }
    }

    /// Print a success message (unless in quiet mode)
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            eprintln!("{}", msg.green());
        }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            eprintln!("{}", msg.dimmed());
        }
    }

    /// Print a warning message
    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    /// Print an error message
    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg.red());
    }

    /// Write log text exactly as received
    pub fn log(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        let mut stdout = std::io::stdout().lock();
        // Closed pipes are ignored
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }
}
