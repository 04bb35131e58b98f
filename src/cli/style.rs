//! Terminal styling helpers
//!
//! Colors are always emitted; `anstream` strips them when stdout is not a
//! terminal.

use indicatif::ProgressStyle;
use owo_colors::OwoColorize;
use std::fmt::Display;

/// Semantic text styles
pub trait Stylize {
    /// Highlighted value (names, ids, commands)
    fn accent(&self) -> String;
    /// De-emphasized text
    fn muted(&self) -> String;
    /// Headings
    fn emphasis(&self) -> String;
    /// Positive outcome
    fn success(&self) -> String;
    /// Negative outcome
    fn failure(&self) -> String;
    /// Needs attention
    fn warning(&self) -> String;
}

impl<T: Display> Stylize for T {
    fn accent(&self) -> String {
        self.cyan().to_string()
    }

    fn muted(&self) -> String {
        self.dimmed().to_string()
    }

    fn emphasis(&self) -> String {
        self.bold().to_string()
    }

    fn success(&self) -> String {
        self.green().to_string()
    }

    fn failure(&self) -> String {
        self.red().to_string()
    }

    fn warning(&self) -> String {
        self.yellow().to_string()
    }
}

/// Green check mark
pub fn check() -> String {
    "✓".success()
}

/// Red cross
pub fn cross() -> String {
    "✗".failure()
}

/// Style for indeterminate spinners
pub fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// `text` as a clickable link when the terminal supports it
pub fn link(text: &str, url: &str) -> String {
    if supports_hyperlinks::on(supports_hyperlinks::Stream::Stdout) {
        terminal_link::Link::new(text, url).to_string()
    } else {
        text.to_string()
    }
}
