//! User-facing progress output.

use chrono::Local;
use colored::Colorize;
use std::sync::Mutex;

/// One-way sink for progress and failure notices.
pub trait DisplaySink: Send + Sync {
    fn display(&self, message: &str);
}

/// Prints `[timestamp] message` lines to stdout and mirrors them to tracing.
#[derive(Debug, Default)]
pub struct ConsoleDisplay;

impl DisplaySink for ConsoleDisplay {
    fn display(&self, message: &str) {
        let stamp = format!("[{}]", Local::now().format("%Y-%m-%d %H:%M:%S %z"));
        if message.starts_with("ERROR") || message.starts_with("Gah!") {
            println!("{} {}", stamp.dimmed(), message.red());
            tracing::warn!(target: "bucketsync::display", "{}", message);
        } else {
            println!("{} {}", stamp.dimmed(), message);
            tracing::info!(target: "bucketsync::display", "{}", message);
        }
    }
}

/// Collects lines in memory.
#[derive(Debug, Default)]
pub struct MemoryDisplay {
    lines: Mutex<Vec<String>>,
}

impl MemoryDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }
}

impl DisplaySink for MemoryDisplay {
    fn display(&self, message: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(message.to_string());
        }
    }
}
