//! Output sink - where status lines end up
//!
//! A batch handed to `write_batch` is written under one lock, so lines of a
//! single flush never interleave with another task's output.
//!
//! Author: Moroya Sakamoto

use std::io::{self, Write};

use parking_lot::Mutex;

/// Append-only line output shared by all tasks
pub trait LineSink: Send + Sync {
    /// Write `lines` in order as one uninterrupted unit
    fn write_batch(&self, lines: &[&str]) -> io::Result<()>;

    /// Write a single line
    fn write_line(&self, line: &str) -> io::Result<()> {
        self.write_batch(&[line])
    }
}

/// Process stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl LineSink for StdoutSink {
    fn write_batch(&self, lines: &[&str]) -> io::Result<()> {
        let mut out = io::stdout().lock();
        for line in lines {
            writeln!(out, "{}", line)?;
        }
        out.flush()
    }
}

/// In-memory sink that remembers batch boundaries
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every batch written so far, in write order
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().clone()
    }

    /// All lines, flattened
    pub fn lines(&self) -> Vec<String> {
        self.batches.lock().iter().flatten().cloned().collect()
    }

    /// Batches whose first line starts with `prefix`
    pub fn batches_with_prefix(&self, prefix: &str) -> Vec<Vec<String>> {
        self.batches
            .lock()
            .iter()
            .filter(|batch| batch.first().is_some_and(|line| line.starts_with(prefix)))
            .cloned()
            .collect()
    }
}

impl LineSink for MemorySink {
    fn write_batch(&self, lines: &[&str]) -> io::Result<()> {
        let batch = lines.iter().map(|line| line.to_string()).collect();
        self.batches.lock().push(batch);
        Ok(())
    }
}
