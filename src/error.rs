//! Error type shared by every module
//!
//! Timeouts are not errors: `send`/`receive` report them as status values.
//! Everything here is either a misuse of an API or an unrecoverable
//! creation failure.
//!
//! Author: Moroya Sakamoto

use std::io;

use thiserror::Error;

use crate::slots::SlotKey;

/// Errors from task-local storage, the handoff queue and the runtime
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Queue allocation failed ({capacity} x {item_size} bytes)")]
    QueueAllocation { capacity: usize, item_size: usize },

    #[error("Item size mismatch: expected {expected} bytes, got {actual}")]
    ItemSize { expected: usize, actual: usize },

    #[error("Slot {key} belongs to task {owner}, not task {caller}")]
    ForeignTask { key: SlotKey, owner: u32, caller: u32 },

    #[error("Slot {0} is out of range")]
    SlotOutOfRange(SlotKey),

    #[error("Slot {0} has no record bound")]
    SlotUnbound(SlotKey),

    #[error("Slot {0} holds a record of a different type")]
    SlotType(SlotKey),

    #[error("Sink write failed: {0}")]
    Sink(#[source] io::Error),

    #[error("Task {name} failed: {reason}")]
    Task { name: String, reason: String },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;
