//! ALICE handoff - task-local state and bounded queue handoff
//!
//! Two task patterns over a thread-backed scheduler:
//! - Slot-keyed task-local records, a rolling CRC-8 and burst-flushed
//!   status lines
//! - A fixed-capacity, fixed-item-size FIFO with tick timeouts between a
//!   producer and a consumer
//!
//! Author: Moroya Sakamoto

pub mod cli;
pub mod config;
pub mod crc;
pub mod error;
pub mod queue;
pub mod ring;
pub mod scheduler;
pub mod sink;
pub mod slots;
pub mod task;
pub mod timer;
pub mod workload;

pub use config::Config;
pub use crc::{crc8, Crc8};
pub use error::{Error, Result};
pub use queue::{FullWindow, HandoffQueue, QueueState, QueueStats, RecvStatus, SendStatus};
pub use scheduler::{TaskHandle, TaskId, TaskSpec, ThreadScheduler};
pub use sink::{LineSink, MemorySink, StdoutSink};
pub use slots::{SlotKey, TaskSlots};
pub use task::{FinalReport, Pacing, RunMode, TaskContext, TaskPriority, TaskProfile};
pub use timer::{Deadline, SysTimer};
