//! Task workloads
//!
//! Burst workers: each runs `10 * task_count + variant_index` iterations
//! against its own slot-bound context, pacing between iterations, then
//! flushes the remainder and reports.
//!
//! Handoff pair: a producer sends `Msg<n>` with a short timeout and drops
//! the message when the queue stays full; a consumer receives with a long
//! timeout. Both write diagnostic lines to the sink.
//!
//! Author: Moroya Sakamoto

use std::sync::Arc;

use log::{info, warn};
use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::queue::{decode_text, encode_text, FullWindow, HandoffQueue, RecvStatus, SendStatus};
use crate::scheduler::{TaskHandle, TaskId, TaskSpec, ThreadScheduler};
use crate::sink::LineSink;
use crate::slots::{SlotKey, TaskSlots};
use crate::task::{FinalReport, TaskContext, TaskPriority, TaskProfile};
use crate::timer::SysTimer;

/// Shared, append-only list of task results
#[derive(Debug)]
pub struct Reports<T> {
    inner: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for Reports<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Reports<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Clone> Reports<T> {
    pub fn push(&self, report: T) {
        self.inner.lock().push(report);
    }

    /// Reports collected so far
    pub fn snapshot(&self) -> Vec<T> {
        self.inner.lock().clone()
    }
}

fn write_line(sink: &dyn LineSink, line: &str) -> Result<()> {
    sink.write_line(line).map_err(Error::Sink)
}

/// Body of burst worker `index`
pub fn run_worker(handle: &TaskHandle, index: u32, config: &Config, sink: &dyn LineSink) -> Result<FinalReport> {
    let me = handle.id();
    let profile = TaskProfile::new(config);
    let ctx = TaskContext::new(index, &profile, config)?;
    let pacing = profile.pacing(&ctx);

    let mut slots = TaskSlots::new(me);
    slots.bind(me, SlotKey::CONTEXT, ctx)?;
    slots.bind(me, SlotKey::PROFILE, profile)?;

    let iterations = config.iterations();
    info!("{}: {} iterations, pacing {:?}", handle.name(), iterations, pacing);

    for _ in 0..iterations {
        let ctx = slots.lookup::<TaskContext>(me, SlotKey::CONTEXT)?;
        ctx.run_iteration(handle.now(), sink)?;
        pacing.apply(handle);
    }

    let ctx = slots.release::<TaskContext>(me, SlotKey::CONTEXT)?;
    slots.release::<TaskProfile>(me, SlotKey::PROFILE)?;
    let report = ctx.finalize(sink)?;

    write_line(sink, &format!("Task finished {}", index))?;
    info!(
        "{}: finished, {} lines in {} flushes, checksum 0x{:02X}",
        report.name, report.lines_emitted, report.flushes, report.checksum
    );
    Ok(report)
}

/// Register `config.task_count` burst workers
pub fn spawn_workers(
    sched: &mut ThreadScheduler,
    config: &Config,
    sink: Arc<dyn LineSink>,
) -> Result<Reports<FinalReport>> {
    let reports = Reports::default();
    for index in 0..config.task_count {
        let config = config.clone();
        let sink = Arc::clone(&sink);
        let reports = reports.clone();
        sched.spawn(
            TaskSpec::new(format!("Task_{index}"), config.stack_size, TaskPriority::NORMAL),
            move |handle| {
                let report = run_worker(&handle, index, &config, sink.as_ref())?;
                reports.push(report);
                Ok(())
            },
        )?;
    }
    Ok(reports)
}

/// What the producer managed to hand off
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProducerReport {
    /// Messages that entered the queue, in send order
    pub accepted: Vec<String>,
    /// Messages dropped after a send timeout
    pub dropped: Vec<String>,
    /// Full window behind each drop, parallel to `dropped`
    pub drop_windows: Vec<FullWindow>,
}

/// What the consumer saw
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerReport {
    /// Messages in receive order
    pub received: Vec<String>,
    pub timeouts: u32,
}

/// Body of the producer task
///
/// Runs until `config.message_limit` messages have been attempted, or
/// forever when no limit is set.
pub fn run_producer(
    handle: &TaskHandle,
    queue: &HandoffQueue,
    config: &Config,
    sink: &dyn LineSink,
) -> Result<ProducerReport> {
    let mut report = ProducerReport::default();
    let mut count: u32 = 1;

    while config.message_limit.map_or(true, |limit| count <= limit) {
        let item = encode_text(&format!("Msg{}", count), queue.item_size());
        let message = decode_text(&item).to_string();
        count = count.wrapping_add(1);

        match queue.send_traced(&item, config.send_timeout)? {
            (SendStatus::Accepted, _) => {
                write_line(sink, &format!("[Producer] sent: {} (tick {})", message, handle.now()))?;
                report.accepted.push(message);
            }
            (SendStatus::TimedOut, window) => {
                warn!("Producer: queue full, dropping {} ({:?})", message, window);
                write_line(
                    sink,
                    &format!("[Producer] ERROR: queue full - timeout ({} ticks)", config.send_timeout),
                )?;
                report.dropped.push(message);
                report.drop_windows.extend(window);
            }
        }

        handle.suspend_for(config.producer_period);
    }

    info!(
        "Producer: done, {} accepted, {} dropped",
        report.accepted.len(),
        report.dropped.len()
    );
    Ok(report)
}

/// Body of the consumer task
///
/// Runs until `config.consumer_idle_limit` consecutive receives time out,
/// or forever when no limit is set.
pub fn run_consumer(
    handle: &TaskHandle,
    queue: &HandoffQueue,
    config: &Config,
    sink: &dyn LineSink,
) -> Result<ConsumerReport> {
    let mut report = ConsumerReport::default();
    let mut buf = vec![0u8; queue.item_size()];
    let mut idle: u32 = 0;

    loop {
        match queue.receive(&mut buf, config.receive_timeout)? {
            RecvStatus::Received => {
                idle = 0;
                let message = decode_text(&buf).to_string();
                write_line(sink, &format!("[Consumer] got: {} (tick {})", message, handle.now()))?;
                report.received.push(message);
            }
            RecvStatus::TimedOut => {
                idle += 1;
                report.timeouts += 1;
                warn!("Consumer: no data for {} ticks", config.receive_timeout);
                write_line(
                    sink,
                    &format!("[Consumer] TIMEOUT: waiting for data (tick {})", handle.now()),
                )?;
                if config.consumer_idle_limit.is_some_and(|limit| idle >= limit) {
                    break;
                }
            }
        }

        handle.suspend_for(config.consumer_period);
    }

    info!(
        "Consumer: done, {} received, {} timeouts",
        report.received.len(),
        report.timeouts
    );
    Ok(report)
}

/// Create the shared queue, announcing failure on the sink
///
/// The caller is expected to halt on error.
pub fn open_queue(config: &Config, timer: SysTimer, sink: &dyn LineSink) -> Result<HandoffQueue> {
    HandoffQueue::new(config.queue_capacity, config.item_size, timer).inspect_err(|_| {
        let _ = sink.write_line("FATAL ERROR: Failed to create queue.");
    })
}

/// Handles to the producer/consumer results
#[derive(Debug, Clone, Default)]
pub struct HandoffReports {
    pub producer: Reports<ProducerReport>,
    pub consumer: Reports<ConsumerReport>,
}

/// Register the producer (high priority) and consumer (normal priority)
pub fn spawn_handoff(
    sched: &mut ThreadScheduler,
    queue: Arc<HandoffQueue>,
    config: &Config,
    sink: Arc<dyn LineSink>,
) -> Result<(HandoffReports, [TaskId; 2])> {
    let reports = HandoffReports::default();

    let producer = {
        let (queue, config, sink) = (Arc::clone(&queue), config.clone(), Arc::clone(&sink));
        let out = reports.producer.clone();
        sched.spawn(
            TaskSpec::new("Producer", config.stack_size, TaskPriority::HIGH),
            move |handle| {
                out.push(run_producer(&handle, &queue, &config, sink.as_ref())?);
                Ok(())
            },
        )?
    };

    let consumer = {
        let (queue, config, sink) = (Arc::clone(&queue), config.clone(), Arc::clone(&sink));
        let out = reports.consumer.clone();
        sched.spawn(
            TaskSpec::new("Consumer", config.stack_size, TaskPriority::NORMAL),
            move |handle| {
                out.push(run_consumer(&handle, &queue, &config, sink.as_ref())?);
                Ok(())
            },
        )?
    };

    Ok((reports, [producer, consumer]))
}
