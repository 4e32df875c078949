//! Per-task records - context, profile and fixed-size status lines
//!
//! A `TaskContext` belongs to exactly one task for its whole life. It
//! carries the iteration counter, the running CRC-8 and a burst buffer of
//! preformatted status lines that is flushed to the sink as one batch.
//!
//! Author: Moroya Sakamoto

use core::fmt::{self, Write};
use core::hint;

use log::{debug, trace};

use crate::config::Config;
use crate::crc::Crc8;
use crate::error::{Error, Result};
use crate::scheduler::TaskHandle;
use crate::sink::LineSink;

/// Bytes reserved for a task name
pub const NAME_LEN: usize = 12;

/// Bytes reserved for one status line
pub const LINE_LEN: usize = 64;

/// Task priority (higher number = more urgent)
///
/// FreeRTOS ordering, the reverse of a rate-monotonic table where a lower
/// number wins. Passed to the scheduler as a hint only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TaskPriority(pub u8);

// Ordered so that `HIGH > NORMAL > LOW`.
impl TaskPriority {
    /// Background work
    pub const LOW: TaskPriority = TaskPriority(1);
    /// Default for workers and consumers
    pub const NORMAL: TaskPriority = TaskPriority(2);
    /// Producers that must not starve
    pub const HIGH: TaskPriority = TaskPriority(3);
}

/// Fixed-capacity text buffer
///
/// Writes past the end are truncated at a character boundary, never
/// reallocated.
#[derive(Clone, Copy)]
pub struct FixedLine<const N: usize> {
    bytes: [u8; N],
    len: usize,
}

/// One formatted status line
pub type StatusLine = FixedLine<LINE_LEN>;

/// Short task identifier
pub type TaskName = FixedLine<NAME_LEN>;

impl<const N: usize> FixedLine<N> {
    pub const fn new() -> Self {
        Self {
            bytes: [0u8; N],
            len: 0,
        }
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.bytes[..self.len]).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<const N: usize> Default for FixedLine<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Write for FixedLine<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let mut take = s.len().min(N - self.len);
        while !s.is_char_boundary(take) {
            take -= 1;
        }
        self.bytes[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}

impl<const N: usize> fmt::Debug for FixedLine<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl<const N: usize> fmt::Display for FixedLine<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a task spends the gap between iterations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Delay,
    Busy,
}

/// Inter-iteration pacing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Suspend through the scheduler for this many ticks
    FixedDelay(u64),
    /// Spin in place for this many cycles without yielding
    BusySpin(u32),
}

impl Pacing {
    pub fn apply(self, handle: &TaskHandle) {
        match self {
            Pacing::FixedDelay(ticks) => handle.suspend_for(ticks),
            Pacing::BusySpin(cycles) => {
                for _ in 0..cycles {
                    hint::spin_loop();
                }
            }
        }
    }
}

/// Per-task configuration record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskProfile {
    pub mode: RunMode,
    pub burst_enabled: bool,
    /// Delay of task 0, in ticks
    pub base_delay: u64,
    /// Spin count used in `RunMode::Busy`
    pub base_cycles: u32,
    /// Extra delay per task index, in ticks
    pub step: u64,
}

impl TaskProfile {
    pub fn new(config: &Config) -> Self {
        Self {
            mode: RunMode::Delay,
            burst_enabled: true,
            base_delay: config.base_delay,
            base_cycles: 0,
            step: config.step,
        }
    }

    /// Pacing for the task that owns `ctx`
    pub fn pacing(&self, ctx: &TaskContext) -> Pacing {
        match self.mode {
            RunMode::Delay => Pacing::FixedDelay(ctx.delay()),
            RunMode::Busy => Pacing::BusySpin(self.base_cycles),
        }
    }
}

/// Summary handed back by `TaskContext::finalize`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalReport {
    pub name: String,
    pub iterations: u32,
    pub checksum: u8,
    pub lines_emitted: u64,
    pub flushes: u64,
}

/// Per-task runtime state
#[derive(Debug)]
pub struct TaskContext {
    name: TaskName,
    iteration: u32,
    checksum: Crc8,
    /// Ticks between iterations
    delay: u64,
    seed: u32,
    /// Burst buffer, allocated once at the burst limit
    lines: Box<[StatusLine]>,
    buffered: usize,
    lines_emitted: u64,
    flushes: u64,
}

impl TaskContext {
    /// Create the context for task `index`
    pub fn new(index: u32, profile: &TaskProfile, config: &Config) -> Result<Self> {
        if config.burst == 0 {
            return Err(Error::InvalidConfig("burst size must be at least 1".to_string()));
        }
        let limit = if profile.burst_enabled { config.burst } else { 1 };

        let mut name = TaskName::new();
        let _ = write!(name, "Task_{}", index);

        let delay = profile
            .base_delay
            .saturating_add(profile.step.saturating_mul(u64::from(index)));
        let seed = config.seed_base.wrapping_add(index);

        debug!("TaskContext::new: name={} delay={} seed={:#x} burst={}", name, delay, seed, limit);
        Ok(Self {
            name,
            iteration: 0,
            checksum: Crc8::new(0),
            delay,
            seed,
            lines: vec![StatusLine::new(); limit].into_boxed_slice(),
            buffered: 0,
            lines_emitted: 0,
            flushes: 0,
        })
    }

    /// Advance one iteration and buffer its status line
    ///
    /// Returns `Some(n)` when the buffer filled up and `n` lines were
    /// flushed to `sink`.
    ///
    /// A batch whose flush failed stays buffered and is retried here before
    /// the iteration advances; if the retry fails too, nothing changes.
    pub fn run_iteration(&mut self, tick: u64, sink: &dyn LineSink) -> Result<Option<usize>> {
        if self.buffered == self.lines.len() {
            self.flush(sink)?;
        }

        self.iteration = self.iteration.wrapping_add(1);
        // Only the low bytes feed the checksum.
        let sum = self.checksum.update(&[self.iteration as u8, self.seed as u8]);

        let line = &mut self.lines[self.buffered];
        line.clear();
        let _ = write!(
            line,
            "[{}] Tick: {} Iter: {} Sum: 0x{:02X}",
            self.name, tick, self.iteration, sum
        );
        self.buffered += 1;
        trace!("{}: buffered {}/{}", self.name, self.buffered, self.lines.len());

        if self.buffered == self.lines.len() {
            return self.flush(sink).map(Some);
        }
        Ok(None)
    }

    /// Write every buffered line to `sink` as one batch
    ///
    /// Returns the number of lines written. An empty buffer writes nothing.
    pub fn flush(&mut self, sink: &dyn LineSink) -> Result<usize> {
        let count = self.buffered;
        if count == 0 {
            return Ok(0);
        }
        let batch: Vec<&str> = self.lines[..count].iter().map(StatusLine::as_str).collect();
        sink.write_batch(&batch).map_err(Error::Sink)?;

        self.buffered = 0;
        self.lines_emitted += count as u64;
        self.flushes += 1;
        Ok(count)
    }

    /// Flush whatever is left and retire the context
    pub fn finalize(mut self, sink: &dyn LineSink) -> Result<FinalReport> {
        self.flush(sink)?;
        debug!(
            "{}: finalized after {} iterations, {} lines in {} flushes",
            self.name, self.iteration, self.lines_emitted, self.flushes
        );
        Ok(FinalReport {
            name: self.name.to_string(),
            iterations: self.iteration,
            checksum: self.checksum.value(),
            lines_emitted: self.lines_emitted,
            flushes: self.flushes,
        })
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn checksum(&self) -> u8 {
        self.checksum.value()
    }

    pub fn delay(&self) -> u64 {
        self.delay
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Lines waiting for the next flush
    pub fn buffered(&self) -> usize {
        self.buffered
    }

    /// Lines that trigger a flush
    pub fn burst_limit(&self) -> usize {
        self.lines.len()
    }

    pub fn lines_emitted(&self) -> u64 {
        self.lines_emitted
    }

    pub fn flushes(&self) -> u64 {
        self.flushes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::crc8;
    use crate::sink::MemorySink;
    use proptest::prelude::*;
    use std::io;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Rejects its first batch, then records like `MemorySink`
    #[derive(Default)]
    struct FlakySink {
        failed: AtomicBool,
        inner: MemorySink,
    }

    impl LineSink for FlakySink {
        fn write_batch(&self, lines: &[&str]) -> io::Result<()> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                return Err(io::Error::other("sink offline"));
            }
            self.inner.write_batch(lines)
        }
    }

    fn context(index: u32) -> TaskContext {
        let config = Config::default();
        TaskContext::new(index, &TaskProfile::new(&config), &config).unwrap()
    }

    #[test]
    fn test_context_creation() {
        let ctx = context(2);
        assert_eq!(ctx.name(), "Task_2");
        assert_eq!(ctx.iteration(), 0);
        assert_eq!(ctx.checksum(), 0);
        assert_eq!(ctx.delay(), 130 + 7 * 2);
        assert_eq!(ctx.seed(), 0xAC);
        assert_eq!(ctx.buffered(), 0);
        assert_eq!(ctx.burst_limit(), 4);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::HIGH > TaskPriority::NORMAL);
        assert!(TaskPriority::NORMAL > TaskPriority::LOW);
    }

    #[test]
    fn test_profile_defaults() {
        let profile = TaskProfile::new(&Config::default());
        assert_eq!(profile.mode, RunMode::Delay);
        assert!(profile.burst_enabled);
        assert_eq!(profile.base_delay, 130);
        assert_eq!(profile.step, 7);
    }

    #[test]
    fn test_status_line_format() {
        let sink = MemorySink::new();
        let mut ctx = context(0);
        for tick in [10, 20, 30, 40] {
            ctx.run_iteration(tick, &sink).unwrap();
        }
        assert_eq!(
            sink.lines(),
            vec![
                "[Task_0] Tick: 10 Iter: 1 Sum: 0x3F",
                "[Task_0] Tick: 20 Iter: 2 Sum: 0x89",
                "[Task_0] Tick: 30 Iter: 3 Sum: 0x78",
                "[Task_0] Tick: 40 Iter: 4 Sum: 0x2F",
            ]
        );
    }

    #[test]
    fn test_flush_exactly_at_burst() {
        let sink = MemorySink::new();
        let mut ctx = context(1);
        for i in 1..=3 {
            assert_eq!(ctx.run_iteration(i, &sink).unwrap(), None);
            assert_eq!(ctx.buffered(), i as usize);
        }
        assert_eq!(ctx.run_iteration(4, &sink).unwrap(), Some(4));
        assert_eq!(ctx.buffered(), 0);
        assert_eq!(sink.batches().len(), 1);
    }

    #[test]
    fn test_failed_flush_is_retried_next_iteration() {
        let sink = FlakySink::default();
        let mut ctx = context(0);
        for i in 1..=3 {
            assert_eq!(ctx.run_iteration(i, &sink).unwrap(), None);
        }
        assert!(matches!(ctx.run_iteration(4, &sink), Err(Error::Sink(_))));
        assert_eq!(ctx.buffered(), 4);
        assert_eq!(ctx.iteration(), 4);
        assert_eq!(ctx.flushes(), 0);

        // The pending batch goes out first, then iteration 5 is buffered.
        assert_eq!(ctx.run_iteration(5, &sink).unwrap(), None);
        assert_eq!(ctx.buffered(), 1);
        assert_eq!(ctx.iteration(), 5);
        assert_eq!(ctx.flushes(), 1);
        assert_eq!(sink.inner.batches().len(), 1);
        assert_eq!(sink.inner.lines()[3], "[Task_0] Tick: 4 Iter: 4 Sum: 0x2F");

        let report = ctx.finalize(&sink).unwrap();
        assert_eq!(report.lines_emitted, 5);
        assert_eq!(sink.inner.lines().len(), 5);
    }

    #[test]
    fn test_failed_retry_leaves_state_untouched() {
        let sink = FlakySink::default();
        let mut ctx = context(0);
        for i in 1..=3 {
            ctx.run_iteration(i, &sink).unwrap();
        }
        assert!(ctx.run_iteration(4, &sink).is_err());
        let sum = ctx.checksum();

        let new_outage = FlakySink::default();
        assert!(ctx.run_iteration(5, &new_outage).is_err());
        assert_eq!(ctx.iteration(), 4);
        assert_eq!(ctx.checksum(), sum);
        assert_eq!(ctx.buffered(), 4);
    }

    #[test]
    fn test_finalize_flushes_partial_batch() {
        let sink = MemorySink::new();
        let mut ctx = context(3);
        for i in 0..6 {
            ctx.run_iteration(i, &sink).unwrap();
        }
        let report = ctx.finalize(&sink).unwrap();
        assert_eq!(report.iterations, 6);
        assert_eq!(report.lines_emitted, 6);
        assert_eq!(report.flushes, 2);
        let sizes: Vec<usize> = sink.batches().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 2]);
    }

    #[test]
    fn test_finalize_empty_writes_nothing() {
        let sink = MemorySink::new();
        let report = context(0).finalize(&sink).unwrap();
        assert_eq!(report.flushes, 0);
        assert!(sink.batches().is_empty());
    }

    #[test]
    fn test_burst_disabled_flushes_every_line() {
        let sink = MemorySink::new();
        let config = Config::default();
        let mut profile = TaskProfile::new(&config);
        profile.burst_enabled = false;
        let mut ctx = TaskContext::new(0, &profile, &config).unwrap();
        for i in 0..3 {
            assert_eq!(ctx.run_iteration(i, &sink).unwrap(), Some(1));
        }
        assert_eq!(sink.batches().len(), 3);
    }

    #[test]
    fn test_zero_burst_rejected() {
        let config = Config {
            burst: 0,
            ..Config::default()
        };
        let result = TaskContext::new(0, &TaskProfile::new(&config), &config);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_checksum_depends_on_history() {
        let sink = MemorySink::new();
        let mut ctx = context(0);
        for k in 1..=44u32 {
            let before = ctx.checksum();
            ctx.run_iteration(0, &sink).unwrap();
            let fresh = crc8(0, &[k as u8, 0xAA]);
            if before != 0 {
                assert_ne!(ctx.checksum(), fresh, "iteration {k}");
            }
        }
        assert_eq!(ctx.checksum(), 0x07);
    }

    #[test]
    fn test_pacing_from_profile() {
        let config = Config::default();
        let mut profile = TaskProfile::new(&config);
        let ctx = TaskContext::new(1, &profile, &config).unwrap();
        assert_eq!(profile.pacing(&ctx), Pacing::FixedDelay(137));

        profile.mode = RunMode::Busy;
        profile.base_cycles = 500;
        assert_eq!(profile.pacing(&ctx), Pacing::BusySpin(500));
    }

    #[test]
    fn test_fixed_line_truncates() {
        let mut line = FixedLine::<8>::new();
        let _ = write!(line, "{}", "abcdefghijkl");
        assert_eq!(line.as_str(), "abcdefgh");
        line.clear();
        assert!(line.is_empty());
    }

    #[test]
    fn test_fixed_line_respects_char_boundary() {
        let mut line = FixedLine::<4>::new();
        let _ = write!(line, "ab\u{e9}\u{e9}");
        assert_eq!(line.as_str(), "ab\u{e9}");
    }

    proptest! {
        #[test]
        fn prop_buffer_never_exceeds_burst(burst in 1usize..8, iterations in 0u32..64) {
            let config = Config { burst, ..Config::default() };
            let sink = MemorySink::new();
            let mut ctx = TaskContext::new(0, &TaskProfile::new(&config), &config).unwrap();
            for i in 0..iterations {
                let flushed = ctx.run_iteration(u64::from(i), &sink).unwrap();
                prop_assert!(ctx.buffered() < burst);
                prop_assert_eq!(flushed.is_some(), (i + 1) as usize % burst == 0);
            }
            let report = ctx.finalize(&sink).unwrap();
            prop_assert_eq!(report.lines_emitted, u64::from(iterations));
            prop_assert_eq!(report.flushes, u64::from(iterations).div_ceil(burst as u64));
            prop_assert_eq!(sink.lines().len(), iterations as usize);
        }
    }
}
