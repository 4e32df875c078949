//! alice-handoff - run the burst workers or the producer/consumer pair
//!
//! Author: Moroya Sakamoto

use std::sync::Arc;

use clap::Parser;
use eyre::{eyre, Context, Result};
use log::{info, LevelFilter};

use alice_handoff::cli::{Cli, Command};
use alice_handoff::config::Config;
use alice_handoff::sink::{LineSink, StdoutSink};
use alice_handoff::workload::{open_queue, spawn_handoff, spawn_workers};
use alice_handoff::ThreadScheduler;

fn setup_logging(cli_log_level: Option<&str>) -> Result<()> {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(LevelFilter::Warn).parse_default_env();

    if let Some(level) = cli_log_level {
        let level: LevelFilter = level
            .parse()
            .map_err(|_| eyre!("Unknown log level '{}'", level))?;
        builder.filter_level(level);
    }

    builder.init();
    Ok(())
}

fn cmd_workers(config: &Config) -> Result<()> {
    let sink: Arc<dyn LineSink> = Arc::new(StdoutSink);
    let mut sched = ThreadScheduler::new(config.timer());
    let reports = spawn_workers(&mut sched, config, sink).context("Failed to create worker tasks")?;

    sched.start().context("Worker task failed")?;

    for report in reports.snapshot() {
        info!(
            "{}: {} iterations, {} lines, {} flushes, checksum 0x{:02X}",
            report.name, report.iterations, report.lines_emitted, report.flushes, report.checksum
        );
    }
    Ok(())
}

fn cmd_handoff(config: &Config) -> Result<()> {
    let timer = config.timer();
    let queue = open_queue(config, timer, &StdoutSink).context("Failed to create queue")?;
    let queue = Arc::new(queue);

    let sink: Arc<dyn LineSink> = Arc::new(StdoutSink);
    let mut sched = ThreadScheduler::new(timer);
    let (reports, _ids) = spawn_handoff(&mut sched, Arc::clone(&queue), config, sink)
        .context("Failed to create handoff tasks")?;

    sched.start().context("Handoff task failed")?;

    let stats = queue.stats();
    for report in reports.producer.snapshot() {
        info!(
            "Producer: {} accepted, {} dropped",
            report.accepted.len(),
            report.dropped.len()
        );
    }
    for report in reports.consumer.snapshot() {
        info!("Consumer: {} received, {} timeouts", report.received.len(), report.timeouts);
    }
    info!(
        "Queue: sent={} received={} send_timeouts={} receive_timeouts={} high_water={}",
        stats.sent, stats.received, stats.send_timeouts, stats.receive_timeouts, stats.high_water
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.log_level.as_deref()).context("Failed to setup logging")?;

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    match cli.command {
        Command::Workers { tasks, burst } => {
            if let Some(tasks) = tasks {
                config.task_count = tasks;
            }
            if let Some(burst) = burst {
                config.burst = burst;
            }
            config.validate()?;
            info!("Starting {} workers, {} iterations each", config.task_count, config.iterations());
            cmd_workers(&config)
        }
        Command::Handoff { messages, idle_limit } => {
            config.message_limit = messages.or(config.message_limit);
            config.consumer_idle_limit = idle_limit.or(config.consumer_idle_limit);
            config.validate()?;
            info!(
                "Starting handoff: capacity={} item_size={} send_timeout={} receive_timeout={}",
                config.queue_capacity, config.item_size, config.send_timeout, config.receive_timeout
            );
            cmd_handoff(&config)
        }
    }
}
