//! Scheduler collaborator - tasks on OS threads
//!
//! Mirrors the four primitives the task code relies on: create a task,
//! start the scheduler, read the current tick, suspend for some ticks.
//! Tasks are registered first and only start running in `start`, which
//! returns once every task has returned.
//!
//! Priorities are recorded and logged but not enforced; the host OS decides
//! who runs.
//!
//! Author: Moroya Sakamoto

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::thread;

use log::{debug, error, info};

use crate::error::{Error, Result};
use crate::task::TaskPriority;
use crate::timer::SysTimer;

/// Maximum tasks one scheduler instance manages
pub const MAX_TASKS: usize = 16;

/// Task identity, unique within one scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u32);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Creation parameters for a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub name: String,
    /// Stack size hint in bytes
    pub stack_size: usize,
    pub priority: TaskPriority,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, stack_size: usize, priority: TaskPriority) -> Self {
        Self {
            name: name.into(),
            stack_size,
            priority,
        }
    }
}

/// What a running task sees of the scheduler
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: TaskId,
    name: Arc<str>,
    priority: TaskPriority,
    timer: SysTimer,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> TaskPriority {
        self.priority
    }

    /// Current tick count
    pub fn now(&self) -> u64 {
        self.timer.now()
    }

    /// Suspend the calling task for `ticks`
    pub fn suspend_for(&self, ticks: u64) {
        self.timer.sleep(ticks);
    }

    pub fn timer(&self) -> SysTimer {
        self.timer
    }
}

/// Task body
pub type TaskEntry = Box<dyn FnOnce(TaskHandle) -> Result<()> + Send + 'static>;

struct Registered {
    handle: TaskHandle,
    stack_size: usize,
    entry: TaskEntry,
}

/// Task table run on OS threads
pub struct ThreadScheduler {
    timer: SysTimer,
    tasks: Vec<Registered>,
}

impl ThreadScheduler {
    pub fn new(timer: SysTimer) -> Self {
        Self {
            timer,
            tasks: Vec::with_capacity(MAX_TASKS),
        }
    }

    /// Register a task; it starts running in `start`
    pub fn spawn<F>(&mut self, spec: TaskSpec, entry: F) -> Result<TaskId>
    where
        F: FnOnce(TaskHandle) -> Result<()> + Send + 'static,
    {
        if self.tasks.len() >= MAX_TASKS {
            return Err(Error::Task {
                name: spec.name,
                reason: format!("task table full ({MAX_TASKS} tasks)"),
            });
        }
        let id = TaskId(self.tasks.len() as u32);
        debug!(
            "ThreadScheduler::spawn: id={} name={} stack={} priority={:?}",
            id, spec.name, spec.stack_size, spec.priority
        );
        self.tasks.push(Registered {
            handle: TaskHandle {
                id,
                name: Arc::from(spec.name),
                priority: spec.priority,
                timer: self.timer,
            },
            stack_size: spec.stack_size,
            entry: Box::new(entry),
        });
        Ok(id)
    }

    /// Number of registered tasks
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn timer(&self) -> SysTimer {
        self.timer
    }

    /// Run every registered task and wait for all of them
    ///
    /// Tasks that loop forever keep this call blocked. The first task error
    /// or panic is returned after all tasks have finished. Failing to create
    /// a thread aborts the start immediately.
    pub fn start(self) -> Result<()> {
        info!("Scheduler starting {} tasks at tick {}", self.tasks.len(), self.timer.now());

        let mut running = Vec::with_capacity(self.tasks.len());
        for task in self.tasks {
            let name = task.handle.name().to_string();
            let handle = task.handle;
            let entry = task.entry;
            let joiner = thread::Builder::new()
                .name(name.clone())
                .stack_size(task.stack_size)
                .spawn(move || entry(handle))
                .map_err(|e| Error::Task {
                    name: name.clone(),
                    reason: format!("thread creation failed: {e}"),
                })?;
            running.push((name, joiner));
        }

        let mut first_err = None;
        for (name, joiner) in running {
            let outcome = match joiner.join() {
                Ok(result) => result,
                Err(payload) => Err(Error::Task {
                    name: name.clone(),
                    reason: panic_message(payload.as_ref()),
                }),
            };
            match outcome {
                Ok(()) => debug!("Task {} returned", name),
                Err(e) => {
                    error!("Task {} failed: {}", name, e);
                    first_err.get_or_insert(e);
                }
            }
        }

        first_err.map_or(Ok(()), Err)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panicked".to_string()
    }
}
