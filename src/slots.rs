//! Task-local slot storage
//!
//! Each task owns one `TaskSlots`, created for it and moved into its entry
//! closure. Records are bound under small integer keys and looked up again
//! with the caller's `TaskId`; a lookup by any other task is rejected, so a
//! task only ever observes the records it registered itself.
//!
//! Author: Moroya Sakamoto

use std::any::Any;
use std::fmt;

use log::trace;

use crate::error::{Error, Result};
use crate::scheduler::TaskId;

/// Slots available per task
pub const SLOT_COUNT: usize = 5;

/// Index into a task's slot table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey(pub u8);

impl SlotKey {
    /// Slot holding the task's `TaskContext`
    pub const CONTEXT: SlotKey = SlotKey(0);
    /// Slot holding the task's `TaskProfile`
    pub const PROFILE: SlotKey = SlotKey(1);

    fn index(self) -> Result<usize> {
        let idx = usize::from(self.0);
        if idx < SLOT_COUNT {
            Ok(idx)
        } else {
            Err(Error::SlotOutOfRange(self))
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Slot table owned by a single task
pub struct TaskSlots {
    owner: TaskId,
    slots: [Option<Box<dyn Any + Send>>; SLOT_COUNT],
}

impl TaskSlots {
    pub fn new(owner: TaskId) -> Self {
        Self {
            owner,
            slots: Default::default(),
        }
    }

    pub fn owner(&self) -> TaskId {
        self.owner
    }

    /// Register `record` under `key`, replacing whatever was there
    pub fn bind<T: Any + Send>(&mut self, task: TaskId, key: SlotKey, record: T) -> Result<()> {
        let idx = self.checked(task, key)?;
        trace!("TaskSlots::bind: task={} key={}", task, key);
        self.slots[idx] = Some(Box::new(record));
        Ok(())
    }

    /// Borrow the record bound under `key`
    pub fn lookup<T: Any + Send>(&mut self, task: TaskId, key: SlotKey) -> Result<&mut T> {
        let idx = self.checked(task, key)?;
        self.slots[idx]
            .as_mut()
            .ok_or(Error::SlotUnbound(key))?
            .downcast_mut::<T>()
            .ok_or(Error::SlotType(key))
    }

    /// Unbind and return the record under `key`
    ///
    /// On a type mismatch the record stays bound.
    pub fn release<T: Any + Send>(&mut self, task: TaskId, key: SlotKey) -> Result<T> {
        let idx = self.checked(task, key)?;
        let record = self.slots[idx].take().ok_or(Error::SlotUnbound(key))?;
        match record.downcast::<T>() {
            Ok(record) => Ok(*record),
            Err(record) => {
                self.slots[idx] = Some(record);
                Err(Error::SlotType(key))
            }
        }
    }

    /// Is anything bound under `key`?
    pub fn is_bound(&self, key: SlotKey) -> bool {
        key.index().is_ok_and(|idx| self.slots[idx].is_some())
    }

    fn checked(&self, task: TaskId, key: SlotKey) -> Result<usize> {
        if task != self.owner {
            return Err(Error::ForeignTask {
                key,
                owner: self.owner.0,
                caller: task.0,
            });
        }
        key.index()
    }
}

impl fmt::Debug for TaskSlots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound: Vec<usize> = (0..SLOT_COUNT).filter(|&i| self.slots[i].is_some()).collect();
        f.debug_struct("TaskSlots")
            .field("owner", &self.owner)
            .field("bound", &bound)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::task::{TaskContext, TaskProfile};

    #[test]
    fn test_bind_and_lookup_same_record() {
        let me = TaskId(1);
        let mut slots = TaskSlots::new(me);
        slots.bind(me, SlotKey::CONTEXT, 41u32).unwrap();

        *slots.lookup::<u32>(me, SlotKey::CONTEXT).unwrap() += 1;
        assert_eq!(*slots.lookup::<u32>(me, SlotKey::CONTEXT).unwrap(), 42);
    }

    #[test]
    fn test_context_and_profile_coexist() {
        let me = TaskId(3);
        let config = Config::default();
        let profile = TaskProfile::new(&config);
        let ctx = TaskContext::new(3, &profile, &config).unwrap();

        let mut slots = TaskSlots::new(me);
        slots.bind(me, SlotKey::CONTEXT, ctx).unwrap();
        slots.bind(me, SlotKey::PROFILE, profile).unwrap();

        assert_eq!(slots.lookup::<TaskContext>(me, SlotKey::CONTEXT).unwrap().name(), "Task_3");
        assert!(slots.lookup::<TaskProfile>(me, SlotKey::PROFILE).unwrap().burst_enabled);
    }

    #[test]
    fn test_foreign_task_rejected() {
        let mut slots = TaskSlots::new(TaskId(1));
        slots.bind(TaskId(1), SlotKey::CONTEXT, 7u8).unwrap();

        let err = slots.lookup::<u8>(TaskId(2), SlotKey::CONTEXT).unwrap_err();
        assert!(matches!(err, Error::ForeignTask { owner: 1, caller: 2, .. }));
        assert!(slots.bind(TaskId(2), SlotKey::PROFILE, 1u8).is_err());
    }

    #[test]
    fn test_unbound_and_out_of_range() {
        let me = TaskId(0);
        let mut slots = TaskSlots::new(me);
        assert!(matches!(
            slots.lookup::<u8>(me, SlotKey::PROFILE),
            Err(Error::SlotUnbound(SlotKey::PROFILE))
        ));
        assert!(matches!(
            slots.bind(me, SlotKey(9), 0u8),
            Err(Error::SlotOutOfRange(SlotKey(9)))
        ));
        assert!(!slots.is_bound(SlotKey(9)));
    }

    #[test]
    fn test_wrong_type_keeps_record() {
        let me = TaskId(0);
        let mut slots = TaskSlots::new(me);
        slots.bind(me, SlotKey::CONTEXT, String::from("ctx")).unwrap();

        assert!(matches!(slots.lookup::<u32>(me, SlotKey::CONTEXT), Err(Error::SlotType(_))));
        assert!(matches!(slots.release::<u32>(me, SlotKey::CONTEXT), Err(Error::SlotType(_))));
        assert!(slots.is_bound(SlotKey::CONTEXT));
        assert_eq!(slots.release::<String>(me, SlotKey::CONTEXT).unwrap(), "ctx");
        assert!(!slots.is_bound(SlotKey::CONTEXT));
    }
}
