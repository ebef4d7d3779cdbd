//! Level-triggered signal cells and single-instance task guards.
//!
//! A [`Flag`] has one writer and any number of waiters. Waiting observes the
//! level, not an edge: a waiter that arrives after `set` returns at once.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
pub struct Flag {
    set: AtomicBool,
    notify: Notify,
}

impl Flag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.set.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn clear(&self) {
        self.set.store(false, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }

    /// Wait until the flag is set.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a set() in between is not lost.
            notified.as_mut().enable();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }

    /// Wait at most `limit`. Returns whether the flag is set.
    pub async fn wait_for(&self, limit: Duration) -> bool {
        let _ = tokio::time::timeout(limit, self.wait()).await;
        self.is_set()
    }
}

/// How a [`TaskSlot`] treats a finished task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPolicy {
    /// A new task may start once the previous one has finished.
    Reusable,
    /// Only one task is ever started over the life of the slot.
    Once,
}

/// Guard allowing at most one instance of a named task.
#[derive(Debug)]
pub struct TaskSlot {
    name: &'static str,
    policy: SlotPolicy,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TaskSlot {
    pub fn new(name: &'static str, policy: SlotPolicy) -> Self {
        Self {
            name,
            policy,
            handle: Mutex::new(None),
        }
    }

    /// Spawn `task` unless the slot is occupied. A refused request is logged
    /// as a warning and otherwise ignored. Returns whether the task started.
    pub fn spawn<F>(&self, runtime: &Handle, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.lock();
        if let Some(existing) = slot.as_ref() {
            if self.policy == SlotPolicy::Once || !existing.is_finished() {
                warn!("signal: {} task already running!", self.name);
                return false;
            }
        }
        debug!("signal: spawning {} task", self.name);
        *slot = Some(runtime.spawn(task));
        true
    }

    /// Whether a task from this slot is alive right now.
    pub fn is_running(&self) -> bool {
        self.lock().as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Whether a task was ever started.
    pub fn was_started(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        // A panic while holding the lock leaves the handle intact.
        self.handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
