use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// A unit of work run once.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// A unit of work run on every timer period.
pub type RepeatingTask = Box<dyn FnMut() + Send + 'static>;

/// Handle for cancelling a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Shared cancellation flag checked right before a task body runs.
#[derive(Debug, Clone, Default)]
pub(crate) struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub(crate) fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Live tasks by id. A task leaves the registry when it completes or is cancelled.
#[derive(Debug, Default)]
pub(crate) struct TaskRegistry {
    next: AtomicU64,
    live: Mutex<HashMap<TaskId, CancelFlag>>,
}

impl TaskRegistry {
    pub(crate) fn register(&self) -> (TaskId, CancelFlag) {
        let id = TaskId(self.next.fetch_add(1, Ordering::Relaxed) + 1);
        let flag = CancelFlag::default();
        self.live.lock().insert(id, flag.clone());
        (id, flag)
    }

    /// Returns false when the task already finished or was never scheduled.
    pub(crate) fn cancel(&self, id: TaskId) -> bool {
        match self.live.lock().remove(&id) {
            Some(flag) => {
                flag.cancel();
                true
            }
            None => false,
        }
    }

    pub(crate) fn finish(&self, id: TaskId) {
        self.live.lock().remove(&id);
    }

    pub(crate) fn cancel_all(&self) -> usize {
        let drained: Vec<CancelFlag> = self.live.lock().drain().map(|(_, f)| f).collect();
        drained.iter().for_each(CancelFlag::cancel);
        drained.len()
    }

    pub(crate) fn active(&self) -> usize {
        self.live.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_cancel_once() {
        let registry = TaskRegistry::default();
        let (a, flag_a) = registry.register();
        let (b, _) = registry.register();
        assert_ne!(a, b);
        assert_eq!(registry.active(), 2);

        assert!(registry.cancel(a));
        assert!(flag_a.is_cancelled());
        assert!(!registry.cancel(a));

        registry.finish(b);
        assert_eq!(registry.active(), 0);
    }

    #[test]
    fn cancel_all_flags_everything() {
        let registry = TaskRegistry::default();
        let flags: Vec<_> = (0..3).map(|_| registry.register().1).collect();
        assert_eq!(registry.cancel_all(), 3);
        assert!(flags.iter().all(CancelFlag::is_cancelled));
    }
}
