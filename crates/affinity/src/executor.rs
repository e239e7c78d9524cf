use crate::ScheduleError;
use crate::task::Task;
use crossbeam_channel::{Sender, unbounded};
use parking_lot::Mutex;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::{self, JoinHandle, ThreadId};

/// A named group of threads draining one shared job queue.
///
/// With one thread this is an affinity thread: everything submitted runs
/// there, in submission order. With several it is a worker pool.
pub struct Executor {
    name: String,
    sender: Mutex<Option<Sender<Task>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    thread_ids: Vec<ThreadId>,
}

impl Executor {
    pub fn spawn(name: impl Into<String>, threads: usize) -> Result<Self, ScheduleError> {
        let name = name.into();
        let (sender, receiver) = unbounded::<Task>();
        let mut handles = Vec::with_capacity(threads.max(1));
        for index in 0..threads.max(1) {
            let receiver = receiver.clone();
            let thread_name = if threads > 1 {
                format!("{name}-{index}")
            } else {
                name.clone()
            };
            let label = thread_name.clone();
            let handle = thread::Builder::new()
                .name(thread_name)
                .spawn(move || {
                    for job in receiver {
                        if catch_unwind(AssertUnwindSafe(job)).is_err() {
                            tracing::error!(thread = %label, "scheduled task panicked");
                        }
                    }
                })
                .map_err(|e| ScheduleError::Spawn(e.to_string()))?;
            handles.push(handle);
        }
        let thread_ids = handles.iter().map(|h| h.thread().id()).collect();
        Ok(Self {
            name,
            sender: Mutex::new(Some(sender)),
            threads: Mutex::new(handles),
            thread_ids,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn submit(&self, job: Task) -> Result<(), ScheduleError> {
        let guard = self.sender.lock();
        let sender = guard.as_ref().ok_or(ScheduleError::ShutDown)?;
        sender.send(job).map_err(|_| ScheduleError::ShutDown)
    }

    /// True when called from one of this executor's threads.
    pub fn is_current(&self) -> bool {
        let me = thread::current().id();
        self.thread_ids.contains(&me)
    }

    /// Close the queue, let queued jobs drain and join the threads.
    /// Joining is skipped for the calling thread itself.
    pub fn stop(&self) {
        self.sender.lock().take();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.threads.lock());
        let me = thread::current().id();
        for handle in handles {
            if handle.thread().id() == me {
                continue;
            }
            if handle.join().is_err() {
                tracing::warn!(executor = %self.name, "executor thread ended abnormally");
            }
        }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("name", &self.name)
            .field("threads", &self.thread_ids.len())
            .finish()
    }
}
