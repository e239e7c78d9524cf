use crate::ScheduleError;
use crate::task::CancelFlag;
use crossbeam_channel::{RecvTimeoutError, Sender, unbounded};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// What happens when a timer entry comes due. Firing only hands work to an
/// executor; task bodies never run on the timer thread.
pub(crate) enum Fire {
    Once(Box<dyn FnOnce() + Send>),
    Every(Duration, Arc<dyn Fn() + Send + Sync>),
}

struct Entry {
    due: Instant,
    seq: u64,
    flag: CancelFlag,
    fire: Fire,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Reversed so the heap pops the earliest entry first.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Single thread that releases delayed and periodic work when it comes due.
pub(crate) struct Timer {
    sender: Mutex<Option<Sender<Entry>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    seq: Mutex<u64>,
}

impl Timer {
    pub(crate) fn spawn(name: &str) -> Result<Self, ScheduleError> {
        let (sender, receiver) = unbounded::<Entry>();
        let handle = thread::Builder::new()
            .name(format!("{name}-timer"))
            .spawn(move || {
                let mut heap: BinaryHeap<Entry> = BinaryHeap::new();
                loop {
                    let next = match heap.peek() {
                        Some(top) => {
                            let wait = top.due.saturating_duration_since(Instant::now());
                            receiver.recv_timeout(wait)
                        }
                        None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
                    };
                    match next {
                        Ok(entry) => heap.push(entry),
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                    let now = Instant::now();
                    while heap.peek().is_some_and(|top| top.due <= now) {
                        let Some(entry) = heap.pop() else { break };
                        if entry.flag.is_cancelled() {
                            continue;
                        }
                        match entry.fire {
                            Fire::Once(fire) => fire(),
                            Fire::Every(period, fire) => {
                                fire();
                                heap.push(Entry {
                                    due: entry.due + period.max(Duration::from_millis(1)),
                                    seq: entry.seq,
                                    flag: entry.flag,
                                    fire: Fire::Every(period, fire),
                                });
                            }
                        }
                    }
                }
            })
            .map_err(|e| ScheduleError::Spawn(e.to_string()))?;
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            thread: Mutex::new(Some(handle)),
            seq: Mutex::new(0),
        })
    }

    pub(crate) fn schedule(
        &self,
        delay: Duration,
        flag: CancelFlag,
        fire: Fire,
    ) -> Result<(), ScheduleError> {
        let seq = {
            let mut seq = self.seq.lock();
            *seq += 1;
            *seq
        };
        let entry = Entry {
            due: Instant::now() + delay,
            seq,
            flag,
            fire,
        };
        let guard = self.sender.lock();
        let sender = guard.as_ref().ok_or(ScheduleError::ShutDown)?;
        sender.send(entry).map_err(|_| ScheduleError::ShutDown)
    }

    /// Pending entries are dropped without firing.
    pub(crate) fn stop(&self) {
        self.sender.lock().take();
        if let Some(handle) = self.thread.lock().take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::warn!("timer thread ended abnormally");
            }
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}
