//! One buffered telemetry stream (events or frames).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::{Map, Value};

/// FIFO buffer plus the flags that serialize its flushes.
///
/// `in_flight` is held for the whole duration of a flush; `scheduled` is
/// set while an automatic flush has been spawned but not yet started, so a
/// burst of enqueues past the limit spawns exactly one flush.
pub(crate) struct Lane<T> {
    /// Key of the batch array in the request body, and the path suffix.
    pub(crate) name: &'static str,
    pub(crate) limit: usize,
    buffer: Mutex<VecDeque<T>>,
    in_flight: AtomicBool,
    scheduled: AtomicBool,
}

/// Releases a lane's in-flight flag when the flush ends, however it ends.
pub(crate) struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl<T: Serialize> Lane<T> {
    pub(crate) fn new(name: &'static str, limit: usize) -> Self {
        Self {
            name,
            limit,
            buffer: Mutex::new(VecDeque::new()),
            in_flight: AtomicBool::new(false),
            scheduled: AtomicBool::new(false),
        }
    }

    fn buffer(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue; returns `true` when the caller should schedule a flush.
    pub(crate) fn push(&self, item: T) -> bool {
        let len = {
            let mut buffer = self.buffer();
            buffer.push_back(item);
            buffer.len()
        };
        len >= self.limit
            && !self.in_flight.load(Ordering::Acquire)
            && self
                .scheduled
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }

    /// Clear the scheduled marker once the spawned flush starts running.
    pub(crate) fn clear_scheduled(&self) {
        self.scheduled.store(false, Ordering::Release);
    }

    /// Claim the lane for a flush; `None` while another flush runs.
    pub(crate) fn begin_flush(&self) -> Option<InFlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard {
                flag: &self.in_flight,
            })
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Take the whole buffer, oldest first.
    pub(crate) fn take_all(&self) -> Vec<T> {
        self.buffer().drain(..).collect()
    }

    /// Put a batch back in front of anything enqueued since it was taken.
    pub(crate) fn restore_front(&self, batch: Vec<T>) {
        let mut buffer = self.buffer();
        for item in batch.into_iter().rev() {
            buffer.push_front(item);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.buffer().len()
    }

    /// Snapshot of the buffered items, oldest first.
    pub(crate) fn snapshot(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.buffer().iter().cloned().collect()
    }

    /// `{ "<name>": [...] }`
    pub(crate) fn body(&self, batch: &[T]) -> Result<Value, serde_json::Error> {
        let mut map = Map::new();
        map.insert(self.name.to_string(), serde_json::to_value(batch)?);
        Ok(Value::Object(map))
    }
}
