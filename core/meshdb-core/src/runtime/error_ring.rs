//! Bounded in-memory error log.
//!
//! I/O-kind failures are recorded here for diagnostics; the ring keeps at
//! most `CAPACITY` entries and drops the oldest beyond that.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::SystemTime;

const CAPACITY: usize = 1000;

#[derive(Debug, Clone)]
pub struct RecordedError {
    pub at: SystemTime,
    pub context: String,
    pub message: String,
}

#[derive(Default)]
pub struct ErrorRing {
    entries: Mutex<VecDeque<RecordedError>>,
}

impl ErrorRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, context: impl Into<String>, message: impl Into<String>) {
        let mut entries = self.entries.lock();
        if entries.len() == CAPACITY {
            entries.pop_front();
        }
        entries.push_back(RecordedError {
            at: SystemTime::now(),
            context: context.into(),
            message: message.into(),
        });
    }

    pub fn snapshot(&self) -> Vec<RecordedError> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_caps_at_capacity() {
        let ring = ErrorRing::new();
        for i in 0..(CAPACITY + 10) {
            ring.record("io", format!("error {i}"));
        }
        assert_eq!(ring.len(), CAPACITY);
        // oldest entries were dropped
        assert_eq!(ring.snapshot()[0].message, "error 10");
    }
}
