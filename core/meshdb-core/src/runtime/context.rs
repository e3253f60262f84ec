//! Cancellation context threaded through every operator `execute`.
//!
//! Operators check the context at least once per batch; in-flight source
//! calls observe the same flag and return `Canceled` early. Timeouts are
//! cancellation with a deadline.

use crate::error::{MeshError, MeshResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Shared cancel flag. Cloning hands out another handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Per-query execution context.
#[derive(Debug, Clone)]
pub struct QueryContext {
    handle: CancelHandle,
    deadline: Option<Instant>,
}

impl Default for QueryContext {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryContext {
    pub fn new() -> Self {
        Self {
            handle: CancelHandle::default(),
            deadline: None,
        }
    }

    /// Context that cancels itself once `timeout` elapses.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            handle: CancelHandle::default(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Handle the runtime stores so `cancel_query` can signal us.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.handle.clone()
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        if self.handle.is_canceled() {
            return true;
        }
        match self.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }

    /// Returns `Err(Canceled)` once the flag is set or the deadline has
    /// passed. Called between batches by every operator.
    pub fn check(&self) -> MeshResult<()> {
        if self.is_canceled() {
            Err(MeshError::Canceled)
        } else {
            Ok(())
        }
    }

    /// Child context sharing the parent's flag; a parent cancel reaches
    /// every child, a child deadline does not loosen the parent's.
    pub fn child(&self) -> Self {
        self.clone()
    }
}
