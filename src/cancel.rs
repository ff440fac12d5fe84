//! Cooperative cancellation signal shared across long batched operations.
//!
//! Grounds the same `AtomicBool` + `Ordering::Relaxed` pattern `progress.rs`
//! uses for its `LOG_ONLY` flag, but instance-scoped rather than global so a
//! caller (tests, a future interactive abort) can hold and flip its own
//! token without affecting any other run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
