// src/supervisor/registry.rs

//! One-handle-per-project task registry.
//!
//! The registry is the concurrency contract that prevents two concurrent
//! runs of the same project: a run exists exactly while its cancellation
//! token is registered here. It is injected into the supervisor rather than
//! being a process-wide singleton so it can be exercised in isolation.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<String, CancellationToken>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh cancellation token for `id`.
    ///
    /// Returns `None` if a handle already exists; the existing handle is
    /// never replaced.
    pub fn try_register(&self, id: &str) -> Option<CancellationToken> {
        let mut tasks = self.tasks.lock().expect("registry lock poisoned");
        if tasks.contains_key(id) {
            return None;
        }
        let token = CancellationToken::new();
        tasks.insert(id.to_string(), token.clone());
        Some(token)
    }

    pub fn contains(&self, id: &str) -> bool {
        let tasks = self.tasks.lock().expect("registry lock poisoned");
        tasks.contains_key(id)
    }

    /// Remove and return the handle for `id`, if any. The caller decides
    /// whether to cancel it.
    pub fn remove(&self, id: &str) -> Option<CancellationToken> {
        let mut tasks = self.tasks.lock().expect("registry lock poisoned");
        tasks.remove(id)
    }
}
