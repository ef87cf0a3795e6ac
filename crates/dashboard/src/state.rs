// crates/dashboard/src/state.rs
//! Load lifecycle shared by the aggregators.
//!
//! Every reload takes a generation number from [`StateCell::next_generation`].
//! Writes carrying an older generation are dropped, so when two loads overlap the
//! most recently started one wins regardless of completion order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockWriteGuard};

use serde::Serialize;
use tokio::sync::broadcast;

/// Lifecycle of an aggregator's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    Idle,
    Loading,
    Success,
    Error,
}

/// `{status, blocks, error}` snapshot exposed by the block aggregators.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockState<B> {
    pub status: LoadStatus,
    pub blocks: Vec<B>,
    pub error: Option<String>,
}

impl<B> BlockState<B> {
    pub fn idle() -> Self {
        Self {
            status: LoadStatus::Idle,
            blocks: Vec::new(),
            error: None,
        }
    }

    pub fn success(blocks: Vec<B>) -> Self {
        Self {
            status: LoadStatus::Success,
            blocks,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: LoadStatus::Error,
            blocks: Vec::new(),
            error: Some(message.into()),
        }
    }
}

impl<B> Default for BlockState<B> {
    fn default() -> Self {
        Self::idle()
    }
}

/// Something with a [`LoadStatus`], so the cell can mark it loading.
pub trait Lifecycle {
    fn set_status(&mut self, status: LoadStatus);
}

impl<B> Lifecycle for BlockState<B> {
    fn set_status(&mut self, status: LoadStatus) {
        self.status = status;
    }
}

/// Current state of one aggregator plus a broadcast of every change.
pub struct StateCell<S> {
    current: RwLock<S>,
    generation: AtomicU64,
    tx: broadcast::Sender<S>,
}

impl<S: Clone + Lifecycle> StateCell<S> {
    pub fn new(initial: S) -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            current: RwLock::new(initial),
            generation: AtomicU64::new(0),
            tx,
        }
    }

    /// Start a new reload. Any in-flight reload becomes stale.
    pub fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Move to `loading`, keeping whatever data is already shown.
    pub fn mark_loading(&self, generation: u64) -> bool {
        self.modify(generation, |state| state.set_status(LoadStatus::Loading))
    }

    /// Replace the state if `generation` is still current. Returns whether it was applied.
    pub fn publish(&self, generation: u64, state: S) -> bool {
        self.modify(generation, move |current| *current = state)
    }

    pub fn snapshot(&self) -> S {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading aggregator state: {e}");
                e.into_inner().clone()
            }
        }
    }

    /// Receive every applied state change.
    pub fn subscribe(&self) -> broadcast::Receiver<S> {
        self.tx.subscribe()
    }

    fn modify(&self, generation: u64, f: impl FnOnce(&mut S)) -> bool {
        let mut guard = self.write();
        // Checked under the write lock so a newer publish cannot interleave.
        if !self.is_current(generation) {
            tracing::debug!(
                generation,
                current = self.generation.load(Ordering::SeqCst),
                "Discarding stale aggregator update"
            );
            return false;
        }
        f(&mut *guard);
        let snapshot = guard.clone();
        drop(guard);
        // Ignore send errors (no subscribers is fine).
        let _ = self.tx.send(snapshot);
        true
    }

    fn write(&self) -> RwLockWriteGuard<'_, S> {
        self.current.write().unwrap_or_else(|e| {
            tracing::error!("RwLock poisoned writing aggregator state: {e}");
            e.into_inner()
        })
    }
}

/// Last accepted settings of an aggregator.
#[derive(Debug)]
pub struct SettingsSlot<T> {
    accepted: Mutex<Option<T>>,
}

impl<T: Clone + PartialEq> SettingsSlot<T> {
    pub fn new() -> Self {
        Self {
            accepted: Mutex::new(None),
        }
    }

    /// Store `settings` unless they equal the accepted ones. Returns whether they changed.
    pub fn accept(&self, settings: &T) -> bool {
        let mut guard = self.lock();
        if guard.as_ref() == Some(settings) {
            return false;
        }
        *guard = Some(settings.clone());
        true
    }

    pub fn current(&self) -> Option<T> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.accepted.lock().unwrap_or_else(|e| {
            tracing::error!("Mutex poisoned reading aggregator settings: {e}");
            e.into_inner()
        })
    }
}

impl<T: Clone + PartialEq> Default for SettingsSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
