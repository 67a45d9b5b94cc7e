use super::MemoryShared;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use devmesh_error::{coordination::CoordinationError, CoordinationResult};
use devmesh_sdk::DistributedSemaphore;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Shared state of one semaphore key.
///
/// Permits start at zero; `release` adds, `acquire` takes. The watch
/// channel is bumped on every release so waiters re-check without a
/// lost-wakeup window.
pub(crate) struct SemaphoreState {
    permits: Mutex<u64>,
    changed: watch::Sender<u64>,
    /// Generation guard so a re-armed TTL cancels older sweepers.
    sweep_gen: AtomicU64,
}

impl SemaphoreState {
    fn new(permits: u64) -> Arc<Self> {
        Arc::new(SemaphoreState {
            permits: Mutex::new(permits),
            changed: watch::channel(0).0,
            sweep_gen: AtomicU64::new(0),
        })
    }

    fn try_take(&self, n: u64) -> bool {
        let mut permits = self.permits.lock().expect("semaphore lock poisoned");
        if *permits >= n {
            *permits -= n;
            true
        } else {
            false
        }
    }

    fn add(&self, n: u64) {
        {
            let mut permits = self.permits.lock().expect("semaphore lock poisoned");
            *permits = permits.saturating_add(n);
        }
        self.changed.send_modify(|v| *v = v.wrapping_add(1));
    }
}

pub(crate) struct MemorySemaphore {
    key: String,
    shared: Arc<MemoryShared>,
}

impl MemorySemaphore {
    pub(crate) fn new(key: &str, shared: Arc<MemoryShared>) -> Self {
        MemorySemaphore {
            key: key.to_string(),
            shared,
        }
    }

    fn state(&self) -> Arc<SemaphoreState> {
        self.shared
            .semaphores
            .entry(self.key.clone())
            .or_insert_with(|| SemaphoreState::new(0))
            .value()
            .clone()
    }
}

#[async_trait]
impl DistributedSemaphore for MemorySemaphore {
    async fn try_set_permits(&self, permits: u32) -> CoordinationResult<bool> {
        match self.shared.semaphores.entry(self.key.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(vacant) => {
                vacant.insert(SemaphoreState::new(u64::from(permits)));
                Ok(true)
            }
        }
    }

    async fn acquire(&self, permits: u32, timeout: Duration) -> CoordinationResult<bool> {
        let state = self.state();
        let n = u64::from(permits);
        if n == 0 {
            return Ok(true);
        }
        let mut changes = state.changed.subscribe();
        let wait = async {
            loop {
                if state.try_take(n) {
                    return true;
                }
                if changes.changed().await.is_err() {
                    return false;
                }
            }
        };
        Ok(tokio::time::timeout(timeout, wait).await.unwrap_or(false))
    }

    async fn release(&self, permits: u32) -> CoordinationResult<()> {
        self.state().add(u64::from(permits));
        Ok(())
    }

    async fn expire(&self, ttl: Duration) -> CoordinationResult<()> {
        if ttl.is_zero() {
            return Err(CoordinationError::InvalidTtl("ttl must be > 0".into()));
        }
        let state = self.state();
        let generation = state.sweep_gen.fetch_add(1, Ordering::SeqCst) + 1;
        let shared = Arc::clone(&self.shared);
        let key = self.key.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let removed = shared.semaphores.remove_if(&key, |_, current| {
                Arc::ptr_eq(current, &state)
                    && state.sweep_gen.load(Ordering::SeqCst) == generation
            });
            if removed.is_some() {
                debug!(key = %key, "semaphore expired");
            }
        });
        Ok(())
    }

    async fn delete(&self) -> CoordinationResult<()> {
        self.shared.semaphores.remove(&self.key);
        Ok(())
    }
}
