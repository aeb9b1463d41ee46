//! Replicated grid state store
//!
//! The only cross-session coordination point. Every execution context
//! (tab, process, device) holds its own in-memory copy; a periodic
//! reconciliation read re-fetches persisted state, diffs it structurally
//! against memory, and on difference replaces memory and notifies
//! subscribers. Conflict policy is last-writer-wins at whole-state
//! granularity; two contexts writing near-simultaneously may have one
//! write silently superseded, which is accepted, not a bug.

use crate::persistence::GridPersistence;
use mosaic_common::events::{EventBus, MosaicEvent};
use mosaic_common::{GridState, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;

/// Grid state replica with change notification.
///
/// The version counter is monotonic per store instance and bumps only
/// on structural change; consumers diff by version, never by timing.
pub struct GridStateStore {
    persistence: Arc<dyn GridPersistence>,
    state: RwLock<GridState>,
    version: AtomicU64,
    bus: EventBus,
}

impl GridStateStore {
    /// Materialize the store from persisted state (empty default when
    /// nothing usable is persisted)
    pub async fn open(persistence: Arc<dyn GridPersistence>) -> Self {
        let state = persistence.load_grid().await;
        Self {
            persistence,
            state: RwLock::new(state),
            version: AtomicU64::new(0),
            bus: EventBus::new(100),
        }
    }

    /// Snapshot of the in-memory grid
    pub async fn load(&self) -> GridState {
        self.state.read().await.clone()
    }

    /// Snapshot plus its version
    pub async fn poll(&self) -> (GridState, u64) {
        let state = self.state.read().await.clone();
        (state, self.version.load(Ordering::Acquire))
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Persist `next` and make it the in-memory state.
    ///
    /// Whole-state replacement: no field-level merge with whatever
    /// another context may have written since our last read.
    pub async fn save(&self, next: GridState) -> Result<()> {
        self.persistence.save_grid(&next).await?;
        let generation = next.generation;
        {
            let mut state = self.state.write().await;
            if *state == next {
                return Ok(());
            }
            *state = next;
        }
        let version = self.bump();
        self.bus.emit_lossy(MosaicEvent::GridChanged {
            generation,
            version,
            timestamp: chrono::Utc::now(),
        });
        Ok(())
    }

    /// One reconciliation read: fetch persisted state and adopt it if
    /// it differs structurally from memory. Returns whether memory was
    /// replaced. With no intervening write this is a no-op and emits
    /// nothing.
    pub async fn reconcile(&self) -> bool {
        let fetched = self.persistence.load_grid().await;
        let generation = fetched.generation;
        {
            let mut state = self.state.write().await;
            if *state == fetched {
                return false;
            }
            debug!("Reconciliation adopted a remote grid write");
            *state = fetched;
        }
        let version = self.bump();
        self.bus.emit_lossy(MosaicEvent::GridChanged {
            generation,
            version,
            timestamp: chrono::Utc::now(),
        });
        true
    }

    /// Drive `reconcile` on a fixed interval until the task is aborted
    pub fn spawn_reconciler(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                store.reconcile().await;
            }
        })
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<MosaicEvent> {
        self.bus.subscribe()
    }

    /// The store-owned event channel, injected into consumers instead
    /// of any ambient global bus
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    fn bump(&self) -> u64 {
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }
}
