//! Grid persistence interface
//!
//! The session consumes persistence, it does not implement it: the
//! server keeps grids in SQLite, browsers in shared storage, tests in
//! memory. The one hard requirement is that reads never fail: absent
//! or corrupt data materializes as a well-formed empty grid, so a
//! session can always start.

use async_trait::async_trait;
use mosaic_common::{GridState, Result};
use std::sync::Mutex;

/// Persisted grid access, whole-state granularity.
///
/// `load_grid` is infallible by contract; `save_grid` replaces the
/// persisted snapshot unconditionally (last-writer-wins). No cross-call
/// transactionality is assumed.
#[async_trait]
pub trait GridPersistence: Send + Sync {
    /// Current persisted grid, or a fresh empty grid when nothing
    /// usable is persisted
    async fn load_grid(&self) -> GridState;

    /// Replace the persisted grid with `state`
    async fn save_grid(&self, state: &GridState) -> Result<()>;
}

/// In-memory persistence for tests and offline sessions.
///
/// Stores the serialized form so corrupt-data behavior can be exercised
/// the same way a real backend would hit it.
pub struct MemoryPersistence {
    raw: Mutex<Option<String>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self {
            raw: Mutex::new(None),
        }
    }

    /// Overwrite the raw persisted bytes, bypassing serialization.
    /// Lets tests plant corrupt data or simulate a foreign writer.
    pub fn set_raw(&self, raw: impl Into<String>) {
        *self.raw.lock().unwrap() = Some(raw.into());
    }
}

impl Default for MemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GridPersistence for MemoryPersistence {
    async fn load_grid(&self) -> GridState {
        let raw = self.raw.lock().unwrap().clone();
        let Some(json) = raw else {
            return GridState::new_generation();
        };
        match serde_json::from_str::<GridState>(&json) {
            Ok(grid) if grid.is_well_formed() => grid,
            Ok(_) => {
                tracing::warn!("Persisted grid has wrong shape, substituting empty default");
                GridState::new_generation()
            }
            Err(e) => {
                tracing::warn!("Persisted grid unreadable, substituting empty default: {}", e);
                GridState::new_generation()
            }
        }
    }

    async fn save_grid(&self, state: &GridState) -> Result<()> {
        let json = serde_json::to_string(state)
            .map_err(|e| mosaic_common::Error::Persistence(e.to_string()))?;
        *self.raw.lock().unwrap() = Some(json);
        Ok(())
    }
}
