//! Event types for the mosaic event system
//!
//! One central enum shared by client and server, broadcast through
//! [`EventBus`] and serializable for SSE transmission. The bus is an
//! explicit object owned by whoever coordinates state (the grid store
//! on the client, the app context on the server) and injected into
//! consumers; there is no ambient global channel.

use crate::model::{MediaRef, TakeIndex};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Mosaic event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MosaicEvent {
    /// Replicated grid state changed (local write or reconciliation)
    GridChanged {
        generation: Uuid,
        /// Store version after the change; consumers diff by version,
        /// not by timing
        version: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A slot's canonical video was written
    SlotUpdated {
        generation: Uuid,
        slot: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A slot's take set was written
    TakesUpdated {
        generation: Uuid,
        slot: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// All 16 canonical slots filled; fired exactly once per generation
    GridCompleted {
        generation: Uuid,
        /// Canonical refs in row-major slot order
        videos: Vec<MediaRef>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Completed grid replaced by a fresh generation
    GenerationReset {
        old_generation: Uuid,
        new_generation: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Coordinated start issued for the active take group
    PlaybackStarted {
        take: TakeIndex,
        /// False when the bounded fallback fired before full readiness
        full_readiness: bool,
        element_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Active take advanced in the fixed 1→2→3→1 cycle
    TakeCycled {
        from: TakeIndex,
        to: TakeIndex,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Composition pipeline produced (and distributed) the final mosaic
    CompositionFinished {
        generation: Uuid,
        url: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl MosaicEvent {
    /// Stable event name for the SSE `event:` field
    pub fn kind(&self) -> &'static str {
        match self {
            MosaicEvent::GridChanged { .. } => "GridChanged",
            MosaicEvent::SlotUpdated { .. } => "SlotUpdated",
            MosaicEvent::TakesUpdated { .. } => "TakesUpdated",
            MosaicEvent::GridCompleted { .. } => "GridCompleted",
            MosaicEvent::GenerationReset { .. } => "GenerationReset",
            MosaicEvent::PlaybackStarted { .. } => "PlaybackStarted",
            MosaicEvent::TakeCycled { .. } => "TakeCycled",
            MosaicEvent::CompositionFinished { .. } => "CompositionFinished",
        }
    }
}

/// One-to-many event broadcaster over `tokio::sync::broadcast`.
///
/// Subscribers receive only events emitted after subscription; slow
/// subscribers lag and drop the oldest buffered events.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MosaicEvent>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MosaicEvent> {
        self.tx.subscribe()
    }

    /// Emit an event; `Err` when no subscriber is listening
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: MosaicEvent,
    ) -> Result<usize, broadcast::error::SendError<MosaicEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: MosaicEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
