//! Slot and take update operations
//!
//! `GridSession` owns one user's view of the grid: it resolves supplied
//! media to durable storage references, applies slot/take writes and
//! the matching contribution in a single logical write, and runs the
//! completion path when the 16th canonical slot fills.
//!
//! Upload failure is a degradation, not an error: the raw reference is
//! written instead and the operation continues.

use crate::contributions::ContributionTracker;
use crate::store::GridStateStore;
use async_trait::async_trait;
use mosaic_common::events::MosaicEvent;
use mosaic_common::model::{GridState, MediaRef, MediaSource, TakeIndex, User};
use mosaic_common::{Error, Result, SLOT_COUNT};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Remote media storage, consumed not implemented
#[async_trait]
pub trait MediaStorage: Send + Sync {
    /// Playable (possibly time-limited) URL for a stored reference,
    /// `None` when the reference is unknown
    async fn resolve(&self, media: &MediaRef) -> Result<Option<String>>;

    /// Upload raw content, returning its durable reference
    async fn upload(&self, uri: &str, bytes: &[u8]) -> Result<MediaRef>;
}

/// Hook invoked when a grid generation completes; the composition
/// pipeline runs behind it
#[async_trait]
pub trait CompositionTrigger: Send + Sync {
    /// Kick off composition for the 16 canonical videos of `generation`
    async fn finalize(&self, generation: Uuid, videos: Vec<MediaRef>) -> Result<String>;
}

/// One user's contributing session against the replicated grid
pub struct GridSession {
    store: Arc<GridStateStore>,
    storage: Arc<dyn MediaStorage>,
    trigger: Arc<dyn CompositionTrigger>,
    tracker: ContributionTracker,
}

impl GridSession {
    pub fn new(
        store: Arc<GridStateStore>,
        storage: Arc<dyn MediaStorage>,
        trigger: Arc<dyn CompositionTrigger>,
        tracker: ContributionTracker,
    ) -> Self {
        Self {
            store,
            storage,
            trigger,
            tracker,
        }
    }

    pub fn store(&self) -> &Arc<GridStateStore> {
        &self.store
    }

    pub fn tracker(&self) -> &ContributionTracker {
        &self.tracker
    }

    /// Write the canonical video of `index` and upsert the acting
    /// user's contribution, then persist; fills the completion path
    /// when this was the last open slot.
    pub async fn update_slot(&self, user: &User, index: usize, source: MediaSource) -> Result<()> {
        check_slot_index(index)?;
        let media = self.resolve_source(source).await;

        let mut next = self.store.load().await;
        next.slots[index].video = Some(media);
        self.tracker.record_contribution(&mut next, user, index);

        if next.is_complete() {
            self.complete(next).await
        } else {
            let generation = next.generation;
            self.store.save(next).await?;
            self.store.bus().emit_lossy(MosaicEvent::SlotUpdated {
                generation,
                slot: index,
                timestamp: chrono::Utc::now(),
            });
            Ok(())
        }
    }

    /// Store up to three take references for one slot in a single
    /// persisted write. When all three are supplied the canonical video
    /// moves to take3 (canonical = last supplied) and the acting user's
    /// contribution is upserted with it.
    pub async fn update_takes(
        &self,
        user: &User,
        index: usize,
        takes: [Option<MediaSource>; 3],
    ) -> Result<()> {
        check_slot_index(index)?;

        let mut resolved: [Option<MediaRef>; 3] = [None, None, None];
        for (i, source) in takes.into_iter().enumerate() {
            if let Some(source) = source {
                resolved[i] = Some(self.resolve_source(source).await);
            }
        }
        let full_triad = resolved.iter().all(|t| t.is_some());

        let mut next = self.store.load().await;
        for (i, take) in TakeIndex::ALL.into_iter().enumerate() {
            if let Some(media) = resolved[i].take() {
                next.slots[index].takes.set(take, media);
            }
        }
        if full_triad {
            next.slots[index].video = next.slots[index].takes.take3.clone();
            self.tracker.record_contribution(&mut next, user, index);
        }

        if next.is_complete() {
            self.complete(next).await
        } else {
            let generation = next.generation;
            self.store.save(next).await?;
            self.store.bus().emit_lossy(MosaicEvent::TakesUpdated {
                generation,
                slot: index,
                timestamp: chrono::Utc::now(),
            });
            Ok(())
        }
    }

    /// Completion path: fire the pipeline trigger once, then replace
    /// the grid with a fresh generation. The completed snapshot and the
    /// reset are one logical transition; the completed state itself is
    /// never persisted.
    async fn complete(&self, completed: GridState) -> Result<()> {
        let generation = completed.generation;
        let videos = completed
            .canonical_videos()
            .ok_or_else(|| Error::Internal("completion path on incomplete grid".into()))?;

        info!("Grid generation {} complete, triggering composition", generation);
        self.store.bus().emit_lossy(MosaicEvent::GridCompleted {
            generation,
            videos: videos.clone(),
            timestamp: chrono::Utc::now(),
        });

        // The pipeline runs server-side; a trigger failure must not
        // strand the grid in a completed state that can never recur.
        if let Err(e) = self.trigger.finalize(generation, videos).await {
            warn!("Composition trigger failed: {}", e);
        }

        let fresh = GridState::new_generation();
        let new_generation = fresh.generation;
        self.store.save(fresh).await?;
        self.store.bus().emit_lossy(MosaicEvent::GenerationReset {
            old_generation: generation,
            new_generation,
            timestamp: chrono::Utc::now(),
        });
        Ok(())
    }

    /// Resolve supplied media to a durable reference, degrading to the
    /// raw reference when upload is unavailable
    async fn resolve_source(&self, source: MediaSource) -> MediaRef {
        match source {
            MediaSource::Stored(media) => media,
            MediaSource::Raw { uri, bytes } => match self.storage.upload(&uri, &bytes).await {
                Ok(media) => media,
                Err(e) => {
                    warn!("Upload failed, keeping raw reference {}: {}", uri, e);
                    MediaRef::new(uri)
                }
            },
        }
    }
}

fn check_slot_index(index: usize) -> Result<()> {
    if index >= SLOT_COUNT {
        return Err(Error::Validation(format!(
            "slot index {index} out of range 0..{SLOT_COUNT}"
        )));
    }
    Ok(())
}
