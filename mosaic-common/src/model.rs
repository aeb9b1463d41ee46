//! Grid data model
//!
//! A grid is one generation of the 4×4 mosaic: 16 slots, each holding a
//! canonical video and up to three alternate takes, plus the
//! contribution log binding users (by email) to slots.
//!
//! Completion is derived, never stored: a grid is complete when every
//! canonical slot is non-null. The completion side effects (pipeline
//! trigger, generation reset) live in the client session, not here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of slots in the grid (4 rows × 4 columns)
pub const SLOT_COUNT: usize = 16;

/// Number of alternate takes per slot
pub const TAKE_COUNT: usize = 3;

/// Opaque key for a remotely stored media blob.
///
/// Resolution to a playable URL is an external capability; this type
/// never inspects the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaRef(pub String);

impl MediaRef {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MediaRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Media supplied to an update operation.
///
/// `Stored` is already durable and reused as-is; `Raw` must be uploaded
/// first. When upload fails, the update degrades to `MediaRef(uri)`
/// rather than failing the whole operation.
#[derive(Debug, Clone)]
pub enum MediaSource {
    /// Already a remote storage reference
    Stored(MediaRef),
    /// Raw recorded content not yet uploaded
    Raw { uri: String, bytes: Vec<u8> },
}

impl MediaSource {
    /// The reference to fall back to when upload is unavailable
    pub fn fallback_ref(&self) -> MediaRef {
        match self {
            MediaSource::Stored(r) => r.clone(),
            MediaSource::Raw { uri, .. } => MediaRef::new(uri.clone()),
        }
    }
}

/// One of the three takes of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TakeIndex {
    One,
    Two,
    Three,
}

impl TakeIndex {
    pub const ALL: [TakeIndex; TAKE_COUNT] = [TakeIndex::One, TakeIndex::Two, TakeIndex::Three];

    /// Cycle order 1 → 2 → 3 → 1
    pub fn next(self) -> TakeIndex {
        match self {
            TakeIndex::One => TakeIndex::Two,
            TakeIndex::Two => TakeIndex::Three,
            TakeIndex::Three => TakeIndex::One,
        }
    }

    pub fn as_usize(self) -> usize {
        match self {
            TakeIndex::One => 0,
            TakeIndex::Two => 1,
            TakeIndex::Three => 2,
        }
    }
}

/// The up-to-three alternate recordings of one slot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TakeSet {
    pub take1: Option<MediaRef>,
    pub take2: Option<MediaRef>,
    pub take3: Option<MediaRef>,
}

impl TakeSet {
    pub fn get(&self, take: TakeIndex) -> Option<&MediaRef> {
        match take {
            TakeIndex::One => self.take1.as_ref(),
            TakeIndex::Two => self.take2.as_ref(),
            TakeIndex::Three => self.take3.as_ref(),
        }
    }

    pub fn set(&mut self, take: TakeIndex, media: MediaRef) {
        match take {
            TakeIndex::One => self.take1 = Some(media),
            TakeIndex::Two => self.take2 = Some(media),
            TakeIndex::Three => self.take3 = Some(media),
        }
    }

    /// True when all three takes are recorded
    pub fn is_full(&self) -> bool {
        self.take1.is_some() && self.take2.is_some() && self.take3.is_some()
    }
}

/// One cell of the grid
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// Canonical video representing this slot in the final mosaic.
    /// Last-write-wins: the most recently supplied take, or take3 when
    /// a triad completes.
    pub video: Option<MediaRef>,
    pub takes: TakeSet,
}

/// A log entry binding a user to a slot at a point in time.
///
/// `owner_email` is the stable identity key; user ids may rotate across
/// authentication sessions, emails do not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub slot: usize,
    pub owner_id: Uuid,
    pub owner_email: String,
    pub timestamp: DateTime<Utc>,
}

/// External identity: opaque id plus the email used as ownership key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
}

/// One generation of the replicated grid.
///
/// The slot array and the contribution log are always written together;
/// no operation leaves them half-applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridState {
    pub generation: Uuid,
    pub slots: Vec<Slot>,
    pub contributions: Vec<Contribution>,
}

impl GridState {
    /// Fresh empty grid under a new generation id
    pub fn new_generation() -> Self {
        Self {
            generation: Uuid::new_v4(),
            slots: vec![Slot::default(); SLOT_COUNT],
            contributions: Vec::new(),
        }
    }

    /// Empty grid under a known generation id (used when materializing
    /// a generation that has never been persisted)
    pub fn empty(generation: Uuid) -> Self {
        Self {
            generation,
            slots: vec![Slot::default(); SLOT_COUNT],
            contributions: Vec::new(),
        }
    }

    /// Structural validity: exactly 16 slots. Persisted data failing
    /// this is treated the same as unreadable data at every load seam.
    pub fn is_well_formed(&self) -> bool {
        self.slots.len() == SLOT_COUNT
    }

    /// Derived completion flag: all 16 canonical slots non-null
    pub fn is_complete(&self) -> bool {
        self.slots.len() == SLOT_COUNT && self.slots.iter().all(|s| s.video.is_some())
    }

    /// Canonical refs in row-major slot order; `None` until complete
    pub fn canonical_videos(&self) -> Option<Vec<MediaRef>> {
        self.slots
            .iter()
            .map(|s| s.video.clone())
            .collect::<Option<Vec<_>>>()
            .filter(|v| v.len() == SLOT_COUNT)
    }

    /// Indices of slots with no canonical video yet
    pub fn open_slots(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.video.is_none())
            .map(|(i, _)| i)
            .collect()
    }
}

impl Default for GridState {
    fn default() -> Self {
        Self::new_generation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media(key: &str) -> MediaRef {
        MediaRef::new(key)
    }

    #[test]
    fn test_new_generation_is_empty() {
        let grid = GridState::new_generation();
        assert_eq!(grid.slots.len(), SLOT_COUNT);
        assert!(grid.contributions.is_empty());
        assert!(!grid.is_complete());
        assert_eq!(grid.open_slots().len(), SLOT_COUNT);
    }

    #[test]
    fn test_completion_requires_all_slots() {
        let mut grid = GridState::new_generation();
        for i in 0..SLOT_COUNT - 1 {
            grid.slots[i].video = Some(media(&format!("clip-{i}")));
        }
        assert!(!grid.is_complete());
        assert!(grid.canonical_videos().is_none());

        grid.slots[SLOT_COUNT - 1].video = Some(media("clip-last"));
        assert!(grid.is_complete());

        let videos = grid.canonical_videos().unwrap();
        assert_eq!(videos.len(), SLOT_COUNT);
        assert_eq!(videos[0], media("clip-0"));
        assert_eq!(videos[15], media("clip-last"));
    }

    #[test]
    fn test_well_formed_requires_full_slot_array() {
        let mut grid = GridState::new_generation();
        assert!(grid.is_well_formed());
        grid.slots.truncate(2);
        assert!(!grid.is_well_formed());
    }

    #[test]
    fn test_take_cycle_order() {
        assert_eq!(TakeIndex::One.next(), TakeIndex::Two);
        assert_eq!(TakeIndex::Two.next(), TakeIndex::Three);
        assert_eq!(TakeIndex::Three.next(), TakeIndex::One);
    }

    #[test]
    fn test_take_set_full() {
        let mut takes = TakeSet::default();
        assert!(!takes.is_full());
        takes.set(TakeIndex::One, media("t1"));
        takes.set(TakeIndex::Two, media("t2"));
        assert!(!takes.is_full());
        takes.set(TakeIndex::Three, media("t3"));
        assert!(takes.is_full());
        assert_eq!(takes.get(TakeIndex::Two), Some(&media("t2")));
    }

    #[test]
    fn test_media_source_fallback() {
        let stored = MediaSource::Stored(media("remote-key"));
        assert_eq!(stored.fallback_ref(), media("remote-key"));

        let raw = MediaSource::Raw {
            uri: "blob:local-recording".into(),
            bytes: vec![1, 2, 3],
        };
        assert_eq!(raw.fallback_ref(), media("blob:local-recording"));
    }

    #[test]
    fn test_grid_state_serde_round_trip() {
        let mut grid = GridState::new_generation();
        grid.slots[3].video = Some(media("clip"));
        grid.slots[3].takes.set(TakeIndex::One, media("clip"));
        grid.contributions.push(Contribution {
            slot: 3,
            owner_id: Uuid::new_v4(),
            owner_email: "a@x".into(),
            timestamp: Utc::now(),
        });

        let json = serde_json::to_string(&grid).unwrap();
        let restored: GridState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, grid);
    }
}
