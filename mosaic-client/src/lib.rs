//! # Mosaic Client Library (mosaic-client)
//!
//! Core of one viewing/contributing session: the replicated grid store
//! with periodic reconciliation, contribution tracking, the slot/take
//! update operations, and the multi-stream playback synchronizer that
//! keeps up to 48 loaded media elements in lockstep.
//!
//! **Architecture:** tokio cooperative tasks against shared session
//! state; cross-context coordination happens only through the periodic
//! persistence read (eventual consistency, last-writer-wins).

pub mod contributions;
pub mod persistence;
pub mod playback;
pub mod remote;
pub mod session;
pub mod store;

pub use contributions::ContributionTracker;
pub use session::GridSession;
pub use store::GridStateStore;
