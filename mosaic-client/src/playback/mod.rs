//! Multi-stream synchronized playback
//!
//! Keeps the session's loaded media elements (16 slots × up to 3 takes)
//! in lockstep: coordinated batched start once every eligible element is
//! buffered, periodic snap-based drift correction against a per-take
//! reference element, and synchronous take-cycling on a fixed interval.

pub mod element;
pub mod engine;

pub use element::{MediaElement, Readiness};
pub use engine::{SyncEngine, SyncHandles};
