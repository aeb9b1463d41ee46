//! Media element abstraction
//!
//! The synchronizer never touches a real video element; the host
//! environment hands it handles implementing [`MediaElement`]. All
//! methods are synchronous property access, mirroring how a host media
//! element exposes its state.

/// How much of the stream an element has buffered.
///
/// Ordered: the coordinated start requires [`Readiness::EnoughData`]
/// from every eligible element (stricter than "can start"); the bounded
/// fallback accepts [`Readiness::FutureData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Readiness {
    /// No data at all
    Nothing,
    /// Duration/dimensions known, no frames
    Metadata,
    /// Data for the current position only
    CurrentData,
    /// Enough to advance at least a little
    FutureData,
    /// Enough to play through at the current download rate
    EnoughData,
}

/// Handle to one video element owned by the host session
pub trait MediaElement: Send + Sync {
    /// Assign the playable URL; clears any previous source state
    fn set_source(&self, url: &str);

    /// Currently assigned URL, if any. Elements without a source are
    /// not eligible for coordinated start or drift correction.
    fn source(&self) -> Option<String>;

    fn readiness(&self) -> Readiness;

    /// Playback position in seconds
    fn current_time(&self) -> f64;

    /// Snap the position; never eased
    fn seek(&self, position: f64);

    fn play(&self);

    fn pause(&self);

    fn is_paused(&self) -> bool;

    /// Toggle visual opacity and input responsiveness only; playback
    /// continues regardless of visibility
    fn set_visible(&self, visible: bool);
}
