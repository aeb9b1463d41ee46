//! # Mosaic Common Library
//!
//! Shared code for the mosaic client and server including:
//! - Grid data model (slots, takes, contributions)
//! - Event types (MosaicEvent enum) and EventBus
//! - Error taxonomy
//! - Storage channel keys
//! - Configuration loading

pub mod channel;
pub mod config;
pub mod error;
pub mod events;
pub mod model;

pub use error::{Error, Result};
pub use model::{GridState, MediaRef, SLOT_COUNT, TAKE_COUNT};
