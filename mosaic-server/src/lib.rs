//! # Mosaic Server Library (mosaic-server)
//!
//! Server side of the collaborative video wall: grid snapshot
//! persistence (SQLite), media blob storage, the composition pipeline
//! (per-slot take merge, normalization, 4×4 mosaic stitch via ffmpeg),
//! distribution, and the HTTP/SSE control surface.

pub mod api;
pub mod config;
pub mod db;
pub mod notify;
pub mod pipeline;
pub mod storage;
