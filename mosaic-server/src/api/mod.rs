//! HTTP API for the mosaic server
//!
//! Grid snapshot read/replace, media blob storage, the composition
//! endpoints, and the SSE event stream.

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{build_router, AppContext};
