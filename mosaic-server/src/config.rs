//! Server configuration
//!
//! Encode targets are fixed per deployment, not per request: every clip
//! entering the mosaic is conformed to the same frame rate, resolution,
//! pixel format and audio layout before any concatenation or stacking.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Transcode targets and quality bounds for the composition pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Common frame rate all inputs are conformed to
    pub target_fps: u32,
    /// Per-slot clip width before stacking
    pub target_width: u32,
    /// Per-slot clip height before stacking
    pub target_height: u32,
    /// Common audio sample rate
    pub audio_rate: u32,
    /// Bounded-quality re-encode: constant rate factor
    pub crf: u32,
    /// x264 speed preset
    pub preset: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_fps: 30,
            target_width: 1280,
            target_height: 720,
            audio_rate: 44_100,
            crf: 23,
            preset: "veryfast".into(),
        }
    }
}

/// Full server configuration assembled in main from CLI/env/file
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// SQLite database path
    pub database: PathBuf,
    /// Root folder for stored media blobs and pipeline scratch space
    pub media_root: PathBuf,
    /// Public base URL media keys resolve under
    pub public_base_url: String,
    /// ffmpeg binary (name or absolute path)
    pub ffmpeg_binary: String,
    /// Mail API endpoint for distribution notifications; None disables
    /// notification entirely
    pub mail_endpoint: Option<String>,
    pub pipeline: PipelineConfig,
    pub shared: mosaic_common::config::MosaicConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.target_fps, 30);
        assert_eq!(config.target_width, 1280);
        assert_eq!(config.target_height, 720);
        assert_eq!(config.audio_rate, 44_100);
    }
}
