//! ffmpeg invocation
//!
//! Thin wrapper over the system ffmpeg binary. Each run is one blocking
//! external invocation moved onto the blocking pool; stderr is captured
//! and surfaced in the error when the run fails.

use mosaic_common::{Error, Result};
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Client for the ffmpeg binary
#[derive(Clone)]
pub struct FfmpegClient {
    binary_path: String,
}

impl FfmpegClient {
    /// Create a client, verifying the binary is invocable
    pub fn new(binary_path: &str) -> Result<Self> {
        match Command::new(binary_path).arg("-version").output() {
            Ok(_) => Ok(Self {
                binary_path: binary_path.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::Config(format!(
                "ffmpeg binary not found: {binary_path}"
            ))),
            Err(e) => Err(Error::Config(format!("Cannot execute {binary_path}: {e}"))),
        }
    }

    /// Check whether ffmpeg is available in PATH
    pub fn is_available() -> bool {
        Command::new("ffmpeg").arg("-version").output().is_ok()
    }

    /// Run one ffmpeg invocation to completion.
    ///
    /// Any non-zero exit is a transcode failure; the caller decides
    /// whether that aborts its run.
    pub async fn run(&self, args: Vec<String>) -> Result<()> {
        debug!("ffmpeg {}", args.join(" "));
        let binary = self.binary_path.clone();
        let output = tokio::task::spawn_blocking(move || {
            Command::new(&binary)
                .arg("-hide_banner")
                .arg("-y")
                .args(&args)
                .output()
        })
        .await
        .map_err(|e| Error::Transcode(format!("Task join error: {e}")))?
        .map_err(|e| Error::Transcode(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(Error::Transcode(format!(
                "ffmpeg exited with {}: {}",
                output.status, tail
            )));
        }
        Ok(())
    }
}

/// Quote-free path rendering for argument lists
pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
