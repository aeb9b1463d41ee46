//! Composition pipeline
//!
//! Turns a completed grid into one final mosaic video: per-slot take
//! merge, normalization to common encode targets, the deterministic 4×4
//! stitch, and distribution.
//!
//! Failure semantics: transcode and composition failures abort the run
//! (no partial mosaic ever leaves this module); storage-publish and
//! notification failures degrade (logged, the run still reports success
//! with a fallback local URL).
//!
//! Concurrent runs are not mutually serialized. Two finalize calls
//! racing will both transcode and both publish; the last distribution
//! wins whatever references point at it.

pub mod ffmpeg;

use crate::config::PipelineConfig;
use crate::notify::{AttachmentData, Notification, Notifier};
use crate::storage::MediaStore;
use ffmpeg::{path_arg, FfmpegClient};
use mosaic_common::events::{EventBus, MosaicEvent};
use mosaic_common::model::MediaRef;
use mosaic_common::{Error, Result, SLOT_COUNT, TAKE_COUNT};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct CompositionPipeline {
    ffmpeg: FfmpegClient,
    media: Arc<MediaStore>,
    notifier: Arc<dyn Notifier>,
    bus: EventBus,
    config: PipelineConfig,
    /// Per-run scratch dirs live under here
    work_root: PathBuf,
    attachment_ceiling_bytes: u64,
}

impl CompositionPipeline {
    pub fn new(
        ffmpeg: FfmpegClient,
        media: Arc<MediaStore>,
        notifier: Arc<dyn Notifier>,
        bus: EventBus,
        config: PipelineConfig,
        attachment_ceiling_bytes: u64,
    ) -> Result<Self> {
        let work_root = media.root().join("work");
        std::fs::create_dir_all(&work_root)?;
        Ok(Self {
            ffmpeg,
            media,
            notifier,
            bus,
            config,
            work_root,
            attachment_ceiling_bytes,
        })
    }

    /// Merge three takes of one slot into a single web-ready clip:
    /// conform each to the common encode targets, then concatenate.
    pub async fn merge_takes(&self, takes: &[PathBuf]) -> Result<PathBuf> {
        if takes.len() != TAKE_COUNT {
            return Err(Error::Validation(format!(
                "merge requires exactly {TAKE_COUNT} takes, got {}",
                takes.len()
            )));
        }
        let work = self.scratch_dir()?;

        let mut conformed = Vec::with_capacity(TAKE_COUNT);
        for (i, take) in takes.iter().enumerate() {
            let out = work.join(format!("take-{i}.mp4"));
            self.ffmpeg
                .run(normalize_args(take, &out, &self.config))
                .await?;
            conformed.push(out);
        }

        let list = work.join("concat.txt");
        std::fs::write(&list, concat_list(&conformed))?;
        let merged = work.join("merged.mp4");
        self.ffmpeg.run(concat_args(&list, &merged)).await?;
        Ok(merged)
    }

    /// Scale-and-letterbox one clip to the pipeline target with the
    /// bounded-quality preset
    pub async fn normalize(&self, clip: &Path) -> Result<PathBuf> {
        let work = self.scratch_dir()?;
        let out = work.join("normalized.mp4");
        self.ffmpeg
            .run(normalize_args(clip, &out, &self.config))
            .await?;
        Ok(out)
    }

    /// Stitch 16 normalized clips into the silent 4×4 mosaic,
    /// slot order row-major, left-to-right top-to-bottom
    pub async fn compose_mosaic(&self, clips: &[PathBuf]) -> Result<PathBuf> {
        if clips.len() != SLOT_COUNT {
            return Err(Error::Validation(format!(
                "mosaic requires exactly {SLOT_COUNT} clips, got {}",
                clips.len()
            )));
        }
        let work = self.scratch_dir()?;
        let out = work.join("mosaic.mp4");
        self.ffmpeg
            .run(mosaic_args(clips, &out, &self.config))
            .await?;
        Ok(out)
    }

    /// Publish the final clip and notify recipients.
    ///
    /// Never fails: storage or notification trouble degrades to a local
    /// URL / skipped mail, logged.
    pub async fn distribute(&self, clip: &Path, recipients: &[String]) -> String {
        let url = match self.media.store_file(clip) {
            Ok(media) => self.media.url_for(&media),
            Err(e) => {
                warn!("Final clip publish failed, reporting local URL: {}", e);
                format!("file://{}", clip.display())
            }
        };

        let recipients = dedupe(recipients);
        if !recipients.is_empty() {
            let attachment = match AttachmentData::read_if_under(clip, self.attachment_ceiling_bytes)
            {
                Ok(a) => a,
                Err(e) => {
                    warn!("Attachment read failed, sending link-only: {}", e);
                    None
                }
            };
            let notification = Notification {
                recipients,
                subject: "Your mosaic is ready".into(),
                body: format!("The finished mosaic video is available at {url}"),
                attachment,
            };
            if let Err(e) = self.notifier.send(notification).await {
                warn!("Notification send failed: {}", e);
            }
        }
        url
    }

    /// Full run for a completed generation: normalize all 16 canonical
    /// clips, stitch, distribute. Transcode failure anywhere aborts with
    /// no artifact.
    pub async fn finalize(
        &self,
        generation: Uuid,
        slots: &[MediaRef],
        recipients: &[String],
    ) -> Result<String> {
        if slots.len() != SLOT_COUNT {
            return Err(Error::Validation(format!(
                "finalize requires exactly {SLOT_COUNT} media references, got {}",
                slots.len()
            )));
        }
        info!("Composing mosaic for generation {}", generation);

        let mut normalized = Vec::with_capacity(SLOT_COUNT);
        for media in slots {
            let path = self
                .media
                .path_for(media)
                .ok_or_else(|| Error::Transcode(format!("media {media} is not stored here")))?;
            normalized.push(self.normalize(&path).await?);
        }

        let mosaic = self.compose_mosaic(&normalized).await?;
        let url = self.distribute(&mosaic, recipients).await;

        self.bus.emit_lossy(MosaicEvent::CompositionFinished {
            generation,
            url: url.clone(),
            timestamp: chrono::Utc::now(),
        });
        info!("Mosaic for generation {} published at {}", generation, url);
        Ok(url)
    }

    fn scratch_dir(&self) -> Result<PathBuf> {
        let dir = self.work_root.join(Uuid::new_v4().to_string());
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

/// Conform one input to the common targets: scale into the box, pad to
/// letterbox, fixed fps, yuv420p, AAC stereo at the common rate
fn normalize_args(input: &Path, output: &Path, config: &PipelineConfig) -> Vec<String> {
    let (w, h) = (config.target_width, config.target_height);
    vec![
        "-i".into(),
        path_arg(input),
        "-vf".into(),
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,\
             pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,fps={fps},format=yuv420p",
            fps = config.target_fps
        ),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        config.preset.clone(),
        "-crf".into(),
        config.crf.to_string(),
        "-c:a".into(),
        "aac".into(),
        "-ar".into(),
        config.audio_rate.to_string(),
        "-ac".into(),
        "2".into(),
        "-movflags".into(),
        "+faststart".into(),
        path_arg(output),
    ]
}

/// Concat demuxer list for already-conformed clips
fn concat_list(clips: &[PathBuf]) -> String {
    clips
        .iter()
        .map(|c| format!("file '{}'\n", path_arg(c).replace('\'', "'\\''")))
        .collect()
}

fn concat_args(list: &Path, output: &Path) -> Vec<String> {
    vec![
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        path_arg(list),
        // Inputs share codecs after normalization; stream copy
        "-c".into(),
        "copy".into(),
        path_arg(output),
    ]
}

/// 4 rows of 4 horizontally stacked clips, rows stacked vertically,
/// audio dropped
fn mosaic_args(clips: &[PathBuf], output: &Path, config: &PipelineConfig) -> Vec<String> {
    let mut args = Vec::new();
    for clip in clips {
        args.push("-i".into());
        args.push(path_arg(clip));
    }

    let mut filter = String::new();
    for row in 0..4 {
        for col in 0..4 {
            filter.push_str(&format!("[{}:v]", row * 4 + col));
        }
        filter.push_str(&format!("hstack=inputs=4[r{row}];"));
    }
    filter.push_str("[r0][r1][r2][r3]vstack=inputs=4[grid]");

    args.extend([
        "-filter_complex".into(),
        filter,
        "-map".into(),
        "[grid]".into(),
        "-an".into(),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        config.preset.clone(),
        "-crf".into(),
        config.crf.to_string(),
        "-movflags".into(),
        "+faststart".into(),
        path_arg(output),
    ]);
    args
}

/// First occurrence wins; order preserved
fn dedupe(recipients: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    recipients
        .iter()
        .filter(|r| seen.insert(r.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[test]
    fn test_normalize_args_carry_common_targets() {
        let config = PipelineConfig::default();
        let args = normalize_args(Path::new("/in.mov"), Path::new("/out.mp4"), &config);
        let joined = args.join(" ");

        // 24/25/30 fps inputs all leave at the single target rate
        assert!(joined.contains("fps=30"));
        assert!(joined.contains("scale=1280:720"));
        assert!(joined.contains("pad=1280:720"));
        assert!(joined.contains("format=yuv420p"));
        assert!(joined.contains("-ar 44100"));
        assert!(joined.contains("-ac 2"));
        assert!(joined.contains("-crf 23"));
    }

    #[test]
    fn test_mosaic_filtergraph_is_row_major() {
        let clips: Vec<PathBuf> = (0..16).map(|i| PathBuf::from(format!("/c{i}.mp4"))).collect();
        let args = mosaic_args(&clips, Path::new("/grid.mp4"), &PipelineConfig::default());

        let filter_pos = args.iter().position(|a| a == "-filter_complex").unwrap();
        let filter = &args[filter_pos + 1];
        assert!(filter.starts_with("[0:v][1:v][2:v][3:v]hstack=inputs=4[r0];"));
        assert!(filter.contains("[12:v][13:v][14:v][15:v]hstack=inputs=4[r3];"));
        assert!(filter.ends_with("[r0][r1][r2][r3]vstack=inputs=4[grid]"));

        // Output is video-only
        assert!(args.contains(&"-an".to_string()));
        // All 16 inputs present
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 16);
    }

    #[test]
    fn test_concat_list_quotes_paths() {
        let list = concat_list(&[PathBuf::from("/work/take-0.mp4"), PathBuf::from("/work/o'k.mp4")]);
        assert!(list.contains("file '/work/take-0.mp4'\n"));
        assert!(list.contains("'\\''"));
    }

    #[test]
    fn test_dedupe_preserves_first_occurrence_order() {
        let recipients = vec![
            "a@x".to_string(),
            "b@x".to_string(),
            "a@x".to_string(),
            "c@x".to_string(),
        ];
        assert_eq!(dedupe(&recipients), vec!["a@x", "b@x", "c@x"]);
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, notification: Notification) -> Result<()> {
            self.sent.lock().unwrap().push(notification);
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send(&self, _notification: Notification) -> Result<()> {
            Err(Error::Distribution("mail API down".into()))
        }
    }

    fn pipeline_with(
        notifier: Arc<dyn Notifier>,
        ceiling: u64,
    ) -> (tempfile::TempDir, CompositionPipeline) {
        let dir = tempfile::tempdir().unwrap();
        let media = Arc::new(MediaStore::new(dir.path(), "http://localhost:5750").unwrap());
        // Construction probing is skipped: distribute never invokes ffmpeg
        let ffmpeg = FfmpegClient::new("true").unwrap();
        let pipeline = CompositionPipeline::new(
            ffmpeg,
            media,
            notifier,
            EventBus::new(16),
            PipelineConfig::default(),
            ceiling,
        )
        .unwrap();
        (dir, pipeline)
    }

    #[tokio::test]
    async fn test_distribute_publishes_and_notifies_once() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (dir, pipeline) = pipeline_with(notifier.clone(), 1_000_000);

        let clip = dir.path().join("final.mp4");
        std::fs::write(&clip, b"final clip").unwrap();

        let url = pipeline
            .distribute(&clip, &["a@x".into(), "a@x".into(), "b@x".into()])
            .await;
        assert!(url.contains("/media/"));

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipients, vec!["a@x", "b@x"]);
        assert!(sent[0].body.contains(&url));
        assert!(sent[0].attachment.is_some());
    }

    #[tokio::test]
    async fn test_distribute_over_ceiling_is_link_only() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (dir, pipeline) = pipeline_with(notifier.clone(), 4);

        let clip = dir.path().join("final.mp4");
        std::fs::write(&clip, b"much larger than four bytes").unwrap();

        let url = pipeline.distribute(&clip, &["a@x".into()]).await;

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].attachment.is_none());
        assert!(sent[0].body.contains(&url));
    }

    #[tokio::test]
    async fn test_distribute_no_recipients_sends_nothing() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (dir, pipeline) = pipeline_with(notifier.clone(), 1_000_000);

        let clip = dir.path().join("final.mp4");
        std::fs::write(&clip, b"clip").unwrap();
        pipeline.distribute(&clip, &[]).await;
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_distribute_survives_notifier_failure() {
        let (dir, pipeline) = pipeline_with(Arc::new(FailingNotifier), 1_000_000);

        let clip = dir.path().join("final.mp4");
        std::fs::write(&clip, b"clip").unwrap();

        // Distribution failure is non-fatal; the URL still comes back
        let url = pipeline.distribute(&clip, &["a@x".into()]).await;
        assert!(url.contains("/media/"));
    }

    #[tokio::test]
    async fn test_finalize_rejects_wrong_count() {
        let (_dir, pipeline) = pipeline_with(Arc::new(RecordingNotifier::default()), 1_000_000);
        let slots = vec![MediaRef::new("a"); 15];
        let result = pipeline.finalize(Uuid::new_v4(), &slots, &[]).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_merge_rejects_wrong_count() {
        let (_dir, pipeline) = pipeline_with(Arc::new(RecordingNotifier::default()), 1_000_000);
        let takes = vec![PathBuf::from("/a.mp4"), PathBuf::from("/b.mp4")];
        let result = pipeline.merge_takes(&takes).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
