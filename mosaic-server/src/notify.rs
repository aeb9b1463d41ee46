//! Distribution notifications
//!
//! The pipeline tells recipients where the finished mosaic lives. Mail
//! transport itself is external; this module speaks to a mail API over
//! HTTP and keeps the attach-or-link policy: the file rides along only
//! when it fits under the configured ceiling.

use async_trait::async_trait;
use base64::Engine as _;
use mosaic_common::{Error, Result};
use reqwest::Client;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// One outgoing notification
#[derive(Debug, Clone)]
pub struct Notification {
    /// Already deduplicated by the caller
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    /// Attached file, already vetted against the size ceiling
    pub attachment: Option<AttachmentData>,
}

#[derive(Debug, Clone)]
pub struct AttachmentData {
    pub filename: String,
    pub content: Vec<u8>,
}

impl AttachmentData {
    /// Read a file for attaching, or `None` when it does not fit under
    /// `ceiling_bytes` (link-only delivery)
    pub fn read_if_under(path: &Path, ceiling_bytes: u64) -> Result<Option<Self>> {
        let size = std::fs::metadata(path)?.len();
        if size >= ceiling_bytes {
            return Ok(None);
        }
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mosaic.mp4".into());
        Ok(Some(Self {
            filename,
            content: std::fs::read(path)?,
        }))
    }
}

/// Notification delivery, consumed by the pipeline
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<()>;
}

#[derive(Serialize)]
struct MailRequest<'a> {
    to: &'a [String],
    subject: &'a str,
    body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    attachment: Option<MailAttachment>,
}

#[derive(Serialize)]
struct MailAttachment {
    filename: String,
    /// Base64-encoded content
    content: String,
}

/// Mail-API client: one HTTP POST per notification
pub struct MailerClient {
    http_client: Client,
    endpoint: String,
}

impl MailerClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http_client: Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .map_err(|e| Error::Http(e.to_string()))?,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Notifier for MailerClient {
    async fn send(&self, notification: Notification) -> Result<()> {
        let request = MailRequest {
            to: &notification.recipients,
            subject: &notification.subject,
            body: &notification.body,
            attachment: notification.attachment.map(|a| MailAttachment {
                filename: a.filename,
                content: base64::engine::general_purpose::STANDARD.encode(a.content),
            }),
        };
        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Distribution(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::Distribution(format!(
                "Mail API returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Drops notifications on the floor; used when no mail endpoint is
/// configured
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn send(&self, notification: Notification) -> Result<()> {
        tracing::debug!(
            "Notification suppressed (no mail endpoint): {} recipients",
            notification.recipients.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_attachment_under_ceiling() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 100]).unwrap();

        let attachment = AttachmentData::read_if_under(file.path(), 1_000).unwrap();
        assert_eq!(attachment.unwrap().content.len(), 100);
    }

    #[test]
    fn test_attachment_at_or_over_ceiling_is_link_only() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 100]).unwrap();

        assert!(AttachmentData::read_if_under(file.path(), 100).unwrap().is_none());
        assert!(AttachmentData::read_if_under(file.path(), 50).unwrap().is_none());
    }
}
