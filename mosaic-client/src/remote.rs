//! HTTP implementations of the external capabilities
//!
//! A session running against the mosaic server consumes its grid
//! snapshot endpoints for persistence, its media endpoints for storage,
//! and its finalize endpoint as the composition trigger. Each client is
//! a thin reqwest wrapper; the traits stay the seam so tests and other
//! backends plug in freely.

use crate::persistence::GridPersistence;
use crate::session::{CompositionTrigger, MediaStorage};
use async_trait::async_trait;
use base64::Engine as _;
use mosaic_common::model::{GridState, MediaRef};
use mosaic_common::{Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

/// Default timeout for snapshot and resolve calls
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Finalize runs the whole transcode pipeline; give it room
const FINALIZE_TIMEOUT: Duration = Duration::from_secs(600);

fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Http(e.to_string()))
}

/// Grid persistence over the server's snapshot endpoints
pub struct HttpGridPersistence {
    http_client: Client,
    base_url: String,
}

impl HttpGridPersistence {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http_client: http_client(DEFAULT_TIMEOUT)?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl GridPersistence for HttpGridPersistence {
    async fn load_grid(&self) -> GridState {
        let url = format!("{}/grid", self.base_url);
        let response = match self.http_client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("Grid fetch failed, substituting empty default: {}", e);
                return GridState::new_generation();
            }
        };
        match response.json::<GridState>().await {
            Ok(grid) if grid.is_well_formed() => grid,
            Ok(_) => {
                warn!("Grid payload has wrong shape, substituting empty default");
                GridState::new_generation()
            }
            Err(e) => {
                warn!("Grid payload unreadable, substituting empty default: {}", e);
                GridState::new_generation()
            }
        }
    }

    async fn save_grid(&self, state: &GridState) -> Result<()> {
        let url = format!("{}/grid", self.base_url);
        let response = self
            .http_client
            .put(&url)
            .json(state)
            .send()
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::Persistence(format!(
                "Grid replace returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct UploadRequest<'a> {
    uri: &'a str,
    /// Base64-encoded content
    content: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    key: String,
}

#[derive(Deserialize)]
struct ResolveResponse {
    url: String,
}

/// Media storage over the server's media endpoints
pub struct HttpMediaStorage {
    http_client: Client,
    base_url: String,
}

impl HttpMediaStorage {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http_client: http_client(DEFAULT_TIMEOUT)?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl MediaStorage for HttpMediaStorage {
    async fn resolve(&self, media: &MediaRef) -> Result<Option<String>> {
        let url = format!("{}/media/{}/url", self.base_url, media);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::Http(format!(
                "Resolve returned {}",
                response.status()
            )));
        }
        let body: ResolveResponse = response
            .json()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Some(body.url))
    }

    async fn upload(&self, uri: &str, bytes: &[u8]) -> Result<MediaRef> {
        let url = format!("{}/media", self.base_url);
        let request = UploadRequest {
            uri,
            content: base64::engine::general_purpose::STANDARD.encode(bytes),
        };
        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Upload(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::Upload(format!(
                "Upload returned {}",
                response.status()
            )));
        }
        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| Error::Upload(e.to_string()))?;
        Ok(MediaRef::new(body.key))
    }
}

#[derive(Serialize)]
struct FinalizeRequest {
    generation: Uuid,
    slots: Vec<MediaRef>,
    recipients: Vec<String>,
}

#[derive(Deserialize)]
struct FinalizeResponse {
    url: String,
}

/// Composition trigger over the server's finalize endpoint
pub struct HttpCompositionTrigger {
    http_client: Client,
    base_url: String,
    recipients: Vec<String>,
}

impl HttpCompositionTrigger {
    pub fn new(base_url: impl Into<String>, recipients: Vec<String>) -> Result<Self> {
        Ok(Self {
            http_client: http_client(FINALIZE_TIMEOUT)?,
            base_url: base_url.into(),
            recipients,
        })
    }
}

#[async_trait]
impl CompositionTrigger for HttpCompositionTrigger {
    async fn finalize(&self, generation: Uuid, videos: Vec<MediaRef>) -> Result<String> {
        let url = format!("{}/compose/finalize", self.base_url);
        let request = FinalizeRequest {
            generation,
            slots: videos,
            recipients: self.recipients.clone(),
        };
        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::Http(format!(
                "Finalize returned {}",
                response.status()
            )));
        }
        let body: FinalizeResponse = response
            .json()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(body.url)
    }
}
