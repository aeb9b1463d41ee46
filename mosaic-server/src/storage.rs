//! Media blob storage
//!
//! Disk-backed store under one root folder. Keys are opaque to callers;
//! here they map to files, and public URLs are derived from the
//! configured base. The composition pipeline reads inputs through
//! `path_for` and publishes its output through `store`.

use mosaic_common::model::MediaRef;
use mosaic_common::{Error, Result};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub struct MediaStore {
    root: PathBuf,
    public_base_url: String,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            public_base_url: public_base_url.into(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist raw content under a fresh key
    pub fn store(&self, bytes: &[u8]) -> Result<MediaRef> {
        let key = Uuid::new_v4().to_string();
        std::fs::write(self.blob_path(&key), bytes)?;
        Ok(MediaRef::new(key))
    }

    /// Publish an existing file (pipeline output) under a fresh key
    pub fn store_file(&self, source: &Path) -> Result<MediaRef> {
        let key = Uuid::new_v4().to_string();
        std::fs::copy(source, self.blob_path(&key))?;
        Ok(MediaRef::new(key))
    }

    /// Local path of a stored blob, if present
    pub fn path_for(&self, media: &MediaRef) -> Option<PathBuf> {
        // Keys never address outside the root
        if media.as_str().contains(['/', '\\']) || media.as_str().contains("..") {
            return None;
        }
        let path = self.blob_path(media.as_str());
        path.exists().then_some(path)
    }

    /// Public URL a stored key resolves under
    pub fn url_for(&self, media: &MediaRef) -> String {
        format!("{}/media/{}/raw", self.public_base_url, media)
    }

    /// Resolve a reference to a playable URL; `None` for unknown keys
    pub fn resolve(&self, media: &MediaRef) -> Option<String> {
        self.path_for(media).map(|_| self.url_for(media))
    }

    pub fn read(&self, media: &MediaRef) -> Result<Vec<u8>> {
        let path = self
            .path_for(media)
            .ok_or_else(|| Error::NotFound(format!("media {media}")))?;
        Ok(std::fs::read(path)?)
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}
