use crate::store::{KeyValueStore, PHOTOS_KEY};
use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// One stored shot. The store holds the reference, not the image bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedPhoto {
    pub id: String,
    pub uri: PathBuf,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl CapturedPhoto {
    pub fn taken_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

#[derive(Clone)]
pub struct PhotoStore {
    store: Arc<dyn KeyValueStore>,
}

impl PhotoStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Photos in append order. Unreadable or malformed data reads as empty.
    pub fn list(&self) -> Vec<CapturedPhoto> {
        match self.load() {
            Ok(photos) => photos,
            Err(err) => {
                tracing::warn!("treating photo store as empty: {err:#}");
                Vec::new()
            }
        }
    }

    /// Newest first, as the camera roll shows them.
    pub fn gallery(&self) -> Vec<CapturedPhoto> {
        let mut photos = self.list();
        photos.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        photos
    }

    pub fn find(&self, id: &str) -> Option<CapturedPhoto> {
        self.list().into_iter().find(|photo| photo.id == id)
    }

    /// Record a new capture with a time-derived id that is unique in the store.
    /// Fails without writing when the stored list cannot be read.
    pub fn append(&self, uri: PathBuf, taken_at: DateTime<Utc>) -> Result<CapturedPhoto> {
        let mut photos = self.load()?;
        let timestamp = taken_at.timestamp_millis();
        let mut candidate = timestamp;
        while photos.iter().any(|photo| photo.id == candidate.to_string()) {
            candidate += 1;
        }

        let photo = CapturedPhoto {
            id: candidate.to_string(),
            uri,
            timestamp,
        };
        photos.push(photo.clone());
        self.save(&photos)?;
        Ok(photo)
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        let mut photos = self.load()?;
        let before = photos.len();
        photos.retain(|photo| photo.id != id);
        if photos.len() == before {
            return Ok(false);
        }
        self.save(&photos)?;
        Ok(true)
    }

    fn load(&self) -> Result<Vec<CapturedPhoto>> {
        let Some(raw) = self.store.get(PHOTOS_KEY)? else {
            return Ok(Vec::new());
        };
        serde_json::from_str(&raw).context("stored photos are not valid JSON")
    }

    fn save(&self, photos: &[CapturedPhoto]) -> Result<()> {
        let encoded = serde_json::to_string(photos).context("failed to encode photos")?;
        self.store
            .set(PHOTOS_KEY, &encoded)
            .context("failed to write photos")
    }
}
