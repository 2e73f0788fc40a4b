use crate::camera::{CameraDevice, MediaLibrary};
use crate::clock::Clock;
use crate::error::CaptureError;
use crate::photos::{CapturedPhoto, PhotoStore};
use crate::plan::Orientation;
use chrono::Utc;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CAPTURE_QUALITY: f32 = 1.0;

#[derive(Debug, Clone, Copy)]
pub struct BatchRequest {
    pub orientation: Orientation,
    pub count: u32,
    pub interval: Duration,
    pub quality: f32,
}

/// One shot as the loop saw it. `photo` is `None` when the photo store write
/// failed; the image file itself still exists.
#[derive(Debug, Clone)]
pub struct ShotRecord {
    pub shot: u32,
    pub uri: PathBuf,
    pub photo: Option<CapturedPhoto>,
    pub media_copy: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub shots: Vec<ShotRecord>,
}

impl BatchReport {
    pub fn captured(&self) -> u32 {
        self.shots.len() as u32
    }

    pub fn photos(&self) -> Vec<CapturedPhoto> {
        self.shots.iter().filter_map(|s| s.photo.clone()).collect()
    }
}

/// Fires a timed burst for one orientation.
///
/// Shots are strictly sequential: each capture is awaited, persisted, then the
/// interval elapses before the next one. There is no delay after the final
/// shot. A camera failure ends the batch; persistence failures do not.
pub struct BurstCapture<'a> {
    pub camera: &'a dyn CameraDevice,
    /// `None` when media library access was not granted.
    pub media_library: Option<&'a dyn MediaLibrary>,
    pub photos: &'a PhotoStore,
    pub clock: &'a dyn Clock,
}

impl BurstCapture<'_> {
    pub async fn run<F>(
        &self,
        request: BatchRequest,
        mut on_shot: F,
    ) -> Result<BatchReport, CaptureError>
    where
        F: FnMut(&ShotRecord),
    {
        let mut report = BatchReport::default();

        for index in 0..request.count {
            let shot = index + 1;
            let photo_ref = self
                .camera
                .capture(request.quality)
                .await
                .map_err(|err| CaptureError::Camera {
                    orientation: request.orientation,
                    shot,
                    message: format!("{err:#}"),
                })?;

            let media_copy = match self.media_library {
                Some(library) => match library.save(&photo_ref.uri).await {
                    Ok(path) => Some(path),
                    Err(err) => {
                        tracing::warn!(shot, "media library save failed: {err:#}");
                        None
                    }
                },
                None => None,
            };

            let photo = match self.photos.append(photo_ref.uri.clone(), Utc::now()) {
                Ok(photo) => Some(photo),
                Err(err) => {
                    tracing::warn!(shot, "photo store append failed: {err:#}");
                    None
                }
            };

            let record = ShotRecord {
                shot,
                uri: photo_ref.uri,
                photo,
                media_copy,
            };
            on_shot(&record);
            report.shots.push(record);

            if shot < request.count {
                self.clock.sleep(request.interval).await;
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::{BatchRequest, BurstCapture};
    use crate::camera::{CameraDevice, MediaLibrary, PhotoRef, SimulatedCamera};
    use crate::clock::ManualClock;
    use crate::error::CaptureError;
    use crate::photos::PhotoStore;
    use crate::plan::Orientation;
    use crate::store::{KeyValueStore, MemoryKeyValueStore};
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;

    fn request(count: u32, interval_secs: u64) -> BatchRequest {
        BatchRequest {
            orientation: Orientation::Horizontal,
            count,
            interval: Duration::from_secs(interval_secs),
            quality: 1.0,
        }
    }

    #[tokio::test]
    async fn produces_one_photo_per_shot_and_sleeps_between_them() {
        for count in [0u32, 1, 2, 5] {
            let temp = tempdir().expect("tempdir");
            let camera = SimulatedCamera::new(temp.path());
            let photos = PhotoStore::new(Arc::new(MemoryKeyValueStore::new()));
            let clock = ManualClock::new();
            let burst = BurstCapture {
                camera: &camera,
                media_library: None,
                photos: &photos,
                clock: &clock,
            };

            let mut progress = Vec::new();
            let report = burst
                .run(request(count, 4), |record| progress.push(record.shot))
                .await
                .expect("batch");

            assert_eq!(report.captured(), count);
            assert_eq!(photos.list().len(), count as usize);
            assert_eq!(progress, (1..=count).collect::<Vec<_>>());
            let expected = Duration::from_secs(4) * count.saturating_sub(1);
            assert_eq!(clock.total_slept(), expected, "count = {count}");
        }
    }

    struct FailsOnShot {
        inner: SimulatedCamera,
        fail_on: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl CameraDevice for FailsOnShot {
        async fn capture(&self, quality: f32) -> Result<PhotoRef> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.fail_on {
                return Err(anyhow!("shutter jammed"));
            }
            self.inner.capture(quality).await
        }
    }

    #[tokio::test]
    async fn camera_failure_stops_the_batch() {
        let temp = tempdir().expect("tempdir");
        let camera = FailsOnShot {
            inner: SimulatedCamera::new(temp.path()),
            fail_on: 3,
            calls: AtomicU32::new(0),
        };
        let photos = PhotoStore::new(Arc::new(MemoryKeyValueStore::new()));
        let clock = ManualClock::new();
        let burst = BurstCapture {
            camera: &camera,
            media_library: None,
            photos: &photos,
            clock: &clock,
        };

        let err = burst
            .run(request(5, 1), |_| {})
            .await
            .expect_err("batch interrupted");
        let CaptureError::Camera { shot, message, .. } = err;
        assert_eq!(shot, 3);
        assert!(message.contains("shutter jammed"));
        assert_eq!(camera.calls.load(Ordering::SeqCst), 3);
        assert_eq!(photos.list().len(), 2);
    }

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }

        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(anyhow!("quota exceeded"))
        }
    }

    struct RecordingLibrary {
        saved: std::sync::Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl MediaLibrary for RecordingLibrary {
        async fn save(&self, uri: &Path) -> Result<PathBuf> {
            self.saved.lock().expect("lock").push(uri.to_path_buf());
            Ok(uri.to_path_buf())
        }
    }

    #[tokio::test]
    async fn persistence_failures_do_not_abort_the_batch() {
        let temp = tempdir().expect("tempdir");
        let camera = SimulatedCamera::new(temp.path());
        let photos = PhotoStore::new(Arc::new(BrokenStore));
        let library = RecordingLibrary {
            saved: std::sync::Mutex::new(Vec::new()),
        };
        let clock = ManualClock::new();
        let burst = BurstCapture {
            camera: &camera,
            media_library: Some(&library),
            photos: &photos,
            clock: &clock,
        };

        let report = burst.run(request(3, 2), |_| {}).await.expect("batch");
        assert_eq!(report.captured(), 3);
        assert!(report.photos().is_empty());
        assert!(report.shots.iter().all(|s| s.media_copy.is_some()));
        assert_eq!(library.saved.lock().expect("lock").len(), 3);
        assert_eq!(clock.sleeps().len(), 2);
    }
}
