use crate::storage::DiskHeadroom;
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Reference to the image data produced by one capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoRef {
    pub uri: PathBuf,
}

#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// Take one photo. `quality` ranges from 0.0 to 1.0.
    async fn capture(&self, quality: f32) -> Result<PhotoRef>;
}

#[async_trait]
pub trait MediaLibrary: Send + Sync {
    /// Copy a capture into the shared gallery, independent of the photo store.
    async fn save(&self, uri: &Path) -> Result<PathBuf>;
}

pub const OUTPUT_PLACEHOLDER: &str = "{output}";
pub const QUALITY_PLACEHOLDER: &str = "{quality}";

#[derive(Debug, Clone)]
pub struct CaptureTarget {
    pub output_dir: PathBuf,
    pub filename_prefix: String,
    pub extension: String,
    pub headroom: DiskHeadroom,
}

impl CaptureTarget {
    fn next_path(&self, index: u64) -> PathBuf {
        let timestamp = Utc::now();
        let filename = format!(
            "{}-{}-{:06}.{}",
            self.filename_prefix,
            timestamp.format("%Y%m%dT%H%M%S%.3fZ"),
            index,
            self.extension
        );
        self.output_dir.join(filename)
    }

    fn prepare(&self) -> Result<()> {
        std::fs::create_dir_all(&self.output_dir).with_context(|| {
            format!(
                "failed to create capture directory {}",
                self.output_dir.display()
            )
        })?;
        self.headroom.check(&self.output_dir)?;
        Ok(())
    }
}

/// Runs an external capture program, substituting `{output}` and `{quality}`
/// in its arguments.
#[derive(Debug)]
pub struct CommandCamera {
    program: String,
    args: Vec<String>,
    target: CaptureTarget,
    timeout: Duration,
    counter: AtomicU64,
}

impl CommandCamera {
    pub fn new(command: &[String], target: CaptureTarget, timeout: Duration) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| anyhow!("camera command is empty"))?;
        if !args.iter().any(|arg| arg.contains(OUTPUT_PLACEHOLDER)) {
            bail!("camera command must contain an {OUTPUT_PLACEHOLDER} argument");
        }
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            target,
            timeout,
            counter: AtomicU64::new(0),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn render_args(&self, output_path: &Path, quality: f32) -> Vec<String> {
        let quality = (quality.clamp(0.0, 1.0) * 100.0).round() as u32;
        self.args
            .iter()
            .map(|arg| {
                arg.replace(OUTPUT_PLACEHOLDER, &output_path.display().to_string())
                    .replace(QUALITY_PLACEHOLDER, &quality.to_string())
            })
            .collect()
    }
}

#[async_trait]
impl CameraDevice for CommandCamera {
    async fn capture(&self, quality: f32) -> Result<PhotoRef> {
        self.target.prepare()?;
        let index = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let path = self.target.next_path(index);

        let mut command = Command::new(&self.program);
        command.args(self.render_args(&path, quality));

        let status = timeout(self.timeout, command.status())
            .await
            .map_err(|_| {
                anyhow!(
                    "{} timed out after {:.0}s",
                    self.program,
                    self.timeout.as_secs_f32()
                )
            })?
            .with_context(|| format!("failed to execute {}", self.program))?;

        if !status.success() {
            bail!("{} exited with status {status}", self.program);
        }
        if !path.is_file() {
            bail!("{} did not write {}", self.program, path.display());
        }

        Ok(PhotoRef { uri: path })
    }
}

const SIMULATED_FRAME: (u32, u32) = (64, 48);

/// Writes a small placeholder PNG per capture.
#[derive(Debug)]
pub struct SimulatedCamera {
    target: CaptureTarget,
    counter: AtomicU64,
}

impl SimulatedCamera {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            target: CaptureTarget {
                output_dir: output_dir.into(),
                filename_prefix: "simulated".to_string(),
                extension: "png".to_string(),
                headroom: DiskHeadroom::DISABLED,
            },
            counter: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl CameraDevice for SimulatedCamera {
    async fn capture(&self, quality: f32) -> Result<PhotoRef> {
        self.target.prepare()?;
        let index = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let path = self.target.next_path(index);

        let shade = (quality.clamp(0.0, 1.0) * 255.0) as u8;
        let (width, height) = SIMULATED_FRAME;
        let frame = image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([shade, (x * 255 / width) as u8, (y * 255 / height) as u8])
        });
        frame
            .save(&path)
            .with_context(|| format!("failed to write simulated frame {}", path.display()))?;

        Ok(PhotoRef { uri: path })
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryMediaLibrary {
    dir: PathBuf,
}

impl DirectoryMediaLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl MediaLibrary for DirectoryMediaLibrary {
    async fn save(&self, uri: &Path) -> Result<PathBuf> {
        let name = uri
            .file_name()
            .ok_or_else(|| anyhow!("{} has no file name", uri.display()))?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create media library {}", self.dir.display()))?;
        let destination = self.dir.join(name);
        tokio::fs::copy(uri, &destination).await.with_context(|| {
            format!(
                "failed to copy {} into media library {}",
                uri.display(),
                self.dir.display()
            )
        })?;
        Ok(destination)
    }
}
