use crate::burst::DEFAULT_CAPTURE_QUALITY;
use crate::countdown::DEFAULT_COUNTDOWN_FROM;
use crate::paths::default_media_library_dir;
use crate::storage::DiskHeadroom;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraSection {
    /// Program and arguments; `{output}` and `{quality}` are substituted.
    pub command: Vec<String>,
    pub quality: f32,
    pub timeout_secs: u64,
}

impl Default for CameraSection {
    fn default() -> Self {
        Self {
            command: default_camera_command(),
            quality: DEFAULT_CAPTURE_QUALITY,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub countdown_from: u32,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            countdown_from: DEFAULT_COUNTDOWN_FROM,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Where captures are written. Relative to the data directory when unset.
    pub capture_dir: Option<PathBuf>,
    pub media_library_dir: PathBuf,
    pub min_free_disk_mb: u64,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            capture_dir: None,
            media_library_dir: default_media_library_dir(),
            min_free_disk_mb: 256,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub camera: CameraSection,
    pub session: SessionSection,
    pub storage: StorageSection,
}

impl AppConfig {
    /// Load `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: AppConfig = toml::from_str(&text).with_context(|| {
            format!("failed to parse config {} (expected TOML)", path.display())
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.camera.command.is_empty() {
            bail!("[camera].command must name a capture program");
        }
        if !(0.0..=1.0).contains(&self.camera.quality) {
            bail!("[camera].quality must be between 0.0 and 1.0");
        }
        if self.camera.timeout_secs == 0 {
            bail!("[camera].timeout_secs must be greater than 0");
        }
        Ok(())
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.camera.timeout_secs)
    }

    pub fn disk_headroom(&self) -> DiskHeadroom {
        DiskHeadroom::from_megabytes(self.storage.min_free_disk_mb)
    }

    pub fn capture_dir(&self, data_dir: &Path) -> PathBuf {
        self.storage
            .capture_dir
            .clone()
            .unwrap_or_else(|| data_dir.join("captures"))
    }
}

fn default_camera_command() -> Vec<String> {
    let command: &[&str] = if cfg!(target_os = "macos") {
        &["imagesnap", "-w", "1", "{output}"]
    } else {
        &["fswebcam", "--no-banner", "--jpeg", "{quality}", "{output}"]
    };
    command.iter().map(|arg| arg.to_string()).collect()
}

pub fn ensure_sample_config(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("failed to create config parent directory {}", parent.display())
        })?;
    }

    let sample = r#"# Camden configuration (TOML)

[camera]
# Capture program and arguments. {output} is replaced with the file to write,
# {quality} with 0-100.
# command = ["fswebcam", "--no-banner", "--jpeg", "{quality}", "{output}"]
quality = 1.0
timeout_secs = 10

[session]
# Seconds counted down after the shutter is pressed.
countdown_from = 3

[storage]
# capture_dir = "/path/to/captures"
# media_library_dir = "/home/me/Pictures/Camden"
# Refuse to capture when less than this much space is free. 0 disables.
min_free_disk_mb = 256
"#;

    std::fs::write(path, sample)
        .with_context(|| format!("failed to write sample config {}", path.display()))?;
    Ok(true)
}
