use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

impl PermissionStatus {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionStatus::Granted)
    }

    pub fn needs_user_action(&self) -> bool {
        !self.is_granted()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionSnapshot {
    pub camera: PermissionStatus,
    pub media: PermissionStatus,
}

impl PermissionSnapshot {
    pub fn granted() -> Self {
        Self {
            camera: PermissionStatus::Granted,
            media: PermissionStatus::Granted,
        }
    }

    /// Capture is only allowed when camera and media access are both granted.
    pub fn allows_capture(&self) -> bool {
        self.camera.is_granted() && self.media.is_granted()
    }
}

#[async_trait]
pub trait PermissionGate: Send + Sync {
    async fn check(&self) -> PermissionSnapshot;
    /// Ask for access. May prompt and suspend until answered; never retried
    /// automatically.
    async fn request(&self) -> PermissionSnapshot;
}

/// Fixed answers, used by the simulated camera and tests.
#[derive(Debug, Clone, Copy)]
pub struct StaticPermissionGate {
    snapshot: PermissionSnapshot,
}

impl StaticPermissionGate {
    pub fn new(snapshot: PermissionSnapshot) -> Self {
        Self { snapshot }
    }

    pub fn granted() -> Self {
        Self::new(PermissionSnapshot::granted())
    }
}

#[async_trait]
impl PermissionGate for StaticPermissionGate {
    async fn check(&self) -> PermissionSnapshot {
        self.snapshot
    }

    async fn request(&self) -> PermissionSnapshot {
        self.snapshot
    }
}

/// Permissions derived from the host: the capture program must resolve and the
/// media library directory must be writable.
#[derive(Debug, Clone)]
pub struct HostPermissionGate {
    camera_program: String,
    media_dir: PathBuf,
}

impl HostPermissionGate {
    pub fn new(camera_program: impl Into<String>, media_dir: impl Into<PathBuf>) -> Self {
        Self {
            camera_program: camera_program.into(),
            media_dir: media_dir.into(),
        }
    }

    fn camera_status(&self) -> PermissionStatus {
        if resolve_program(&self.camera_program).is_some() {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        }
    }

    fn media_status(&self) -> PermissionStatus {
        match std::fs::metadata(&self.media_dir) {
            Ok(meta) if meta.is_dir() && !meta.permissions().readonly() => {
                PermissionStatus::Granted
            }
            Ok(_) => PermissionStatus::Denied,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                PermissionStatus::Undetermined
            }
            Err(_) => PermissionStatus::Denied,
        }
    }
}

#[async_trait]
impl PermissionGate for HostPermissionGate {
    async fn check(&self) -> PermissionSnapshot {
        PermissionSnapshot {
            camera: self.camera_status(),
            media: self.media_status(),
        }
    }

    async fn request(&self) -> PermissionSnapshot {
        if self.media_status() == PermissionStatus::Undetermined {
            if let Err(err) = tokio::fs::create_dir_all(&self.media_dir).await {
                tracing::warn!(
                    "unable to create media library {}: {err}",
                    self.media_dir.display()
                );
            }
        }
        self.check().await
    }
}

pub fn permission_help_message(snapshot: &PermissionSnapshot) -> String {
    let mut missing = Vec::new();
    if snapshot.camera.needs_user_action() {
        missing.push("camera (install the capture program or fix [camera].command)");
    }
    if snapshot.media.needs_user_action() {
        missing.push("media library (make [storage].media_library_dir writable)");
    }
    format!(
        "Camera and media library permissions are required. Missing: {}.",
        missing.join(", ")
    )
}

fn resolve_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let search_path = std::env::var_os("PATH")?;
    std::env::split_paths(&search_path)
        .map(|dir| dir.join(program))
        .find(|path| path.is_file())
}
