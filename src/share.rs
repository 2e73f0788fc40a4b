use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;

#[async_trait]
pub trait ShareSurface: Send + Sync {
    async fn is_available(&self) -> bool;
    async fn share(&self, uri: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareOutcome {
    Shared,
    Unavailable,
    MissingFile,
}

/// Hands a photo to the desktop's default handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemShare;

#[async_trait]
impl ShareSurface for SystemShare {
    async fn is_available(&self) -> bool {
        if cfg!(any(target_os = "macos", target_os = "windows")) {
            return true;
        }
        ["DISPLAY", "WAYLAND_DISPLAY"]
            .iter()
            .any(|var| std::env::var_os(var).is_some_and(|value| !value.is_empty()))
    }

    async fn share(&self, uri: &Path) -> Result<()> {
        opener::open(uri).with_context(|| format!("failed to open {}", uri.display()))
    }
}

/// Check availability, then share. Nothing is invoked when the surface is
/// unavailable or the image file is gone.
pub async fn share_photo(surface: &dyn ShareSurface, uri: &Path) -> Result<ShareOutcome> {
    if !uri.exists() {
        return Ok(ShareOutcome::MissingFile);
    }
    if !surface.is_available().await {
        return Ok(ShareOutcome::Unavailable);
    }
    surface.share(uri).await?;
    Ok(ShareOutcome::Shared)
}
