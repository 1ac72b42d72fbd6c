//! Finished-recording persistence
//!
//! Once a movie is finalized the recorder hands its path to a `MediaLibrary`
//! and forgets about it. The library owns the file from then on: it copies
//! it into its store and removes the original after a successful copy.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::encoder::ffmpeg::sidecar_path;

/// Library errors
#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Library access denied: {0}")]
    AccessDenied(String),

    #[error("Recording not found: {0:?}")]
    SourceMissing(PathBuf),
}

pub type LibraryResult<T> = Result<T, LibraryError>;

/// Destination for finished recordings
pub trait MediaLibrary: Send + Sync {
    /// Take ownership of a finished file. Fire-and-forget.
    fn save(&self, path: PathBuf);
}

/// A library that is just a directory on disk
#[derive(Debug, Clone)]
pub struct DirectoryLibrary {
    root: PathBuf,
}

impl DirectoryLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Copy a recording (and its calibration sidecar, if any) into the
    /// library, then delete the originals. Returns the library path.
    pub async fn import(&self, source: &Path) -> LibraryResult<PathBuf> {
        self.authorize().await?;

        if !tokio::fs::try_exists(source).await? {
            return Err(LibraryError::SourceMissing(source.to_path_buf()));
        }

        let destination = self.destination_for(source).await?;
        tokio::fs::copy(source, &destination).await?;
        tokio::fs::remove_file(source).await?;

        let sidecar = sidecar_path(source);
        if tokio::fs::try_exists(&sidecar).await.unwrap_or(false) {
            let sidecar_destination = sidecar_path(&destination);
            match tokio::fs::copy(&sidecar, &sidecar_destination).await {
                Ok(_) => {
                    let _ = tokio::fs::remove_file(&sidecar).await;
                }
                Err(e) => tracing::warn!("Failed to copy calibration sidecar: {}", e),
            }
        }

        tracing::info!("Recording saved to library: {:?}", destination);
        Ok(destination)
    }

    async fn authorize(&self) -> LibraryResult<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| LibraryError::AccessDenied(format!("{:?}: {}", self.root, e)))?;

        let metadata = tokio::fs::metadata(&self.root).await?;
        if !metadata.is_dir() || metadata.permissions().readonly() {
            return Err(LibraryError::AccessDenied(format!(
                "{:?} is not a writable directory",
                self.root
            )));
        }
        Ok(())
    }

    async fn destination_for(&self, source: &Path) -> LibraryResult<PathBuf> {
        let file_name = source
            .file_name()
            .ok_or_else(|| LibraryError::SourceMissing(source.to_path_buf()))?;
        let candidate = self.root.join(file_name);
        if !tokio::fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }

        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let mut name = format!("{}_{}", stem, &suffix[..8]);
        if let Some(ext) = source.extension() {
            name.push('.');
            name.push_str(&ext.to_string_lossy());
        }
        Ok(self.root.join(name))
    }
}

impl MediaLibrary for DirectoryLibrary {
    fn save(&self, path: PathBuf) {
        let library = self.clone();
        let task = async move {
            if let Err(e) = library.import(&path).await {
                tracing::error!("Failed to save recording {:?}: {}", path, e);
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(task);
            }
            Err(_) => {
                // No ambient runtime: run the import on a throwaway one
                std::thread::spawn(move || {
                    match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                        Ok(runtime) => runtime.block_on(task),
                        Err(e) => tracing::error!("Failed to start library runtime: {}", e),
                    }
                });
            }
        }
    }
}
