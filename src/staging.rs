//! Temporary on-disk staging of uploaded documents.
//!
//! Each staged copy gets a random `<uuid>.<ext>` name inside the staging
//! directory and is owned by a [`StagedFile`] guard. The guard removes the
//! file exactly once: either through [`StagedFile::cleanup`] or on drop.

use crate::document::{ContentType, Document};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("Failed to create staging directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write staged file {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Writes documents into the shared staging directory.
#[derive(Debug, Clone)]
pub struct Stager {
    dir: PathBuf,
}

impl Stager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write the document to a fresh uniquely named file.
    ///
    /// On a failed write the partial file is removed before returning.
    pub async fn stage(
        &self,
        document: &Document,
        content_type: ContentType,
    ) -> Result<StagedFile, StagingError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StagingError::CreateDir {
                path: self.dir.clone(),
                source,
            })?;

        let path = self
            .dir
            .join(format!("{}.{}", Uuid::new_v4(), content_type.extension()));

        // create_new: never clobber another request's file
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|source| StagingError::Write {
                path: path.clone(),
                source,
            })?;

        // From here on the guard owns the path, so any early return removes it.
        let staged = StagedFile {
            path,
            content_type,
            owned: true,
        };

        if let Err(source) = write_all(file, &document.data).await {
            return Err(StagingError::Write {
                path: staged.path.clone(),
                source,
            });
        }

        debug!(
            "Staged {} ({} bytes) at {:?}",
            document.display_name(),
            document.data.len(),
            staged.path
        );

        Ok(staged)
    }
}

async fn write_all(mut file: tokio::fs::File, data: &[u8]) -> std::io::Result<()> {
    file.write_all(data).await?;
    file.flush().await?;
    file.sync_all().await
}

/// Exclusive handle to a staged document. Removes the file when dropped.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    content_type: ContentType,
    owned: bool,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    /// File name without the directory, e.g. `0b6c…e1.pdf`.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Whether this handle still owns (and will remove) the file.
    #[cfg(test)]
    pub fn is_owned(&self) -> bool {
        self.owned
    }

    /// Remove the staged file. Later calls, including the one from `Drop`,
    /// do nothing.
    pub fn cleanup(&mut self) {
        if !self.owned {
            return;
        }
        self.owned = false;

        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed staged file {:?}", self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Staged file {:?} was already gone", self.path)
            }
            Err(e) => warn!("Failed to remove staged file {:?}: {}", self.path, e),
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        self.cleanup();
    }
}
