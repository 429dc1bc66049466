//! Filesystem archive holding one directory per article: the rendered page
//! plus, at most, one stored attachment under a fixed name.

use std::error::Error as StdError;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use futures::{StreamExt, pin_mut};
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};

/// Fixed name an attachment is stored under inside its article directory.
/// The submitter-supplied filename is never used as a path component.
pub const UPLOAD_FILE_NAME: &str = "upload";
/// Fixed name of the rendered page inside its article directory.
pub const PAGE_FILE_NAME: &str = "index.html";

/// Errors that can occur while interacting with the article archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("invalid archive path")]
    InvalidPath,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("uploaded file exceeds the configured size limit")]
    UploadTooLarge,
    #[error("uploaded file stream failed")]
    UploadStream {
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

/// Filesystem-backed storage rooted at the articles directory.
#[derive(Debug)]
pub struct ArticleArchive {
    root: PathBuf,
}

impl ArticleArchive {
    /// Initialise the archive rooted at the provided directory, creating it
    /// if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Create the per-article directory. Keyed by id only.
    pub async fn create_article_dir(&self, id: u64) -> Result<(), ArchiveError> {
        fs::create_dir_all(self.article_dir(id)).await?;
        Ok(())
    }

    /// Stream an attachment to `articles/<id>/upload`, enforcing the byte
    /// limit as chunks arrive. On any failure the partial file is removed so
    /// an aborted upload never leaves content on disk.
    pub async fn store_upload<S>(
        &self,
        id: u64,
        stream: S,
        limit_bytes: u64,
    ) -> Result<u64, ArchiveError>
    where
        S: futures::Stream<Item = Result<Bytes, ArchiveError>>,
    {
        let destination = self.article_dir(id).join(UPLOAD_FILE_NAME);
        let mut file = fs::File::create(&destination).await?;
        let mut total_bytes: u64 = 0;

        pin_mut!(stream);
        while let Some(chunk_result) = stream.next().await {
            let chunk = match chunk_result {
                Ok(chunk) => chunk,
                Err(err) => {
                    drop(file);
                    let _ = fs::remove_file(&destination).await;
                    return Err(err);
                }
            };

            total_bytes = total_bytes.saturating_add(chunk.len() as u64);
            if total_bytes > limit_bytes {
                drop(file);
                let _ = fs::remove_file(&destination).await;
                return Err(ArchiveError::UploadTooLarge);
            }

            if let Err(err) = file.write_all(&chunk).await {
                drop(file);
                let _ = fs::remove_file(&destination).await;
                return Err(ArchiveError::Io(err));
            }
        }

        file.flush().await?;
        Ok(total_bytes)
    }

    /// Write the rendered page for an article.
    pub async fn write_page(&self, id: u64, html: &str) -> Result<(), ArchiveError> {
        let destination = self.article_dir(id).join(PAGE_FILE_NAME);
        fs::write(destination, html).await?;
        Ok(())
    }

    /// Read a stored file for serving. Directory requests fall back to the
    /// article's `index.html`.
    pub async fn read(&self, relative: &str) -> Result<(PathBuf, Bytes), ArchiveError> {
        let mut absolute = self.resolve(relative)?;
        if fs::metadata(&absolute)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
        {
            absolute = absolute.join(PAGE_FILE_NAME);
        }
        let data = fs::read(&absolute).await?;
        Ok((absolute, Bytes::from(data)))
    }

    /// Whether the archive root is currently usable.
    pub async fn is_available(&self) -> bool {
        fs::metadata(&self.root)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
    }

    fn article_dir(&self, id: u64) -> PathBuf {
        self.root.join(id.to_string())
    }

    /// Resolve a request path inside the archive root, refusing anything
    /// that could escape it.
    fn resolve(&self, relative: &str) -> Result<PathBuf, ArchiveError> {
        let candidate = Path::new(relative);
        if candidate.is_absolute()
            || candidate
                .components()
                .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(ArchiveError::InvalidPath);
        }

        Ok(self.root.join(candidate))
    }
}
