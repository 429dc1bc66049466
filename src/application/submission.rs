//! The submission pipeline: validate, allocate an id, store the optional
//! upload, render the static page, then persist the index entry. Each step
//! only runs once the previous one succeeded, so the store never references
//! an article whose page is missing.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::article::{Article, MediaKind, validate_submission};
use crate::domain::error::DomainError;
use crate::infra::articles::{ArchiveError, ArticleArchive};
use crate::presentation::views::render_article_page;

use super::store::{ArticleStore, StoreError};

/// Stream type to name when a submission carries no file part.
pub type EmptyUpload = futures::stream::Empty<Result<Bytes, ArchiveError>>;

/// The optional file part of a submission. The filename is used only to
/// classify the media kind; the content is stored under a fixed name.
pub struct UploadPart<S> {
    pub filename: String,
    pub stream: S,
}

/// One validated-not-yet-processed form submission.
pub struct NewSubmission<S> {
    pub title: String,
    pub message: String,
    pub upload: Option<UploadPart<S>>,
}

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error("uploaded file exceeds the configured size limit")]
    UploadTooLarge,
    #[error("uploaded file stream failed")]
    UploadStream(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("article storage failed")]
    Storage(#[source] ArchiveError),
    #[error("article page rendering failed")]
    Render(#[source] askama::Error),
    #[error("article index persistence failed")]
    Store(#[from] StoreError),
}

/// Orchestrates one submission end to end.
pub struct SubmissionService {
    store: Arc<ArticleStore>,
    archive: Arc<ArticleArchive>,
    upload_limit_bytes: u64,
}

impl SubmissionService {
    pub fn new(store: Arc<ArticleStore>, archive: Arc<ArticleArchive>, upload_limit_bytes: u64) -> Self {
        Self {
            store,
            archive,
            upload_limit_bytes,
        }
    }

    /// Run the pipeline for one submission and return the new article id.
    ///
    /// An id burned by a failure after allocation is never reused. A failure
    /// after the page write leaves the page orphaned on disk; that is
    /// surfaced to the caller, not rolled back.
    pub async fn submit<S>(&self, submission: NewSubmission<S>) -> Result<u64, SubmissionError>
    where
        S: futures::Stream<Item = Result<Bytes, ArchiveError>>,
    {
        let NewSubmission {
            title,
            message,
            upload,
        } = submission;

        validate_submission(&title, &message)?;

        let id = self.store.allocate();
        self.archive
            .create_article_dir(id)
            .await
            .map_err(SubmissionError::Storage)?;

        let media = match upload {
            Some(part) => {
                let kind = MediaKind::from_filename(&part.filename);
                let written = self
                    .archive
                    .store_upload(id, part.stream, self.upload_limit_bytes)
                    .await
                    .map_err(|err| match err {
                        ArchiveError::UploadTooLarge => SubmissionError::UploadTooLarge,
                        ArchiveError::UploadStream { source } => {
                            SubmissionError::UploadStream(source)
                        }
                        other => SubmissionError::Storage(other),
                    })?;
                info!(
                    target = "bacheca::submission",
                    article_id = id,
                    media = kind.as_str(),
                    size_bytes = written,
                    "stored article attachment"
                );
                Some(kind)
            }
            None => None,
        };

        let html = render_article_page(&title, &message, media).map_err(SubmissionError::Render)?;
        self.archive
            .write_page(id, &html)
            .await
            .map_err(SubmissionError::Storage)?;

        let article = Article { id, title, media };
        if let Err(err) = self.store.append(article).await {
            // The rendered page stays behind; nothing links to it yet.
            warn!(
                target = "bacheca::submission",
                article_id = id,
                "index persistence failed, rendered page left orphaned"
            );
            return Err(SubmissionError::Store(err));
        }

        info!(
            target = "bacheca::submission",
            article_id = id,
            "article published"
        );
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    async fn service(root: &std::path::Path, limit: u64) -> (Arc<ArticleStore>, SubmissionService) {
        let store = Arc::new(
            ArticleStore::load(root.join("data"))
                .await
                .expect("store loads"),
        );
        let archive =
            Arc::new(ArticleArchive::new(root.join("data/articles")).expect("archive opens"));
        let submission = SubmissionService::new(store.clone(), archive, limit);
        (store, submission)
    }

    fn text_upload(
        filename: &str,
        content: &'static [u8],
    ) -> Option<UploadPart<impl futures::Stream<Item = Result<Bytes, ArchiveError>>>> {
        Some(UploadPart {
            filename: filename.to_string(),
            stream: stream::once(async move { Ok(Bytes::from_static(content)) }),
        })
    }

    #[tokio::test]
    async fn plain_submission_renders_a_page_and_appends_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let (store, service) = service(dir.path(), 1024).await;

        let id = service
            .submit(NewSubmission::<EmptyUpload> {
                title: "Hello".into(),
                message: "World".into(),
                upload: None,
            })
            .await
            .unwrap();
        assert_eq!(id, 1);

        let page = std::fs::read_to_string(dir.path().join("data/articles/1/index.html")).unwrap();
        assert!(page.contains("Hello"));
        assert!(page.contains("World"));

        let listed = store.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, 1);
        assert_eq!(listed[0].media, None);
    }

    #[tokio::test]
    async fn invalid_title_fails_before_any_storage_is_touched() {
        let dir = tempfile::tempdir().unwrap();
        let (store, service) = service(dir.path(), 1024).await;

        let result = service
            .submit(NewSubmission::<EmptyUpload> {
                title: String::new(),
                message: "body".into(),
                upload: None,
            })
            .await;
        assert!(matches!(result, Err(SubmissionError::Validation(_))));
        assert!(!dir.path().join("data/articles/1").exists());
        assert!(store.list().await.is_empty());

        // Validation failures do not burn ids.
        let id = service
            .submit(NewSubmission::<EmptyUpload> {
                title: "ok".into(),
                message: "body".into(),
                upload: None,
            })
            .await
            .unwrap();
        assert_eq!(id, 1);
    }

    #[tokio::test]
    async fn oversized_upload_aborts_before_rendering_and_burns_the_id() {
        let dir = tempfile::tempdir().unwrap();
        let (store, service) = service(dir.path(), 4).await;

        let result = service
            .submit(NewSubmission {
                title: "Big".into(),
                message: "body".into(),
                upload: text_upload("big.png", b"way too many bytes"),
            })
            .await;
        assert!(matches!(result, Err(SubmissionError::UploadTooLarge)));
        assert!(!dir.path().join("data/articles/1/upload").exists());
        assert!(!dir.path().join("data/articles/1/index.html").exists());
        assert!(store.list().await.is_empty());

        // The failed attempt consumed id 1.
        let id = service
            .submit(NewSubmission::<EmptyUpload> {
                title: "Next".into(),
                message: "body".into(),
                upload: None,
            })
            .await
            .unwrap();
        assert_eq!(id, 2);
    }

    #[tokio::test]
    async fn recognized_attachment_produces_an_embed_and_index_media() {
        let dir = tempfile::tempdir().unwrap();
        let (store, service) = service(dir.path(), 1024).await;

        let id = service
            .submit(NewSubmission {
                title: "Photo".into(),
                message: "look at this".into(),
                upload: text_upload("cat.jpg", b"not really a jpeg"),
            })
            .await
            .unwrap();

        let page =
            std::fs::read_to_string(dir.path().join(format!("data/articles/{id}/index.html")))
                .unwrap();
        assert!(page.contains("<img src=\"upload\""));

        let stored = std::fs::read(dir.path().join(format!("data/articles/{id}/upload"))).unwrap();
        assert_eq!(stored, b"not really a jpeg");

        assert_eq!(store.list().await[0].media, Some(MediaKind::Image));
    }

    #[tokio::test]
    async fn uppercase_extension_is_stored_but_not_embedded() {
        let dir = tempfile::tempdir().unwrap();
        let (store, service) = service(dir.path(), 1024).await;

        let id = service
            .submit(NewSubmission {
                title: "Shouty".into(),
                message: "case matters".into(),
                upload: text_upload("photo.PNG", b"bytes"),
            })
            .await
            .unwrap();

        let page =
            std::fs::read_to_string(dir.path().join(format!("data/articles/{id}/index.html")))
                .unwrap();
        assert!(!page.contains("<img"));
        assert!(page.contains("<a href=\"upload\""));
        assert!(dir.path().join(format!("data/articles/{id}/upload")).exists());
        assert_eq!(store.list().await[0].media, Some(MediaKind::Other));
    }
}
