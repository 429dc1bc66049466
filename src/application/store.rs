//! The authoritative article list: in-memory snapshot, JSON index on disk,
//! and the monotonic id allocator seeded from the reloaded index.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio::{fs, sync::Mutex};

use crate::domain::article::Article;

const INDEX_FILE_NAME: &str = "index.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("article index is corrupt: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Owns the article list and its persisted form.
///
/// Every mutation goes through [`ArticleStore::append`], which holds one lock
/// across the read-append-persist sequence so concurrent submitters cannot
/// interleave and the in-memory list never diverges from the index file
/// after a successful append. The raw collection is never handed out for
/// external mutation.
#[derive(Debug)]
pub struct ArticleStore {
    index_path: PathBuf,
    articles: Mutex<Vec<Article>>,
    next_id: AtomicU64,
}

impl ArticleStore {
    /// Reload the persisted index from the data root. A missing index file
    /// means an empty board, not an error; the allocator resumes above the
    /// highest reloaded id.
    pub async fn load(data_root: PathBuf) -> Result<Self, StoreError> {
        fs::create_dir_all(&data_root).await?;
        let index_path = data_root.join(INDEX_FILE_NAME);

        let articles: Vec<Article> = match fs::read(&index_path).await {
            Ok(raw) => serde_json::from_slice(&raw)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(StoreError::Io(err)),
        };

        let next_id = articles
            .iter()
            .map(|article| article.id)
            .max()
            .map_or(1, |max| max + 1);

        Ok(Self {
            index_path,
            articles: Mutex::new(articles),
            next_id: AtomicU64::new(next_id),
        })
    }

    /// Hand out the next article id. Strictly increasing, never reused; an
    /// id burned by a failed submission stays burned.
    pub fn allocate(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Prepend one article and rewrite the whole index file. Must only be
    /// called once the article's page (and upload, if any) is on disk, so
    /// the listing never references a missing page.
    pub async fn append(&self, article: Article) -> Result<(), StoreError> {
        let mut articles = self.articles.lock().await;
        articles.insert(0, article);
        let encoded = serde_json::to_vec(&*articles)?;
        match fs::write(&self.index_path, encoded).await {
            Ok(()) => Ok(()),
            Err(err) => {
                // Keep memory and disk agreeing: roll the in-memory insert
                // back so a later append does not resurrect this entry.
                articles.remove(0);
                Err(StoreError::Io(err))
            }
        }
    }

    /// Current snapshot, most-recent-first.
    pub async fn list(&self) -> Vec<Article> {
        self.articles.lock().await.clone()
    }
}
