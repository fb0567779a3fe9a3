// Polling inbox: JSON drop files become documents

use crate::engine::RetrievalEngine;
use crate::error::{RagError, Result};
use crate::ingest::IncomingDocument;
use ahash::AHashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time;

/// Counters for one pass over the inbox
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InboxScan {
    pub ingested: usize,
    pub failed: usize,
    /// Files that could not be moved out of the inbox
    pub unmoved: usize,
}

/// Watches a directory for `*.json` files shaped
/// `{"text": "...", "metadata": {...}}`.
///
/// Each file is ingested and then moved to `processed/`, or to `failed/` if it
/// does not parse or ingestion fails. A crash between commit and move
/// re-ingests the file on the next pass under a new id. A file that cannot be
/// moved is deleted; if that fails too it is skipped for the life of the
/// watcher.
pub struct InboxWatcher {
    engine: Arc<RetrievalEngine>,
    dir: PathBuf,
    processed_dir: PathBuf,
    failed_dir: PathBuf,
    poll_interval: Duration,
    stuck: Mutex<AHashSet<PathBuf>>,
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| RagError::Io {
        source: e,
        context: format!("Failed to create inbox directory: {}", path.display()),
    })
}

impl InboxWatcher {
    pub fn new(engine: Arc<RetrievalEngine>, dir: PathBuf, poll_interval: Duration) -> Result<Self> {
        if poll_interval.is_zero() {
            return Err(RagError::InvalidConfigValue {
                path: "ingest.inbox_poll_interval".to_string(),
                message: "Poll interval must be greater than 0".to_string(),
            });
        }

        let processed_dir = dir.join("processed");
        let failed_dir = dir.join("failed");
        create_dir(&dir)?;
        create_dir(&processed_dir)?;
        create_dir(&failed_dir)?;

        Ok(Self {
            engine,
            dir,
            processed_dir,
            failed_dir,
            poll_interval,
            stuck: Mutex::new(AHashSet::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Ingest every pending file once, oldest name first
    pub async fn scan_once(&self) -> Result<InboxScan> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| RagError::Io {
            source: e,
            context: format!("Failed to read inbox: {}", self.dir.display()),
        })?;

        let mut stuck = self.stuck.lock().await;
        let mut pending: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
            .filter(|p| !stuck.contains(p))
            .collect();
        pending.sort();

        let mut scan = InboxScan::default();
        for path in pending {
            let target = match self.ingest_file(&path).await {
                Ok(id) => {
                    tracing::debug!("Inbox file {} ingested as {}", path.display(), id);
                    scan.ingested += 1;
                    &self.processed_dir
                }
                Err(e) => {
                    tracing::warn!("Inbox file {} failed: {}", path.display(), e);
                    scan.failed += 1;
                    &self.failed_dir
                }
            };

            if !self.move_to(&path, target) {
                scan.unmoved += 1;
                stuck.insert(path);
            }
        }

        if scan.ingested + scan.failed > 0 {
            tracing::info!(
                "Inbox pass: {} ingested, {} failed, {} unmoved",
                scan.ingested,
                scan.failed,
                scan.unmoved
            );
        }
        Ok(scan)
    }

    async fn ingest_file(&self, path: &Path) -> Result<String> {
        let raw = std::fs::read_to_string(path).map_err(|e| RagError::Io {
            source: e,
            context: format!("Failed to read inbox file: {}", path.display()),
        })?;
        let document: IncomingDocument =
            serde_json::from_str(&raw).map_err(|e| RagError::Json {
                source: e,
                context: format!("Invalid inbox file: {}", path.display()),
            })?;

        let outcome = self.engine.ingest(&document.text, document.metadata).await?;
        if let Some(warning) = outcome.persist_warning {
            tracing::warn!("Inbox document {} not persisted: {}", outcome.id, warning);
        }
        Ok(outcome.id)
    }

    /// Move a handled file out of the inbox. Returns false when the file could
    /// not be moved to `target_dir`.
    fn move_to(&self, path: &Path, target_dir: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        let Err(e) = std::fs::rename(path, target_dir.join(name)) else {
            return true;
        };

        tracing::error!("Failed to move {}: {}", path.display(), e);
        if let Err(e) = std::fs::remove_file(path) {
            tracing::error!(
                "Failed to remove {}, skipping it until restart: {}",
                path.display(),
                e
            );
        }
        false
    }

    /// Poll until `shutdown` completes
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut ticker = time::interval(self.poll_interval);
        tokio::pin!(shutdown);

        tracing::info!(
            "Watching inbox {} every {:?}",
            self.dir.display(),
            self.poll_interval
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Inbox watcher stopping");
                    break;
                }

                _ = ticker.tick() => {
                    if let Err(e) = self.scan_once().await {
                        tracing::error!("Inbox scan failed: {}", e);
                    }
                }
            }
        }

        Ok(())
    }
}
