/// Directory batch loading with chunked embedding
use crate::engine::RetrievalEngine;
use crate::error::{RagError, Result};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Outcome of a directory load
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Documents committed
    pub count: usize,
    /// Files that could not be read or ingested
    pub errors: Vec<(PathBuf, String)>,
}

struct PendingFile {
    path: PathBuf,
    text: String,
    metadata: Map<String, Value>,
}

/// Normalise extension filters to lowercase without a leading dot
fn normalise_extensions(extensions: &[String]) -> Vec<String> {
    extensions
        .iter()
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

fn matches_extension(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|ext| extensions.iter().any(|allowed| *allowed == ext))
}

/// Ingest every matching file under `path`.
///
/// Files are visited in sorted order and embedded in chunks of
/// `embedding.batch_size`. A file that fails is recorded in the report and the
/// load carries on. `extensions` defaults to `ingest.extensions`.
pub async fn load_from_directory(
    engine: &RetrievalEngine,
    path: &Path,
    extensions: Option<&[String]>,
) -> Result<LoadReport> {
    if !path.is_dir() {
        return Err(RagError::Io {
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
            context: format!("Cannot load from {}", path.display()),
        });
    }

    let extensions =
        normalise_extensions(extensions.unwrap_or(engine.config().ingest.extensions.as_slice()));
    let imported_at = chrono::Utc::now().to_rfc3339();

    let mut report = LoadReport::default();
    let mut pending = Vec::new();

    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let failed = e.path().unwrap_or(path).to_path_buf();
                report.errors.push((failed, e.to_string()));
                continue;
            }
        };
        if !entry.file_type().is_file() || !matches_extension(entry.path(), &extensions) {
            continue;
        }

        let file_path = entry.path().to_path_buf();
        let text = match std::fs::read_to_string(&file_path) {
            Ok(text) => text,
            Err(e) => {
                report.errors.push((file_path, e.to_string()));
                continue;
            }
        };

        let relative = file_path.strip_prefix(path).unwrap_or(&file_path);
        let mut metadata = Map::new();
        metadata.insert(
            "source".to_string(),
            Value::String(relative.to_string_lossy().to_string()),
        );
        metadata.insert(
            "filename".to_string(),
            Value::String(
                file_path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
            ),
        );
        metadata.insert(
            "imported_at".to_string(),
            Value::String(imported_at.clone()),
        );

        pending.push(PendingFile {
            path: file_path,
            text,
            metadata,
        });
    }

    info!(
        "Loading {} files from {} ({} unreadable)",
        pending.len(),
        path.display(),
        report.errors.len()
    );

    let batch_size = engine.config().embedding.batch_size.max(1);
    for chunk in pending.chunks(batch_size) {
        let texts: Vec<String> = chunk.iter().map(|f| f.text.clone()).collect();

        match engine.embed_batch(texts).await {
            Ok(vectors) => {
                for (file, vector) in chunk.iter().zip(vectors) {
                    let result = engine
                        .ingest_embedded(&file.text, Some(file.metadata.clone()), vector)
                        .await;
                    record(&mut report, file, result);
                }
            }
            Err(e) => {
                // Isolate the failing file by embedding one at a time
                warn!("Batch embedding failed, retrying files individually: {}", e);
                for file in chunk {
                    let result = engine.ingest(&file.text, Some(file.metadata.clone())).await;
                    record(&mut report, file, result);
                }
            }
        }
    }

    info!(
        "Loaded {} documents from {} ({} errors)",
        report.count,
        path.display(),
        report.errors.len()
    );

    Ok(report)
}

fn record(
    report: &mut LoadReport,
    file: &PendingFile,
    result: Result<crate::engine::IngestOutcome>,
) {
    match result {
        Ok(outcome) => {
            if let Some(warning) = outcome.persist_warning {
                warn!("{} committed in memory only: {}", file.path.display(), warning);
            }
            debug!("Ingested {} as {}", file.path.display(), outcome.id);
            report.count += 1;
        }
        Err(e) => {
            warn!("Failed to ingest {}: {}", file.path.display(), e);
            report.errors.push((file.path.clone(), e.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_matching() {
        let exts = normalise_extensions(&[".TXT".to_string(), "md".to_string()]);
        assert_eq!(exts, vec!["txt", "md"]);

        assert!(matches_extension(Path::new("a/b.txt"), &exts));
        assert!(matches_extension(Path::new("notes.MD"), &exts));
        assert!(!matches_extension(Path::new("image.png"), &exts));
        assert!(!matches_extension(Path::new("README"), &exts));
        assert!(matches_extension(Path::new("README"), &[]));
    }
}
