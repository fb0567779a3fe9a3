//! Storage layer
//!
//! Provides the document store (records + slot mapping) and the snapshot
//! persistence that writes it to disk together with the vector index.

mod documents;
mod snapshot;

use std::path::{Path, PathBuf};

pub use documents::{DocumentRecord, DocumentSnapshot, DocumentStore, DocumentStoreError};
pub use snapshot::{LoadedIndex, PersistenceError, SnapshotStore, FORMAT_VERSION};

/// Directory holding the snapshot files under a data dir
pub fn index_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("index")
}

/// Format size as human-readable string
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_idx])
}

/// Total size of the regular files directly inside `dir`
pub fn dir_size(dir: &Path) -> u64 {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .filter_map(|e| e.metadata().ok())
                .filter(|m| m.is_file())
                .map(|m| m.len())
                .sum()
        })
        .unwrap_or(0)
}
