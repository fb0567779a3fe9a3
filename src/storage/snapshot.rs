//! Generation-based snapshots of the vector index and document store
//!
//! Each save writes three data files tagged with a new generation number,
//! then swaps `manifest.json` to point at them. The manifest carries BLAKE3
//! digests of the data files, so a torn write or a mismatched set is detected
//! on load instead of producing an index whose slots disagree with the
//! mapping.

use super::documents::{DocumentSnapshot, DocumentStore};
use crate::embedding::{HnswParams, Metric, VectorIndex};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Bumped whenever the on-disk layout changes
pub const FORMAT_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "manifest.json";
const EXACT_PREFIX: &str = "exact-";
const APPROX_PREFIX: &str = "approx-";
const DOCUMENTS_PREFIX: &str = "documents-";

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    #[error("Serialization error: {context}: {source}")]
    Serialization {
        source: serde_json::Error,
        context: String,
    },

    #[error("Unsupported snapshot format version {found} (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("Snapshot does not match configuration: {0}")]
    SchemaMismatch(String),

    #[error("Checksum mismatch for {file}")]
    ChecksumMismatch { file: String },

    #[error("Corrupt snapshot: {0}")]
    Corrupt(String),
}

fn io_err(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> PersistenceError {
    let context = context.into();
    move |source| PersistenceError::Io { source, context }
}

fn json_err(context: impl Into<String>) -> impl FnOnce(serde_json::Error) -> PersistenceError {
    let context = context.into();
    move |source| PersistenceError::Serialization { source, context }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileEntry {
    name: String,
    blake3: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    generation: u64,
    dimension: usize,
    metric: Metric,
    count: usize,
    written_at: String,
    exact: FileEntry,
    approx: FileEntry,
    documents: FileEntry,
}

/// HNSW blob: the graph is rebuilt by re-inserting slots in this order
#[derive(Debug, Serialize, Deserialize)]
struct ApproxBlob {
    metric: Metric,
    params: HnswParams,
    insertion_order: Vec<usize>,
}

/// State recovered from disk
pub struct LoadedIndex {
    pub generation: u64,
    pub vectors: VectorIndex,
    pub documents: DocumentStore,
}

/// Snapshot directory manager
pub struct SnapshotStore {
    dir: PathBuf,
    flush_retries: usize,
    generation: u64,
}

impl SnapshotStore {
    /// Open (creating if needed) the snapshot directory
    pub fn open(dir: PathBuf, flush_retries: usize) -> Result<Self, PersistenceError> {
        fs::create_dir_all(&dir).map_err(io_err(format!(
            "Failed to create index directory: {}",
            dir.display()
        )))?;

        // Never reuse a generation number that is already on disk
        let generation = highest_generation(&dir)?;

        Ok(Self {
            dir,
            flush_retries,
            generation,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Generation of the last snapshot written or loaded
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Load the snapshot named by the manifest, or `None` when there is none.
    ///
    /// `dimension` and `metric` must match what the snapshot was written with.
    pub fn load(
        &mut self,
        dimension: usize,
        metric: Metric,
        max_documents: usize,
    ) -> Result<Option<LoadedIndex>, PersistenceError> {
        let manifest_path = self.dir.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Ok(None);
        }

        let raw = fs::read(&manifest_path).map_err(io_err("Failed to read manifest"))?;
        let manifest: Manifest =
            serde_json::from_slice(&raw).map_err(json_err("Failed to parse manifest"))?;

        if manifest.format_version != FORMAT_VERSION {
            return Err(PersistenceError::VersionMismatch {
                found: manifest.format_version,
                expected: FORMAT_VERSION,
            });
        }
        if manifest.dimension != dimension {
            return Err(PersistenceError::SchemaMismatch(format!(
                "snapshot dimension {} != configured {}",
                manifest.dimension, dimension
            )));
        }
        if manifest.metric != metric {
            return Err(PersistenceError::SchemaMismatch(format!(
                "snapshot metric {} != configured {}",
                manifest.metric.as_str(),
                metric.as_str()
            )));
        }

        let exact_raw = self.read_verified(&manifest.exact)?;
        let approx_raw = self.read_verified(&manifest.approx)?;
        let documents_raw = self.read_verified(&manifest.documents)?;

        let vectors = decode_vectors(&exact_raw)?;
        let approx: ApproxBlob =
            serde_json::from_slice(&approx_raw).map_err(json_err("Failed to parse HNSW blob"))?;
        let documents: DocumentSnapshot = serde_json::from_slice(&documents_raw)
            .map_err(json_err("Failed to parse documents blob"))?;

        if approx.metric != metric {
            return Err(PersistenceError::Corrupt(
                "HNSW blob metric disagrees with manifest".to_string(),
            ));
        }

        let vector_count = vectors.len() / dimension.max(1);
        if vector_count != manifest.count || documents.slots.len() != manifest.count {
            return Err(PersistenceError::Corrupt(format!(
                "count mismatch: manifest {}, vectors {}, slot mapping {}",
                manifest.count,
                vector_count,
                documents.slots.len()
            )));
        }

        let vectors = VectorIndex::from_vectors(
            dimension,
            metric,
            approx.params,
            &vectors,
            &approx.insertion_order,
        )
        .map_err(|e| PersistenceError::Corrupt(e.to_string()))?;

        let documents = DocumentStore::from_snapshot(documents, max_documents)
            .map_err(|e| PersistenceError::Corrupt(e.to_string()))?;

        self.generation = self.generation.max(manifest.generation);

        info!(
            "Loaded index generation {} ({} slots, {} documents)",
            manifest.generation,
            vectors.len(),
            documents.len()
        );

        Ok(Some(LoadedIndex {
            generation: manifest.generation,
            vectors,
            documents,
        }))
    }

    /// Write a new generation, retrying up to `flush_retries` extra times
    pub fn save(
        &mut self,
        vectors: &VectorIndex,
        documents: &DocumentStore,
    ) -> Result<u64, PersistenceError> {
        let mut attempt = 0;
        loop {
            match self.write_generation(vectors, documents) {
                Ok(generation) => return Ok(generation),
                Err(e) if attempt < self.flush_retries => {
                    attempt += 1;
                    warn!(
                        "Snapshot flush failed (attempt {}/{}): {}",
                        attempt,
                        self.flush_retries + 1,
                        e
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn write_generation(
        &mut self,
        vectors: &VectorIndex,
        documents: &DocumentStore,
    ) -> Result<u64, PersistenceError> {
        let generation = self.generation + 1;

        let exact_bytes = encode_vectors(vectors.raw_vectors())?;
        let approx_bytes = serde_json::to_vec(&ApproxBlob {
            metric: vectors.metric(),
            params: vectors.params().clone(),
            insertion_order: vectors.graph_order(),
        })
        .map_err(json_err("Failed to serialize HNSW blob"))?;
        let documents_bytes = serde_json::to_vec(&documents.snapshot())
            .map_err(json_err("Failed to serialize documents blob"))?;

        let exact = self.write_file(&format!("{EXACT_PREFIX}{generation}.bin.zst"), &exact_bytes)?;
        let approx = self.write_file(&format!("{APPROX_PREFIX}{generation}.json"), &approx_bytes)?;
        let documents_entry = self.write_file(
            &format!("{DOCUMENTS_PREFIX}{generation}.json"),
            &documents_bytes,
        )?;

        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            generation,
            dimension: vectors.dimension(),
            metric: vectors.metric(),
            count: vectors.len(),
            written_at: chrono::Utc::now().to_rfc3339(),
            exact,
            approx,
            documents: documents_entry,
        };
        let manifest_bytes = serde_json::to_vec_pretty(&manifest)
            .map_err(json_err("Failed to serialize manifest"))?;

        // The manifest rename is the commit point
        self.write_file(MANIFEST_FILE, &manifest_bytes)?;
        self.generation = generation;
        sync_dir(&self.dir);

        debug!("Flushed index generation {} ({} slots)", generation, manifest.count);

        if let Err(e) = self.collect_garbage(generation) {
            warn!("Failed to remove stale snapshot files: {}", e);
        }

        Ok(generation)
    }

    /// Write `bytes` to `name` via a synced temp file and rename
    fn write_file(&self, name: &str, bytes: &[u8]) -> Result<FileEntry, PersistenceError> {
        let final_path = self.dir.join(name);
        let temp_path = self.dir.join(format!("{name}.tmp"));

        let mut file = fs::File::create(&temp_path).map_err(io_err(format!(
            "Failed to create temp file: {}",
            temp_path.display()
        )))?;
        file.write_all(bytes).map_err(io_err(format!(
            "Failed to write temp file: {}",
            temp_path.display()
        )))?;
        file.sync_all().map_err(io_err(format!(
            "Failed to sync temp file: {}",
            temp_path.display()
        )))?;
        drop(file);

        fs::rename(&temp_path, &final_path).map_err(io_err(format!(
            "Failed to rename {} -> {}",
            temp_path.display(),
            final_path.display()
        )))?;

        Ok(FileEntry {
            name: name.to_string(),
            blake3: blake3::hash(bytes).to_hex().to_string(),
        })
    }

    fn read_verified(&self, entry: &FileEntry) -> Result<Vec<u8>, PersistenceError> {
        // Manifest names are plain file names inside the index directory
        if entry.name.contains('/') || entry.name.contains('\\') || entry.name.contains("..") {
            return Err(PersistenceError::Corrupt(format!(
                "invalid file name in manifest: {}",
                entry.name
            )));
        }

        let path = self.dir.join(&entry.name);
        let bytes = fs::read(&path).map_err(io_err(format!(
            "Failed to read snapshot file: {}",
            path.display()
        )))?;

        if blake3::hash(&bytes).to_hex().as_str() != entry.blake3 {
            return Err(PersistenceError::ChecksumMismatch {
                file: entry.name.clone(),
            });
        }
        Ok(bytes)
    }

    /// Remove data files of other generations and leftover temp files
    fn collect_garbage(&self, current: u64) -> Result<usize, PersistenceError> {
        let mut removed = 0;
        let entries = fs::read_dir(&self.dir).map_err(io_err("Failed to list index directory"))?;

        for entry in entries {
            let entry = entry.map_err(io_err("Failed to read index directory entry"))?;
            let name = entry.file_name().to_string_lossy().to_string();

            let stale = name.ends_with(".tmp")
                || parse_generation(&name).is_some_and(|generation| generation != current);
            if stale {
                fs::remove_file(entry.path())
                    .map_err(io_err(format!("Failed to remove {}", name)))?;
                removed += 1;
            }
        }

        if removed > 0 {
            debug!("Removed {} stale snapshot files", removed);
        }
        Ok(removed)
    }
}

fn parse_generation(name: &str) -> Option<u64> {
    let rest = [EXACT_PREFIX, APPROX_PREFIX, DOCUMENTS_PREFIX]
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix))?;
    if rest.ends_with(".tmp") {
        return None;
    }
    rest.split('.').next()?.parse().ok()
}

fn highest_generation(dir: &Path) -> Result<u64, PersistenceError> {
    let entries = fs::read_dir(dir).map_err(io_err("Failed to list index directory"))?;
    let mut highest = 0;
    for entry in entries.flatten() {
        if let Some(generation) = parse_generation(&entry.file_name().to_string_lossy()) {
            highest = highest.max(generation);
        }
    }
    Ok(highest)
}

fn sync_dir(dir: &Path) {
    // Not supported on every platform; the renames are still atomic
    if let Ok(handle) = fs::File::open(dir) {
        let _ = handle.sync_all();
    }
}

fn encode_vectors(data: &[f32]) -> Result<Vec<u8>, PersistenceError> {
    let mut raw = Vec::with_capacity(data.len() * 4);
    for value in data {
        raw.extend_from_slice(&value.to_le_bytes());
    }
    zstd::encode_all(&raw[..], 3).map_err(io_err("Failed to compress vectors"))
}

fn decode_vectors(bytes: &[u8]) -> Result<Vec<f32>, PersistenceError> {
    let raw = zstd::decode_all(bytes).map_err(io_err("Failed to decompress vectors"))?;
    if raw.len() % 4 != 0 {
        return Err(PersistenceError::Corrupt(format!(
            "vector blob length {} is not a multiple of 4",
            raw.len()
        )));
    }
    Ok(raw
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}
