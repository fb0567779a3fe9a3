//! Document store: records keyed by id plus the ordered slot → id mapping
//!
//! Slot resolution never depends on map iteration order; `slots[i]` is the id
//! that owns vector slot `i`.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocumentStoreError {
    #[error("Slot {slot} out of range (mapping length {len})")]
    SlotOutOfRange { slot: usize, len: usize },

    #[error("Unknown document: {0}")]
    UnknownDocument(String),

    #[error("Document store is full ({limit} documents)")]
    CapacityExceeded { limit: usize },
}

/// Stored text and metadata for one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Seconds since the Unix epoch at ingestion
    pub timestamp: f64,
}

impl DocumentRecord {
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: id.into(),
            text: text.into(),
            metadata,
            timestamp: now.timestamp_micros() as f64 / 1_000_000.0,
        }
    }
}

/// Serializable form of the store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub slots: Vec<String>,
    pub records: Vec<DocumentRecord>,
}

pub struct DocumentStore {
    records: AHashMap<String, DocumentRecord>,
    slots: Vec<String>,
    /// Newest slot per id; older slots of the same id are superseded
    latest: AHashMap<String, usize>,
    max_documents: usize,
}

impl DocumentStore {
    /// Empty store; `max_documents == 0` means unlimited
    pub fn new(max_documents: usize) -> Self {
        Self {
            records: AHashMap::new(),
            slots: Vec::new(),
            latest: AHashMap::new(),
            max_documents,
        }
    }

    /// Rebuild from a snapshot. Every slot must name a known record.
    pub fn from_snapshot(
        snapshot: DocumentSnapshot,
        max_documents: usize,
    ) -> Result<Self, DocumentStoreError> {
        let mut store = Self::new(max_documents);
        for record in snapshot.records {
            store.records.insert(record.id.clone(), record);
        }
        for id in snapshot.slots {
            store.append_slot_mapping(&id)?;
        }
        Ok(store)
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        let mut records: Vec<DocumentRecord> = self.records.values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        DocumentSnapshot {
            slots: self.slots.clone(),
            records,
        }
    }

    /// Insert or replace a record, returning the one it replaced
    pub fn put(
        &mut self,
        record: DocumentRecord,
    ) -> Result<Option<DocumentRecord>, DocumentStoreError> {
        if self.max_documents > 0
            && !self.records.contains_key(&record.id)
            && self.records.len() >= self.max_documents
        {
            return Err(DocumentStoreError::CapacityExceeded {
                limit: self.max_documents,
            });
        }

        Ok(self.records.insert(record.id.clone(), record))
    }

    pub fn get(&self, id: &str) -> Option<&DocumentRecord> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Assign the next slot to `id`, which must already be stored
    pub fn append_slot_mapping(&mut self, id: &str) -> Result<usize, DocumentStoreError> {
        if !self.records.contains_key(id) {
            return Err(DocumentStoreError::UnknownDocument(id.to_string()));
        }

        let slot = self.slots.len();
        self.slots.push(id.to_string());
        self.latest.insert(id.to_string(), slot);
        Ok(slot)
    }

    pub fn resolve(&self, slot: usize) -> Result<&str, DocumentStoreError> {
        self.slots
            .get(slot)
            .map(String::as_str)
            .ok_or(DocumentStoreError::SlotOutOfRange {
                slot,
                len: self.slots.len(),
            })
    }

    /// Whether `slot` is the newest slot of its document
    pub fn is_current(&self, slot: usize) -> bool {
        self.slots
            .get(slot)
            .and_then(|id| self.latest.get(id))
            .is_some_and(|&latest| latest == slot)
    }

    /// Slot currently serving `id`
    pub fn current_slot(&self, id: &str) -> Option<usize> {
        self.latest.get(id).copied()
    }

    /// Slots that still resolve but have been replaced by a re-index
    pub fn superseded_count(&self) -> usize {
        self.slots.len() - self.latest.len()
    }

    /// Undo the most recent `append_slot_mapping`
    pub fn pop_slot_mapping(&mut self) -> Option<String> {
        let id = self.slots.pop()?;
        // Fall back to the id's previous slot, if it had one
        match self.slots.iter().rposition(|s| *s == id) {
            Some(previous) => {
                self.latest.insert(id.clone(), previous);
            }
            None => {
                self.latest.remove(&id);
            }
        }
        Some(id)
    }

    /// Undo a `put`: reinstate `previous`, or drop `id` if it was new
    pub fn restore(&mut self, id: &str, previous: Option<DocumentRecord>) {
        match previous {
            Some(record) => {
                self.records.insert(id.to_string(), record);
            }
            None => {
                self.records.remove(id);
            }
        }
    }

    /// Number of distinct documents
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Length of the slot mapping
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// `(id, text)` for every document, ordered by current slot
    pub fn corpus(&self) -> Vec<(String, String)> {
        let mut current: Vec<(usize, &DocumentRecord)> = self
            .latest
            .iter()
            .filter_map(|(id, &slot)| self.records.get(id).map(|r| (slot, r)))
            .collect();
        current.sort_by_key(|(slot, _)| *slot);
        current
            .into_iter()
            .map(|(_, r)| (r.id.clone(), r.text.clone()))
            .collect()
    }
}
