/// Dual-backend vector index: exact linear scan plus HNSW
use super::approx::ApproxIndex;
use super::exact::ExactIndex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Slot {slot} out of range (index holds {len} vectors)")]
    SlotOutOfRange { slot: usize, len: usize },

    #[error("Only the newest slot can be discarded: asked for {slot}, index holds {len}")]
    InvalidDiscard { slot: usize, len: usize },

    #[error("Corrupt vector data: {0}")]
    CorruptData(String),
}

/// Distance metric, fixed when the index is built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Squared Euclidean distance
    L2,
    /// `1 - cos(a, b)`; a zero vector sits at 0.5 from any unit direction
    Cosine,
}

impl Metric {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "l2" => Some(Metric::L2),
            "cosine" => Some(Metric::Cosine),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::L2 => "l2",
            Metric::Cosine => "cosine",
        }
    }

    /// Distance between two vectors of equal length
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::L2 => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
            Metric::Cosine => {
                let (mut dot, mut na, mut nb) = (0.0f32, 0.0f32, 0.0f32);
                for (x, y) in a.iter().zip(b) {
                    dot += x * y;
                    na += x * x;
                    nb += y * y;
                }
                if na == 0.0 || nb == 0.0 {
                    // Half the squared distance between the unit-normalised
                    // forms, where a zero vector stays at the origin
                    let ua = if na > 0.0 { 1.0 } else { 0.0 };
                    let ub = if nb > 0.0 { 1.0 } else { 0.0 };
                    0.5 * (ua + ub)
                } else {
                    (1.0 - dot / (na.sqrt() * nb.sqrt())).max(0.0)
                }
            }
        }
    }

    /// Form a vector takes inside the HNSW graph, which measures plain
    /// Euclidean distance
    pub(crate) fn prepare(&self, vector: &[f32]) -> Vec<f32> {
        match self {
            Metric::L2 => vector.to_vec(),
            Metric::Cosine => {
                let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 0.0 {
                    vector.iter().map(|x| x / norm).collect()
                } else {
                    vector.to_vec()
                }
            }
        }
    }

    /// Convert a Euclidean graph distance back into this metric
    pub(crate) fn from_graph_distance(&self, distance: f32) -> f32 {
        match self {
            Metric::L2 => distance * distance,
            Metric::Cosine => 0.5 * distance * distance,
        }
    }
}

/// HNSW construction parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HnswParams {
    /// Max connections per node (M)
    pub m: usize,
    /// Build-time search width
    pub ef_construction: usize,
    /// Max graph layers (hnsw_rs caps this at 16)
    pub max_layer: usize,
    /// Initial capacity hint
    pub capacity: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            max_layer: 16,
            capacity: 10_000,
        }
    }
}

/// Which backend answers a search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Linear scan, ground truth
    Exact,
    /// HNSW graph, sub-linear; may miss neighbours or return fewer than k
    Approximate,
}

/// One nearest-neighbour hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Ordinal slot of the vector
    pub slot: usize,
    /// Distance under the index metric (lower is closer)
    pub distance: f32,
}

/// Vector index holding both nearest-neighbour backends over one vector set.
///
/// Every `add` goes to both backends so they can not drift apart; slot `i`
/// is the vector of the i-th successful `add` that was not discarded.
pub struct VectorIndex {
    dimension: usize,
    metric: Metric,
    exact: ExactIndex,
    approx: ApproxIndex,
}

impl VectorIndex {
    /// Create an empty index
    pub fn new(dimension: usize, metric: Metric, params: HnswParams) -> Self {
        Self {
            dimension,
            metric,
            exact: ExactIndex::new(dimension, metric),
            approx: ApproxIndex::new(metric, params),
        }
    }

    /// Rebuild an index from slot-ordered flat vector data
    ///
    /// `graph_order` lists slots in the order they enter the HNSW graph and
    /// must be a permutation of `0..count`.
    pub fn from_vectors(
        dimension: usize,
        metric: Metric,
        params: HnswParams,
        data: &[f32],
        graph_order: &[usize],
    ) -> Result<Self, VectorIndexError> {
        if dimension == 0 || data.len() % dimension != 0 {
            return Err(VectorIndexError::CorruptData(format!(
                "{} floats do not divide into vectors of dimension {}",
                data.len(),
                dimension
            )));
        }

        let mut index = Self::new(dimension, metric, params);
        for vector in data.chunks_exact(dimension) {
            index.exact.push(vector);
        }

        let count = index.exact.len();
        let mut seen = vec![false; count];
        for &slot in graph_order {
            if slot >= count || seen[slot] {
                return Err(VectorIndexError::CorruptData(format!(
                    "graph order is not a permutation of 0..{}",
                    count
                )));
            }
            seen[slot] = true;
        }
        if graph_order.len() != count {
            return Err(VectorIndexError::CorruptData(format!(
                "graph order covers {} of {} slots",
                graph_order.len(),
                count
            )));
        }

        for &slot in graph_order {
            if let Some(vector) = index.exact.get(slot) {
                let vector = vector.to_vec();
                index.approx.insert(&vector, slot);
            }
        }

        Ok(index)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), VectorIndexError> {
        if vector.len() != self.dimension {
            return Err(VectorIndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Append one vector to both backends, returning its slot
    pub fn add(&mut self, vector: &[f32]) -> Result<usize, VectorIndexError> {
        self.check_dimension(vector)?;

        let slot = self.exact.len();
        self.exact.push(vector);
        self.approx.insert(vector, slot);

        Ok(slot)
    }

    /// Roll back the most recent `add`
    pub fn discard(&mut self, slot: usize) -> Result<(), VectorIndexError> {
        let len = self.exact.len();
        if len == 0 || slot != len - 1 {
            return Err(VectorIndexError::InvalidDiscard { slot, len });
        }

        self.exact.pop();
        if !self.approx.retire(slot) {
            tracing::error!("Discarded slot {} had no live HNSW point", slot);
        }
        Ok(())
    }

    /// k nearest neighbours of `query`, closest first
    ///
    /// `k` is clamped to the index size. `ef_search` only affects
    /// approximate mode.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        mode: SearchMode,
        ef_search: usize,
    ) -> Result<Vec<Neighbor>, VectorIndexError> {
        self.check_dimension(query)?;

        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let results = match mode {
            SearchMode::Exact => self.exact.search(query, k),
            SearchMode::Approximate => self.approx.search(query, k, ef_search),
        };
        Ok(results)
    }

    /// Stored vector for a slot
    pub fn vector(&self, slot: usize) -> Result<&[f32], VectorIndexError> {
        self.exact.get(slot).ok_or(VectorIndexError::SlotOutOfRange {
            slot,
            len: self.exact.len(),
        })
    }

    /// Number of vectors (slots)
    pub fn len(&self) -> usize {
        self.exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn params(&self) -> &HnswParams {
        self.approx.params()
    }

    /// All vectors, flat and slot-ordered
    pub fn raw_vectors(&self) -> &[f32] {
        self.exact.as_slice()
    }

    /// Live HNSW points; equals `len()` outside a transaction
    pub fn approx_points(&self) -> usize {
        self.approx.live_points()
    }

    /// HNSW points left behind by rolled-back adds
    pub fn retired_points(&self) -> usize {
        self.approx.retired_points()
    }

    /// Slots in HNSW insertion order
    pub fn graph_order(&self) -> Vec<usize> {
        self.approx.insertion_order()
    }
}
