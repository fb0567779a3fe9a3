/// Exact linear-scan nearest-neighbour backend
use super::vector_index::{Metric, Neighbor};

/// Flat, slot-ordered vector storage scanned in full on every query.
///
/// Vectors are stored contiguously; slot `i` occupies
/// `data[i * dimension..(i + 1) * dimension]`.
pub(crate) struct ExactIndex {
    dimension: usize,
    metric: Metric,
    data: Vec<f32>,
}

impl ExactIndex {
    pub(crate) fn new(dimension: usize, metric: Metric) -> Self {
        Self {
            dimension,
            metric,
            data: Vec::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    pub(crate) fn push(&mut self, vector: &[f32]) {
        self.data.extend_from_slice(vector);
    }

    /// Drop the most recently pushed vector
    pub(crate) fn pop(&mut self) {
        let new_len = self.data.len().saturating_sub(self.dimension);
        self.data.truncate(new_len);
    }

    pub(crate) fn get(&self, slot: usize) -> Option<&[f32]> {
        let start = slot.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    pub(crate) fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Scan every slot; ties are broken by ascending slot
    pub(crate) fn search(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        let mut scored: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(slot, row)| Neighbor {
                slot,
                distance: self.metric.distance(query, row),
            })
            .collect();

        scored.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.slot.cmp(&b.slot))
        });
        scored.truncate(k);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_and_get() {
        let mut index = ExactIndex::new(2, Metric::L2);
        index.push(&[1.0, 2.0]);
        index.push(&[3.0, 4.0]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(1), Some(&[3.0, 4.0][..]));

        index.pop();
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(1), None);
    }

    #[test]
    fn test_search_orders_by_distance() {
        let mut index = ExactIndex::new(2, Metric::L2);
        index.push(&[10.0, 0.0]);
        index.push(&[1.0, 0.0]);
        index.push(&[0.0, 0.0]);

        let results = index.search(&[0.0, 0.0], 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].slot, 2);
        assert_eq!(results[0].distance, 0.0);
        assert_eq!(results[1].slot, 1);
        assert_eq!(results[1].distance, 1.0);
    }

    #[test]
    fn test_equal_distances_prefer_lower_slot() {
        let mut index = ExactIndex::new(1, Metric::L2);
        index.push(&[1.0]);
        index.push(&[-1.0]);

        let results = index.search(&[0.0], 2);
        assert_eq!(results[0].slot, 0);
        assert_eq!(results[1].slot, 1);
    }
}
