/// Approximate HNSW nearest-neighbour backend
use super::vector_index::{HnswParams, Metric, Neighbor};
use hnsw_rs::prelude::*;

/// HNSW graph over the same vectors as the exact backend.
///
/// Graph point ids are not slots: a rolled-back insert leaves a point in the
/// graph that can not be removed, so each point records the slot it serves
/// (`None` once retired) and retired points are filtered from results.
/// Vectors are inserted after `Metric::prepare`, so Euclidean graph distance
/// converts back to the configured metric.
pub(crate) struct ApproxIndex {
    graph: Hnsw<'static, f32, DistL2>,
    metric: Metric,
    params: HnswParams,
    point_slots: Vec<Option<usize>>,
    retired: usize,
}

impl ApproxIndex {
    pub(crate) fn new(metric: Metric, params: HnswParams) -> Self {
        let graph = Hnsw::<f32, DistL2>::new(
            params.m,
            params.capacity,
            params.max_layer,
            params.ef_construction,
            DistL2 {},
        );

        Self {
            graph,
            metric,
            params,
            point_slots: Vec::new(),
            retired: 0,
        }
    }

    pub(crate) fn insert(&mut self, vector: &[f32], slot: usize) {
        let point_id = self.point_slots.len();
        let prepared = self.metric.prepare(vector);
        self.graph.insert((prepared.as_slice(), point_id));
        self.point_slots.push(Some(slot));
    }

    /// Retire the newest point serving `slot`. Returns false if none does.
    pub(crate) fn retire(&mut self, slot: usize) -> bool {
        let found = self
            .point_slots
            .iter_mut()
            .rev()
            .find(|entry| **entry == Some(slot));

        match found {
            Some(entry) => {
                *entry = None;
                self.retired += 1;
                true
            }
            None => false,
        }
    }

    pub(crate) fn live_points(&self) -> usize {
        self.point_slots.len() - self.retired
    }

    pub(crate) fn retired_points(&self) -> usize {
        self.retired
    }

    /// Slots in graph insertion order, retired points skipped
    pub(crate) fn insertion_order(&self) -> Vec<usize> {
        self.point_slots.iter().flatten().copied().collect()
    }

    pub(crate) fn params(&self) -> &HnswParams {
        &self.params
    }

    pub(crate) fn search(&self, query: &[f32], k: usize, ef_search: usize) -> Vec<Neighbor> {
        if k == 0 || self.live_points() == 0 {
            return Vec::new();
        }

        // Over-fetch so retired points can not crowd out live ones
        let fetch = k + self.retired;
        let prepared = self.metric.prepare(query);
        let neighbours = self.graph.search(&prepared, fetch, ef_search.max(fetch));

        let mut results: Vec<Neighbor> = neighbours
            .into_iter()
            .filter_map(|n| {
                let slot = self.point_slots.get(n.d_id).copied().flatten()?;
                Some(Neighbor {
                    slot,
                    distance: self.metric.from_graph_distance(n.distance),
                })
            })
            .collect();

        results.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.slot.cmp(&b.slot))
        });
        results.truncate(k);
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> HnswParams {
        HnswParams {
            m: 16,
            ef_construction: 200,
            max_layer: 16,
            capacity: 1000,
        }
    }

    #[test]
    fn test_insert_and_search() {
        let mut index = ApproxIndex::new(Metric::L2, params());
        index.insert(&[1.0, 0.0, 0.0], 0);
        index.insert(&[0.0, 1.0, 0.0], 1);
        index.insert(&[0.0, 0.0, 1.0], 2);

        let results = index.search(&[1.0, 0.0, 0.0], 2, 32);
        assert!(!results.is_empty());
        assert_eq!(results[0].slot, 0);
        assert!(results[0].distance < 1e-5);
    }

    #[test]
    fn test_retired_point_is_filtered() {
        let mut index = ApproxIndex::new(Metric::L2, params());
        index.insert(&[1.0, 0.0], 0);
        index.insert(&[0.0, 1.0], 1);
        assert!(index.retire(1));
        assert_eq!(index.live_points(), 1);

        // Slot 1 is reassigned to a different vector
        index.insert(&[-1.0, 0.0], 1);

        let results = index.search(&[0.0, 1.0], 3, 32);
        assert_eq!(results.len(), 2);
        for n in &results {
            // Neither live point sits at (0, 1)
            assert!(n.distance > 0.5);
        }
        assert_eq!(index.insertion_order(), vec![0, 1]);
    }

    #[test]
    fn test_empty_search() {
        let index = ApproxIndex::new(Metric::Cosine, params());
        assert!(index.search(&[1.0, 0.0], 5, 32).is_empty());
    }
}
