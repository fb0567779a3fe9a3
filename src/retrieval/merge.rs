//! Merging the dense and lexical legs

use crate::retrieval::ScoredDocument;
use std::collections::HashSet;

/// Concatenate dense then lexical results, keeping the first instance of each id.
///
/// A document found by both legs keeps its dense entry. The result is sorted
/// by score descending (stable, so equal scores keep merge order) and cut to
/// `limit`.
pub fn merge_results(
    dense: Vec<ScoredDocument>,
    lexical: Vec<ScoredDocument>,
    limit: usize,
) -> Vec<ScoredDocument> {
    let mut seen: HashSet<String> = HashSet::new();

    let mut merged: Vec<ScoredDocument> = dense
        .into_iter()
        .chain(lexical)
        .filter(|doc| seen.insert(doc.id.clone()))
        .collect();

    merged.sort_by(|a, b| b.score.total_cmp(&a.score));
    merged.truncate(limit);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::ResultSource;

    fn doc(id: &str, score: f32, source: ResultSource) -> ScoredDocument {
        ScoredDocument {
            id: id.to_string(),
            text: format!("text {id}"),
            metadata: Default::default(),
            score,
            source,
            distance: None,
        }
    }

    #[test]
    fn test_dense_wins_on_duplicate() {
        let dense = vec![doc("a", 0.4, ResultSource::Dense)];
        let lexical = vec![
            doc("a", 7.5, ResultSource::Lexical),
            doc("b", 1.0, ResultSource::Lexical),
        ];

        let merged = merge_results(dense, lexical, 10);

        assert_eq!(merged.len(), 2);
        let a = merged.iter().find(|d| d.id == "a").unwrap();
        assert_eq!(a.source, ResultSource::Dense);
        assert_eq!(a.score, 0.4);
    }

    #[test]
    fn test_sorted_and_truncated() {
        let dense = vec![
            doc("a", 0.9, ResultSource::Dense),
            doc("b", 0.2, ResultSource::Dense),
        ];
        let lexical = vec![doc("c", 0.5, ResultSource::Lexical)];

        let merged = merge_results(dense, lexical, 2);
        let ids: Vec<&str> = merged.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_zero_limit() {
        let dense = vec![doc("a", 0.9, ResultSource::Dense)];
        assert!(merge_results(dense, Vec::new(), 0).is_empty());
    }
}
