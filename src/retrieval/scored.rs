//! Scored result structures

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Which leg of a hybrid query produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    Dense,
    Lexical,
}

impl ResultSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultSource::Dense => "dense",
            ResultSource::Lexical => "lexical",
        }
    }
}

/// A document with relevance score and the leg that found it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredDocument {
    /// Document id
    pub id: String,

    /// Stored text
    pub text: String,

    /// Caller-supplied metadata
    pub metadata: Map<String, Value>,

    /// Relevance score, higher is better. Dense hits score `1 / (1 + distance)`,
    /// lexical hits carry their BM25 score.
    pub score: f32,

    pub source: ResultSource,

    /// Vector distance for dense hits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
}

impl ScoredDocument {
    /// Get a short preview of the text (first N characters)
    pub fn preview(&self, max_chars: usize) -> String {
        if self.text.chars().count() <= max_chars {
            self.text.clone()
        } else {
            let head: String = self.text.chars().take(max_chars).collect();
            format!("{}...", head)
        }
    }
}

/// Monotonic similarity for a distance (1.0 at distance 0)
pub fn distance_to_score(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_to_score() {
        assert_eq!(distance_to_score(0.0), 1.0);
        assert_eq!(distance_to_score(1.0), 0.5);
        assert!(distance_to_score(0.1) > distance_to_score(0.2));
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        let doc = ScoredDocument {
            id: "a".to_string(),
            text: "héllo wörld".to_string(),
            metadata: Map::new(),
            score: 1.0,
            source: ResultSource::Dense,
            distance: Some(0.0),
        };
        assert_eq!(doc.preview(2), "hé...");
        assert_eq!(doc.preview(50), "héllo wörld");
    }

    #[test]
    fn test_source_serializes_lowercase() {
        let json = serde_json::to_string(&ResultSource::Lexical).unwrap();
        assert_eq!(json, "\"lexical\"");
    }
}
