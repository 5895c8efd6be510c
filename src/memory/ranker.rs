//! Pluggable ranking of recalled memories.

use super::MemoryItem;

/// Reorders or filters retrieved memories before prompt injection.
///
/// When no ranker is configured, the retriever's order is preserved.
pub trait Ranker: Send + Sync {
    /// Select up to `top_k` memories for the given query.
    fn rank(&self, query: &str, memories: Vec<MemoryItem>, top_k: usize) -> Vec<MemoryItem>;
}

/// Ranks by stored similarity, descending, truncated to `top_k`.
pub struct SimilarityRanker;

impl Ranker for SimilarityRanker {
    fn rank(&self, _query: &str, mut memories: Vec<MemoryItem>, top_k: usize) -> Vec<MemoryItem> {
        memories.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        memories.truncate(top_k);
        memories
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKind;

    fn item(text: &str, similarity: f64) -> MemoryItem {
        MemoryItem {
            role: "assistant".to_string(),
            text: text.to_string(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            similarity,
            kind: MemoryKind::Persistent,
        }
    }

    #[test]
    fn test_similarity_ranker_sorts_and_truncates() {
        let ranker = SimilarityRanker;
        let memories = vec![item("low", 0.5), item("high", 0.95), item("mid", 0.8)];

        let ranked = ranker.rank("query", memories, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].text, "high");
        assert_eq!(ranked[1].text, "mid");
    }

    #[test]
    fn test_similarity_ranker_short_input() {
        let ranker = SimilarityRanker;
        let ranked = ranker.rank("q", vec![item("only", 0.9)], 5);
        assert_eq!(ranked.len(), 1);
    }
}
