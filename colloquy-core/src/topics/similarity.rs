//! Topic similarity abstraction.
//!
//! The `Similarity` trait is the primary extensibility point of the topic
//! engine: swap in `LexicalSimilarity` (default), an embedding-backed cosine
//! implementation, or any other conforming scorer without touching the
//! reuse-detection logic. The contract: symmetric, `score(a, a) == 1.0`,
//! results in `[0, 1]`.

use std::collections::HashMap;

use parking_lot::RwLock;

/// Trait for all similarity implementations.
pub trait Similarity: Send + Sync + 'static {
    /// Score two topic strings in `[0, 1]`.
    fn score(&self, a: &str, b: &str) -> f32;
}

/// Cosine similarity over lowercase word-frequency vectors.
///
/// Cheap and deterministic. Quality is bounded by surface overlap — "Solar
/// Energy" and "Photovoltaics" score 0 — but the reuse decision only needs a
/// conforming scorer; a semantic implementation is a drop-in upgrade.
#[derive(Debug, Clone, Default)]
pub struct LexicalSimilarity;

/// Words too generic to signal topic identity.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "is",
    "it", "of", "on", "or", "that", "the", "this", "to", "with",
];

impl LexicalSimilarity {
    pub fn new() -> Self {
        Self
    }

    fn term_counts(text: &str) -> HashMap<String, f32> {
        let mut counts = HashMap::new();
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .map(|t| t.to_lowercase())
            .filter(|t| !t.is_empty() && !STOPWORDS.contains(&t.as_str()))
        {
            *counts.entry(token).or_insert(0.0) += 1.0;
        }
        counts
    }
}

impl Similarity for LexicalSimilarity {
    fn score(&self, a: &str, b: &str) -> f32 {
        if a.trim().eq_ignore_ascii_case(b.trim()) {
            return 1.0;
        }

        let counts_a = Self::term_counts(a);
        let counts_b = Self::term_counts(b);
        if counts_a.is_empty() || counts_b.is_empty() {
            return 0.0;
        }

        let dot: f32 = counts_a
            .iter()
            .filter_map(|(term, weight)| counts_b.get(term).map(|other| weight * other))
            .sum();
        let norm_a: f32 = counts_a.values().map(|w| w * w).sum::<f32>().sqrt();
        let norm_b: f32 = counts_b.values().map(|w| w * w).sum::<f32>().sqrt();
        (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
    }
}

/// Caching wrapper: scores are memoised per unordered string pair.
///
/// Topic labels are short and few per conversation, so the cache is
/// unbounded.
pub struct CachedSimilarity<S> {
    inner: S,
    cache: RwLock<HashMap<(String, String), f32>>,
}

impl<S: Similarity> CachedSimilarity<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn key(a: &str, b: &str) -> (String, String) {
        if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        }
    }
}

impl<S: Similarity> Similarity for CachedSimilarity<S> {
    fn score(&self, a: &str, b: &str) -> f32 {
        let key = Self::key(a, b);
        if let Some(&cached) = self.cache.read().get(&key) {
            return cached;
        }
        let score = self.inner.score(a, b);
        self.cache.write().insert(key, score);
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn identical_strings_score_one() {
        let sim = LexicalSimilarity::new();
        assert_eq!(sim.score("Solar Energy", "Solar Energy"), 1.0);
        assert_eq!(sim.score("solar energy", "Solar Energy"), 1.0);
        assert_eq!(sim.score("", ""), 1.0);
    }

    #[test]
    fn disjoint_topics_score_zero() {
        let sim = LexicalSimilarity::new();
        assert_eq!(sim.score("Solar Energy", "Quantum Computing"), 0.0);
    }

    #[test]
    fn overlapping_topics_score_between() {
        let sim = LexicalSimilarity::new();
        let score = sim.score("Solar Energy Storage", "Solar Energy Policy");
        assert!(score > 0.5 && score < 1.0, "score = {score}");
    }

    #[test]
    fn score_is_symmetric() {
        let sim = LexicalSimilarity::new();
        let ab = sim.score("renewable solar power", "solar power grids");
        let ba = sim.score("solar power grids", "renewable solar power");
        assert!((ab - ba).abs() < f32::EPSILON);
    }

    #[test]
    fn stopwords_do_not_inflate_scores() {
        let sim = LexicalSimilarity::new();
        assert_eq!(sim.score("The Future of AI", "The History of Rome"), 0.0);
    }

    struct CountingSim(Arc<AtomicUsize>);

    impl Similarity for CountingSim {
        fn score(&self, a: &str, b: &str) -> f32 {
            self.0.fetch_add(1, Ordering::Relaxed);
            LexicalSimilarity::new().score(a, b)
        }
    }

    #[test]
    fn cache_computes_each_pair_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sim = CachedSimilarity::new(CountingSim(Arc::clone(&calls)));

        let first = sim.score("Solar Energy", "AI Future");
        let second = sim.score("AI Future", "Solar Energy");
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }
}
