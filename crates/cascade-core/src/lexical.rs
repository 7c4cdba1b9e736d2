//! Character-bigram lexical similarity.
//!
//! Inputs are trimmed, lowercased and stripped of a fixed punctuation set,
//! then split into overlapping 2-rune windows. Inputs of four runes or fewer
//! also contribute their single runes so short queries stay comparable.
//! Similarity is the Jaccard index of the two bigram sets.

use lru::LruCache;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

/// Characters removed before bigram extraction.
pub const PUNCTUATION: [char; 11] = [' ', ',', '。', '，', '？', '?', '！', '!', '、', '\t', '\n'];

/// Inputs at or below this many runes also emit unigrams.
const UNIGRAM_MAX_RUNES: usize = 4;

pub type BigramSet = HashSet<String>;

/// Extract the bigram set of `input`.
pub fn extract_bigrams(input: &str) -> BigramSet {
    let lowered = input.trim().to_lowercase();
    let runes: Vec<char> = lowered.chars().filter(|c| !PUNCTUATION.contains(c)).collect();

    if runes.is_empty() {
        return BigramSet::new();
    }

    let mut bigrams = BigramSet::with_capacity(runes.len() * 2);
    for pair in runes.windows(2) {
        bigrams.insert(pair.iter().collect());
    }
    if runes.len() <= UNIGRAM_MAX_RUNES {
        for r in &runes {
            bigrams.insert(r.to_string());
        }
    }
    bigrams
}

/// Jaccard index of two sets. Empty sets score 0.
pub fn jaccard(a: &BigramSet, b: &BigramSet) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let intersection = small.iter().filter(|bg| large.contains(*bg)).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        return 0.0;
    }
    intersection as f32 / union as f32
}

/// FIFO memo of bigram sets. Lookups use `peek` so hits do not refresh an
/// entry's position; the oldest insert is evicted first.
struct BigramCache {
    entries: Option<LruCache<String, Arc<BigramSet>>>,
}

impl BigramCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(LruCache::new),
        }
    }

    fn get_or_insert(&mut self, input: &str) -> Arc<BigramSet> {
        let Some(entries) = self.entries.as_mut() else {
            return Arc::new(extract_bigrams(input));
        };
        if let Some(bigrams) = entries.peek(input) {
            return Arc::clone(bigrams);
        }

        let bigrams = Arc::new(extract_bigrams(input));
        entries.put(input.to_string(), Arc::clone(&bigrams));
        bigrams
    }

    fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, LruCache::len)
    }
}

/// Lexical scorer with a bounded bigram memo.
pub struct LexicalSimilarity {
    threshold: f32,
    cache: Mutex<BigramCache>,
}

impl LexicalSimilarity {
    /// `threshold` is the match threshold used for the upper-bound short
    /// circuit; `cache_capacity` bounds the number of memoized inputs.
    pub fn new(threshold: f32, cache_capacity: usize) -> Self {
        Self {
            threshold,
            cache: Mutex::new(BigramCache::new(cache_capacity)),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Bigram set of `input`, memoized per raw string.
    pub fn bigrams(&self, input: &str) -> Arc<BigramSet> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert(input)
    }

    /// Number of memoized inputs.
    pub fn cached_inputs(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Similarity of `a` and `b` in `[0, 1]`.
    ///
    /// When `min(|A|,|B|) / max(|A|,|B|)` is already below the threshold the
    /// exact intersection is skipped and that bound is returned instead; the
    /// returned score is then an upper bound that is still sub-threshold.
    pub fn similarity(&self, a: &str, b: &str) -> f32 {
        if a == b {
            return 1.0;
        }

        let bigrams_a = self.bigrams(a);
        let bigrams_b = self.bigrams(b);
        if bigrams_a.is_empty() || bigrams_b.is_empty() {
            return 0.0;
        }

        let (min_len, max_len) = if bigrams_a.len() <= bigrams_b.len() {
            (bigrams_a.len(), bigrams_b.len())
        } else {
            (bigrams_b.len(), bigrams_a.len())
        };
        let upper_bound = min_len as f32 / max_len as f32;
        if upper_bound < self.threshold {
            return upper_bound;
        }

        jaccard(&bigrams_a, &bigrams_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BigramSet {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_extract_bigrams_long_input() {
        let bigrams = extract_bigrams("搜索会议笔记");
        assert_eq!(bigrams, set(&["搜索", "索会", "会议", "议笔", "笔记"]));
    }

    #[test]
    fn test_extract_bigrams_short_input_adds_unigrams() {
        let bigrams = extract_bigrams("搜索笔记");
        assert_eq!(
            bigrams,
            set(&["搜索", "索笔", "笔记", "搜", "索", "笔", "记"])
        );
    }

    #[test]
    fn test_extract_bigrams_normalizes() {
        assert_eq!(extract_bigrams("  Hi, Bo! "), extract_bigrams("hibo"));
        assert!(extract_bigrams("，。？！").is_empty());
        assert!(extract_bigrams("   ").is_empty());
    }

    #[test]
    fn test_identity_and_symmetry() {
        let lex = LexicalSimilarity::new(0.8, 100);
        let pairs = [
            ("明天有什么会议", "明天有什么安排"),
            ("搜索笔记", "搜索会议笔记"),
            ("hello world", "world hello"),
            ("", "会议"),
        ];
        for (a, b) in pairs {
            assert_eq!(lex.similarity(a, a), 1.0);
            assert_eq!(lex.similarity(a, b), lex.similarity(b, a));
            let s = lex.similarity(a, b);
            assert!((0.0..=1.0).contains(&s));
        }
    }

    #[test]
    fn test_upper_bound_short_circuit() {
        let lex = LexicalSimilarity::new(0.8, 100);
        // 7 bigrams vs 4 bigrams: bound 4/7 < 0.8, returned as-is.
        let score = lex.similarity("一二三四五六七八", "一二三四五");
        let expected = extract_bigrams("一二三四五").len() as f32
            / extract_bigrams("一二三四五六七八").len() as f32;
        assert!((score - expected).abs() < 1e-6);
        assert!(score < 0.8);
    }

    #[test]
    fn test_full_jaccard_when_bound_passes() {
        let lex = LexicalSimilarity::new(0.5, 100);
        let a = extract_bigrams("明天有什么会议");
        let b = extract_bigrams("明天有什么安排");
        assert!((lex.similarity("明天有什么会议", "明天有什么安排") - jaccard(&a, &b)).abs() < 1e-6);
    }

    #[test]
    fn test_bigram_cache_fifo_eviction() {
        let lex = LexicalSimilarity::new(0.8, 2);
        let first = lex.bigrams("first input");
        lex.bigrams("second input");
        assert_eq!(lex.cached_inputs(), 2);

        // Re-reading does not reorder: FIFO, not LRU.
        let again = lex.bigrams("first input");
        assert!(Arc::ptr_eq(&first, &again));

        lex.bigrams("third input");
        assert_eq!(lex.cached_inputs(), 2);
        let refreshed = lex.bigrams("first input");
        assert!(!Arc::ptr_eq(&first, &refreshed));
    }

    #[test]
    fn test_zero_capacity_cache() {
        let lex = LexicalSimilarity::new(0.8, 0);
        lex.bigrams("anything");
        assert_eq!(lex.cached_inputs(), 0);
    }
}
