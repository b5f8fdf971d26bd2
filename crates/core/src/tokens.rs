//! Token estimation
//!
//! Every budget comparison in a turn must use one estimator. Implementations
//! must be monotonic: appending text never lowers the count.

use unicode_segmentation::UnicodeSegmentation;

/// Length/tokenizer estimator
pub trait TokenCounter: Send + Sync {
    /// Estimated token count of `text`
    fn count_tokens(&self, text: &str) -> usize;

    /// Estimated token count of several texts
    fn count_all<'a>(&self, texts: &mut dyn Iterator<Item = &'a str>) -> usize {
        texts.map(|t| self.count_tokens(t)).sum()
    }
}

/// Grapheme-based estimator
///
/// Latin-like text averages ~4 graphemes per token; dense scripts (Hangul,
/// CJK, kana, Devanagari) average ~2. The two counts are rounded up
/// separately and added, which keeps the estimate monotonic in appended text.
#[derive(Debug, Clone, Copy)]
pub struct HeuristicTokenCounter {
    /// Graphemes per token for Latin-like text
    pub latin_chars_per_token: usize,
    /// Graphemes per token for dense scripts
    pub dense_chars_per_token: usize,
}

impl Default for HeuristicTokenCounter {
    fn default() -> Self {
        Self {
            latin_chars_per_token: 4,
            dense_chars_per_token: 2,
        }
    }
}

impl HeuristicTokenCounter {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_dense(c: char) -> bool {
        matches!(c,
            '\u{AC00}'..='\u{D7A3}'   // Hangul syllables
            | '\u{1100}'..='\u{11FF}' // Hangul jamo
            | '\u{3130}'..='\u{318F}' // Hangul compatibility jamo
            | '\u{3040}'..='\u{30FF}' // Hiragana / Katakana
            | '\u{4E00}'..='\u{9FFF}' // CJK unified ideographs
            | '\u{0900}'..='\u{097F}' // Devanagari
        )
    }
}

impl TokenCounter for HeuristicTokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        let mut latin = 0usize;
        let mut dense = 0usize;
        for grapheme in text.graphemes(true) {
            match grapheme.chars().next() {
                Some(c) if Self::is_dense(c) => dense += 1,
                Some(_) => latin += 1,
                None => {},
            }
        }
        latin.div_ceil(self.latin_chars_per_token.max(1))
            + dense.div_ceil(self.dense_chars_per_token.max(1))
    }
}

/// Longest prefix of `text` (on grapheme boundaries) within `budget` tokens
///
/// Relies on the counter being monotonic, so the cut point is found by
/// binary search.
pub fn truncate_to_tokens<'a>(text: &'a str, budget: usize, counter: &dyn TokenCounter) -> &'a str {
    if counter.count_tokens(text) <= budget {
        return text;
    }
    let boundaries: Vec<usize> = text
        .grapheme_indices(true)
        .map(|(i, _)| i)
        .skip(1)
        .chain(std::iter::once(text.len()))
        .collect();

    // largest idx whose prefix fits
    let (mut lo, mut hi) = (0usize, boundaries.len());
    while lo < hi {
        let mid = (lo + hi) / 2;
        if counter.count_tokens(&text[..boundaries[mid]]) <= budget {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    if lo == 0 {
        ""
    } else {
        &text[..boundaries[lo - 1]]
    }
}
