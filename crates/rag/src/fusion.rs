//! Reciprocal Rank Fusion
//!
//! `rrf_score(d) = Σ 1 / (rank_in_list(d) + K)` over every list `d` appears
//! in, with 1-based ranks. Documents are keyed by normalized text so the same
//! passage found by both searches merges into one entry.
//!
//! Ordering is independent of the order the lists are passed in: ties on
//! score fall back to source priority, best rank, then the normalized text.

use std::cmp::Ordering;
use std::collections::HashMap;

use medirag_config::ConfigError;
use medirag_core::{Document, DocumentSource};

use crate::RagError;

/// Reciprocal rank fuser
#[derive(Debug, Clone, Copy)]
pub struct RankFuser {
    k: f32,
}

impl Default for RankFuser {
    fn default() -> Self {
        Self {
            k: medirag_config::constants::rag::RRF_K,
        }
    }
}

struct Entry {
    doc: Document,
    score: f32,
    best_rank: usize,
    sources: Vec<DocumentSource>,
}

impl RankFuser {
    pub fn new(k: f32) -> Result<Self, RagError> {
        if k.is_nan() || k <= 0.0 {
            return Err(ConfigError::invalid("retrieval.rrf_k", format!("Must be positive, got {}", k)).into());
        }
        Ok(Self { k })
    }

    pub fn k(&self) -> f32 {
        self.k
    }

    /// Whether `candidate` should represent the entry instead of `current`
    fn prefer(candidate: &Document, current: &Document) -> bool {
        (candidate.source.priority(), candidate.rank, &candidate.id)
            < (current.source.priority(), current.rank, &current.id)
    }

    /// Fuse ranked lists
    ///
    /// When at most one list is non-empty it is returned unchanged.
    pub fn fuse(&self, lists: &[Vec<Document>]) -> Vec<Document> {
        let non_empty: Vec<&Vec<Document>> = lists.iter().filter(|l| !l.is_empty()).collect();
        match non_empty.len() {
            0 => return Vec::new(),
            1 => return non_empty[0].clone(),
            _ => {},
        }

        let mut entries: HashMap<String, Entry> = HashMap::new();

        for list in non_empty {
            // a passage repeated inside one list counts once, at its best rank
            let mut best_in_list: HashMap<String, &Document> = HashMap::new();
            for doc in list {
                let key = doc.fusion_key();
                match best_in_list.get(&key) {
                    Some(existing) if existing.rank <= doc.rank => {},
                    _ => {
                        best_in_list.insert(key, doc);
                    },
                }
            }

            for (key, doc) in best_in_list {
                let contribution = 1.0 / (doc.rank as f32 + self.k);
                match entries.get_mut(&key) {
                    Some(entry) => {
                        entry.score += contribution;
                        entry.best_rank = entry.best_rank.min(doc.rank);
                        if !entry.sources.contains(&doc.source) {
                            entry.sources.push(doc.source);
                        }
                        if Self::prefer(doc, &entry.doc) {
                            entry.doc = doc.clone();
                        }
                    },
                    None => {
                        entries.insert(
                            key,
                            Entry {
                                doc: doc.clone(),
                                score: contribution,
                                best_rank: doc.rank,
                                sources: vec![doc.source],
                            },
                        );
                    },
                }
            }
        }

        let mut fused: Vec<(String, Entry)> = entries.into_iter().collect();
        for (_, entry) in fused.iter_mut() {
            if entry.sources.len() > 1 {
                entry.doc.source = DocumentSource::Fused;
            }
        }

        fused.sort_by(|(ka, a), (kb, b)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.doc.source.priority().cmp(&b.doc.source.priority()))
                .then_with(|| a.best_rank.cmp(&b.best_rank))
                .then_with(|| ka.cmp(kb))
        });

        fused
            .into_iter()
            .enumerate()
            .map(|(i, (_, entry))| {
                let mut doc = entry.doc;
                doc.score = entry.score;
                doc.rank = i + 1;
                doc
            })
            .collect()
    }
}
