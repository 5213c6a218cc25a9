use std::collections::{HashMap, HashSet};

use crate::error::{Result, RetrievalError};
use crate::models::{Chunk, RetrievalLeg, RetrievalResult};
use crate::search::scope::{RetrievalQuery, Retriever};

/// RRF constant
const RRF_K: f32 = 60.0;
const WEIGHT_SUM_TOLERANCE: f32 = 1e-6;

/// Per-leg fusion weights. Always non-negative and summing to 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    semantic: f32,
    lexical: f32,
}

impl FusionWeights {
    /// Weights that are negative, non-finite or do not sum to 1.0 are rejected,
    /// never silently normalized.
    pub fn new(semantic: f32, lexical: f32) -> Result<Self> {
        let valid = semantic.is_finite()
            && lexical.is_finite()
            && semantic >= 0.0
            && lexical >= 0.0
            && ((semantic + lexical) - 1.0).abs() <= WEIGHT_SUM_TOLERANCE;
        if !valid {
            return Err(RetrievalError::InvalidWeights { semantic, lexical });
        }
        Ok(Self { semantic, lexical })
    }

    pub fn semantic(&self) -> f32 {
        self.semantic
    }

    pub fn lexical(&self) -> f32 {
        self.lexical
    }

    fn for_leg(&self, leg: RetrievalLeg) -> f32 {
        match leg {
            RetrievalLeg::Semantic => self.semantic,
            RetrievalLeg::Lexical => self.lexical,
        }
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            semantic: 0.6,
            lexical: 0.4,
        }
    }
}

/// A deduplicated candidate after fusion.
#[derive(Debug, Clone)]
pub struct FusedChunk {
    pub chunk: Chunk,
    pub fused_score: f32,
    /// 0-based rank in the semantic leg, if it appeared there
    pub semantic_rank: Option<usize>,
    /// 0-based rank in the lexical leg, if it appeared there
    pub lexical_rank: Option<usize>,
}

/// Run both legs against the query and fuse their rankings.
pub fn fuse(
    query: &RetrievalQuery<'_>,
    semantic: &dyn Retriever,
    lexical: &dyn Retriever,
    weights: FusionWeights,
) -> Result<Vec<FusedChunk>> {
    let semantic_results = semantic.retrieve(query)?;
    let lexical_results = lexical.retrieve(query)?;
    tracing::debug!(
        "Legs returned {} semantic / {} lexical candidates",
        semantic_results.len(),
        lexical_results.len()
    );
    Ok(fuse_ranked(&semantic_results, &lexical_results, weights))
}

/// Weighted reciprocal-rank fusion of two ranked lists.
///
/// Each list contributes `weight / (RRF_K + rank + 1)` per chunk. A chunk seen
/// in both legs (same `document_id` and `chunk_index`) appears once with both
/// contributions summed. Output is sorted by fused score, descending; equal
/// scores keep first-seen order, semantic leg before lexical.
pub fn fuse_ranked(
    semantic: &[RetrievalResult],
    lexical: &[RetrievalResult],
    weights: FusionWeights,
) -> Vec<FusedChunk> {
    type Key = (String, usize);
    let mut fused: Vec<FusedChunk> = Vec::with_capacity(semantic.len() + lexical.len());
    let mut positions: HashMap<Key, usize> = HashMap::new();

    for (leg, results) in [
        (RetrievalLeg::Semantic, semantic),
        (RetrievalLeg::Lexical, lexical),
    ] {
        let weight = weights.for_leg(leg);
        let mut seen_in_leg: HashSet<Key> = HashSet::new();

        for (rank, result) in results.iter().enumerate() {
            let key: Key = (result.chunk.document_id.clone(), result.chunk.chunk_index);
            if !seen_in_leg.insert(key.clone()) {
                continue;
            }
            let contribution = weight * (1.0 / (RRF_K + rank as f32 + 1.0));

            let position = *positions.entry(key).or_insert_with(|| {
                fused.push(FusedChunk {
                    chunk: result.chunk.clone(),
                    fused_score: 0.0,
                    semantic_rank: None,
                    lexical_rank: None,
                });
                fused.len() - 1
            });

            let entry = &mut fused[position];
            entry.fused_score += contribution;
            match leg {
                RetrievalLeg::Semantic => entry.semantic_rank = Some(rank),
                RetrievalLeg::Lexical => entry.lexical_rank = Some(rank),
            }
        }
    }

    // Stable sort: ties keep first-seen order
    fused.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused
}
