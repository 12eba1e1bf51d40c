//! Ranking of search candidates supplied by the keyword-search caller.
//!
//! The caller brings keyword scores (already in `[0, 1]`) and whatever
//! stored embeddings the candidates have. Each candidate gets a semantic
//! score from [`cosine_similarity`] against the query vector, and both are
//! combined with [`hybrid_score`]. A candidate without a usable embedding
//! still ranks on its keyword score alone.

use serde::Serialize;

use crate::config::Config;
use crate::error::ValidationError;
use crate::hybrid::{hybrid_score, validate_weights, HybridScore, HybridWeights};
use crate::models::Chunk;
use crate::vector::{cosine_similarity, validate_dimensions};

#[derive(Debug, Clone)]
pub struct RankCandidate {
    pub item_id: String,
    pub keyword_score: Option<f64>,
    pub embedding: Option<Vec<f32>>,
}

impl RankCandidate {
    pub fn from_chunk(chunk: &Chunk, keyword_score: Option<f64>) -> Self {
        Self {
            item_id: chunk.id.clone(),
            keyword_score,
            embedding: chunk.embedding.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedItem {
    pub item_id: String,
    pub score: HybridScore,
}

/// Score and order candidates by final score (descending), ties by id.
///
/// The query vector must have `expected_dims` components. A stored embedding
/// whose dimension differs from the query's is treated as absent. Fails on
/// invalid weights, a mis-sized query vector or a keyword score outside
/// `[0, 1]`.
pub fn rank(
    query_vector: Option<&[f32]>,
    expected_dims: usize,
    candidates: &[RankCandidate],
    weights: HybridWeights,
) -> Result<Vec<RankedItem>, ValidationError> {
    validate_weights(&weights)?;
    if let Some(q) = query_vector {
        validate_dimensions(q, expected_dims)?;
    }

    let mut ranked = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let semantic = match (query_vector, candidate.embedding.as_deref()) {
            (Some(q), Some(e)) => match cosine_similarity(q, e) {
                Ok(sim) => Some(sim),
                Err(err) => {
                    tracing::warn!(item_id = %candidate.item_id, error = %err, "ignoring stored embedding");
                    None
                }
            },
            _ => None,
        };
        ranked.push(RankedItem {
            item_id: candidate.item_id.clone(),
            score: hybrid_score(semantic, candidate.keyword_score, weights)?,
        });
    }

    ranked.sort_by(|a, b| {
        b.score
            .final_score
            .total_cmp(&a.score.final_score)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
    Ok(ranked)
}

/// Run the score command: combine two scores with the configured weights,
/// optionally overridden on the command line.
pub fn run_score(
    config: &Config,
    semantic: Option<f64>,
    keyword: Option<f64>,
    semantic_weight: Option<f64>,
    keyword_weight: Option<f64>,
) -> anyhow::Result<()> {
    let defaults = config.retrieval.weights();
    let weights = HybridWeights {
        semantic: semantic_weight.unwrap_or(defaults.semantic),
        keyword: keyword_weight.unwrap_or(defaults.keyword),
    };
    let score = hybrid_score(semantic, keyword, weights)?;

    println!("semantic: {}", format_score(score.semantic));
    println!("keyword:  {}", format_score(score.keyword));
    println!(
        "weights:  semantic={} keyword={}",
        score.weights.semantic, score.weights.keyword
    );
    println!("final:    {:.4}", score.final_score);
    Ok(())
}

fn format_score(score: Option<f64>) -> String {
    match score {
        Some(s) => format!("{:.4}", s),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, keyword: Option<f64>, embedding: Option<Vec<f32>>) -> RankCandidate {
        RankCandidate {
            item_id: id.to_string(),
            keyword_score: keyword,
            embedding,
        }
    }

    #[test]
    fn test_rank_orders_by_final_score() {
        let query = vec![1.0, 0.0];
        let candidates = vec![
            candidate("far", Some(0.9), Some(vec![-1.0, 0.0])),
            candidate("near", Some(0.5), Some(vec![1.0, 0.0])),
            candidate("keyword-only", Some(0.8), None),
        ];
        let ranked = rank(Some(query.as_slice()), 2, &candidates, HybridWeights::default()).unwrap();
        let ids: Vec<&str> = ranked.iter().map(|r| r.item_id.as_str()).collect();
        // near: 0.7*1.0 + 0.3*0.5 = 0.85; keyword-only: 0.8; far: 0.7*0.0 + 0.3*0.9 = 0.27
        assert_eq!(ids, vec!["near", "keyword-only", "far"]);
        assert!((ranked[0].score.final_score - 0.85).abs() < 1e-9);
        assert_eq!(ranked[1].score.semantic, None);
    }

    #[test]
    fn test_wrong_dimension_treated_as_absent() {
        let query = vec![1.0, 0.0];
        let candidates = vec![candidate("a", Some(0.4), Some(vec![1.0, 0.0, 0.0]))];
        let ranked = rank(Some(query.as_slice()), 2, &candidates, HybridWeights::default()).unwrap();
        assert_eq!(ranked[0].score.semantic, None);
        assert_eq!(ranked[0].score.final_score, 0.4);
    }

    #[test]
    fn test_no_query_vector_is_keyword_only() {
        let candidates = vec![
            candidate("b", Some(0.3), Some(vec![1.0])),
            candidate("a", Some(0.3), None),
            candidate("c", None, None),
        ];
        let ranked = rank(None, 2, &candidates, HybridWeights::default()).unwrap();
        let ids: Vec<&str> = ranked.iter().map(|r| r.item_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(ranked[2].score.final_score, 0.0);
    }

    #[test]
    fn test_invalid_weights() {
        let weights = HybridWeights {
            semantic: 0.5,
            keyword: 0.6,
        };
        assert!(rank(None, 2, &[], weights).is_err());
    }

    #[test]
    fn test_query_vector_must_match_configured_dimension() {
        let query = vec![1.0, 0.0, 0.0];
        let candidates = vec![candidate("a", Some(0.4), Some(vec![1.0, 0.0, 0.0]))];
        let err = rank(Some(query.as_slice()), 2, &candidates, HybridWeights::default()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::DimensionMismatch {
                expected: 2,
                got: 3
            }
        );
    }

    #[test]
    fn test_out_of_range_keyword_score_rejected() {
        let candidates = vec![candidate("a", Some(1.5), None)];
        assert!(matches!(
            rank(None, 2, &candidates, HybridWeights::default()),
            Err(ValidationError::InvalidScore(_))
        ));
    }
}
