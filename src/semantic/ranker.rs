//! Threshold-filtered, limit-bounded ranking of stored chunks.

use crate::semantic::similarity::{cosine_similarity, l2_norm, SimilarityError};
use crate::semantic::types::SearchResult;

/// Rank `items` against `query` by cosine similarity.
///
/// Items scoring below `base_similarity` are dropped. Survivors are sorted
/// by score descending; equal scores keep the order in which `items`
/// yielded them, which for store-backed searches is the store's
/// enumeration order. At most `limit` results are returned.
///
/// A stored vector with zero norm scores `0.0`. A zero-norm query is an
/// error, as is any stored vector whose dimension differs from the query.
pub fn rank<'a, 'b, I>(
    query: &[f32],
    items: I,
    limit: usize,
    base_similarity: f32,
) -> Result<Vec<SearchResult>, SimilarityError>
where
    I: IntoIterator<Item = (&'a str, &'b [f32])>,
{
    if limit == 0 {
        return Ok(vec![]);
    }

    if l2_norm(query) < f32::EPSILON {
        return Err(SimilarityError::DegenerateVector);
    }

    let mut results = Vec::new();
    for (chunk, embedding) in items {
        let score = match cosine_similarity(query, embedding) {
            Ok(score) => score,
            // query is known to be non-degenerate, so the stored vector is
            Err(SimilarityError::DegenerateVector) => 0.0,
            Err(err) => return Err(err),
        };

        if score >= base_similarity {
            results.push(SearchResult {
                chunk: chunk.to_string(),
                score,
            });
        }
    }

    // sort_by is stable
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    results.truncate(limit);

    Ok(results)
}
