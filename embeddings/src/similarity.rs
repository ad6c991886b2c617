//! Distance computation for face embeddings.

use crate::error::{EmbeddingError, Result};

/// Compute the euclidean distance between two embeddings.
///
/// No normalization is applied; face models already emit vectors that are
/// comparable under the L2 metric. Squares are summed in f64 so that tiny
/// nonzero differences do not underflow to a distance of zero.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let sum: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (f64::from(*x) - f64::from(*y)).powi(2))
        .sum();

    Ok(sum.sqrt() as f32)
}

/// Compute the distance from `query` to each candidate, in candidate order.
pub fn distances<'a, I>(query: &[f32], candidates: I) -> Result<Vec<f32>>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    candidates
        .into_iter()
        .map(|candidate| euclidean_distance(candidate, query))
        .collect()
}
