//! Cosine similarity between two equal-length vectors.
//!
//! Scoring is done in `f64` regardless of the element type, so `f32`
//! embeddings and `f64` vectors go through the same code path.

use thiserror::Error;

pub type SimilarityScore = f64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimilarityError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("degenerate vector: zero norm, similarity is undefined")]
    DegenerateVector,
}

pub type Result<T> = std::result::Result<T, SimilarityError>;

fn check_lengths<T>(a: &[T], b: &[T]) -> Result<()> {
    if a.len() != b.len() {
        return Err(SimilarityError::InvalidArgument(format!(
            "vector lengths differ ({} vs {})",
            a.len(),
            b.len()
        )));
    }
    if a.is_empty() {
        return Err(SimilarityError::InvalidArgument(
            "vectors must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Largest absolute component. Scaling by it keeps the sums below from
/// overflowing for large finite input.
fn max_abs<T: Copy + Into<f64>>(v: &[T]) -> Result<f64> {
    let mut max = 0.0f64;
    for (i, &x) in v.iter().enumerate() {
        let x: f64 = x.into();
        if !x.is_finite() {
            return Err(SimilarityError::InvalidArgument(format!(
                "component {i} is not finite ({x})"
            )));
        }
        max = max.max(x.abs());
    }
    Ok(max)
}

/// Euclidean length.
pub fn l2_norm<T: Copy + Into<f64>>(v: &[T]) -> Result<f64> {
    if v.is_empty() {
        return Err(SimilarityError::InvalidArgument(
            "vectors must not be empty".to_string(),
        ));
    }
    let scale = max_abs(v)?;
    if scale == 0.0 {
        return Ok(0.0);
    }
    let sum = v.iter().fold(0.0, |acc, &x| {
        let x: f64 = x.into();
        let x = x / scale;
        acc + x * x
    });
    Ok(scale * sum.sqrt())
}

/// `dot(a, b) / (|a| * |b|)`.
///
/// Fails with [`SimilarityError::InvalidArgument`] when the lengths differ,
/// the vectors are empty, or a component is not finite, and with
/// [`SimilarityError::DegenerateVector`] when either norm is zero. Each
/// vector is divided by its largest absolute component before summing, which
/// leaves the ratio unchanged and keeps every sum finite.
pub fn cosine_similarity<T: Copy + Into<f64>>(a: &[T], b: &[T]) -> Result<SimilarityScore> {
    check_lengths(a, b)?;
    let scale_a = max_abs(a)?;
    let scale_b = max_abs(b)?;
    if scale_a == 0.0 || scale_b == 0.0 {
        return Err(SimilarityError::DegenerateVector);
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y): (f64, f64) = (x.into(), y.into());
        let (x, y) = (x / scale_a, y / scale_b);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    Ok(dot / (norm_a.sqrt() * norm_b.sqrt()))
}
