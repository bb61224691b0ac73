use crate::EmbedError;

/// Storage dimension for entity embeddings. Everything persisted next to an
/// entity row, and everything the detector compares, has exactly this width.
pub const EMBEDDING_DIM: usize = 1024;

/// How far a squared norm may drift from 1.0 before a vector is re-normalized.
const UNIT_NORM_TOLERANCE: f64 = 1e-6;

/// Cosine similarity between two entity embeddings.
///
/// Mismatched widths score 0.0 rather than erroring, so a stale cached
/// vector can never rank a duplicate candidate, only demote it.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
  if a.is_empty() || a.len() != b.len() {
    return 0.0;
  }

  let mut dot = 0.0_f64;
  let mut norm_a_sq = 0.0_f64;
  let mut norm_b_sq = 0.0_f64;
  for (&x, &y) in a.iter().zip(b.iter()) {
    let (x, y) = (f64::from(x), f64::from(y));
    dot += x * y;
    norm_a_sq += x * x;
    norm_b_sq += y * y;
  }

  let denominator = (norm_a_sq * norm_b_sq).sqrt();
  if denominator <= f64::EPSILON {
    return 0.0;
  }
  dot / denominator
}

/// Fit a raw provider response to the storage dimension and unit length.
///
/// Endpoints that ignore the requested dimension return wider vectors, which
/// truncate cleanly as long as they are re-normalized afterwards. A response
/// narrower than the storage dimension carries too little signal to compare
/// against stored vectors and is rejected.
pub fn prepare_embedding(mut raw: Vec<f32>) -> Result<Vec<f32>, EmbedError> {
  if raw.len() < EMBEDDING_DIM {
    return Err(EmbedError::Invalid(format!(
      "embedding has {} dimensions, storage needs {EMBEDDING_DIM}",
      raw.len()
    )));
  }
  raw.truncate(EMBEDDING_DIM);

  let norm_sq: f64 = raw.iter().map(|&x| f64::from(x) * f64::from(x)).sum();
  if (norm_sq - 1.0).abs() > UNIT_NORM_TOLERANCE {
    let norm = norm_sq.sqrt();
    if norm > 0.0 {
      for component in &mut raw {
        *component = (f64::from(*component) / norm) as f32;
      }
    }
  }

  Ok(raw)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn norm_sq(vector: &[f32]) -> f64 {
    vector.iter().map(|&x| f64::from(x) * f64::from(x)).sum()
  }

  #[test]
  fn parallel_and_opposite_directions_hit_the_extremes() {
    let v = [0.6_f32, 0.8, 0.0];
    assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-9);
  }

  #[test]
  fn orthogonal_directions_score_zero() {
    assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
  }

  #[test]
  fn width_mismatch_scores_zero_instead_of_erroring() {
    assert_eq!(cosine_similarity(&[], &[1.0]), 0.0);
    assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
  }

  #[test]
  fn zero_vectors_score_zero() {
    assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
  }

  #[test]
  fn wide_responses_truncate_and_renormalize() {
    let out = prepare_embedding(vec![1.0_f32; EMBEDDING_DIM + 512]).unwrap();
    assert_eq!(out.len(), EMBEDDING_DIM);
    assert!((norm_sq(&out) - 1.0).abs() < 1e-4);
  }

  #[test]
  fn exact_width_is_normalized_when_off_unit() {
    let out = prepare_embedding(vec![2.0_f32; EMBEDDING_DIM]).unwrap();
    assert!((norm_sq(&out) - 1.0).abs() < 1e-4);
  }

  #[test]
  fn narrow_responses_are_rejected() {
    let err = prepare_embedding(vec![1.0_f32; 16]).unwrap_err();
    assert!(matches!(err, EmbedError::Invalid(_)));
  }
}
