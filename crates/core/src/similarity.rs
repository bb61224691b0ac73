use std::collections::BTreeSet;

use crate::normalize::normalize_text;
use crate::{AttributeValue, ScalarValue};

/// Edit-and-token-aware name similarity in [0, 1] over already-normalized
/// names.
///
/// Takes the better of a plain normalized Levenshtein ratio and a token-set
/// recombination score, so word-subset names ("excel" vs "ms excel") rank as
/// near-duplicates while short unrelated names ("sap" vs "sapui5") do not.
#[must_use]
pub fn name_similarity(a: &str, b: &str) -> f64 {
  if a == b {
    return 1.0;
  }
  if a.is_empty() || b.is_empty() {
    return 0.0;
  }

  strsim::normalized_levenshtein(a, b).max(token_set_similarity(a, b))
}

fn token_set_similarity(a: &str, b: &str) -> f64 {
  let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
  let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();

  let common: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
  if common.is_empty() {
    // No shared tokens: fall back to comparing sorted token strings
    let sorted_a = tokens_a.iter().copied().collect::<Vec<_>>().join(" ");
    let sorted_b = tokens_b.iter().copied().collect::<Vec<_>>().join(" ");
    return strsim::normalized_levenshtein(&sorted_a, &sorted_b);
  }

  let only_a: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
  let only_b: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

  let base = common.join(" ");
  let with_a = join_parts(&base, &only_a);
  let with_b = join_parts(&base, &only_b);

  strsim::normalized_levenshtein(&base, &with_a)
    .max(strsim::normalized_levenshtein(&base, &with_b))
    .max(strsim::normalized_levenshtein(&with_a, &with_b))
}

fn join_parts(base: &str, rest: &[&str]) -> String {
  if rest.is_empty() {
    base.to_owned()
  } else {
    format!("{base} {}", rest.join(" "))
  }
}

// ──────────────────────────────────────────────────
// Attribute value comparison
// ──────────────────────────────────────────────────

fn scalar_key(value: &ScalarValue) -> String {
  match value {
    ScalarValue::Number(n) => format!("{n}"),
    ScalarValue::Text(text) => normalize_text(text),
  }
}

/// Whether two attribute values count as the same observation: exact
/// equality for numbers, normalized equality for strings, set equality for
/// sequences.
#[must_use]
pub fn values_agree(a: &AttributeValue, b: &AttributeValue) -> bool {
  match (a, b) {
    (AttributeValue::Number(x), AttributeValue::Number(y)) => x == y,
    (AttributeValue::Text(x), AttributeValue::Text(y)) => normalize_text(x) == normalize_text(y),
    (AttributeValue::List(x), AttributeValue::List(y)) => {
      let set_a: BTreeSet<String> = x.iter().map(scalar_key).collect();
      let set_b: BTreeSet<String> = y.iter().map(scalar_key).collect();
      set_a == set_b
    }
    _ => false,
  }
}

/// How close two conflicting attribute values are, in [0, 1]: fuzzy ratio
/// for strings, 1.0/0.0 for numbers, Jaccard overlap for sequences.
#[must_use]
pub fn value_similarity(a: &AttributeValue, b: &AttributeValue) -> f64 {
  if values_agree(a, b) {
    return 1.0;
  }

  match (a, b) {
    (AttributeValue::Number(_), AttributeValue::Number(_)) => 0.0,
    (AttributeValue::Text(x), AttributeValue::Text(y)) => {
      strsim::normalized_levenshtein(&normalize_text(x), &normalize_text(y))
    }
    (AttributeValue::List(x), AttributeValue::List(y)) => {
      let set_a: BTreeSet<String> = x.iter().map(scalar_key).collect();
      let set_b: BTreeSet<String> = y.iter().map(scalar_key).collect();
      let union = set_a.union(&set_b).count();
      if union == 0 {
        return 0.0;
      }
      let shared = set_a.intersection(&set_b).count();
      shared as f64 / union as f64
    }
    _ => 0.0,
  }
}
