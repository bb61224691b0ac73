use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::normalize::normalize_text;
use crate::similarity::{value_similarity, values_agree};
use crate::{ConsolidatedEntity, ConsolidationConfig, Contradiction, ExtractedEntity};

/// Sentence terminators for Spanish text. Opening marks (¿ ¡) are not
/// boundaries; they stay glued to the sentence they introduce.
const SENTENCE_TERMINATORS: [char; 4] = ['.', '!', '?', '…'];

/// Split free text into trimmed sentences.
#[must_use]
fn split_sentences(text: &str) -> Vec<String> {
  let mut sentences = Vec::new();
  let mut current = String::new();

  for ch in text.chars() {
    current.push(ch);
    if SENTENCE_TERMINATORS.contains(&ch) {
      let sentence = current.trim();
      if !sentence.is_empty() {
        sentences.push(sentence.to_owned());
      }
      current.clear();
    }
  }

  let tail = current.trim();
  if !tail.is_empty() {
    sentences.push(tail.to_owned());
  }

  sentences
}

/// Produces the post-merge state of an existing entity absorbing a newly
/// extracted one. Pure with respect to its inputs; writing the result and
/// rescoring confidence are the agent's responsibility.
pub struct EntityMerger {
  config: Arc<ConsolidationConfig>,
}

impl EntityMerger {
  #[must_use]
  pub fn new(config: Arc<ConsolidationConfig>) -> Self {
    Self { config }
  }

  #[must_use]
  pub fn merge(
    &self,
    new: &ExtractedEntity,
    existing: &ConsolidatedEntity,
    new_id: Uuid,
    interview_id: &str,
    similarity: f64,
    now: DateTime<Utc>,
  ) -> ConsolidatedEntity {
    tracing::debug!(
      existing = %existing.name,
      incoming = %new.name,
      similarity,
      "merging entities"
    );

    let mut merged = existing.clone();

    // 1. Description combination: append unseen sentences.
    merged.description = combine_descriptions(
      existing.description.as_deref(),
      new.description.as_deref(),
    );

    // 2. Attribute merging with contradiction tracking. The existing value
    // always wins; conflicts below the similarity threshold are recorded.
    let earliest_interview = existing
      .mentioned_in_interviews
      .first()
      .cloned()
      .unwrap_or_default();

    for (key, new_value) in &new.attributes {
      match merged.attributes.get(key) {
        None => {
          merged.attributes.insert(key.clone(), new_value.clone());
        }
        Some(existing_value) => {
          if values_agree(existing_value, new_value) {
            continue;
          }
          let value_sim = value_similarity(existing_value, new_value);
          if value_sim >= self.config.contradiction_similarity_threshold {
            // Close enough to count as agreement on the existing value.
            continue;
          }
          let already_recorded = merged.contradiction_details.iter().any(|contradiction| {
            contradiction.attribute == *key
              && contradiction.values.last() == Some(new_value)
          });
          if already_recorded {
            continue;
          }
          tracing::info!(
            entity = %existing.name,
            attribute = %key,
            interview_id,
            value_sim,
            "attribute contradiction recorded"
          );
          merged.contradiction_details.push(Contradiction {
            attribute: key.clone(),
            values: vec![existing_value.clone(), new_value.clone()],
            source_interviews: vec![earliest_interview.clone(), interview_id.to_owned()],
            similarity: value_sim,
          });
        }
      }
    }

    // Namespace tags: adopt where the existing entity had none.
    if merged.company.is_none() {
      merged.company = new.company.clone();
    }
    if merged.business_unit.is_none() {
      merged.business_unit = new.business_unit.clone();
    }
    if merged.department.is_none() {
      merged.department = new.department.clone();
    }

    // 3. Provenance.
    if !merged
      .mentioned_in_interviews
      .iter()
      .any(|id| id == interview_id)
    {
      merged.mentioned_in_interviews.push(interview_id.to_owned());
    }
    merged.source_count = merged.mentioned_in_interviews.len() as u32;
    if !merged.merged_entity_ids.contains(&new_id) {
      merged.merged_entity_ids.push(new_id);
    }
    merged.last_mentioned_at = now;

    // 4. Flags.
    merged.is_consolidated = true;
    merged.has_contradictions = !merged.contradiction_details.is_empty();
    merged.consolidated_at = Some(now);

    // A grown description invalidates the cached embedding.
    if merged.description != existing.description {
      merged.embedding = None;
      merged.embedding_text_hash = None;
    }

    merged
  }
}

/// The existing text is kept verbatim; only genuinely new sentences are
/// appended, so an unchanged description stays byte-identical.
fn combine_descriptions(existing: Option<&str>, new: Option<&str>) -> Option<String> {
  let Some(new_text) = new else {
    return existing.map(str::to_owned);
  };

  let existing_sentences = existing.map(split_sentences).unwrap_or_default();
  let mut seen: Vec<String> = existing_sentences
    .iter()
    .map(|sentence| normalize_text(sentence))
    .collect();

  let mut additions: Vec<String> = Vec::new();
  for sentence in split_sentences(new_text) {
    let key = normalize_text(&sentence);
    if !seen.contains(&key) {
      seen.push(key);
      additions.push(sentence);
    }
  }

  match (existing, additions.is_empty()) {
    (Some(text), true) => Some(text.to_owned()),
    (Some(text), false) => Some(format!("{} {}", text.trim_end(), additions.join(" "))),
    (None, true) => None,
    (None, false) => Some(additions.join(" ")),
  }
}
