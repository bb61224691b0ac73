use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use comversa_shared::ConsolidationError;
use uuid::Uuid;

use crate::normalize::normalize_name;
use crate::relationships::name_matches_text;
use crate::store::EntityStore;
use crate::{ConsolidatedEntity, ConsolidationConfig, EntityType, Pattern, PatternType};

/// Flags recurring pains and problematic systems across the whole store.
/// Pure in-memory over pre-fetched entities; callers replace persisted
/// pattern rows wholesale with the output.
pub struct PatternRecognizer {
  config: Arc<ConsolidationConfig>,
}

impl PatternRecognizer {
  #[must_use]
  pub fn new(config: Arc<ConsolidationConfig>) -> Self {
    Self { config }
  }

  #[must_use]
  pub fn identify(
    &self,
    pain_points: &[ConsolidatedEntity],
    systems: &[ConsolidatedEntity],
    total_interviews: u64,
    now: DateTime<Utc>,
  ) -> Vec<Pattern> {
    let mut patterns = Vec::new();

    // recurring_pain: pain points mentioned in enough distinct interviews
    for pain in pain_points {
      if pain.source_count < self.config.recurring_pain_threshold {
        continue;
      }
      let frequency = frequency(u64::from(pain.source_count), total_interviews);
      patterns.push(Pattern {
        id: Uuid::now_v7(),
        pattern_type: PatternType::RecurringPain,
        entity_type: EntityType::PainPoint,
        entity_id: pain.id,
        pattern_frequency: frequency,
        source_count: pain.source_count,
        high_priority: frequency >= self.config.high_priority_frequency,
        description: format!(
          "Dolor recurrente: «{}» mencionado en {} de {} entrevistas",
          pain.name, pain.source_count, total_interviews
        ),
        detected_at: now,
      });
    }

    // problematic_system: systems tied to pain points or contradicted
    // across enough distinct interviews
    for system in systems {
      let Ok(system_name) = normalize_name(&system.name, EntityType::System) else {
        continue;
      };

      let mut interviews: BTreeSet<&str> = BTreeSet::new();
      for pain in pain_points {
        let Some(description) = pain.description.as_deref() else {
          continue;
        };
        if name_matches_text(&system_name, description) {
          interviews.extend(pain.mentioned_in_interviews.iter().map(String::as_str));
        }
      }
      for contradiction in &system.contradiction_details {
        interviews.extend(contradiction.source_interviews.iter().map(String::as_str));
      }

      let count = interviews.len() as u64;
      if count < u64::from(self.config.problematic_system_threshold) {
        continue;
      }
      let frequency = frequency(count, total_interviews);
      patterns.push(Pattern {
        id: Uuid::now_v7(),
        pattern_type: PatternType::ProblematicSystem,
        entity_type: EntityType::System,
        entity_id: system.id,
        pattern_frequency: frequency,
        source_count: count as u32,
        high_priority: frequency >= self.config.high_priority_frequency,
        description: format!(
          "Sistema problemático: «{}» asociado a dolores o contradicciones en {} de {} entrevistas",
          system.name, count, total_interviews
        ),
        detected_at: now,
      });
    }

    tracing::info!(patterns = patterns.len(), total_interviews, "pattern scan finished");
    patterns
  }

  /// Run a full scan against the store and replace the persisted pattern
  /// rows wholesale. Returns the fresh patterns.
  pub async fn scan_and_store(
    &self,
    store: &dyn EntityStore,
  ) -> Result<Vec<Pattern>, ConsolidationError> {
    let pain_points = store
      .get_entities_by_type(EntityType::PainPoint, None)
      .await?;
    let systems = store.get_entities_by_type(EntityType::System, None).await?;
    let total_interviews = store.get_total_interview_count().await?;

    let patterns = self.identify(&pain_points, &systems, total_interviews, Utc::now());

    let mut txn = store.begin().await?;
    for pattern_type in [PatternType::RecurringPain, PatternType::ProblematicSystem] {
      let rows: Vec<Pattern> = patterns
        .iter()
        .filter(|pattern| pattern.pattern_type == pattern_type)
        .cloned()
        .collect();
      txn.replace_patterns(pattern_type, &rows).await?;
    }
    txn.commit().await?;

    Ok(patterns)
  }
}

fn frequency(count: u64, total_interviews: u64) -> f64 {
  if total_interviews == 0 {
    0.0
  } else {
    count as f64 / total_interviews as f64
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use crate::{AttributeValue, Contradiction, ExtractedEntity};

  use super::*;

  fn entity(
    ty: EntityType,
    name: &str,
    description: Option<&str>,
    interviews: &[&str],
  ) -> ConsolidatedEntity {
    let extracted = ExtractedEntity {
      id: None,
      name: name.to_owned(),
      description: description.map(str::to_owned),
      attributes: BTreeMap::new(),
      company: None,
      business_unit: None,
      department: None,
    };
    let mut entity =
      ConsolidatedEntity::from_extracted(&extracted, ty, Uuid::now_v7(), interviews[0], Utc::now());
    entity.mentioned_in_interviews = interviews.iter().map(|id| (*id).to_owned()).collect();
    entity.source_count = interviews.len() as u32;
    entity
  }

  fn recognizer() -> PatternRecognizer {
    PatternRecognizer::new(Arc::new(ConsolidationConfig::default()))
  }

  #[test]
  fn frequent_pain_point_becomes_high_priority_pattern() {
    let pain = entity(
      EntityType::PainPoint,
      "coordinación por WhatsApp",
      None,
      &["1", "2", "3", "4"],
    );
    let patterns = recognizer().identify(&[pain.clone()], &[], 10, Utc::now());

    assert_eq!(patterns.len(), 1);
    let pattern = &patterns[0];
    assert_eq!(pattern.pattern_type, PatternType::RecurringPain);
    assert_eq!(pattern.entity_id, pain.id);
    assert_eq!(pattern.source_count, 4);
    assert!((pattern.pattern_frequency - 0.4).abs() < 1e-9);
    assert!(pattern.high_priority);
  }

  #[test]
  fn rare_pain_points_are_ignored() {
    let pain = entity(EntityType::PainPoint, "reuniones largas", None, &["1", "2"]);
    let patterns = recognizer().identify(&[pain], &[], 10, Utc::now());
    assert!(patterns.is_empty());
  }

  #[test]
  fn below_high_priority_frequency_stays_low_priority() {
    let pain = entity(
      EntityType::PainPoint,
      "carga manual de datos",
      None,
      &["1", "2", "3"],
    );
    let patterns = recognizer().identify(&[pain], &[], 20, Utc::now());
    assert_eq!(patterns.len(), 1);
    assert!(!patterns[0].high_priority);
  }

  #[test]
  fn system_with_enough_linked_pain_interviews_is_problematic() {
    let system = entity(EntityType::System, "Excel", None, &["1"]);
    let pain_a = entity(
      EntityType::PainPoint,
      "reportes manuales",
      Some("los reportes en excel tardan"),
      &["1", "2", "3"],
    );
    let pain_b = entity(
      EntityType::PainPoint,
      "versiones duplicadas",
      Some("cada área guarda su propio excel"),
      &["4", "5"],
    );
    let patterns =
      recognizer().identify(&[pain_a, pain_b], &[system.clone()], 10, Utc::now());

    let problematic: Vec<_> = patterns
      .iter()
      .filter(|p| p.pattern_type == PatternType::ProblematicSystem)
      .collect();
    assert_eq!(problematic.len(), 1);
    assert_eq!(problematic[0].entity_id, system.id);
    assert_eq!(problematic[0].source_count, 5);
    assert!((problematic[0].pattern_frequency - 0.5).abs() < 1e-9);
  }

  #[test]
  fn system_contradictions_count_toward_the_threshold() {
    let mut system = entity(EntityType::System, "SAP", None, &["1"]);
    system.contradiction_details.push(Contradiction {
      attribute: "version".into(),
      values: vec![
        AttributeValue::Text("ECC".into()),
        AttributeValue::Text("S4".into()),
      ],
      source_interviews: vec!["1".into(), "2".into()],
      similarity: 0.2,
    });
    let pain = entity(
      EntityType::PainPoint,
      "licencias",
      Some("el costo de sap crece"),
      &["3", "4", "5"],
    );
    let patterns = recognizer().identify(&[pain], &[system], 10, Utc::now());

    let problematic: Vec<_> = patterns
      .iter()
      .filter(|p| p.pattern_type == PatternType::ProblematicSystem)
      .collect();
    assert_eq!(problematic.len(), 1);
    assert_eq!(problematic[0].source_count, 5);
  }

  #[test]
  fn empty_corpus_yields_zero_frequency() {
    let pain = entity(
      EntityType::PainPoint,
      "sin datos",
      None,
      &["1", "2", "3"],
    );
    let patterns = recognizer().identify(&[pain], &[], 0, Utc::now());
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].pattern_frequency, 0.0);
  }
}
