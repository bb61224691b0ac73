use std::collections::{BTreeMap, HashSet};

use uuid::Uuid;

use crate::normalize::{normalize_name, normalize_text};
use crate::{ConsolidatedEntity, EntityType, RelationshipType};

/// Minimum shared leading characters for a partial name match.
const PREFIX_MATCH_CHARS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NameMatch {
  Full,
  Prefix,
}

/// Word-boundary search for `name` inside `text`, case-normalized and
/// accent-preserving. A full-phrase hit beats a shared-prefix hit.
fn match_in_text(name: &str, text: &str) -> Option<NameMatch> {
  let text = normalize_text(text);
  let words: Vec<&str> = text
    .split_whitespace()
    .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
    .filter(|word| !word.is_empty())
    .collect();

  let name_tokens: Vec<&str> = name.split_whitespace().collect();
  if !name_tokens.is_empty()
    && words
      .windows(name_tokens.len())
      .any(|window| window == name_tokens.as_slice())
  {
    return Some(NameMatch::Full);
  }

  let prefix_hit = words.iter().any(|word| {
    let shared = word
      .chars()
      .zip(name.chars())
      .take_while(|(a, b)| a == b)
      .count();
    shared >= PREFIX_MATCH_CHARS
  });
  prefix_hit.then_some(NameMatch::Prefix)
}

/// Whether `name` appears in `text`, by full token phrase or shared prefix.
/// Shared with the pattern recognizer's problematic-system scan.
pub(crate) fn name_matches_text(name: &str, text: &str) -> bool {
  match_in_text(name, text).is_some()
}

/// One inferred edge, prior to persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredEdge {
  pub source_entity_id: Uuid,
  pub source_entity_type: EntityType,
  pub target_entity_id: Uuid,
  pub target_entity_type: EntityType,
  pub relationship_type: RelationshipType,
  pub strength: f64,
}

/// Infers typed co-occurrence edges between the entities of one interview.
/// Pure in-memory; both endpoints are entities the agent has already
/// persisted, so orphan edges are never emitted.
#[derive(Debug, Default, Clone, Copy)]
pub struct RelationshipDiscoverer;

impl RelationshipDiscoverer {
  #[must_use]
  pub fn discover(
    &self,
    entities_by_type: &BTreeMap<EntityType, Vec<ConsolidatedEntity>>,
    interview_id: &str,
  ) -> Vec<DiscoveredEdge> {
    let empty: Vec<ConsolidatedEntity> = Vec::new();
    let of = |ty: EntityType| entities_by_type.get(&ty).unwrap_or(&empty);

    let mut edges = Vec::new();
    let mut seen: HashSet<(Uuid, Uuid, RelationshipType)> = HashSet::new();

    let mut push = |edge: DiscoveredEdge| {
      if seen.insert((
        edge.source_entity_id,
        edge.target_entity_id,
        edge.relationship_type,
      )) {
        edges.push(edge);
      }
    };

    // system → causes → pain_point
    for system in of(EntityType::System) {
      let Ok(system_name) = normalize_name(&system.name, EntityType::System) else {
        continue;
      };
      for pain in of(EntityType::PainPoint) {
        let Some(description) = pain.description.as_deref() else {
          continue;
        };
        if let Some(hit) = match_in_text(&system_name, description) {
          push(DiscoveredEdge {
            source_entity_id: system.id,
            source_entity_type: EntityType::System,
            target_entity_id: pain.id,
            target_entity_type: EntityType::PainPoint,
            relationship_type: RelationshipType::Causes,
            strength: if hit == NameMatch::Full { 0.8 } else { 0.6 },
          });
        }
      }

      // process → uses → system
      for process in of(EntityType::Process) {
        let Some(description) = process.description.as_deref() else {
          continue;
        };
        if let Some(hit) = match_in_text(&system_name, description) {
          push(DiscoveredEdge {
            source_entity_id: process.id,
            source_entity_type: EntityType::Process,
            target_entity_id: system.id,
            target_entity_type: EntityType::System,
            relationship_type: RelationshipType::Uses,
            strength: if hit == NameMatch::Full { 0.7 } else { 0.5 },
          });
        }
      }
    }

    // kpi → measures → process (full-token matches only)
    for process in of(EntityType::Process) {
      let Ok(process_name) = normalize_name(&process.name, EntityType::Process) else {
        continue;
      };
      for kpi in of(EntityType::Kpi) {
        let Some(description) = kpi.description.as_deref() else {
          continue;
        };
        if match_in_text(&process_name, description) == Some(NameMatch::Full) {
          push(DiscoveredEdge {
            source_entity_id: kpi.id,
            source_entity_type: EntityType::Kpi,
            target_entity_id: process.id,
            target_entity_type: EntityType::Process,
            relationship_type: RelationshipType::Measures,
            strength: 0.7,
          });
        }
      }
    }

    // automation_candidate → addresses → pain_point (full-token matches only)
    for pain in of(EntityType::PainPoint) {
      let Ok(pain_name) = normalize_name(&pain.name, EntityType::PainPoint) else {
        continue;
      };
      for candidate in of(EntityType::AutomationCandidate) {
        let Some(description) = candidate.description.as_deref() else {
          continue;
        };
        if match_in_text(&pain_name, description) == Some(NameMatch::Full) {
          push(DiscoveredEdge {
            source_entity_id: candidate.id,
            source_entity_type: EntityType::AutomationCandidate,
            target_entity_id: pain.id,
            target_entity_type: EntityType::PainPoint,
            relationship_type: RelationshipType::Addresses,
            strength: 0.8,
          });
        }
      }
    }

    tracing::debug!(interview_id, edges = edges.len(), "relationship discovery finished");
    edges
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap as Map;

  use chrono::Utc;

  use crate::ExtractedEntity;

  use super::*;

  fn entity(ty: EntityType, name: &str, description: Option<&str>) -> ConsolidatedEntity {
    let extracted = ExtractedEntity {
      id: None,
      name: name.to_owned(),
      description: description.map(str::to_owned),
      attributes: Map::new(),
      company: None,
      business_unit: None,
      department: None,
    };
    ConsolidatedEntity::from_extracted(&extracted, ty, Uuid::now_v7(), "1", Utc::now())
  }

  fn by_type(entities: Vec<ConsolidatedEntity>) -> BTreeMap<EntityType, Vec<ConsolidatedEntity>> {
    let mut map: BTreeMap<EntityType, Vec<ConsolidatedEntity>> = BTreeMap::new();
    for entity in entities {
      map.entry(entity.entity_type).or_default().push(entity);
    }
    map
  }

  #[test]
  fn system_mention_in_pain_description_causes_edge() {
    let system = entity(EntityType::System, "Excel", None);
    let pain = entity(
      EntityType::PainPoint,
      "reportes manuales",
      Some("los reportes en Excel son muy lentos"),
    );
    let edges =
      RelationshipDiscoverer.discover(&by_type(vec![system.clone(), pain.clone()]), "1");

    assert_eq!(edges.len(), 1);
    let edge = &edges[0];
    assert_eq!(edge.source_entity_id, system.id);
    assert_eq!(edge.target_entity_id, pain.id);
    assert_eq!(edge.relationship_type, RelationshipType::Causes);
    assert_eq!(edge.strength, 0.8);
  }

  #[test]
  fn shared_prefix_scores_the_partial_strength() {
    let system = entity(EntityType::System, "contabilidad", None);
    let pain = entity(
      EntityType::PainPoint,
      "cierres tardíos",
      Some("el módulo contable falla cada cierre"),
    );
    let edges = RelationshipDiscoverer.discover(&by_type(vec![system, pain]), "1");

    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].strength, 0.6);
  }

  #[test]
  fn process_using_a_system_emits_uses() {
    let system = entity(EntityType::System, "SAP", None);
    let process = entity(
      EntityType::Process,
      "facturación",
      Some("se registra cada factura en SAP"),
    );
    let edges = RelationshipDiscoverer.discover(&by_type(vec![system.clone(), process.clone()]), "1");

    assert_eq!(edges.len(), 1);
    let edge = &edges[0];
    assert_eq!(edge.source_entity_id, process.id);
    assert_eq!(edge.target_entity_id, system.id);
    assert_eq!(edge.relationship_type, RelationshipType::Uses);
    assert_eq!(edge.strength, 0.7);
  }

  #[test]
  fn kpi_measuring_a_process_requires_full_match() {
    let process = entity(EntityType::Process, "cierre mensual", None);
    let matching_kpi = entity(
      EntityType::Kpi,
      "días de cierre",
      Some("mide la duración del cierre mensual en días"),
    );
    let partial_kpi = entity(
      EntityType::Kpi,
      "tasa de error",
      Some("errores detectados en el cierre trimestral"),
    );
    let edges = RelationshipDiscoverer.discover(
      &by_type(vec![process.clone(), matching_kpi.clone(), partial_kpi]),
      "1",
    );

    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].source_entity_id, matching_kpi.id);
    assert_eq!(edges[0].relationship_type, RelationshipType::Measures);
  }

  #[test]
  fn automation_candidate_addressing_a_pain_point() {
    let pain = entity(EntityType::PainPoint, "reportes manuales", None);
    let candidate = entity(
      EntityType::AutomationCandidate,
      "generación automática de informes",
      Some("eliminaría los reportes manuales del equipo"),
    );
    let edges = RelationshipDiscoverer.discover(&by_type(vec![pain.clone(), candidate.clone()]), "1");

    assert_eq!(edges.len(), 1);
    let edge = &edges[0];
    assert_eq!(edge.source_entity_id, candidate.id);
    assert_eq!(edge.target_entity_id, pain.id);
    assert_eq!(edge.relationship_type, RelationshipType::Addresses);
    assert_eq!(edge.strength, 0.8);
  }

  #[test]
  fn accented_names_match_with_accents_intact() {
    let system = entity(EntityType::System, "Planificación", None);
    let pain = entity(
      EntityType::PainPoint,
      "retrasos",
      Some("la planificación siempre llega tarde"),
    );
    let edges = RelationshipDiscoverer.discover(&by_type(vec![system, pain]), "1");
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].strength, 0.8);
  }

  #[test]
  fn unrelated_entities_emit_nothing() {
    let system = entity(EntityType::System, "Jira", None);
    let pain = entity(
      EntityType::PainPoint,
      "reuniones largas",
      Some("demasiadas reuniones sin agenda"),
    );
    let edges = RelationshipDiscoverer.discover(&by_type(vec![system, pain]), "1");
    assert!(edges.is_empty());
  }
}
