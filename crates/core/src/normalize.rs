use comversa_shared::ConsolidationError;

use crate::EntityType;

/// Boilerplate tokens dropped from system names before comparison.
const SYSTEM_STOPWORDS: [&str; 4] = ["sistema", "software", "herramienta", "plataforma"];

/// Leading phrases dropped from pain point names before comparison.
const PAIN_POINT_PREFIXES: [&str; 3] = ["problema de", "dificultad con", "issue with"];

/// Collapse runs of whitespace into single spaces and trim the ends.
#[must_use]
pub fn collapse_whitespace(text: &str) -> String {
  text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase and collapse whitespace. Accented characters pass through
/// untouched; Spanish orthography is preserved end-to-end.
#[must_use]
pub fn normalize_text(text: &str) -> String {
  collapse_whitespace(&text.to_lowercase())
}

/// Canonicalize a raw entity name for comparison.
///
/// Deterministic and side-effect-free. Fails with `InvalidEntityName` when
/// nothing but boilerplate remains.
pub fn normalize_name(name: &str, entity_type: EntityType) -> Result<String, ConsolidationError> {
  let mut normalized = normalize_text(name);

  match entity_type {
    EntityType::System => {
      normalized = normalized
        .split_whitespace()
        .filter(|token| !SYSTEM_STOPWORDS.contains(token))
        .collect::<Vec<_>>()
        .join(" ");
    }
    EntityType::PainPoint => {
      for prefix in PAIN_POINT_PREFIXES {
        if let Some(rest) = normalized.strip_prefix(prefix) {
          normalized = rest.trim_start().to_owned();
          break;
        }
      }
    }
    _ => {}
  }

  if normalized.is_empty() {
    return Err(ConsolidationError::InvalidEntityName(name.to_owned()));
  }

  Ok(normalized)
}
