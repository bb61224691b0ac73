mod types;
pub use types::{
  AttributeValue, AuditRecord, ConsolidatedEntity, Contradiction, EntitySnapshot, EntityType,
  ExtractedEntity, Pattern, PatternType, Relationship, RelationshipType, ScalarValue,
};

mod config;
pub use config::ConsolidationConfig;

mod normalize;
pub use normalize::{collapse_whitespace, normalize_name, normalize_text};

mod similarity;
pub use similarity::{name_similarity, value_similarity, values_agree};

mod detect;
pub use detect::{DetectionOutcome, DuplicateDetector, DuplicateMatch, embedding_text};

mod merge;
pub use merge::EntityMerger;

mod consensus;
pub use consensus::{ConsensusScorer, NEEDS_REVIEW_THRESHOLD};

mod relationships;
pub use relationships::{DiscoveredEdge, RelationshipDiscoverer};

mod patterns;
pub use patterns::PatternRecognizer;

mod store;
pub use store::{EntityStore, StoreTransaction};

mod metrics;
pub use metrics::{MetricsRegistry, MetricsSnapshot, Stage};

mod agent;
pub use agent::{ConsolidationAgent, ConsolidationInput, ConsolidationOutcome};

mod rollback;
pub use rollback::RollbackService;

pub use comversa_shared::{ConsolidationError, StoreError};
