use std::sync::Arc;

use chrono::Utc;
use comversa_shared::{ConsolidationError, StoreError};
use uuid::Uuid;

use crate::store::{EntityStore, StoreTransaction};
use crate::{ConsolidatedEntity, Relationship};

/// Restores entities from the snapshots keyed by an audit record and
/// redirects relationships to the restored originals. All-or-nothing: on any
/// error the rollback aborts and the prior state stands.
pub struct RollbackService {
  store: Arc<dyn EntityStore>,
}

impl RollbackService {
  #[must_use]
  pub fn new(store: Arc<dyn EntityStore>) -> Self {
    Self { store }
  }

  pub async fn rollback(&self, audit_id: Uuid, reason: &str) -> Result<(), ConsolidationError> {
    let mut txn = self.store.begin().await?;

    let result = Self::run(txn.as_mut(), audit_id, reason).await;
    match result {
      Ok(()) => {
        txn.commit().await?;
        tracing::info!(%audit_id, reason, "rollback committed");
        Ok(())
      }
      Err(err) => {
        tracing::error!(%audit_id, error = %err, "rollback aborted");
        if let Err(rollback_err) = txn.rollback().await {
          tracing::warn!(error = %rollback_err, "transaction rollback also failed");
        }
        Err(err)
      }
    }
  }

  async fn run(
    txn: &mut dyn StoreTransaction,
    audit_id: Uuid,
    reason: &str,
  ) -> Result<(), ConsolidationError> {
    let audit = txn
      .get_audit(audit_id)
      .await?
      .ok_or_else(|| StoreError::NotFound(format!("audit record {audit_id}")))?;

    if audit.rolled_back_at.is_some() {
      return Err(ConsolidationError::AlreadyRolledBack(audit_id));
    }

    let snapshots = txn.get_snapshots_for_audit(audit_id).await?;
    for snapshot in &snapshots {
      let entity: ConsolidatedEntity = serde_json::from_value(snapshot.entity_state.clone())
        .map_err(|err| {
          StoreError::Fatal(format!("snapshot {} is not a valid entity: {err}", snapshot.id))
        })?;
      txn.restore_entity(snapshot.entity_type, &entity).await?;
      tracing::info!(
        %audit_id,
        entity_id = %entity.id,
        entity_type = %entity.entity_type,
        "entity restored from snapshot"
      );
    }

    // Redirect edges from the post-merge entity back to the restored
    // original; colliding edges are unioned, keeping the stronger strength.
    if let Some(&original_id) = audit.merged_entity_ids.first() {
      let touching = txn
        .get_relationships_for_entity(audit.resulting_entity_id)
        .await?;
      for mut relationship in touching {
        redirect_endpoints(&mut relationship, audit.resulting_entity_id, original_id);

        let duplicate = txn
          .find_relationship(
            relationship.source_entity_id,
            relationship.target_entity_id,
            relationship.relationship_type,
          )
          .await?
          .filter(|other| other.id != relationship.id);

        if let Some(mut surviving) = duplicate {
          for interview in &relationship.mentioned_in_interviews {
            if !surviving.mentioned_in_interviews.contains(interview) {
              surviving.mentioned_in_interviews.push(interview.clone());
            }
          }
          surviving.strength = surviving.strength.max(relationship.strength);
          surviving.updated_at = Utc::now();
          txn.update_relationship(&surviving).await?;
          txn.delete_relationship(relationship.id).await?;
        } else {
          txn.update_relationship(&relationship).await?;
        }
      }
    }

    txn
      .mark_audit_rolled_back(audit_id, Utc::now(), reason)
      .await?;
    Ok(())
  }
}

fn redirect_endpoints(relationship: &mut Relationship, from: Uuid, to: Uuid) {
  if relationship.source_entity_id == from {
    relationship.source_entity_id = to;
  }
  if relationship.target_entity_id == from {
    relationship.target_entity_id = to;
  }
}
