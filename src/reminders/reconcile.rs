//! Converge the server's reminders for one relation to a desired list.
//!
//! Items are matched by id:
//! - current ids missing from the desired list are deleted
//! - desired items whose real id is known to the server are updated
//! - everything else in the desired list is created (temporary ids dropped)
//!
//! After all operations the list is re-fetched from the server; the desired
//! list came from a form that cannot see concurrent changes.

use std::collections::HashSet;
use std::fmt;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::RemindersApi;
use crate::errors::ApiError;
use crate::models::reminder::{Relation, Reminder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Delete,
    Update,
    Create,
    Refetch,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Delete => "delete",
            SyncPhase::Update => "update",
            SyncPhase::Create => "create",
            SyncPhase::Refetch => "refetch",
        };
        f.write_str(name)
    }
}

/// Operations needed to turn `current` into `desired`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub deletes: Vec<String>,
    /// `(id, new field values)`
    pub updates: Vec<(String, Reminder)>,
    /// New reminders, already stripped of ids and bound to the relation.
    pub creates: Vec<Reminder>,
}

impl ReconcilePlan {
    pub fn len(&self) -> usize {
        self.deletes.len() + self.updates.len() + self.creates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The first failing operation. Operations before it were applied and are
/// not rolled back; re-fetch to see the resulting state.
#[derive(Debug, Error)]
#[error("reminder sync failed during {phase} (id: {id:?}) after {applied} applied operations: {source}")]
pub struct ReconcileError {
    pub phase: SyncPhase,
    pub id: Option<String>,
    pub applied: usize,
    pub source: ApiError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub deleted: usize,
    pub updated: usize,
    pub created: usize,
    /// Authoritative list re-fetched after the sync.
    pub reminders: Vec<Reminder>,
}

/// Compute the operations without executing them.
pub fn plan(relation: &Relation, current: &[Reminder], desired: &[Reminder]) -> ReconcilePlan {
    let current_ids: HashSet<&str> = current.iter().filter_map(|r| r.persisted_id()).collect();
    let desired_ids: HashSet<&str> = desired.iter().filter_map(|r| r.persisted_id()).collect();

    let deletes = current
        .iter()
        .filter_map(|r| r.persisted_id())
        .filter(|id| !desired_ids.contains(id))
        .map(str::to_string)
        .collect();

    let mut updates = Vec::new();
    let mut creates = Vec::new();
    for item in desired {
        let mut item = bind(item, relation);
        let known = item
            .persisted_id()
            .filter(|id| current_ids.contains(id))
            .map(str::to_string);
        match known {
            Some(id) => updates.push((id, item)),
            None => {
                item.id = None;
                creates.push(item);
            }
        }
    }

    ReconcilePlan {
        deletes,
        updates,
        creates,
    }
}

fn bind(item: &Reminder, relation: &Relation) -> Reminder {
    let mut item = item.clone();
    item.relation_id = relation.id.clone();
    item.relation_type = relation.kind.clone();
    item
}

pub struct ReminderReconciler<A> {
    api: A,
}

impl<A: RemindersApi> ReminderReconciler<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Fetch the server's list for `relation`, then reconcile it with `desired`.
    pub async fn sync(
        &self,
        relation: &Relation,
        desired: &[Reminder],
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let current = self.api.list(relation).await.map_err(|source| ReconcileError {
            phase: SyncPhase::Refetch,
            id: None,
            applied: 0,
            source,
        })?;
        self.reconcile(relation, &current, desired).await
    }

    /// Apply deletions, then updates, then creations, stopping at the first failure.
    pub async fn reconcile(
        &self,
        relation: &Relation,
        current: &[Reminder],
        desired: &[Reminder],
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let plan = plan(relation, current, desired);
        debug!(
            relation_id = %relation.id,
            relation_type = %relation.kind,
            deletes = plan.deletes.len(),
            updates = plan.updates.len(),
            creates = plan.creates.len(),
            "reminder sync planned"
        );

        let mut applied = 0;
        let fail = |phase: SyncPhase, id: Option<&str>, applied: usize, source: ApiError| {
            warn!(%phase, id = ?id, applied, error = %source, "reminder sync stopped");
            ReconcileError {
                phase,
                id: id.map(str::to_string),
                applied,
                source,
            }
        };

        for id in &plan.deletes {
            self.api
                .delete(id)
                .await
                .map_err(|e| fail(SyncPhase::Delete, Some(id.as_str()), applied, e))?;
            applied += 1;
        }

        for (id, item) in &plan.updates {
            self.api
                .update(id, item)
                .await
                .map_err(|e| fail(SyncPhase::Update, Some(id.as_str()), applied, e))?;
            applied += 1;
        }

        for item in &plan.creates {
            self.api
                .create(item)
                .await
                .map_err(|e| fail(SyncPhase::Create, None, applied, e))?;
            applied += 1;
        }

        let reminders = self
            .api
            .list(relation)
            .await
            .map_err(|e| fail(SyncPhase::Refetch, None, applied, e))?;

        info!(
            relation_id = %relation.id,
            deleted = plan.deletes.len(),
            updated = plan.updates.len(),
            created = plan.creates.len(),
            total = reminders.len(),
            "reminders synced"
        );

        Ok(ReconcileOutcome {
            deleted: plan.deletes.len(),
            updated: plan.updates.len(),
            created: plan.creates.len(),
            reminders,
        })
    }
}
