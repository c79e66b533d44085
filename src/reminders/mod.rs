//! Reminder endpoints and list reconciliation.

pub mod reconcile;

use std::sync::Arc;

use async_trait::async_trait;

use crate::client::{ApiClient, ApiRequest};
use crate::errors::ApiError;
use crate::models::reminder::{Relation, Reminder, ReminderList, ReminderWire, SetCompletedRequest};

pub use reconcile::{plan, ReconcileError, ReconcileOutcome, ReconcilePlan, ReminderReconciler, SyncPhase};

pub const REMINDERS_PATH: &str = "/v1/health/reminders";

/// Reminder operations as the reconciler needs them.
#[async_trait]
pub trait RemindersApi: Send + Sync {
    /// All reminders attached to `relation`.
    async fn list(&self, relation: &Relation) -> Result<Vec<Reminder>, ApiError>;

    async fn get(&self, id: &str) -> Result<Reminder, ApiError>;

    /// Persist a new reminder. Any id on `reminder` is ignored.
    async fn create(&self, reminder: &Reminder) -> Result<Reminder, ApiError>;

    async fn update(&self, id: &str, reminder: &Reminder) -> Result<Reminder, ApiError>;

    async fn delete(&self, id: &str) -> Result<(), ApiError>;

    async fn set_completed(&self, id: &str, completed: bool) -> Result<Reminder, ApiError>;
}

/// `RemindersApi` over the authenticated backend client.
#[derive(Clone)]
pub struct HttpRemindersApi {
    client: Arc<ApiClient>,
}

impl HttpRemindersApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    fn item_path(id: &str) -> String {
        format!("{}/{}", REMINDERS_PATH, urlencoding::encode(id))
    }
}

#[async_trait]
impl RemindersApi for HttpRemindersApi {
    async fn list(&self, relation: &Relation) -> Result<Vec<Reminder>, ApiError> {
        let req = ApiRequest::get(REMINDERS_PATH)
            .query("relationId", relation.id.as_str())
            .query("relationType", relation.kind.as_str());
        let list: ReminderList = self.client.request(req).await?;
        Ok(list.into_reminders())
    }

    async fn get(&self, id: &str) -> Result<Reminder, ApiError> {
        let wire: ReminderWire = self.client.get(&Self::item_path(id)).await?;
        Ok(wire.into())
    }

    async fn create(&self, reminder: &Reminder) -> Result<Reminder, ApiError> {
        let mut wire = ReminderWire::from(reminder);
        wire.id = None;
        let created: ReminderWire = self.client.post(REMINDERS_PATH, &wire).await?;
        tracing::debug!(id = ?created.id, relation_id = %created.relation_id, "reminder created");
        Ok(created.into())
    }

    async fn update(&self, id: &str, reminder: &Reminder) -> Result<Reminder, ApiError> {
        let wire = ReminderWire::from(reminder);
        let updated: ReminderWire = self.client.put(&Self::item_path(id), &wire).await?;
        Ok(updated.into())
    }

    async fn delete(&self, id: &str) -> Result<(), ApiError> {
        let _: serde_json::Value = self.client.delete(&Self::item_path(id)).await?;
        Ok(())
    }

    async fn set_completed(&self, id: &str, completed: bool) -> Result<Reminder, ApiError> {
        let body = SetCompletedRequest {
            is_completed: completed,
        };
        let updated: ReminderWire = self.client.patch(&Self::item_path(id), &body).await?;
        Ok(updated.into())
    }
}
