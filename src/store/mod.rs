pub mod file;
pub mod memory;

use async_trait::async_trait;

use crate::errors::ApiError;
use crate::models::session::{Credentials, PermissionSet, Session};

pub use file::FileSessionStore;
pub use memory::MemorySessionStore;

/// In-place change applied to the stored session by [`SessionStore::update`].
pub type SessionUpdate = Box<dyn FnOnce(&mut Session) + Send>;

/// Abstraction over where the signed-in session lives.
/// Implementations: MemorySessionStore (process-scoped), FileSessionStore (JSON on disk).
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Read the current session. A missing session is `Session::default()`.
    async fn load(&self) -> Result<Session, ApiError>;

    /// Replace the stored session.
    async fn save(&self, session: Session) -> Result<(), ApiError>;

    /// Apply `change` to the stored session as one step: no other load, save
    /// or update of this store interleaves with it. Returns the new session.
    async fn update(&self, change: SessionUpdate) -> Result<Session, ApiError>;

    /// Drop credentials, tenant id and permissions.
    async fn clear(&self) -> Result<(), ApiError> {
        self.save(Session::default()).await
    }

    async fn store_credentials(&self, credentials: Credentials) -> Result<(), ApiError> {
        self.update(Box::new(move |session| {
            session.credentials = Some(credentials);
            session.refreshed_at = Some(chrono::Utc::now());
        }))
        .await
        .map(drop)
    }

    async fn set_tenant(&self, tenant_id: Option<String>) -> Result<(), ApiError> {
        self.update(Box::new(move |session| session.tenant_id = tenant_id))
            .await
            .map(drop)
    }

    async fn set_permissions(&self, permissions: PermissionSet) -> Result<(), ApiError> {
        self.update(Box::new(move |session| session.permissions = Some(permissions)))
            .await
            .map(drop)
    }
}
