use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{SessionStore, SessionUpdate};
use crate::errors::ApiError;
use crate::models::session::Session;

/// Volatile session storage. Nothing survives the process.
#[derive(Default)]
pub struct MemorySessionStore {
    session: RwLock<Session>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            session: RwLock::new(session),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> Result<Session, ApiError> {
        Ok(self.session.read().await.clone())
    }

    async fn save(&self, session: Session) -> Result<(), ApiError> {
        *self.session.write().await = session;
        Ok(())
    }

    async fn update(&self, change: SessionUpdate) -> Result<Session, ApiError> {
        let mut session = self.session.write().await;
        change(&mut *session);
        Ok(session.clone())
    }
}
