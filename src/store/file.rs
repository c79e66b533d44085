//! FileSessionStore keeps the session in a JSON file so the CLI stays
//! signed in between invocations.
//!
//! The file is rewritten whole on every save (write to a uniquely named
//! sibling temp file, then rename). On unix the file is created owner-only
//! (0600) since it holds the refresh token. A missing file reads as an
//! empty session.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{SessionStore, SessionUpdate};
use crate::errors::ApiError;
use crate::models::session::Session;

pub struct FileSessionStore {
    path: PathBuf,
    // Held for the whole of every load, save and update from this process.
    lock: Mutex<()>,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Session, ApiError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Session::default()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                ApiError::Storage(format!("corrupt session file {}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Session::default()),
            Err(e) => Err(ApiError::Storage(format!(
                "failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn write(&self, session: &Session) -> Result<(), ApiError> {
        let bytes = serde_json::to_vec_pretty(session)
            .map_err(|e| ApiError::Storage(format!("failed to encode session: {}", e)))?;

        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "session".into());
        let tmp = self
            .path
            .with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4()));

        if let Err(e) = write_private(&tmp, &bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(ApiError::Storage(format!("failed to write {}: {}", tmp.display(), e)));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(ApiError::Storage(format!(
                "failed to replace {}: {}",
                self.path.display(),
                e
            )));
        }

        tracing::debug!(path = %self.path.display(), "session saved");
        Ok(())
    }
}

async fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> Result<Session, ApiError> {
        let _guard = self.lock.lock().await;
        self.read().await
    }

    async fn save(&self, session: Session) -> Result<(), ApiError> {
        let _guard = self.lock.lock().await;
        self.write(&session).await
    }

    async fn update(&self, change: SessionUpdate) -> Result<Session, ApiError> {
        let _guard = self.lock.lock().await;
        let mut session = self.read().await?;
        change(&mut session);
        self.write(&session).await?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::Credentials;

    fn scratch_path() -> PathBuf {
        std::env::temp_dir().join(format!("healthcrm-session-{}.json", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_session() {
        let store = FileSessionStore::new(scratch_path());
        assert_eq!(store.load().await.unwrap(), Session::default());
    }

    #[tokio::test]
    async fn test_session_survives_new_store_instance() {
        let path = scratch_path();
        {
            let store = FileSessionStore::new(&path);
            store.store_credentials(Credentials::new("acc", "ref")).await.unwrap();
            store.set_tenant(Some("north-clinic".into())).await.unwrap();
        }

        let reopened = FileSessionStore::new(&path);
        let session = reopened.load().await.unwrap();
        assert_eq!(session.access_token(), Some("acc"));
        assert_eq!(session.refresh_token(), Some("ref"));
        assert_eq!(session.tenant_id.as_deref(), Some("north-clinic"));

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_storage_error() {
        let path = scratch_path();
        std::fs::write(&path, b"{not json").unwrap();

        let store = FileSessionStore::new(&path);
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, ApiError::Storage(_)));

        let _ = std::fs::remove_file(path);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_session_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let path = scratch_path();
        // a pre-existing world-readable file is replaced, not reused
        std::fs::write(&path, b"").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let store = FileSessionStore::new(&path);
        store.store_credentials(Credentials::new("acc", "ref")).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0, "session file mode = {:o}", mode & 0o777);

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_concurrent_updates_leave_no_temp_files() {
        let dir = std::env::temp_dir().join(format!("healthcrm-store-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let store = std::sync::Arc::new(FileSessionStore::new(dir.join("session.json")));

        let tasks: Vec<_> = (0..10)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .update(Box::new(move |s| {
                            let mut perms = s.permissions.take().unwrap_or_default();
                            perms.permissions.push(format!("p{}", i));
                            s.permissions = Some(perms);
                        }))
                        .await
                        .unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let perms = store.load().await.unwrap().permissions.unwrap();
        assert_eq!(perms.permissions.len(), 10);
        let entries = std::fs::read_dir(&dir).unwrap().count();
        assert_eq!(entries, 1);

        let _ = std::fs::remove_dir_all(dir);
    }
}
