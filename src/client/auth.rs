// Session lifecycle: sign-in, sign-out, token refresh and permission re-sync.

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::envelope;
use super::refresh::{self, Ticket};
use super::{ApiClient, ApiRequest, REFRESH_PATH};
use crate::errors::ApiError;
use crate::models::session::{Credentials, PermissionSet, Session};

pub const LOGIN_PATH: &str = "/v1/auth/login";
pub const LOGOUT_PATH: &str = "/v1/auth/logout";
pub const PERMISSIONS_PATH: &str = "/v1/auth/permissions";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    tenant_id: Option<String>,
    #[serde(default)]
    permissions: Option<PermissionSet>,
}

impl ApiClient {
    /// Sign in with email and password and store the resulting session.
    /// Keeps a previously selected tenant when the backend does not assign one.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        let req = ApiRequest::post(LOGIN_PATH).json(json!({
            "email": email,
            "password": password,
        }));
        let resp: LoginResponse = envelope::decode(self.send_plain(&req, None).await?)?;

        let credentials = Credentials::new(resp.access_token, resp.refresh_token);
        let (tenant_id, permissions) = (resp.tenant_id, resp.permissions);
        let session = self
            .store
            .update(Box::new(move |session| {
                session.credentials = Some(credentials);
                if tenant_id.is_some() {
                    session.tenant_id = tenant_id;
                }
                session.permissions = permissions;
                session.refreshed_at = Some(chrono::Utc::now());
            }))
            .await?;

        info!(tenant = ?session.tenant_id, "signed in");
        Ok(session)
    }

    /// Revoke the refresh token server-side (best-effort) and clear the session.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let session = self.store.load().await?;
        if let Some(refresh_token) = session.refresh_token() {
            let req = ApiRequest::post(LOGOUT_PATH).json(json!({ "refreshToken": refresh_token }));
            if let Err(e) = self.send_plain(&req, session.access_token()).await {
                warn!(error = %e, "server-side logout failed, clearing local session anyway");
            }
        }
        self.store.clear().await?;
        info!("signed out");
        Ok(())
    }

    /// Select the tenant sent as `X-Tenant-ID` on subsequent requests.
    pub async fn set_tenant(&self, tenant_id: Option<String>) -> Result<(), ApiError> {
        self.store.set_tenant(tenant_id).await
    }

    /// Obtain a new access token, coordinating with concurrent callers so that
    /// at most one refresh call is in flight.
    pub(crate) async fn refresh_access_token(&self) -> Result<String, ApiError> {
        let session = self.store.load().await?;
        let Some(refresh_token) = session.refresh_token().map(str::to_string) else {
            warn!("no refresh token available, ending session");
            self.teardown().await;
            return Err(ApiError::Unauthenticated);
        };
        let timeout = self.config.refresh_timeout;

        let guard = match self.refresh.enter() {
            Ticket::Follower(rx) => {
                debug!("refresh already in flight, waiting");
                return refresh::wait_for(rx, timeout).await;
            }
            Ticket::Leader(guard) => guard,
        };

        let outcome = match tokio::time::timeout(timeout, self.call_refresh(&refresh_token)).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(e)) => Err(ApiError::RefreshFailed(e.to_string())),
            Err(_) => Err(ApiError::RefreshTimeout(timeout)),
        };

        let resp = match outcome {
            Ok(resp) => resp,
            Err(e) => {
                let released = guard.settle(Err(e.clone()));
                warn!(error = %e, released, "token refresh failed, ending session");
                self.teardown().await;
                return Err(e);
            }
        };

        let access_token = resp.access_token;
        let rotated = resp
            .refresh_token
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| refresh_token.clone());

        // Only replace the credentials this refresh was started from. A
        // session cleared meanwhile stays cleared.
        let credentials = Credentials::new(access_token.clone(), rotated);
        let stored = self
            .store
            .update(Box::new(move |session| {
                if session.refresh_token() == Some(refresh_token.as_str()) {
                    session.credentials = Some(credentials);
                    session.refreshed_at = Some(chrono::Utc::now());
                }
            }))
            .await;

        match stored {
            Ok(session) if session.access_token() == Some(access_token.as_str()) => {}
            Ok(_) => {
                guard.settle(Err(ApiError::Unauthenticated));
                warn!("session ended while refreshing, discarding new token");
                return Err(ApiError::Unauthenticated);
            }
            Err(e) => {
                guard.settle(Err(e.clone()));
                self.teardown().await;
                return Err(e);
            }
        }

        let released = guard.settle(Ok(access_token.clone()));
        info!(released, "access token refreshed");

        self.sync_permissions(&access_token).await;
        Ok(access_token)
    }

    async fn call_refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ApiError> {
        let req = ApiRequest::post(REFRESH_PATH).json(json!({ "refreshToken": refresh_token }));
        envelope::decode(self.send_plain(&req, None).await?)
    }

    /// Re-read fine-grained permissions after a refresh. Failures keep the
    /// previous grants and never fail the refresh. Grants are only merged
    /// while `access_token` is still the session's token.
    async fn sync_permissions(&self, access_token: &str) {
        let result = async {
            let req = ApiRequest::get(PERMISSIONS_PATH);
            let fresh: PermissionSet = envelope::decode(self.send_plain(&req, Some(access_token)).await?)?;
            let token = access_token.to_string();
            let session = self
                .store
                .update(Box::new(move |session| {
                    if session.access_token() == Some(token.as_str()) {
                        let current = session.permissions.take().unwrap_or_default();
                        session.permissions = Some(current.merged_with(fresh));
                    }
                }))
                .await?;
            Ok::<bool, ApiError>(session.access_token() == Some(access_token))
        }
        .await;

        match result {
            Ok(true) => debug!("permissions re-synced"),
            Ok(false) => debug!("session changed during permission re-sync, grants not applied"),
            Err(e) => warn!(error = %e, "permission re-sync failed, keeping previous grants"),
        }
    }
}
