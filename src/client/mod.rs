//! Authenticated request client for the CRM backend.
//!
//! Every call gets the bearer token and tenant header from the session store.
//! Authorization failures are recovered by one coordinated token refresh and
//! a single retry; anything else is normalized and returned to the caller.

pub mod auth;
pub mod envelope;
pub mod events;
pub mod refresh;

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::errors::{ApiError, NormalizedError};
use crate::store::SessionStore;

pub use events::{AuthEvent, AuthEvents, LogEvents};

pub const REFRESH_PATH: &str = "/v1/auth/refresh";
pub const TENANT_HEADER: &str = "X-Tenant-ID";

/// Paths served without tenant context.
const TENANT_FREE_PATHS: &[&str] = &["/auth/", "/discovery/", "/v1/auth/", "/v1/discovery/"];

/// One outbound call, independent of credentials.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Surface a 403 to the caller instead of emitting `Forbidden`, even for reads.
    pub user_initiated: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            user_initiated: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn serialize<B: Serialize + ?Sized>(self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body).map_err(|e| ApiError::Encode(e.to_string()))?;
        Ok(self.json(value))
    }

    pub fn user_initiated(mut self) -> Self {
        self.user_initiated = true;
        self
    }

    pub fn is_modifying(&self) -> bool {
        matches!(
            self.method,
            Method::POST | Method::PUT | Method::PATCH | Method::DELETE
        )
    }

    fn is_refresh(&self) -> bool {
        self.path.contains(REFRESH_PATH)
    }

    fn needs_tenant(&self) -> bool {
        !TENANT_FREE_PATHS.iter().any(|p| self.path.contains(p))
    }
}

pub struct ApiClient {
    http: reqwest::Client,
    config: ClientConfig,
    store: Arc<dyn SessionStore>,
    events: Arc<dyn AuthEvents>,
    refresh: refresh::RefreshGate,
}

impl ApiClient {
    pub fn new(
        config: ClientConfig,
        store: Arc<dyn SessionStore>,
        events: Arc<dyn AuthEvents>,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(config.request_timeout)
            .connect_timeout(std::time::Duration::from_secs(5))
            .user_agent(concat!("healthcrm/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config,
            store,
            events,
            refresh: refresh::RefreshGate::new(),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(ApiRequest::get(path)).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(ApiRequest::post(path).serialize(body)?).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(ApiRequest::put(path).serialize(body)?).await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(ApiRequest::patch(path).serialize(body)?).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(ApiRequest::delete(path)).await
    }

    /// Send `req` with auth context attached and decode the payload as `T`.
    pub async fn request<T: DeserializeOwned>(&self, req: ApiRequest) -> Result<T, ApiError> {
        let body = self.execute(&req).await?;
        envelope::decode(body)
    }

    async fn execute(&self, req: &ApiRequest) -> Result<Value, ApiError> {
        let session = self.store.load().await?;
        let tenant_id = session.tenant_id.clone();
        let mut access_token = session.access_token().map(str::to_string);
        let mut retried = false;

        loop {
            let (status, body) = self
                .send_once(req, access_token.as_deref(), tenant_id.as_deref())
                .await?;
            if status.is_success() {
                return Ok(body);
            }
            let error = NormalizedError::from_response(status, &body);

            match status {
                StatusCode::UNAUTHORIZED => {
                    if req.is_refresh() || retried {
                        debug!(path = %req.path, retried, "401 is terminal");
                        self.teardown().await;
                        return Err(ApiError::Unauthenticated);
                    }
                }
                StatusCode::FORBIDDEN => {
                    // The backend reports missing or invalid tokens as 403.
                    let has_refresh_token = self.store.load().await?.refresh_token().is_some();
                    if !has_refresh_token {
                        debug!(path = %req.path, "403 without refresh token, ending session");
                        self.teardown().await;
                        return Err(ApiError::Unauthenticated);
                    }
                    if retried {
                        return Err(self.deny(req, error));
                    }
                }
                _ => return Err(ApiError::Http(error)),
            }

            retried = true;
            access_token = Some(self.recover_token(access_token.as_deref()).await?);
            debug!(method = %req.method, path = %req.path, "retrying with refreshed token");
        }
    }

    /// Token to retry with after an auth failure. Reuses a token that a
    /// concurrent refresh already stored instead of refreshing again.
    async fn recover_token(&self, failed: Option<&str>) -> Result<String, ApiError> {
        let session = self.store.load().await?;
        match session.access_token() {
            Some(current) if Some(current) != failed && !self.refresh.in_progress() => {
                Ok(current.to_string())
            }
            _ => self.refresh_access_token().await,
        }
    }

    fn deny(&self, req: &ApiRequest, error: NormalizedError) -> ApiError {
        let surface = req.is_modifying()
            || req.user_initiated
            || self
                .config
                .user_initiated_paths
                .iter()
                .any(|p| req.path.contains(p.as_str()));

        if surface {
            ApiError::Forbidden {
                error,
                redirected: false,
            }
        } else {
            self.events.emit(AuthEvent::Forbidden {
                path: req.path.clone(),
            });
            ApiError::Forbidden {
                error,
                redirected: true,
            }
        }
    }

    /// Drop the session and tell the host to sign in again.
    async fn teardown(&self) {
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "failed to clear session");
        }
        self.events.emit(AuthEvent::Unauthenticated);
    }

    fn url_for(&self, path: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }

    /// One HTTP exchange, no recovery. Returns the status and the parsed body.
    async fn send_once(
        &self,
        req: &ApiRequest,
        access_token: Option<&str>,
        tenant_id: Option<&str>,
    ) -> Result<(StatusCode, Value), ApiError> {
        let mut builder = self.http.request(req.method.clone(), self.url_for(&req.path));

        if !req.query.is_empty() {
            builder = builder.query(&req.query);
        }
        if let Some(token) = access_token {
            builder = builder.bearer_auth(token);
        }
        if req.needs_tenant() {
            if let Some(tenant) = tenant_id {
                builder = builder.header(TENANT_HEADER, tenant);
            }
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await.map_err(|e| {
            warn!(method = %req.method, path = %req.path, error = %e, "request failed");
            ApiError::from(e)
        })?;

        let status = resp.status();
        let bytes = resp.bytes().await?;
        debug!(method = %req.method, path = %req.path, status = status.as_u16(), "response");

        Ok((status, envelope::parse_body(&bytes)))
    }

    /// Like `send_once`, but any non-2xx status is an error. Used by the auth
    /// endpoints, which must never trigger recovery themselves.
    async fn send_plain(
        &self,
        req: &ApiRequest,
        access_token: Option<&str>,
    ) -> Result<Value, ApiError> {
        let (status, body) = self.send_once(req, access_token, None).await?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(ApiError::Http(NormalizedError::from_response(status, &body)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySessionStore;

    fn client(base: &str) -> ApiClient {
        ApiClient::new(
            ClientConfig::new(base),
            Arc::new(MemorySessionStore::new()),
            Arc::new(LogEvents),
        )
        .unwrap()
    }

    #[test]
    fn test_tenant_free_paths() {
        assert!(!ApiRequest::post("/v1/auth/login").needs_tenant());
        assert!(!ApiRequest::get("/v1/discovery/tenants").needs_tenant());
        assert!(!ApiRequest::get("/auth/me").needs_tenant());
        assert!(ApiRequest::get("/v1/health/reminders").needs_tenant());
    }

    #[test]
    fn test_modifying_methods() {
        assert!(ApiRequest::post("/x").is_modifying());
        assert!(ApiRequest::put("/x").is_modifying());
        assert!(ApiRequest::patch("/x").is_modifying());
        assert!(ApiRequest::delete("/x").is_modifying());
        assert!(!ApiRequest::get("/x").is_modifying());
    }

    #[test]
    fn test_refresh_path_detection() {
        assert!(ApiRequest::post(REFRESH_PATH).is_refresh());
        assert!(!ApiRequest::post("/v1/auth/login").is_refresh());
    }

    #[test]
    fn test_url_joining() {
        let c = client("http://crm.local/api/");
        assert_eq!(c.url_for("/v1/health/reminders"), "http://crm.local/api/v1/health/reminders");
        assert_eq!(c.url_for("v1/health/reminders"), "http://crm.local/api/v1/health/reminders");
    }

    #[test]
    fn test_forbidden_read_on_user_initiated_path_is_surfaced() {
        let c = ApiClient::new(
            ClientConfig::new("http://crm.local").with_user_initiated_paths(["/v1/health/exports"]),
            Arc::new(MemorySessionStore::new()),
            Arc::new(LogEvents),
        )
        .unwrap();
        let err = NormalizedError::from_response(StatusCode::FORBIDDEN, &Value::Null);

        let surfaced = c.deny(&ApiRequest::get("/v1/health/exports/42"), err.clone());
        assert!(matches!(surfaced, ApiError::Forbidden { redirected: false, .. }));

        let redirected = c.deny(&ApiRequest::get("/v1/health/customers"), err);
        assert!(matches!(redirected, ApiError::Forbidden { redirected: true, .. }));
    }
}
