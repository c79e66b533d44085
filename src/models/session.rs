// Session model: credentials, tenant and permission grants of the signed-in user.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Access/refresh token pair. Replaced as a unit on refresh.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

/// Permission grants of the current user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    /// Module-level grants, e.g. "customers", "appointments".
    #[serde(default)]
    pub modules: Vec<String>,
    /// Fine-grained grants, e.g. "customers:update".
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl PermissionSet {
    /// Keep our module grants (unless we have none) and take the fine-grained
    /// grants from `fresh`.
    pub fn merged_with(&self, fresh: PermissionSet) -> PermissionSet {
        let modules = if self.modules.is_empty() {
            fresh.modules
        } else {
            self.modules.clone()
        };
        PermissionSet {
            modules,
            permissions: fresh.permissions,
        }
    }

    pub fn allows(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub permissions: Option<PermissionSet>,
    #[serde(default)]
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn access_token(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.access_token.as_str())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.credentials
            .as_ref()
            .map(|c| c.refresh_token.as_str())
            .filter(|t| !t.is_empty())
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }
}
