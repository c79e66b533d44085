//! Navigation signals raised by the client when the session can no longer
//! be used. The host decides how to react (show a login screen, a
//! forbidden page, or exit the CLI).

use tokio::sync::mpsc::UnboundedSender;

/// Where the host should send the user after a terminal auth failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// Session was torn down; the user has to sign in again.
    Unauthenticated,
    /// The user is signed in but may not read `path`.
    Forbidden { path: String },
}

impl AuthEvent {
    pub fn route(&self) -> &'static str {
        match self {
            AuthEvent::Unauthenticated => "/login",
            AuthEvent::Forbidden { .. } => "/forbidden",
        }
    }
}

pub trait AuthEvents: Send + Sync {
    fn emit(&self, event: AuthEvent);
}

/// Default sink: only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEvents;

impl AuthEvents for LogEvents {
    fn emit(&self, event: AuthEvent) {
        match &event {
            AuthEvent::Unauthenticated => {
                tracing::warn!(route = event.route(), "session ended, sign-in required")
            }
            AuthEvent::Forbidden { path } => {
                tracing::warn!(route = event.route(), path = %path, "access forbidden")
            }
        }
    }
}

impl AuthEvents for UnboundedSender<AuthEvent> {
    fn emit(&self, event: AuthEvent) {
        // A closed receiver means nobody is navigating anymore.
        let _ = self.send(event);
    }
}
