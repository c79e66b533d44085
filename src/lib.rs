//! Authenticated access to the multi-tenant HealthCRM backend.
//!
//! - [`client::ApiClient`] attaches bearer and tenant headers, decodes the
//!   response envelope, and recovers expired sessions with a single-flight
//!   token refresh.
//! - [`reminders::ReminderReconciler`] converges a record's reminders on the
//!   server to a desired list.

pub mod client;
pub mod config;
pub mod errors;
pub mod models;
pub mod reminders;
pub mod store;

pub use client::{ApiClient, ApiRequest, AuthEvent, AuthEvents, LogEvents};
pub use errors::{ApiError, NormalizedError};
