// Models module

pub mod reminder;
pub mod session;

pub use reminder::{Relation, Reminder, ReminderWire, TEMP_ID_PREFIX};
pub use session::{Credentials, PermissionSet, Session};
