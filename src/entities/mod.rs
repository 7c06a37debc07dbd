//! Database entities.

pub mod occurrence;
pub mod order;
pub mod pickup;
pub mod timeline_line;
pub mod user;

pub use occurrence::{OccurrenceKind, OccurrenceStatus, ReturnReason};
pub use pickup::PickupStatus;
pub use timeline_line::LineStatus;
pub use user::UserRole;
