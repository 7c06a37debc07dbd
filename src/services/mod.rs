pub mod erp;
pub mod notifications;
pub mod pickups;
pub mod timeline;
pub mod users;
