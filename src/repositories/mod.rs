pub mod memberships;
pub mod memory;
pub mod messages;
pub mod notifications;
pub mod users;
