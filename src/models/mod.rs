pub mod envelopes;
pub mod messages;
