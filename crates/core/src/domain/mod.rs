pub mod call;
pub mod conversation;
pub mod record;
pub mod schedule;
pub mod tool;
