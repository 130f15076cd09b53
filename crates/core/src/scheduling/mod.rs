//! Deferred execution: cron evaluation, the per-conversation schedule book
//! and the scheduler that creates, cancels and fires entries.

pub mod cron;
pub mod scheduler;

pub use cron::{CronError, CronExpression};
pub use scheduler::{ScheduleBook, ScheduleError, Scheduler, SchedulerConfig};
