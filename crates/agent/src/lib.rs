//! Agent runtime - the embedding layer around the orchestration core
//!
//! This crate wires the deterministic core to durable storage and time:
//! - Built-in tools (`tools`): memory, expense records, scheduling, echo
//! - Per-conversation serialization (`hub`)
//! - The transport-facing facade (`runtime::AgentRuntime`)
//! - The periodic scheduler loop (`ticker::SchedulerTicker`)
//! - Startup wiring from configuration (`bootstrap`)
//!
//! # Execution model
//!
//! Every operation loads one conversation snapshot, runs a single
//! orchestrator step against it while holding that conversation's guard,
//! and saves it back. Ticks fan out across conversations in parallel; a
//! failure in one conversation never affects another.

pub mod audit;
pub mod bootstrap;
pub mod hub;
pub mod runtime;
pub mod ticker;
pub mod tools;

pub use audit::TracingAuditSink;
pub use bootstrap::{bootstrap, bootstrap_with_config, Application, BootstrapError};
pub use hub::ConversationHub;
pub use runtime::{AgentRuntime, RuntimeError, TickFailure, TickSummary};
pub use ticker::{SchedulerTicker, TickerHandle};
