//! Jobflow Core — the coordination layer of the job-application pipeline.
//!
//! Three pieces, each an explicitly constructed value (no globals):
//!
//! - [`events::MessageBus`] routes envelopes between named participants,
//!   runs agents on their own tasks and supports correlated waits.
//! - [`workflow::WorkflowEngine`] drives a variant's steps over the bus with
//!   timeouts, bounded retries and exponential backoff.
//! - [`store::StateManager`] keeps one durable JSON record per job.
//!
//! The agents that do the actual research, scoring and writing live outside
//! this crate; they only need to implement [`agents::Agent`].

pub mod agents;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod orchestration;
pub mod state;
pub mod store;
pub mod workflow;

// Convenience re-exports
pub use config::AppConfig;
pub use error::{CoreError, CoreResult};
pub use state::{AppState, AppStateInner};
