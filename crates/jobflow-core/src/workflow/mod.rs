//! Workflow engine — YAML-configured, bus-driven step pipelines.
//!
//! # Architecture
//!
//! ```text
//! config/workflows/*.yaml ──► VariantLoader ──► WorkflowVariant
//!                                                    │
//!                          JobContext ──────► WorkflowEngine ──► StateManager
//!                                                    │
//!                                               MessageBus
//!                                                    │
//!                               research / scoring / positioning / content agents
//! ```

pub mod executor;
pub mod loader;
pub mod schema;
pub mod steps;

pub use executor::{default_variant_for_role, JobContext, WorkflowEngine, ENGINE_NAME};
pub use loader::VariantLoader;
pub use schema::{StepDefinition, WorkflowVariant};
pub use steps::{StepKind, StepMapping};
