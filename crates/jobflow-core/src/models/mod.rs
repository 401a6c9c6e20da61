pub mod message;
pub mod workflow_state;

pub use message::{AgentMessage, MessageKind, BROADCAST};
pub use workflow_state::{
    NewWorkflowState, StageSlot, StateUpdate, WorkflowMetrics, WorkflowState, WorkflowStatus,
};
