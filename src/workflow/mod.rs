//! 工作流：步骤、边、Router、引擎与过程事件

pub mod builder;
pub mod engine;
pub mod events;
pub mod graph;
pub mod router;
pub mod steps;
pub mod types;

pub use builder::WorkflowBuilder;
pub use engine::{WorkflowEngine, DEFAULT_MAX_RETRIES};
pub use events::WorkflowEvent;
pub use graph::WorkflowGraph;
pub use router::route;
pub use steps::{StepPrompts, StepRunner};
pub use types::*;
