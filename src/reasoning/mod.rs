//! 推理层：Reasoning Invoker（planner）、Query Corrector（critic）、各步骤 prompt

pub mod critic;
pub mod planner;
pub mod prompts;

pub use critic::QueryCorrector;
pub use planner::{parse_llm_output, render_log, Binding, PlannerOutput, ReasoningInvoker};
