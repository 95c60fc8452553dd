//! 工作流图
//!
//! 邻接表：步骤 -> 唯一出边。固定边直接给出下一步，条件边交给 Router。

use std::collections::HashMap;

use crate::core::AgentError;
use crate::memory::MessageLog;
use crate::workflow::builder::WorkflowBuilder;
use crate::workflow::router::route;
use crate::workflow::types::*;

/// 工作流图
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    edges: HashMap<Step, Edge>,
}

impl WorkflowGraph {
    pub(crate) fn from_edges(edges: HashMap<Step, Edge>) -> Self {
        Self { edges }
    }

    /// NL→SQL 流水线：
    /// Start→ListTables→GetSchema→GenerateQuery→(Router)，CorrectQuery→ExecuteQuery→(Router)，
    /// FormatAnswer→End
    pub fn sql_pipeline() -> Result<Self, WorkflowError> {
        WorkflowBuilder::new()
            .edge(Step::Start, Step::ListTables)
            .edge(Step::ListTables, Step::GetSchema)
            .edge(Step::GetSchema, Step::GenerateQuery)
            .conditional(Step::GenerateQuery)
            .edge(Step::CorrectQuery, Step::ExecuteQuery)
            .conditional(Step::ExecuteQuery)
            .edge(Step::FormatAnswer, Step::End)
            .build()
    }

    pub fn entry(&self) -> Step {
        Step::Start
    }

    pub fn edge(&self, from: Step) -> Option<Edge> {
        self.edges.get(&from).copied()
    }

    pub fn is_conditional(&self, from: Step) -> bool {
        matches!(self.edge(from), Some(Edge::Conditional))
    }

    /// 根据出边（必要时由 Router 查看日志）选出下一步
    pub fn next(&self, from: Step, log: &MessageLog) -> Result<Step, AgentError> {
        match self.edge(from) {
            Some(Edge::Fixed(to)) => Ok(to),
            Some(Edge::Conditional) => route(log),
            None => Err(WorkflowError::MissingEdge(from).into()),
        }
    }
}
