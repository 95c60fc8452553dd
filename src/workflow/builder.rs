//! 工作流构建器
//!
//! 提供流畅的API来声明步骤之间的边，build 时校验图的完整性

use std::collections::{HashMap, HashSet, VecDeque};

use crate::workflow::graph::WorkflowGraph;
use crate::workflow::types::*;

/// 工作流构建器
#[derive(Debug, Default)]
pub struct WorkflowBuilder {
    edges: HashMap<Step, Edge>,
    duplicate: Option<Step>,
}

impl WorkflowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加固定边
    pub fn edge(self, from: Step, to: Step) -> Self {
        self.insert(from, Edge::Fixed(to))
    }

    /// 添加条件边（由 Router 决定去向）
    pub fn conditional(self, from: Step) -> Self {
        self.insert(from, Edge::Conditional)
    }

    fn insert(mut self, from: Step, edge: Edge) -> Self {
        if self.edges.insert(from, edge).is_some() && self.duplicate.is_none() {
            self.duplicate = Some(from);
        }
        self
    }

    /// 构建工作流图。
    ///
    /// 要求：除 End 外每个步骤恰有一条出边；End 没有出边；所有步骤都能从 Start 到达。
    pub fn build(self) -> Result<WorkflowGraph, WorkflowError> {
        if let Some(step) = self.duplicate {
            return Err(WorkflowError::DuplicateEdge(step));
        }
        if self.edges.contains_key(&Step::End) {
            return Err(WorkflowError::EdgeFromEnd);
        }
        if let Some(step) = Step::ALL
            .iter()
            .copied()
            .find(|s| *s != Step::End && !self.edges.contains_key(s))
        {
            return Err(WorkflowError::MissingEdge(step));
        }

        let mut seen = HashSet::from([Step::Start]);
        let mut queue = VecDeque::from([Step::Start]);
        while let Some(step) = queue.pop_front() {
            let targets: Vec<Step> = match self.edges.get(&step) {
                Some(Edge::Fixed(to)) => vec![*to],
                Some(Edge::Conditional) => Step::ROUTE_TARGETS.to_vec(),
                None => vec![],
            };
            for to in targets {
                if seen.insert(to) {
                    queue.push_back(to);
                }
            }
        }
        if let Some(step) = Step::ALL.iter().copied().find(|s| !seen.contains(s)) {
            return Err(WorkflowError::Unreachable(step));
        }

        Ok(WorkflowGraph::from_edges(self.edges))
    }
}
