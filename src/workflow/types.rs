//! 工作流类型定义
//!
//! 定义步骤、边以及图构建错误

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 工作流中的步骤（节点）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// 入口，无动作
    Start,
    /// 调用 list-tables 工具
    ListTables,
    /// 模型只能请求表结构
    GetSchema,
    /// 模型生成查询或直接给出答案
    GenerateQuery,
    /// Query Corrector 复查查询
    CorrectQuery,
    /// 执行查询，失败交给 Fallback Handler
    ExecuteQuery,
    /// 模型只能提交最终答案
    FormatAnswer,
    /// 出口
    End,
}

impl Step {
    /// 所有步骤，按流水线顺序
    pub const ALL: [Step; 8] = [
        Step::Start,
        Step::ListTables,
        Step::GetSchema,
        Step::GenerateQuery,
        Step::CorrectQuery,
        Step::ExecuteQuery,
        Step::FormatAnswer,
        Step::End,
    ];

    /// Router 可能选择的目标
    pub const ROUTE_TARGETS: [Step; 5] = [
        Step::GenerateQuery,
        Step::CorrectQuery,
        Step::ExecuteQuery,
        Step::FormatAnswer,
        Step::End,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Step::Start => "start",
            Step::ListTables => "list_tables",
            Step::GetSchema => "get_schema",
            Step::GenerateQuery => "generate_query",
            Step::CorrectQuery => "correct_query",
            Step::ExecuteQuery => "execute_query",
            Step::FormatAnswer => "format_answer",
            Step::End => "end",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 出边
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// 固定转移
    Fixed(Step),
    /// 由 Router 根据日志末条决定
    Conditional,
}

/// 工作流错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("step {0} has no outgoing edge")]
    MissingEdge(Step),
    #[error("step {0} already has an outgoing edge")]
    DuplicateEdge(Step),
    #[error("end step may not have an outgoing edge")]
    EdgeFromEnd,
    #[error("step {0} is unreachable from start")]
    Unreachable(Step),
}
