//! Fallback Handler：把工具失败转成日志条目
//!
//! 不重试工具本身。每个失败的调用生成一条以 "Error: " 开头的 ToolResult，
//! 重试交回工作流：Router 读到错误前缀后把流程送回 GenerateQuery。

use std::fmt::Display;

use crate::core::AgentError;
use crate::memory::{LogEntry, ToolCall, ERROR_PREFIX};

#[derive(Debug, Default)]
pub struct FallbackHandler;

impl FallbackHandler {
    pub fn new() -> Self {
        Self
    }

    /// "Error: <detail> please fix your mistakes."
    pub fn error_text(detail: impl Display) -> String {
        format!("{ERROR_PREFIX}{detail} please fix your mistakes.")
    }

    /// 为每个失败的调用生成一条错误结果，按 call_id 关联
    pub fn handle(&self, err: &AgentError, failed_calls: &[ToolCall]) -> Vec<LogEntry> {
        tracing::warn!(
            error = %err,
            calls = failed_calls.len(),
            "tool failure converted to error result"
        );
        let content = Self::error_text(err);
        failed_calls
            .iter()
            .map(|call| LogEntry::tool_error(call.call_id.clone(), content.clone()))
            .collect()
    }
}
