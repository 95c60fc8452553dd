//! Router：只看日志末条，决定条件边的去向
//!
//! | 末条                                    | 去向          |
//! |-----------------------------------------|---------------|
//! | FinalAnswer                             | End           |
//! | ToolResult，is_error 或以 "Error: " 开头 | GenerateQuery |
//! | ToolResult，成功                         | FormatAnswer  |
//! | AssistantAction，以 "Error: " 开头       | GenerateQuery |
//! | AssistantAction，无调用（文本 SQL）      | CorrectQuery  |
//! | AssistantAction，含 sql_db_query，其余为 submit_final_answer | ExecuteQuery |
//! | AssistantAction，只有 submit_final_answer | FormatAnswer  |
//!
//! 查询与答案同时出现时先执行查询：答案由 FormatAnswer 基于查询结果重新生成。
//! 其余形状（只有问题、含未处理的其他调用）不属于任何可达状态，返回 MalformedLog。

use crate::core::AgentError;
use crate::memory::{LogEntry, LogError, MessageLog};
use crate::tools::{FINAL_ANSWER_ACTION, QUERY_TOOL};
use crate::workflow::Step;

pub fn route(log: &MessageLog) -> Result<Step, AgentError> {
    let last = log.last().ok_or(LogError::Unroutable("empty log"))?;
    let next = match last {
        LogEntry::FinalAnswer { .. } => Step::End,
        LogEntry::ToolResult { is_error, .. } => {
            if *is_error || last.has_error_marker() {
                Step::GenerateQuery
            } else {
                Step::FormatAnswer
            }
        }
        LogEntry::AssistantAction { tool_calls, .. } => {
            if last.has_error_marker() {
                Step::GenerateQuery
            } else if tool_calls.is_empty() {
                Step::CorrectQuery
            } else if !tool_calls
                .iter()
                .all(|c| c.name == QUERY_TOOL || c.name == FINAL_ANSWER_ACTION)
            {
                return Err(LogError::Unroutable("action requests tools no step will run").into());
            } else if tool_calls.iter().any(|c| c.name == QUERY_TOOL) {
                Step::ExecuteQuery
            } else {
                Step::FormatAnswer
            }
        }
        LogEntry::UserQuestion { .. } => {
            return Err(LogError::Unroutable("nothing generated yet").into())
        }
    };
    Ok(next)
}
