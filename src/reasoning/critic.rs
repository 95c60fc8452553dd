//! Query Corrector：按固定规则清单复查生成的 SQL
//!
//! 输出要么是原样的查询，要么是改写后的查询，总是恰好一个 sql_db_query 调用，
//! 工作流因此可以确定地进入 ExecuteQuery。做不到时返回 CorrectionFailure（致命）。

use std::sync::Arc;

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::{LogEntry, Message, MessageLog, ToolCall};
use crate::reasoning::planner::{Binding, ReasoningInvoker};
use crate::tools::{BoundAction, QUERY_TOOL};

const CORRECTOR_ACTIONS: &[BoundAction] = &[BoundAction::ExecuteQuery];

pub struct QueryCorrector {
    invoker: ReasoningInvoker,
    system_prompt: String,
}

impl QueryCorrector {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            invoker: ReasoningInvoker::new(llm),
            system_prompt: system_prompt.into(),
        }
    }

    /// 复查日志末尾生成的查询，返回一条只含一个 sql_db_query 调用的 AssistantAction
    pub async fn correct(&self, log: &MessageLog) -> Result<LogEntry, AgentError> {
        let original = generated_query(log)?;
        let action = self
            .invoker
            .invoke_messages(
                &self.system_prompt,
                vec![Message::user(original.clone())],
                Binding::required(CORRECTOR_ACTIONS),
            )
            .await?;

        if action.has_error_marker() {
            return Err(AgentError::CorrectionFailure(action.content().to_string()));
        }
        let calls = action.tool_calls();
        if calls.len() != 1 {
            return Err(AgentError::CorrectionFailure(format!(
                "expected exactly one {} call, got {}",
                QUERY_TOOL,
                calls.len()
            )));
        }
        let call = &calls[0];
        if call.name != QUERY_TOOL {
            return Err(AgentError::CorrectionFailure(format!(
                "expected a {} call, got {}",
                QUERY_TOOL, call.name
            )));
        }
        let corrected = call
            .arg_str("query")
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| {
                AgentError::CorrectionFailure("corrected call has no query".to_string())
            })?;

        let sql = if same_query(&original, corrected) {
            original
        } else {
            tracing::info!(original = %original, corrected = %corrected, "query rewritten");
            corrected.to_string()
        };

        Ok(LogEntry::action(
            action.content(),
            vec![ToolCall::new(QUERY_TOOL, serde_json::json!({ "query": sql }))],
        ))
    }
}

/// 日志末尾的生成结果：sql_db_query 调用的 query 参数，或纯文本中的 SQL
pub fn generated_query(log: &MessageLog) -> Result<String, AgentError> {
    let from_entry = match log.last() {
        Some(LogEntry::AssistantAction {
            content,
            tool_calls,
        }) => match tool_calls.iter().find(|c| c.name == QUERY_TOOL) {
            Some(call) => call.arg_str("query").map(|q| q.trim().to_string()),
            None if tool_calls.is_empty() => Some(extract_sql(content)),
            None => None,
        },
        _ => None,
    };
    from_entry.filter(|q| !q.is_empty()).ok_or_else(|| {
        AgentError::CorrectionFailure("the log does not end with a generated query".to_string())
    })
}

/// 去掉 ``` 代码块包裹与语言标记
pub fn extract_sql(content: &str) -> String {
    let trimmed = content.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed.to_string();
    };
    let rest = &trimmed[start + 3..];
    let body = rest.find("```").map(|end| &rest[..end]).unwrap_or(rest);
    let body = match body.split_once('\n') {
        Some((tag, tail))
            if matches!(
                tag.trim().to_ascii_lowercase().as_str(),
                "sql" | "sqlite" | "postgres" | "postgresql" | "mysql"
            ) =>
        {
            tail
        }
        _ => body,
    };
    body.trim().to_string()
}

/// 忽略空白差异与末尾分号后是否相同
pub fn same_query(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

fn normalize(sql: &str) -> String {
    let collapsed = extract_sql(sql)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    collapsed.trim_end_matches(';').trim_end().to_string()
}
