//! Reasoning Invoker：调用 LLM 并把输出解析为 AssistantAction
//!
//! 日志按顺序渲染为消息（这是模型获得的唯一上下文），system prompt 末尾附上本步骤
//! 绑定的动作及其参数 schema。模型回复纯文本或 JSON tool call；
//! parse_llm_output 从文本中提取 JSON 并解析为一个或多个调用。

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::core::{AgentError, FallbackHandler};
use crate::llm::LlmClient;
use crate::memory::{LogEntry, Message, MessageLog, ToolCall};
use crate::tools::{tool_call_schema_json, BoundAction};

/// LLM 返回的单个调用（{"tool": "sql_db_query", "args": {"query": "..."}}）
#[derive(Debug, Clone, Deserialize)]
pub struct ParsedCall {
    pub tool: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCalls {
    Many(Vec<ParsedCall>),
    One(ParsedCall),
}

/// Planner 输出
#[derive(Debug, Clone)]
pub enum PlannerOutput {
    /// 纯文本
    Response(String),
    /// 一个或多个调用；content 为 JSON 之前的说明文字
    ToolCalls {
        content: String,
        calls: Vec<ParsedCall>,
    },
}

/// 解析 LLM 输出：```json 围栏、以 { 或 [ 开头、或正文中带 "tool" 键的花括号片段按调用解析，
/// 其余为 Response；按调用解析的 JSON 无效时报错
pub fn parse_llm_output(output: &str) -> Result<PlannerOutput, AgentError> {
    let trimmed = output.trim();

    let (json_str, prefix) = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        let body = rest
            .find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or(rest.trim());
        (body, trimmed[..start].trim())
    } else if trimmed.starts_with('[') {
        (trimmed, "")
    } else {
        // 正文中的花括号片段只有带 "tool" 键时才视为调用，SQL 里的 JSON 字面量保持原样
        match (trimmed.find('{'), trimmed.rfind('}')) {
            (Some(start), Some(end))
                if end > start && (start == 0 || trimmed[start..=end].contains("\"tool\"")) =>
            {
                (&trimmed[start..=end], trimmed[..start].trim())
            }
            _ => return Ok(PlannerOutput::Response(trimmed.to_string())),
        }
    };

    let parsed: RawCalls = serde_json::from_str(json_str)
        .map_err(|e| AgentError::JsonParseError(format!("{}: {}", e, json_str)))?;

    let calls: Vec<ParsedCall> = match parsed {
        RawCalls::Many(calls) => calls,
        RawCalls::One(call) => vec![call],
    }
    .into_iter()
    .filter(|c| !c.tool.trim().is_empty())
    .map(|c| ParsedCall {
        tool: c.tool.trim().to_string(),
        args: if c.args.is_null() {
            serde_json::json!({})
        } else {
            c.args
        },
    })
    .collect();

    if calls.is_empty() {
        Ok(PlannerOutput::Response(trimmed.to_string()))
    } else {
        Ok(PlannerOutput::ToolCalls {
            content: prefix.to_string(),
            calls,
        })
    }
}

/// 本步骤向模型开放的动作；require_call 为 true 时模型必须调用其中之一
#[derive(Debug, Clone, Copy)]
pub struct Binding<'a> {
    pub actions: &'a [BoundAction],
    pub require_call: bool,
}

impl<'a> Binding<'a> {
    pub fn optional(actions: &'a [BoundAction]) -> Self {
        Self {
            actions,
            require_call: false,
        }
    }

    pub fn required(actions: &'a [BoundAction]) -> Self {
        Self {
            actions,
            require_call: true,
        }
    }

    /// 追加到 system prompt 的动作说明
    pub fn prompt_section(&self) -> String {
        let mut out = String::from("## Available actions\n\n");
        if self.require_call {
            out.push_str(
                "You MUST call exactly one of the actions below. Reply with ONLY a JSON object, \
                 plain text is not accepted:\n",
            );
        } else {
            out.push_str(
                "Reply with plain text, or call one of the actions below by replying with ONLY \
                 a JSON object:\n",
            );
        }
        out.push_str("{\"tool\": \"<action name>\", \"args\": {...}}\n\nTool call schema:\n");
        out.push_str(&tool_call_schema_json());
        out.push_str("\n\n");
        for action in self.actions {
            out.push_str(&format!(
                "- {}: {}\n  parameters: {}\n",
                action.name(),
                action.description(),
                action.args_schema()
            ));
        }
        out
    }
}

/// 日志条目 -> LLM 消息
pub fn render_log(log: &MessageLog) -> Vec<Message> {
    log.entries()
        .iter()
        .map(|entry| match entry {
            LogEntry::UserQuestion { text } => Message::user(text.clone()),
            LogEntry::AssistantAction {
                content,
                tool_calls,
            } => Message::assistant(render_action(content, tool_calls)),
            LogEntry::ToolResult {
                call_id, content, ..
            } => Message::user(format!("Tool result [{}]: {}", call_id, content)),
            LogEntry::FinalAnswer { text } => Message::assistant(text.clone()),
        })
        .collect()
}

fn render_action(content: &str, tool_calls: &[ToolCall]) -> String {
    let calls: Vec<Value> = tool_calls
        .iter()
        .map(|c| serde_json::json!({ "tool": c.name, "args": c.arguments, "id": c.call_id }))
        .collect();
    let json = match calls.len() {
        0 => String::new(),
        1 => calls[0].to_string(),
        _ => Value::Array(calls).to_string(),
    };
    match (content.trim().is_empty(), json.is_empty()) {
        (_, true) => content.to_string(),
        (true, false) => json,
        (false, false) => format!("{}\n{}", content, json),
    }
}

/// Reasoning Invoker：持有 LLM，invoke 返回一条 AssistantAction
pub struct ReasoningInvoker {
    llm: Arc<dyn LlmClient>,
}

impl ReasoningInvoker {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 以完整日志为上下文调用模型
    pub async fn invoke(
        &self,
        system: &str,
        log: &MessageLog,
        binding: Binding<'_>,
    ) -> Result<LogEntry, AgentError> {
        self.invoke_messages(system, render_log(log), binding).await
    }

    /// 以给定消息为上下文调用模型。
    ///
    /// 无法解析的 JSON 与空回复不会被宽松处理：它们变成一条以 "Error: " 开头的
    /// AssistantAction，交给 Router 送回生成步骤。
    pub async fn invoke_messages(
        &self,
        system: &str,
        messages: Vec<Message>,
        binding: Binding<'_>,
    ) -> Result<LogEntry, AgentError> {
        let system = format!("{}\n\n{}", system, binding.prompt_section());
        let mut full_messages = Vec::with_capacity(messages.len() + 1);
        full_messages.push(Message::system(system));
        full_messages.extend(messages);
        tracing::debug!(messages = full_messages.len(), "invoking llm");

        let output = self
            .llm
            .complete(&full_messages)
            .await
            .map_err(AgentError::LlmError)?;

        if output.trim().is_empty() {
            return Ok(LogEntry::action(
                FallbackHandler::error_text("the model returned an empty response,"),
                vec![],
            ));
        }

        match parse_llm_output(&output) {
            Ok(PlannerOutput::Response(text)) => Ok(LogEntry::action(text, vec![])),
            Ok(PlannerOutput::ToolCalls { content, calls }) => Ok(LogEntry::action(
                content,
                calls
                    .into_iter()
                    .map(|c| ToolCall::new(c.tool, c.args))
                    .collect(),
            )),
            Err(e) => {
                tracing::warn!("unparseable model output: {}", e);
                Ok(LogEntry::action(FallbackHandler::error_text(&e), vec![]))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::memory::Role;
    use crate::tools::{FINAL_ANSWER_ACTION, QUERY_TOOL};

    #[test]
    fn test_parse_plain_sql_is_response() {
        match parse_llm_output("SELECT COUNT(*) FROM orders WHERE amount > 300").unwrap() {
            PlannerOutput::Response(text) => {
                assert_eq!(text, "SELECT COUNT(*) FROM orders WHERE amount > 300")
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_sql_with_json_literal_is_response() {
        let sql = r#"SELECT COUNT(*) FROM events WHERE payload = '{"kind":"order"}'"#;
        match parse_llm_output(sql).unwrap() {
            PlannerOutput::Response(text) => assert_eq!(text, sql),
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_single_call_with_prefix() {
        let out = parse_llm_output(
            r#"Let me run it. {"tool": "sql_db_query", "args": {"query": "SELECT 1"}}"#,
        )
        .unwrap();
        match out {
            PlannerOutput::ToolCalls { content, calls } => {
                assert_eq!(content, "Let me run it.");
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].tool, QUERY_TOOL);
                assert_eq!(calls[0].args["query"], "SELECT 1");
            }
            other => panic!("expected tool calls, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_fenced_array() {
        let out = parse_llm_output(
            "```json\n[{\"tool\": \"sql_db_schema\", \"args\": {\"table_names\": \"a\"}}, {\"tool\": \"sql_db_schema\", \"args\": {\"table_names\": \"b\"}}]\n```",
        )
        .unwrap();
        assert!(matches!(out, PlannerOutput::ToolCalls { ref calls, .. } if calls.len() == 2));
    }

    #[test]
    fn test_parse_missing_args_defaults_to_object() {
        match parse_llm_output(r#"{"tool": "sql_db_list_tables"}"#).unwrap() {
            PlannerOutput::ToolCalls { calls, .. } => assert!(calls[0].args.is_object()),
            other => panic!("expected tool calls, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_broken_json_is_error() {
        assert!(matches!(
            parse_llm_output(r#"{"tool": "sql_db_query", "args": {"query": }"#),
            Err(AgentError::JsonParseError(_))
        ));
    }

    #[test]
    fn test_required_binding_prompt() {
        let section = Binding::required(&[BoundAction::FinalAnswer]).prompt_section();
        assert!(section.contains("MUST"));
        assert!(section.contains(FINAL_ANSWER_ACTION));
        assert!(!section.contains(QUERY_TOOL));
    }

    #[test]
    fn test_render_log_correlates_results() {
        let mut log = MessageLog::new("how many orders?");
        let call = ToolCall::new(QUERY_TOOL, serde_json::json!({"query": "SELECT 1"}));
        let id = call.call_id.clone();
        log.append(LogEntry::action("", vec![call])).unwrap();
        log.append(LogEntry::tool_ok(id.clone(), "[{\"1\":1}]")).unwrap();
        let msgs = render_log(&log);
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[1].role, Role::Assistant);
        assert!(msgs[1].content.contains(&id));
        assert!(msgs[2].content.starts_with(&format!("Tool result [{}]", id)));
    }

    #[tokio::test]
    async fn test_invoke_assigns_call_ids() {
        let mock = Arc::new(MockLlmClient::scripted([
            r#"{"tool": "sql_db_query", "args": {"query": "SELECT 1"}}"#,
        ]));
        let invoker = ReasoningInvoker::new(mock.clone());
        let log = MessageLog::new("q");
        let entry = invoker
            .invoke(
                "system",
                &log,
                Binding::optional(&[BoundAction::ExecuteQuery, BoundAction::FinalAnswer]),
            )
            .await
            .unwrap();
        let calls = entry.tool_calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].call_id.starts_with("call_"));
        let sent = &mock.calls()[0];
        assert_eq!(sent[0].role, Role::System);
        assert!(sent[0].content.contains(QUERY_TOOL));
    }

    #[tokio::test]
    async fn test_invoke_unparseable_becomes_error_action() {
        let mock = Arc::new(MockLlmClient::scripted([r#"{"tool": oops}"#]));
        let invoker = ReasoningInvoker::new(mock);
        let entry = invoker
            .invoke("system", &MessageLog::new("q"), Binding::optional(&[]))
            .await
            .unwrap();
        assert!(entry.has_error_marker());
        assert!(entry.tool_calls().is_empty());
    }
}
