//! 各步骤的实现
//!
//! 每个步骤拿到日志的只读视图，返回要追加的条目；由引擎负责追加。
//! 步骤之间不共享其他状态。

use std::slice;
use std::sync::Arc;

use serde_json::json;

use crate::core::{AgentError, FallbackHandler};
use crate::llm::LlmClient;
use crate::memory::{LogEntry, LogError, MessageLog, ToolCall, ERROR_PREFIX};
use crate::reasoning::prompts::{
    self, FORMAT_SYSTEM, QUERY_CHECK_SYSTEM, QUERY_GEN_SYSTEM, SCHEMA_SYSTEM,
};
use crate::reasoning::{Binding, QueryCorrector, ReasoningInvoker};
use crate::tools::schema::FinalAnswerArgs;
use crate::tools::{resolve, BoundAction, ToolExecutor, LIST_TABLES_TOOL, QUERY_TOOL};
use crate::workflow::Step;

const SCHEMA_ACTIONS: &[BoundAction] = &[BoundAction::FetchSchema];
const GENERATE_ACTIONS: &[BoundAction] = &[BoundAction::ExecuteQuery, BoundAction::FinalAnswer];
const FORMAT_ACTIONS: &[BoundAction] = &[BoundAction::FinalAnswer];

/// 各步骤使用的 system prompt（已替换方言）
#[derive(Debug, Clone)]
pub struct StepPrompts {
    pub schema: String,
    pub generate: String,
    pub check: String,
    pub format: String,
}

impl StepPrompts {
    pub fn for_dialect(dialect: &str) -> Self {
        Self {
            schema: prompts::render(SCHEMA_SYSTEM, dialect),
            generate: prompts::render(QUERY_GEN_SYSTEM, dialect),
            check: prompts::render(QUERY_CHECK_SYSTEM, dialect),
            format: prompts::render(FORMAT_SYSTEM, dialect),
        }
    }
}

/// 步骤执行器：持有推理、纠错、工具与 fallback
pub struct StepRunner {
    invoker: ReasoningInvoker,
    corrector: QueryCorrector,
    executor: ToolExecutor,
    fallback: FallbackHandler,
    prompts: StepPrompts,
    format_attempts: usize,
}

impl StepRunner {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        executor: ToolExecutor,
        dialect: &str,
        format_attempts: usize,
    ) -> Self {
        let prompts = StepPrompts::for_dialect(dialect);
        Self {
            invoker: ReasoningInvoker::new(Arc::clone(&llm)),
            corrector: QueryCorrector::new(llm, prompts.check.clone()),
            executor,
            fallback: FallbackHandler::new(),
            prompts,
            format_attempts: format_attempts.max(1),
        }
    }

    /// 累计 token 使用
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.invoker.token_usage()
    }

    /// 执行一个步骤，返回要追加的条目
    pub async fn run(&self, step: Step, log: &MessageLog) -> Result<Vec<LogEntry>, AgentError> {
        match step {
            Step::Start | Step::End => Ok(Vec::new()),
            Step::ListTables => self.list_tables().await,
            Step::GetSchema => self.get_schema(log).await,
            Step::GenerateQuery => self.generate_query(log).await,
            Step::CorrectQuery => Ok(vec![self.corrector.correct(log).await?]),
            Step::ExecuteQuery => self.execute_query(log).await,
            Step::FormatAnswer => self.format_answer(log).await,
        }
    }

    /// 不经过模型，直接调用 list-tables；补一条 AssistantAction 承载 call_id
    async fn list_tables(&self) -> Result<Vec<LogEntry>, AgentError> {
        let call = ToolCall::new(LIST_TABLES_TOOL, json!({}));
        let tables = self
            .executor
            .execute(&call)
            .await
            .map_err(|e| AgentError::SchemaUnavailable(e.to_string()))?;
        let call_id = call.call_id.clone();
        Ok(vec![
            LogEntry::action("", vec![call]),
            LogEntry::tool_ok(call_id, tables),
        ])
    }

    /// 模型只能调用 sql_db_schema；不合规或取结构失败都是致命的
    async fn get_schema(&self, log: &MessageLog) -> Result<Vec<LogEntry>, AgentError> {
        let action = self
            .invoker
            .invoke(&self.prompts.schema, log, Binding::required(SCHEMA_ACTIONS))
            .await?;
        if action.has_error_marker() {
            return Err(AgentError::SchemaUnavailable(action.content().to_string()));
        }
        let calls = action.tool_calls();
        if calls.is_empty() {
            return Err(AgentError::SchemaUnavailable(
                "the model did not request any table schema".to_string(),
            ));
        }
        if let Some(call) = calls.iter().find(|c| resolve(c, SCHEMA_ACTIONS).is_none()) {
            return Err(AgentError::SchemaUnavailable(format!(
                "the model called {} instead of {}",
                call.name,
                BoundAction::names(SCHEMA_ACTIONS)
            )));
        }

        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let schema = self
                .executor
                .execute(call)
                .await
                .map_err(|e| AgentError::SchemaUnavailable(e.to_string()))?;
            results.push(LogEntry::tool_ok(call.call_id.clone(), schema));
        }

        let mut entries = Vec::with_capacity(results.len() + 1);
        entries.push(action);
        entries.extend(results);
        Ok(entries)
    }

    /// 生成查询；未绑定的调用不执行，直接合成错误结果（不经过 Fallback Handler）
    async fn generate_query(&self, log: &MessageLog) -> Result<Vec<LogEntry>, AgentError> {
        let action = self
            .invoker
            .invoke(&self.prompts.generate, log, Binding::optional(GENERATE_ACTIONS))
            .await?;

        let rejected: Vec<LogEntry> = action
            .tool_calls()
            .iter()
            .filter(|call| resolve(call, GENERATE_ACTIONS).is_none())
            .map(|call| {
                let err = AgentError::HallucinatedTool(call.name.clone());
                tracing::warn!(error = %err, call_id = %call.call_id, "unbound action requested");
                LogEntry::tool_error(
                    call.call_id.clone(),
                    format!(
                        "{ERROR_PREFIX}{} is not a valid tool, try one of [{}].",
                        call.name,
                        BoundAction::names(GENERATE_ACTIONS)
                    ),
                )
            })
            .collect();

        let mut entries = Vec::with_capacity(rejected.len() + 1);
        entries.push(action);
        entries.extend(rejected);
        Ok(entries)
    }

    /// 逐个执行最新 AssistantAction 中的 sql_db_query 调用，首次失败即交给 Fallback Handler
    async fn execute_query(&self, log: &MessageLog) -> Result<Vec<LogEntry>, AgentError> {
        let calls: Vec<&ToolCall> = match log.last() {
            Some(entry @ LogEntry::AssistantAction { .. }) => entry
                .tool_calls()
                .iter()
                .filter(|c| c.name == QUERY_TOOL)
                .collect(),
            _ => Vec::new(),
        };
        if calls.is_empty() {
            return Err(LogError::NoPendingCall(QUERY_TOOL).into());
        }

        let mut entries = Vec::with_capacity(calls.len());
        for call in calls {
            match self.executor.execute(call).await {
                Ok(content) => entries.push(LogEntry::tool_ok(call.call_id.clone(), content)),
                Err(e) if e.is_recoverable() => {
                    entries.extend(self.fallback.handle(&e, slice::from_ref(call)));
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(entries)
    }

    /// 只接受恰好一个 submit_final_answer 且 final_answer 非空；
    /// 不合规的尝试连同错误结果一起保留，供下一次尝试参考
    async fn format_answer(&self, log: &MessageLog) -> Result<Vec<LogEntry>, AgentError> {
        let mut view = log.clone();
        let mut entries = Vec::new();
        let mut last_detail = String::new();

        for attempt in 1..=self.format_attempts {
            let action = self
                .invoker
                .invoke(&self.prompts.format, &view, Binding::required(FORMAT_ACTIONS))
                .await?;

            match final_answer_text(&action) {
                Ok(text) => {
                    entries.push(LogEntry::FinalAnswer { text });
                    return Ok(entries);
                }
                Err(detail) => {
                    tracing::warn!(attempt, max = self.format_attempts, %detail, "final answer rejected");
                    let err = AgentError::InvalidFinalAnswer(detail.clone());
                    let mut failed = vec![action.clone()];
                    failed.extend(self.fallback.handle(&err, action.tool_calls()));
                    for entry in failed {
                        view.append(entry.clone())?;
                        entries.push(entry);
                    }
                    last_detail = detail;
                }
            }
        }
        Err(AgentError::InvalidFinalAnswer(last_detail))
    }
}

fn final_answer_text(action: &LogEntry) -> Result<String, String> {
    if action.has_error_marker() {
        return Err(action.content().to_string());
    }
    let calls = action.tool_calls();
    let call = match calls {
        [] => return Err("expected a submit_final_answer call, got plain text".to_string()),
        [call] => call,
        _ => {
            return Err(format!(
                "expected exactly one submit_final_answer call, got {}",
                calls.len()
            ))
        }
    };
    if resolve(call, FORMAT_ACTIONS).is_none() {
        return Err(format!("{} cannot be called here", call.name));
    }
    let args: FinalAnswerArgs =
        serde_json::from_value(call.arguments.clone()).map_err(|e| e.to_string())?;
    let text = args.final_answer.trim();
    if text.is_empty() {
        return Err("final_answer is empty".to_string());
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteDatabase;
    use crate::llm::MockLlmClient;
    use crate::tools::{sql_tool_registry, NO_ROWS, SCHEMA_TOOL};

    fn runner(replies: &[&str]) -> (StepRunner, Arc<MockLlmClient>) {
        let db = SqliteDatabase::open_in_memory().unwrap();
        db.execute_batch(
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, amount REAL);
             INSERT INTO orders (amount) VALUES (250.0), (350.0), (500.0);",
        )
        .unwrap();
        let mock = Arc::new(MockLlmClient::scripted(replies.iter().copied()));
        let executor = ToolExecutor::new(sql_tool_registry(Arc::new(db), 4000), 5);
        (StepRunner::new(mock.clone(), executor, "SQLite", 2), mock)
    }

    fn append_all(log: &mut MessageLog, entries: Vec<LogEntry>) {
        for e in entries {
            log.append(e).unwrap();
        }
    }

    #[tokio::test]
    async fn test_list_tables_pairs_call_and_result() {
        let (runner, _) = runner(&[]);
        let entries = runner.run(Step::ListTables, &MessageLog::new("q")).await.unwrap();
        assert_eq!(entries.len(), 2);
        let call_id = entries[0].tool_calls()[0].call_id.clone();
        assert!(matches!(&entries[1],
            LogEntry::ToolResult { call_id: id, content, is_error: false } if *id == call_id && content == "orders"));
    }

    #[tokio::test]
    async fn test_get_schema_rejects_other_tools() {
        let (runner, _) = runner(&[r#"{"tool": "sql_db_query", "args": {"query": "SELECT 1"}}"#]);
        let err = runner.run(Step::GetSchema, &MessageLog::new("q")).await.unwrap_err();
        assert!(matches!(err, AgentError::SchemaUnavailable(_)));
    }

    #[tokio::test]
    async fn test_get_schema_unknown_table_is_fatal() {
        let (runner, _) = runner(&[r#"{"tool": "sql_db_schema", "args": {"table_names": "invoices"}}"#]);
        let err = runner.run(Step::GetSchema, &MessageLog::new("q")).await.unwrap_err();
        assert!(matches!(err, AgentError::SchemaUnavailable(ref m) if m.contains("invoices")));
    }

    #[tokio::test]
    async fn test_get_schema_binds_only_schema_tool() {
        let (runner, mock) =
            runner(&[r#"{"tool": "sql_db_schema", "args": {"table_names": "orders"}}"#]);
        let entries = runner.run(Step::GetSchema, &MessageLog::new("q")).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[1].content().contains("CREATE TABLE orders"));
        let system = &mock.calls()[0][0].content;
        assert!(system.contains(SCHEMA_TOOL));
        assert!(!system.contains("- sql_db_query:"));
    }

    #[tokio::test]
    async fn test_generate_synthesizes_error_for_unbound_call() {
        let (runner, _) = runner(&[r#"{"tool": "drop_table", "args": {"name": "orders"}}"#]);
        let entries = runner.run(Step::GenerateQuery, &MessageLog::new("q")).await.unwrap();
        assert_eq!(entries.len(), 2);
        match &entries[1] {
            LogEntry::ToolResult { call_id, content, is_error } => {
                assert_eq!(call_id, &entries[0].tool_calls()[0].call_id);
                assert!(*is_error);
                assert!(content.starts_with("Error: drop_table is not a valid tool"));
            }
            other => panic!("expected tool result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_execute_query_failure_goes_through_fallback() {
        let (runner, _) = runner(&[]);
        let mut log = MessageLog::new("q");
        let call = ToolCall::new(QUERY_TOOL, json!({"query": "SELEC COUNT(*) FROM orders"}));
        append_all(&mut log, vec![LogEntry::action("", vec![call])]);
        let entries = runner.run(Step::ExecuteQuery, &log).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].has_error_marker());
        assert!(entries[0].content().ends_with("please fix your mistakes."));
    }

    #[tokio::test]
    async fn test_execute_query_zero_rows_is_not_error() {
        let (runner, _) = runner(&[]);
        let mut log = MessageLog::new("q");
        let call = ToolCall::new(QUERY_TOOL, json!({"query": "SELECT * FROM orders WHERE amount > 1000"}));
        append_all(&mut log, vec![LogEntry::action("", vec![call])]);
        let entries = runner.run(Step::ExecuteQuery, &log).await.unwrap();
        assert!(matches!(&entries[0], LogEntry::ToolResult { content, is_error: false, .. } if content == NO_ROWS));
    }

    #[tokio::test]
    async fn test_execute_query_requires_pending_call() {
        let (runner, _) = runner(&[]);
        let err = runner.run(Step::ExecuteQuery, &MessageLog::new("q")).await.unwrap_err();
        assert!(matches!(err, AgentError::MalformedLog(_)));
    }

    #[tokio::test]
    async fn test_format_answer_retries_then_accepts() {
        let (runner, _) = runner(&[
            "There are 2 orders.",
            r#"{"tool": "submit_final_answer", "args": {"final_answer": "There are 2 orders above 300."}}"#,
        ]);
        let entries = runner.run(Step::FormatAnswer, &MessageLog::new("q")).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(matches!(&entries[0], LogEntry::AssistantAction { tool_calls, .. } if tool_calls.is_empty()));
        assert_eq!(
            entries[1],
            LogEntry::FinalAnswer { text: "There are 2 orders above 300.".into() }
        );
    }

    #[tokio::test]
    async fn test_format_answer_exhausted() {
        let (runner, _) = runner(&[
            r#"{"tool": "submit_final_answer", "args": {"final_answer": "  "}}"#,
            r#"{"tool": "submit_final_answer", "args": {}}"#,
        ]);
        let err = runner.run(Step::FormatAnswer, &MessageLog::new("q")).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidFinalAnswer(_)));
    }
}
