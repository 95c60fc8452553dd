//! 工作流引擎
//!
//! 从 Start 出发逐步执行：运行步骤 → 追加条目 → 沿出边选出下一步，直到 End。
//! 一次只运行一个步骤；步骤之间检查取消。
//!
//! 重试计数放在引擎里而不是日志里：条件边每选中一次 GenerateQuery 就加一，
//! 超过 max_retries 时以 RetryExhausted 结束运行。

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, ErrorKind};
use crate::memory::{LogEntry, LogError, MessageLog};
use crate::workflow::events::WorkflowEvent;
use crate::workflow::graph::WorkflowGraph;
use crate::workflow::steps::StepRunner;
use crate::workflow::types::Step;

/// 默认重试上限
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// 工作流引擎
pub struct WorkflowEngine {
    graph: WorkflowGraph,
    steps: StepRunner,
    max_retries: usize,
}

impl WorkflowEngine {
    pub fn new(graph: WorkflowGraph, steps: StepRunner, max_retries: usize) -> Self {
        Self {
            graph,
            steps,
            max_retries,
        }
    }

    /// 执行一次运行；events 不为空时逐条发送过程事件
    pub async fn run(
        &self,
        question: &str,
        cancel: &CancellationToken,
        events: Option<&UnboundedSender<WorkflowEvent>>,
    ) -> Result<MessageLog, AgentError> {
        let emit = |event: WorkflowEvent| {
            if let Some(tx) = events {
                let _ = tx.send(event);
            }
        };

        let result = self.drive(question, cancel, &emit).await;

        let (prompt_tokens, completion_tokens, total_tokens) = self.steps.token_usage();
        emit(WorkflowEvent::TokenUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        });
        match &result {
            Ok(log) => {
                let answer = log.final_answer().unwrap_or_default().to_string();
                let elapsed_ms = log.elapsed_ms();
                tracing::info!(entries = log.len(), elapsed_ms, "run finished");
                emit(WorkflowEvent::Done { answer, elapsed_ms });
            }
            Err(e) => {
                tracing::error!(error = %e, "run failed");
                emit(WorkflowEvent::Error {
                    kind: e.kind(),
                    message: e.to_string(),
                });
            }
        }
        result
    }

    async fn drive(
        &self,
        question: &str,
        cancel: &CancellationToken,
        emit: &(dyn Fn(WorkflowEvent) + Send + Sync),
    ) -> Result<MessageLog, AgentError> {
        let mut log = MessageLog::new(question);
        tracing::info!(question = %log.question(), "run started");
        if let Some(first) = log.last() {
            emit(WorkflowEvent::Entry {
                entry: first.clone(),
            });
        }

        let mut retries = 0usize;
        let mut current = self.graph.entry();
        loop {
            if current == Step::End {
                return if log.is_finished() {
                    Ok(log)
                } else {
                    Err(LogError::MissingFinalAnswer.into())
                };
            }
            if cancel.is_cancelled() {
                tracing::info!(step = %current, "run cancelled");
                return Err(AgentError::Cancelled);
            }

            tracing::info!(step = %current, "step started");
            emit(WorkflowEvent::StepStarted { step: current });
            let entries = self.steps.run(current, &log).await?;
            for entry in entries {
                log.append(entry.clone())?;
                emit(WorkflowEvent::Entry { entry });
            }

            let next = self.graph.next(current, &log)?;
            if self.graph.is_conditional(current) && next == Step::GenerateQuery {
                retries += 1;
                let kind = recovery_kind(current, &log);
                let detail = log
                    .last()
                    .map(|e| e.content().to_string())
                    .unwrap_or_default();
                tracing::warn!(
                    from = %current,
                    attempt = retries,
                    max_retries = self.max_retries,
                    kind = ?kind,
                    "error result, regenerating query"
                );
                emit(WorkflowEvent::Recovery {
                    kind,
                    attempt: retries,
                    max_retries: self.max_retries,
                    detail,
                });
                if retries > self.max_retries {
                    return Err(AgentError::RetryExhausted { attempts: retries });
                }
            }

            tracing::info!(from = %current, to = %next, "routed");
            emit(WorkflowEvent::Routed {
                from: current,
                to: next,
            });
            current = next;
        }
    }
}

/// 生成步骤留下的错误结果来自未绑定调用；其余（执行失败、无法解析的输出）归为执行错误
fn recovery_kind(from: Step, log: &MessageLog) -> ErrorKind {
    match (from, log.last()) {
        (Step::GenerateQuery, Some(LogEntry::ToolResult { .. })) => ErrorKind::HallucinatedCapability,
        _ => ErrorKind::AdapterExecutionError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::db::SqliteDatabase;
    use crate::llm::MockLlmClient;
    use crate::tools::{sql_tool_registry, ToolExecutor};

    fn engine(replies: &[&str], max_retries: usize) -> WorkflowEngine {
        let db = SqliteDatabase::open_in_memory().unwrap();
        db.execute_batch("CREATE TABLE orders (id INTEGER PRIMARY KEY, amount REAL);")
            .unwrap();
        let mock = Arc::new(MockLlmClient::scripted(replies.iter().copied()));
        let executor = ToolExecutor::new(sql_tool_registry(Arc::new(db), 4000), 5);
        WorkflowEngine::new(
            WorkflowGraph::sql_pipeline().unwrap(),
            StepRunner::new(mock, executor, "SQLite", 2),
            max_retries,
        )
    }

    const SCHEMA_CALL: &str = r#"{"tool": "sql_db_schema", "args": {"table_names": "orders"}}"#;

    #[tokio::test]
    async fn test_cancelled_before_first_step() {
        let engine = engine(&[], DEFAULT_MAX_RETRIES);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = engine.run("q", &cancel, None).await.unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let bad = r#"{"tool": "sql_db_query", "args": {"query": "SELEC 1"}}"#;
        let engine = engine(&[SCHEMA_CALL, bad, bad, bad], 2);
        let err = engine
            .run("q", &CancellationToken::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::RetryExhausted { attempts: 3 }));
    }

    #[tokio::test]
    async fn test_emits_done_event() {
        let engine = engine(
            &[
                SCHEMA_CALL,
                r#"{"tool": "submit_final_answer", "args": {"final_answer": "draft"}}"#,
                r#"{"tool": "submit_final_answer", "args": {"final_answer": "There are no orders."}}"#,
            ],
            DEFAULT_MAX_RETRIES,
        );
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let log = engine
            .run("how many orders?", &CancellationToken::new(), Some(&tx))
            .await
            .unwrap();
        assert_eq!(log.final_answer(), Some("There are no orders."));
        drop(tx);
        let mut last = None;
        while let Some(ev) = rx.recv().await {
            last = Some(ev);
        }
        assert!(matches!(last, Some(WorkflowEvent::Done { ref answer, .. }) if answer == "There are no orders."));
    }
}
