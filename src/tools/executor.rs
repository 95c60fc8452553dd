//! 工具执行器
//!
//! 按日志中的 ToolCall 执行工具：在超时内调用 registry.execute，失败或超时转为
//! AgentError（ToolExecutionFailed / ToolTimeout），交由调用方决定是否经 Fallback Handler 写回日志。
//! 每次调用输出一行 JSON 审计日志，带上 call_id 便于与日志条目对照。

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::AgentError;
use crate::memory::ToolCall;
use crate::tools::ToolRegistry;

/// 工具执行器：对每次调用施加超时，并将结果映射为 AgentError
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行一次调用，成功时返回结果文本
    pub async fn execute(&self, call: &ToolCall) -> Result<String, AgentError> {
        let start = Instant::now();
        let result = timeout(
            self.timeout,
            self.registry.execute(&call.name, call.arguments.clone()),
        )
        .await;

        let outcome = match &result {
            Ok(Ok(_)) => "ok",
            Ok(Err(_)) => "error",
            Err(_) => "timeout",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": call.name,
            "call_id": call.call_id,
            "ok": outcome == "ok",
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&call.arguments),
        });
        tracing::info!(audit = %audit, "tool");

        match result {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(e)) => Err(AgentError::ToolExecutionFailed(e)),
            Err(_) => Err(AgentError::ToolTimeout(format!(
                "{} did not finish within {}s",
                call.name,
                self.timeout.as_secs()
            ))),
        }
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use std::sync::Arc;

    use crate::db::SqliteDatabase;
    use crate::tools::{sql_tool_registry, Tool, QUERY_TOOL};

    const SLOW_COUNT: &str = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 300000000) SELECT COUNT(*) FROM c";

    struct Slow;

    #[async_trait]
    impl Tool for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "Sleeps"
        }

        async fn execute(&self, _args: Value) -> Result<String, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        }
    }

    struct Failing;

    #[async_trait]
    impl Tool for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn description(&self) -> &str {
            "Always fails"
        }

        async fn execute(&self, _args: Value) -> Result<String, String> {
            Err("near \"SELEC\": syntax error".to_string())
        }
    }

    #[tokio::test]
    async fn test_timeout_maps_to_tool_timeout() {
        let mut registry = ToolRegistry::new();
        registry.register(Slow);
        let executor = ToolExecutor::new(registry, 1);
        let err = executor
            .execute(&ToolCall::new("slow", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolTimeout(ref t) if t.starts_with("slow")));
    }

    #[tokio::test]
    async fn test_failure_maps_to_execution_failed() {
        let mut registry = ToolRegistry::new();
        registry.register(Failing);
        let executor = ToolExecutor::new(registry, 5);
        let err = executor
            .execute(&ToolCall::new("failing", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolExecutionFailed(ref m) if m.contains("syntax error")));
    }

    #[tokio::test]
    async fn test_slow_query_times_out_and_releases_connection() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        let executor = ToolExecutor::new(sql_tool_registry(Arc::new(db), 4000), 1);
        let started = Instant::now();
        let err = executor
            .execute(&ToolCall::new(QUERY_TOOL, json!({ "query": SLOW_COUNT })))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolTimeout(ref t) if t.starts_with(QUERY_TOOL)));
        assert!(started.elapsed() < Duration::from_secs(10));

        let out = executor
            .execute(&ToolCall::new(QUERY_TOOL, json!({ "query": "SELECT 1 AS one" })))
            .await
            .unwrap();
        assert_eq!(out, r#"[{"one":1}]"#);
    }
}
