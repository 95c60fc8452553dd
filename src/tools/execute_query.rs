//! sql_db_query：执行 SQL
//!
//! 空结果返回哨兵文本 NO_ROWS（正常结果，不是错误）；语法/语义错误返回 Err，
//! 这是唯一经由 FallbackHandler 转成日志条目的工具失败。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::db::{run_blocking, Database};
use crate::tools::{BoundAction, Tool};

pub const NO_ROWS: &str = "Query returned no rows.";

/// 结果文本默认最大字符数
pub const DEFAULT_MAX_RESULT_CHARS: usize = 4000;

pub struct ExecuteQueryTool {
    db: Arc<dyn Database>,
    max_result_chars: usize,
}

impl ExecuteQueryTool {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            db,
            max_result_chars: DEFAULT_MAX_RESULT_CHARS,
        }
    }

    pub fn with_max_result_chars(mut self, max_result_chars: usize) -> Self {
        self.max_result_chars = max_result_chars;
        self
    }
}

#[async_trait]
impl Tool for ExecuteQueryTool {
    fn name(&self) -> &str {
        BoundAction::ExecuteQuery.name()
    }

    fn description(&self) -> &str {
        BoundAction::ExecuteQuery.description()
    }

    fn parameters_schema(&self) -> Value {
        BoundAction::ExecuteQuery.args_schema()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let sql = args
            .get("query")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "missing required argument 'query'".to_string())?
            .to_string();

        let rows = run_blocking(&self.db, move |db| db.execute(&sql))
            .await
            .map_err(|e| e.to_string())?;
        if rows.is_empty() {
            return Ok(NO_ROWS.to_string());
        }
        let text = serde_json::to_string(&rows).map_err(|e| e.to_string())?;
        Ok(truncate(text, self.max_result_chars))
    }
}

fn truncate(text: String, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text;
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{}... (truncated)", head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteDatabase;
    use serde_json::json;

    fn tool() -> ExecuteQueryTool {
        let db = SqliteDatabase::open_in_memory().unwrap();
        db.execute_batch(
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, amount REAL);
             INSERT INTO orders (amount) VALUES (250.0), (350.0), (500.0);",
        )
        .unwrap();
        ExecuteQueryTool::new(Arc::new(db))
    }

    #[tokio::test]
    async fn test_rows_rendered_as_json() {
        let out = tool()
            .execute(json!({"query": "SELECT COUNT(*) AS n FROM orders WHERE amount > 300"}))
            .await
            .unwrap();
        assert_eq!(out, r#"[{"n":2}]"#);
    }

    #[tokio::test]
    async fn test_empty_result_is_sentinel() {
        let out = tool()
            .execute(json!({"query": "SELECT * FROM orders WHERE amount > 10000"}))
            .await
            .unwrap();
        assert_eq!(out, NO_ROWS);
    }

    #[tokio::test]
    async fn test_syntax_error_is_err() {
        assert!(tool()
            .execute(json!({"query": "SELEC * FROM orders"}))
            .await
            .is_err());
        assert!(tool().execute(json!({})).await.is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abcdef".into(), 3), "abc... (truncated)");
        assert_eq!(truncate("abc".into(), 3), "abc");
    }
}
