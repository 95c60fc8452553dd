//! sql_db_schema：取指定表的结构与样例行

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::db::{run_blocking, Database};
use crate::tools::{BoundAction, Tool};

pub struct FetchSchemaTool {
    db: Arc<dyn Database>,
}

impl FetchSchemaTool {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

/// table_names 既接受 "a, b" 也接受 ["a", "b"]
fn table_names(args: &Value) -> Result<Vec<String>, String> {
    let names: Vec<String> = match args.get("table_names") {
        Some(Value::String(s)) => s.split(',').map(|n| n.trim().to_string()).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|n| n.trim().to_string())
            .collect(),
        _ => return Err("missing required argument 'table_names'".to_string()),
    };
    let names: Vec<String> = names.into_iter().filter(|n| !n.is_empty()).collect();
    if names.is_empty() {
        return Err("argument 'table_names' is empty".to_string());
    }
    Ok(names)
}

#[async_trait]
impl Tool for FetchSchemaTool {
    fn name(&self) -> &str {
        BoundAction::FetchSchema.name()
    }

    fn description(&self) -> &str {
        BoundAction::FetchSchema.description()
    }

    fn parameters_schema(&self) -> Value {
        BoundAction::FetchSchema.args_schema()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let names = table_names(&args)?;
        run_blocking(&self.db, move |db| db.get_schema(&names))
            .await
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteDatabase;
    use serde_json::json;

    fn tool() -> FetchSchemaTool {
        let db = SqliteDatabase::open_in_memory().unwrap();
        db.execute_batch("CREATE TABLE orders (id INTEGER, amount REAL);")
            .unwrap();
        FetchSchemaTool::new(Arc::new(db))
    }

    #[test]
    fn test_table_names_forms() {
        assert_eq!(
            table_names(&json!({"table_names": "orders, users"})).unwrap(),
            vec!["orders", "users"]
        );
        assert_eq!(
            table_names(&json!({"table_names": ["orders"]})).unwrap(),
            vec!["orders"]
        );
        assert!(table_names(&json!({})).is_err());
        assert!(table_names(&json!({"table_names": " , "})).is_err());
    }

    #[tokio::test]
    async fn test_schema_for_known_table() {
        let out = tool()
            .execute(json!({"table_names": "orders"}))
            .await
            .unwrap();
        assert!(out.contains("CREATE TABLE orders"));
    }

    #[tokio::test]
    async fn test_unknown_table_fails() {
        let err = tool()
            .execute(json!({"table_names": "invoices"}))
            .await
            .unwrap_err();
        assert!(err.contains("invoices"));
    }
}
