//! sql_db_list_tables：列出数据库中的表
//!
//! 从不失败：没有表或数据库出错时返回描述性文本，保持主路径简单。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::db::{run_blocking, Database};
use crate::tools::{BoundAction, Tool};

pub const NO_TABLES: &str = "No tables found in the database.";

pub struct ListTablesTool {
    db: Arc<dyn Database>,
}

impl ListTablesTool {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for ListTablesTool {
    fn name(&self) -> &str {
        BoundAction::ListTables.name()
    }

    fn description(&self) -> &str {
        BoundAction::ListTables.description()
    }

    async fn execute(&self, _args: Value) -> Result<String, String> {
        match run_blocking(&self.db, |db| db.list_tables()).await {
            Ok(tables) if tables.is_empty() => Ok(NO_TABLES.to_string()),
            Ok(tables) => Ok(tables.join(", ")),
            Err(e) => {
                tracing::warn!("list_tables failed: {}", e);
                Ok(format!("{} ({})", NO_TABLES, e))
            }
        }
    }
}
