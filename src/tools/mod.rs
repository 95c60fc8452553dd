pub mod action;
pub mod execute_query;
pub mod executor;
pub mod fetch_schema;
pub mod list_tables;
pub mod registry;
pub mod schema;

use std::sync::Arc;

use crate::db::Database;

pub use action::{
    resolve, BoundAction, FINAL_ANSWER_ACTION, LIST_TABLES_TOOL, QUERY_TOOL, SCHEMA_TOOL,
};
pub use execute_query::{ExecuteQueryTool, NO_ROWS};
pub use executor::ToolExecutor;
pub use fetch_schema::FetchSchemaTool;
pub use list_tables::{ListTablesTool, NO_TABLES};
pub use registry::{Tool, ToolRegistry};
pub use schema::tool_call_schema_json;

/// 注册三个 SQL 工具适配器
pub fn sql_tool_registry(db: Arc<dyn Database>, max_result_chars: usize) -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register(ListTablesTool::new(Arc::clone(&db)));
    tools.register(FetchSchemaTool::new(Arc::clone(&db)));
    tools.register(ExecuteQueryTool::new(db).with_max_result_chars(max_result_chars));
    tools
}
