//! 可绑定动作：每一步向推理服务开放的动作集合是这个封闭枚举的子集
//!
//! 模型输出的动作名在运行时按名查找；找不到或不在本步骤绑定集合内的一律视为
//! HallucinatedCapability，不会被静默忽略。

use serde_json::Value;

use crate::memory::ToolCall;
use crate::tools::schema::{args_schema, FinalAnswerArgs, QueryArgs, SchemaArgs};

pub const LIST_TABLES_TOOL: &str = "sql_db_list_tables";
pub const SCHEMA_TOOL: &str = "sql_db_schema";
pub const QUERY_TOOL: &str = "sql_db_query";
pub const FINAL_ANSWER_ACTION: &str = "submit_final_answer";

/// 推理服务可请求的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundAction {
    ListTables,
    FetchSchema,
    ExecuteQuery,
    FinalAnswer,
}

impl BoundAction {
    pub fn name(self) -> &'static str {
        match self {
            BoundAction::ListTables => LIST_TABLES_TOOL,
            BoundAction::FetchSchema => SCHEMA_TOOL,
            BoundAction::ExecuteQuery => QUERY_TOOL,
            BoundAction::FinalAnswer => FINAL_ANSWER_ACTION,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            LIST_TABLES_TOOL => Some(BoundAction::ListTables),
            SCHEMA_TOOL => Some(BoundAction::FetchSchema),
            QUERY_TOOL => Some(BoundAction::ExecuteQuery),
            FINAL_ANSWER_ACTION => Some(BoundAction::FinalAnswer),
            _ => None,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            BoundAction::ListTables => "List the tables available in the database. Takes no arguments.",
            BoundAction::FetchSchema => {
                "Get the schema and sample rows for the given comma-separated list of tables. \
                 Be sure the tables actually exist by checking the table list first."
            }
            BoundAction::ExecuteQuery => {
                "Execute a SQL query against the database and get back the result. \
                 If the query is not correct, an error message will be returned; \
                 rewrite the query and try again."
            }
            BoundAction::FinalAnswer => "Submit the final answer to the user.",
        }
    }

    pub fn args_schema(self) -> Value {
        match self {
            BoundAction::ListTables => serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
            BoundAction::FetchSchema => args_schema::<SchemaArgs>(),
            BoundAction::ExecuteQuery => args_schema::<QueryArgs>(),
            BoundAction::FinalAnswer => args_schema::<FinalAnswerArgs>(),
        }
    }

    /// 逗号分隔的动作名，用于错误提示
    pub fn names(bound: &[BoundAction]) -> String {
        bound.iter().map(|a| a.name()).collect::<Vec<_>>().join(", ")
    }
}

/// 按名解析一次调用，并检查它是否在本步骤绑定的集合内
pub fn resolve(call: &ToolCall, bound: &[BoundAction]) -> Option<BoundAction> {
    BoundAction::from_name(&call.name).filter(|a| bound.contains(a))
}
