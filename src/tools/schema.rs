//! 工具参数与调用格式的 JSON Schema（schemars 自动生成）
//!
//! 参数 schema 渲染进 system prompt，调用格式 schema 告诉模型如何输出 tool call。

use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::Value;

/// 工具调用请求格式：与 parse_llm_output 解析的 `{"tool": "...", "args": {...}}` 一致（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallFormat {
    /// 动作名，必须是本步骤列出的可用动作之一
    pub tool: String,
    /// 动作参数，结构见各动作的 parameters
    pub args: serde_json::Map<String, Value>,
}

/// sql_db_schema 参数
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SchemaArgs {
    /// 逗号分隔的表名，例如 "orders, customers"
    pub table_names: String,
}

/// sql_db_query 参数
#[derive(Debug, Deserialize, JsonSchema)]
pub struct QueryArgs {
    /// 一条完整、语法正确的 SQL 语句
    pub query: String,
}

/// submit_final_answer 参数
#[derive(Debug, Deserialize, JsonSchema)]
pub struct FinalAnswerArgs {
    /// 面向用户的最终回答
    pub final_answer: String,
}

/// 生成类型 T 的 JSON Schema
pub fn args_schema<T: JsonSchema>() -> Value {
    serde_json::to_value(schema_for!(T)).unwrap_or_else(|_| {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    })
}

/// 返回工具调用的 JSON Schema 字符串，可拼入 system prompt
pub fn tool_call_schema_json() -> String {
    let schema = schema_for!(ToolCallFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_args_schema_requires_query() {
        let schema = args_schema::<QueryArgs>();
        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "query"));
    }

    #[test]
    fn test_tool_call_schema_mentions_fields() {
        let s = tool_call_schema_json();
        assert!(s.contains("\"tool\""));
        assert!(s.contains("\"args\""));
    }
}
