//! 消息日志：一次运行内只追加的有序条目序列
//!
//! 日志是各步骤之间唯一共享的状态。append 时校验不变式：
//! - UserQuestion 只能作为首条，由 MessageLog::new 创建
//! - ToolResult 的 call_id 必须对应此前某个 AssistantAction 发出的、尚未被回应的调用
//! - call_id 在整个运行内唯一
//! - FinalAnswer 至多一条，且之后不再接受任何条目

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// 错误标记前缀：Router 据此把流程送回 GenerateQuery
pub const ERROR_PREFIX: &str = "Error: ";

/// 推理服务发出的一次工具调用请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
    pub call_id: String,
}

impl ToolCall {
    /// 创建调用并生成运行内唯一的 call_id
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
            call_id: format!("call_{}", uuid::Uuid::new_v4().simple()),
        }
    }

    /// 读取字符串参数
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }
}

/// 日志条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogEntry {
    /// 用户原始问题
    UserQuestion { text: String },
    /// 推理服务输出；tool_calls 为空表示普通文本
    AssistantAction {
        content: String,
        tool_calls: Vec<ToolCall>,
    },
    /// 单次工具调用的结果，通过 call_id 关联
    ToolResult {
        call_id: String,
        content: String,
        is_error: bool,
    },
    /// 终止输出
    FinalAnswer { text: String },
}

impl LogEntry {
    pub fn action(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        LogEntry::AssistantAction {
            content: content.into(),
            tool_calls,
        }
    }

    pub fn tool_ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        LogEntry::ToolResult {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn tool_error(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        LogEntry::ToolResult {
            call_id: call_id.into(),
            content: content.into(),
            is_error: true,
        }
    }

    /// 条目的文本内容
    pub fn content(&self) -> &str {
        match self {
            LogEntry::UserQuestion { text } | LogEntry::FinalAnswer { text } => text,
            LogEntry::AssistantAction { content, .. } | LogEntry::ToolResult { content, .. } => {
                content
            }
        }
    }

    /// 仅 AssistantAction 有调用，其余为空
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            LogEntry::AssistantAction { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    /// 内容是否以错误标记开头
    pub fn has_error_marker(&self) -> bool {
        self.content().starts_with(ERROR_PREFIX)
    }

    /// 用于日志与事件的条目类型名
    pub fn kind(&self) -> &'static str {
        match self {
            LogEntry::UserQuestion { .. } => "user_question",
            LogEntry::AssistantAction { .. } => "assistant_action",
            LogEntry::ToolResult { .. } => "tool_result",
            LogEntry::FinalAnswer { .. } => "final_answer",
        }
    }
}

/// 违反日志不变式
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogError {
    #[error("user question may only be the first entry")]
    QuestionNotFirst,
    #[error("no entry may follow the final answer")]
    AfterFinalAnswer,
    #[error("tool result for unknown call_id {0}")]
    UnknownCallId(String),
    #[error("call_id {0} already has a result")]
    CallAlreadyResolved(String),
    #[error("duplicate call_id {0}")]
    DuplicateCallId(String),
    #[error("entry cannot be routed: {0}")]
    Unroutable(&'static str),
    #[error("last entry has no {0} call to execute")]
    NoPendingCall(&'static str),
    #[error("run ended without a final answer")]
    MissingFinalAnswer,
}

/// 只追加日志：一次运行一个实例
#[derive(Debug, Clone)]
pub struct MessageLog {
    entries: Vec<LogEntry>,
    /// call_id -> 是否已有结果
    calls: HashMap<String, bool>,
    /// 运行开始时间（毫秒时间戳）
    started_at: i64,
}

impl MessageLog {
    /// 以用户问题开启一次运行
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            entries: vec![LogEntry::UserQuestion {
                text: question.into(),
            }],
            calls: HashMap::new(),
            started_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// 追加一条条目；违反不变式时拒绝且日志不变
    pub fn append(&mut self, entry: LogEntry) -> Result<(), LogError> {
        if self.is_finished() {
            return Err(LogError::AfterFinalAnswer);
        }
        match &entry {
            LogEntry::UserQuestion { .. } => return Err(LogError::QuestionNotFirst),
            LogEntry::AssistantAction { tool_calls, .. } => {
                for (i, call) in tool_calls.iter().enumerate() {
                    let repeated = tool_calls[..i].iter().any(|c| c.call_id == call.call_id);
                    if repeated || self.calls.contains_key(&call.call_id) {
                        return Err(LogError::DuplicateCallId(call.call_id.clone()));
                    }
                }
                for call in tool_calls {
                    self.calls.insert(call.call_id.clone(), false);
                }
            }
            LogEntry::ToolResult { call_id, .. } => match self.calls.get_mut(call_id) {
                None => return Err(LogError::UnknownCallId(call_id.clone())),
                Some(true) => return Err(LogError::CallAlreadyResolved(call_id.clone())),
                Some(resolved) => *resolved = true,
            },
            LogEntry::FinalAnswer { .. } => {}
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 自运行开始经过的毫秒数
    pub fn elapsed_ms(&self) -> u64 {
        (chrono::Utc::now().timestamp_millis() - self.started_at).max(0) as u64
    }

    /// 首条的用户问题
    pub fn question(&self) -> &str {
        match self.entries.first() {
            Some(LogEntry::UserQuestion { text }) => text,
            _ => "",
        }
    }

    pub fn final_answer(&self) -> Option<&str> {
        match self.entries.last() {
            Some(LogEntry::FinalAnswer { text }) => Some(text),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.final_answer().is_some()
    }
}
