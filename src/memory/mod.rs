//! 记忆层：单次运行的只追加消息日志，以及发往 LLM 的请求消息

pub mod conversation;
pub mod log;

pub use conversation::{Message, Role};
pub use log::{LogEntry, LogError, MessageLog, ToolCall, ERROR_PREFIX};
