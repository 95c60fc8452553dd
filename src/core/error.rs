//! 运行错误类型
//!
//! 可恢复错误（工具失败、超时、幻觉工具）在运行内部被转成日志条目，不会抛给调用方；
//! 其余都是致命错误，终止本次运行。

use thiserror::Error;

use crate::db::DbError;
use crate::memory::LogError;
use crate::workflow::WorkflowError;

/// 一次运行中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Hallucinated tool: {0}")]
    HallucinatedTool(String),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Query correction failed: {0}")]
    CorrectionFailure(String),

    #[error("Retry budget exhausted after {attempts} attempts")]
    RetryExhausted { attempts: usize },

    #[error("Schema unavailable: {0}")]
    SchemaUnavailable(String),

    #[error("Invalid final answer: {0}")]
    InvalidFinalAnswer(String),

    #[error("Malformed log: {0}")]
    MalformedLog(#[from] LogError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Cancelled")]
    Cancelled,
}

impl AgentError {
    /// 是否可转换为日志条目并驱动下一轮生成
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AgentError::ToolExecutionFailed(_)
                | AgentError::ToolTimeout(_)
                | AgentError::HallucinatedTool(_)
                | AgentError::JsonParseError(_)
        )
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::HallucinatedTool(_) => ErrorKind::HallucinatedCapability,
            AgentError::ToolExecutionFailed(_)
            | AgentError::ToolTimeout(_)
            | AgentError::JsonParseError(_)
            | AgentError::InvalidFinalAnswer(_) => ErrorKind::AdapterExecutionError,
            AgentError::CorrectionFailure(_) => ErrorKind::CorrectionFailure,
            AgentError::RetryExhausted { .. } => ErrorKind::RetryExhausted,
            _ => ErrorKind::Fatal,
        }
    }
}

/// 错误分类，用于事件与日志
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 模型请求了本步骤未绑定的动作
    HallucinatedCapability,
    /// 已绑定的工具执行失败，或模型输出不符合约定格式
    AdapterExecutionError,
    CorrectionFailure,
    RetryExhausted,
    Fatal,
}
