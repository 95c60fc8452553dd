//! sqlbee - 自然语言转 SQL 智能体
//!
//! 一个问题对应一次运行：有向图工作流依次列出表、取表结构、生成查询、复查、执行，
//! 最后由模型给出自然语言答案。执行失败与幻觉调用会被写回日志并送回生成步骤重试。
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、Fallback Handler、运行入口 SqlAgent
//! - **db**: 数据库协作者接口与 SQLite 实现
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: 消息日志与 LLM 消息
//! - **observability**: tracing 初始化
//! - **reasoning**: Reasoning Invoker、Query Corrector、prompt
//! - **tools**: 工具 trait、注册表、执行器与三个 SQL 工具
//! - **workflow**: 步骤、图、Router、引擎与过程事件

pub mod config;
pub mod core;
pub mod db;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod reasoning;
pub mod tools;
pub mod workflow;

pub use crate::core::{AgentError, SqlAgent};
pub use crate::memory::{LogEntry, MessageLog};
pub use crate::workflow::WorkflowEvent;
