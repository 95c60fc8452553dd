//! 核心编排层：错误分类、失败恢复、运行入口

pub mod error;
pub mod orchestrator;
pub mod recovery;

pub use error::{AgentError, ErrorKind};
pub use orchestrator::{create_llm_from_config, AgentSettings, SqlAgent};
pub use recovery::FallbackHandler;
