//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SQLBEE__*` 覆盖（双下划线表示嵌套，如 `SQLBEE__LLM__PROVIDER=openai`）。
//! 每个字段都有默认值，找不到配置文件时也能得到可用的配置。

use std::path::PathBuf;

use serde::Deserialize;

use crate::db::sqlite::DEFAULT_SAMPLE_ROWS;
use crate::tools::execute_query::DEFAULT_MAX_RESULT_CHARS;
use crate::workflow::DEFAULT_MAX_RETRIES;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub database: DatabaseSection,
    pub tools: ToolsSection,
    pub workflow: WorkflowSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：mock / openai / deepseek；没有对应 API Key 时退回 mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub deepseek: LlmDeepSeekSection,
    pub openai: LlmOpenAiSection,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: "deepseek-chat".to_string(),
            base_url: None,
            deepseek: LlmDeepSeekSection::default(),
            openai: LlmOpenAiSection::default(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LlmDeepSeekSection {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LlmOpenAiSection {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次请求超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [database] 段：SQLite 文件、样例行数、结果截断
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub path: Option<PathBuf>,
    /// 表结构后附带的样例行数
    pub sample_rows: usize,
    /// 查询结果文本的最大字符数
    pub max_result_chars: usize,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: None,
            sample_rows: DEFAULT_SAMPLE_ROWS,
            max_result_chars: DEFAULT_MAX_RESULT_CHARS,
        }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
        }
    }
}

/// [workflow] 段：重试上限与最终答案尝试次数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkflowSection {
    pub max_retries: usize,
    pub format_attempts: usize,
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            format_attempts: 2,
        }
    }
}

/// 从 config 目录加载配置，环境变量 SQLBEE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path，则追加该文件（可覆盖前面的键；文件必须存在）
/// 3. 最后叠加环境变量 SQLBEE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SQLBEE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
