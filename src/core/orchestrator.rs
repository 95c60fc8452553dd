//! 运行入口：组装 LLM、数据库工具、工作流引擎，对外提供 run / answer / stream
//!
//! 每次运行拥有独立的日志；SqlAgent 本身不保存任何跨运行的对话状态。

use std::sync::Arc;

use futures_util::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::AgentError;
use crate::db::{Database, SqliteDatabase};
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient};
use crate::memory::{LogError, MessageLog};
use crate::tools::{sql_tool_registry, ToolExecutor};
use crate::workflow::{StepRunner, WorkflowEngine, WorkflowEvent, WorkflowGraph};

/// 根据配置与环境变量选择 LLM 后端（DeepSeek / OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let has_deepseek_key = std::env::var("DEEPSEEK_API_KEY").is_ok();
    let openai_key = std::env::var("OPENAI_API_KEY").ok();
    let timeout = cfg.llm.timeouts.request;

    match provider.as_str() {
        "deepseek" if has_deepseek_key || openai_key.is_some() => {
            let model = cfg
                .llm
                .deepseek
                .model
                .clone()
                .unwrap_or_else(|| cfg.llm.model.clone());
            tracing::info!("Using DeepSeek LLM ({})", model);
            Arc::new(OpenAiClient::deepseek(Some(&model)).with_request_timeout(timeout))
        }
        "openai" if openai_key.is_some() => {
            let model = cfg
                .llm
                .openai
                .model
                .clone()
                .unwrap_or_else(|| "gpt-4o-mini".to_string());
            tracing::info!("Using OpenAI LLM ({})", model);
            Arc::new(
                OpenAiClient::new(cfg.llm.base_url.as_deref(), &model, openai_key.as_deref())
                    .with_request_timeout(timeout),
            )
        }
        "mock" => {
            tracing::info!("Using Mock LLM");
            Arc::new(MockLlmClient::new())
        }
        other => {
            tracing::warn!("No API key set for provider '{}', using Mock LLM", other);
            Arc::new(MockLlmClient::new())
        }
    }
}

/// 运行参数（来自 [tools] / [database] / [workflow] 段）
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub max_retries: usize,
    pub format_attempts: usize,
    pub tool_timeout_secs: u64,
    pub max_result_chars: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for AgentSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            max_retries: cfg.workflow.max_retries,
            format_attempts: cfg.workflow.format_attempts,
            tool_timeout_secs: cfg.tools.tool_timeout_secs,
            max_result_chars: cfg.database.max_result_chars,
        }
    }
}

/// NL→SQL Agent
pub struct SqlAgent {
    engine: Arc<WorkflowEngine>,
    shutdown: CancellationToken,
}

impl SqlAgent {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        db: Arc<dyn Database>,
        settings: AgentSettings,
    ) -> Result<Self, AgentError> {
        let dialect = db.dialect().to_string();
        let executor = ToolExecutor::new(
            sql_tool_registry(db, settings.max_result_chars),
            settings.tool_timeout_secs,
        );
        tracing::debug!(tools = ?executor.tool_names(), "tools registered");
        let steps = StepRunner::new(llm, executor, &dialect, settings.format_attempts);
        let engine = WorkflowEngine::new(WorkflowGraph::sql_pipeline()?, steps, settings.max_retries);
        tracing::info!(dialect = %dialect, max_retries = settings.max_retries, "sql agent ready");
        Ok(Self {
            engine: Arc::new(engine),
            shutdown: CancellationToken::new(),
        })
    }

    /// 按配置打开 SQLite 数据库并选择 LLM 后端
    pub fn from_config(cfg: &AppConfig) -> Result<Self, AgentError> {
        let path = cfg.database.path.as_ref().ok_or_else(|| {
            AgentError::ConfigError("database.path is not set".to_string())
        })?;
        let db = SqliteDatabase::open(path)?.with_sample_rows(cfg.database.sample_rows);
        Self::new(
            create_llm_from_config(cfg),
            Arc::new(db),
            AgentSettings::from(cfg),
        )
    }

    /// 取消所有进行中与之后的运行
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// 回答一个问题，返回完整日志
    pub async fn run(&self, question: &str) -> Result<MessageLog, AgentError> {
        let cancel = self.shutdown.child_token();
        self.engine.run(question, &cancel, None).await
    }

    /// 同 run，cancel 被触发时在下一个步骤边界以 Cancelled 结束
    pub async fn run_with_cancel(
        &self,
        question: &str,
        cancel: CancellationToken,
    ) -> Result<MessageLog, AgentError> {
        let cancel = link(&self.shutdown, cancel);
        let _guard = cancel.clone().drop_guard();
        self.engine.run(question, &cancel, None).await
    }

    /// 只返回最终答案文本
    pub async fn answer(&self, question: &str) -> Result<String, AgentError> {
        let log = self.run(question).await?;
        log.final_answer()
            .map(str::to_string)
            .ok_or_else(|| LogError::MissingFinalAnswer.into())
    }

    /// 后台运行并逐个产出过程事件；最后一个事件是 Done 或 Error
    pub fn stream(
        &self,
        question: impl Into<String>,
    ) -> impl Stream<Item = WorkflowEvent> + Send + 'static {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Arc::clone(&self.engine);
        let cancel = self.shutdown.child_token();
        let question = question.into();
        tokio::spawn(async move {
            // 结果已通过 Done / Error 事件送出
            let _ = engine.run(&question, &cancel, Some(&tx)).await;
        });
        futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
    }
}

/// 任一 token 取消时，返回的 token 也被取消；返回的 token 被取消后监听任务退出
fn link(shutdown: &CancellationToken, cancel: CancellationToken) -> CancellationToken {
    let linked = shutdown.child_token();
    let child = linked.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => child.cancel(),
            _ = child.cancelled() => {}
        }
    });
    linked
}
