//! 数据库协作者：列表、取表结构、执行 SQL
//!
//! 核心不解析结果行的结构，只把它们序列化成文本交回推理服务。
//! 连接的建立与生命周期由实现方负责，工作流只持有 `Arc<dyn Database>`。

pub mod sqlite;

use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

pub use sqlite::SqliteDatabase;

/// 一行查询结果：列名 -> 值
pub type Row = Map<String, Value>;

/// 数据库访问错误
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Unknown table(s): {0}")]
    UnknownTables(String),

    #[error("{0}")]
    Execution(String),

    #[error("Database unavailable: {0}")]
    Connection(String),
}

/// 数据库服务接口（同步调用；工作流一次只发起一个请求）
pub trait Database: Send + Sync {
    /// 方言名，写进 prompt（如 SQLite）
    fn dialect(&self) -> &str {
        "SQL"
    }

    /// 可查询的表名，按名称排序
    fn list_tables(&self) -> Result<Vec<String>, DbError>;

    /// 指定表的结构描述；任一表不存在时返回 UnknownTables
    fn get_schema(&self, table_names: &[String]) -> Result<String, DbError>;

    /// 执行一条语句并返回结果行；语法或语义错误返回 Execution
    fn execute(&self, sql: &str) -> Result<Vec<Row>, DbError>;

    /// 中断正在执行的语句（不支持中断的实现可忽略）
    fn interrupt(&self) {}
}

/// 在阻塞线程池中执行数据库调用
///
/// 返回的 future 在完成前被丢弃（如工具超时）时中断正在执行的语句，释放连接。
pub async fn run_blocking<T, F>(db: &Arc<dyn Database>, f: F) -> Result<T, DbError>
where
    T: Send + 'static,
    F: FnOnce(&dyn Database) -> Result<T, DbError> + Send + 'static,
{
    let worker = Arc::clone(db);
    let mut guard = InterruptOnDrop {
        db: Some(Arc::clone(db)),
    };
    let result = tokio::task::spawn_blocking(move || f(worker.as_ref())).await;
    guard.db = None;
    result.map_err(|e| DbError::Execution(format!("database task failed: {}", e)))?
}

struct InterruptOnDrop {
    db: Option<Arc<dyn Database>>,
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        if let Some(db) = self.db.take() {
            tracing::warn!("database call abandoned, interrupting statement");
            db.interrupt();
        }
    }
}
