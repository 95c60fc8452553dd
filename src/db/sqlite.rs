//! SQLite 实现（rusqlite，同步）
//!
//! 表结构取自 sqlite_master 中的 CREATE TABLE 语句，并附带若干样例行，
//! 帮助模型理解列的取值形态。

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, InterruptHandle, OptionalExtension};
use serde_json::Value;

use crate::db::{Database, DbError, Row};

/// 默认每张表附带的样例行数
pub const DEFAULT_SAMPLE_ROWS: usize = 3;

pub struct SqliteDatabase {
    conn: Mutex<Connection>,
    interrupt: InterruptHandle,
    sample_rows: usize,
}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        DbError::Execution(e.to_string())
    }
}

impl SqliteDatabase {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| DbError::Connection(format!("{}: {}", path.as_ref().display(), e)))?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory().map_err(|e| DbError::Connection(e.to_string()))?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            interrupt: conn.get_interrupt_handle(),
            conn: Mutex::new(conn),
            sample_rows: DEFAULT_SAMPLE_ROWS,
        }
    }

    /// 设置 get_schema 附带的样例行数（0 表示不附带）
    pub fn with_sample_rows(mut self, sample_rows: usize) -> Self {
        self.sample_rows = sample_rows;
        self
    }

    /// 执行多条语句（建表、灌数据等）
    pub fn execute_batch(&self, sql: &str) -> Result<(), DbError> {
        self.lock()?.execute_batch(sql)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn
            .lock()
            .map_err(|_| DbError::Connection("connection mutex poisoned".to_string()))
    }

    fn sample_block(&self, conn: &Connection, table: &str) -> Result<String, DbError> {
        let sql = format!(
            "SELECT * FROM {} LIMIT {}",
            quote_identifier(table),
            self.sample_rows
        );
        let mut stmt = conn.prepare(&sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query([])?;
        let mut lines = vec![columns.join("\t")];
        let mut count = 0usize;
        while let Some(row) = rows.next()? {
            count += 1;
            let mut cells = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                cells.push(cell_text(&to_json(row.get_ref(i)?)));
            }
            lines.push(cells.join("\t"));
        }
        Ok(format!(
            "/*\n{} rows from {} table:\n{}\n*/",
            count,
            table,
            lines.join("\n")
        ))
    }
}

impl Database for SqliteDatabase {
    fn dialect(&self) -> &str {
        "SQLite"
    }

    fn list_tables(&self) -> Result<Vec<String>, DbError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn get_schema(&self, table_names: &[String]) -> Result<String, DbError> {
        let conn = self.lock()?;
        let mut blocks = Vec::new();
        let mut missing = Vec::new();
        for name in table_names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            let ddl: Option<String> = conn
                .query_row(
                    "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [name],
                    |row| row.get(0),
                )
                .optional()?;
            match ddl {
                Some(ddl) => {
                    let mut block = ddl.trim().to_string();
                    if self.sample_rows > 0 {
                        block.push_str("\n\n");
                        block.push_str(&self.sample_block(&conn, name)?);
                    }
                    blocks.push(block);
                }
                None => missing.push(name.to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(DbError::UnknownTables(missing.join(", ")));
        }
        if blocks.is_empty() {
            return Err(DbError::UnknownTables("(none given)".to_string()));
        }
        Ok(blocks.join("\n\n"))
    }

    fn execute(&self, sql: &str) -> Result<Vec<Row>, DbError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Row::new();
            for (i, column) in columns.iter().enumerate() {
                record.insert(column.clone(), to_json(row.get_ref(i)?));
            }
            out.push(record);
        }
        Ok(out)
    }

    fn interrupt(&self) {
        self.interrupt.interrupt();
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<blob {} bytes>", bytes.len())),
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const SLOW_COUNT: &str = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 300000000) SELECT COUNT(*) FROM c";

    fn orders_db() -> SqliteDatabase {
        let db = SqliteDatabase::open_in_memory().unwrap();
        db.execute_batch(
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, amount REAL);
             INSERT INTO orders (amount) VALUES (250.0), (350.0), (500.0);",
        )
        .unwrap();
        db
    }

    #[test]
    fn test_list_tables() {
        let db = orders_db();
        db.execute_batch("CREATE TABLE customers (id INTEGER, name TEXT);")
            .unwrap();
        assert_eq!(db.list_tables().unwrap(), vec!["customers", "orders"]);
    }

    #[test]
    fn test_schema_includes_ddl_and_samples() {
        let db = orders_db();
        let schema = db.get_schema(&["orders".to_string()]).unwrap();
        assert!(schema.contains("CREATE TABLE orders"));
        assert!(schema.contains("3 rows from orders table"));
        assert!(schema.contains("350"));
    }

    #[test]
    fn test_sample_header_counts_actual_rows() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        db.execute_batch(
            "CREATE TABLE refunds (id INTEGER, amount REAL);
             INSERT INTO refunds (amount) VALUES (12.5);",
        )
        .unwrap();
        let schema = db.get_schema(&["refunds".to_string()]).unwrap();
        assert!(schema.contains("1 rows from refunds table"));
        assert!(!schema.contains("3 rows from refunds table"));
    }

    #[test]
    fn test_interrupt_stops_running_query() {
        let db = Arc::new(SqliteDatabase::open_in_memory().unwrap());
        let worker = Arc::clone(&db);
        let handle = std::thread::spawn(move || worker.execute(SLOW_COUNT));
        while !handle.is_finished() {
            std::thread::sleep(std::time::Duration::from_millis(50));
            db.interrupt();
        }
        assert!(matches!(handle.join().unwrap(), Err(DbError::Execution(_))));
    }

    #[test]
    fn test_schema_unknown_table() {
        let db = orders_db();
        let err = db
            .get_schema(&["orders".to_string(), "invoices".to_string()])
            .unwrap_err();
        assert!(matches!(err, DbError::UnknownTables(ref t) if t == "invoices"));
    }

    #[test]
    fn test_execute_count() {
        let db = orders_db();
        let rows = db
            .execute("SELECT COUNT(*) AS n FROM orders WHERE amount > 300")
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["n"], Value::from(2));
    }

    #[test]
    fn test_execute_empty_and_error() {
        let db = orders_db();
        assert!(db
            .execute("SELECT * FROM orders WHERE amount > 10000")
            .unwrap()
            .is_empty());
        assert!(matches!(
            db.execute("SELEC COUNT(*) FROM orders"),
            Err(DbError::Execution(_))
        ));
    }
}
