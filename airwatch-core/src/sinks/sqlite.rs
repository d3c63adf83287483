use super::{ensure_same_columns, HistorySink, SinkError};
use crate::record::FlatRecord;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// SQLite history table, one column per flat key.
///
/// Column types come from the first record: integers -> INTEGER, other
/// numbers -> REAL, strings -> TEXT, booleans -> INTEGER, null -> untyped.
pub struct SqliteSink {
    conn: Connection,
    table: String,
    path: PathBuf,
}

impl SqliteSink {
    /// Open (or create) the database file; the table is created by [`HistorySink::create`].
    pub fn open<P: Into<PathBuf>>(path: P, table: impl Into<String>) -> Result<Self, SinkError> {
        let path = path.into();
        let conn = Connection::open(&path)?;
        Ok(Self {
            conn,
            table: table.into(),
            path,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Columns of the stored table, in declaration order (empty if absent).
    pub fn stored_columns(&self) -> Result<Vec<String>, SinkError> {
        let sql = format!("PRAGMA table_info({})", quote_ident(&self.table));
        let mut stmt = self.conn.prepare(&sql)?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    pub fn row_count(&self) -> Result<u64, SinkError> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(&self.table));
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn insert(&self, record: &FlatRecord) -> Result<(), SinkError> {
        let columns: Vec<String> = record.keys().map(quote_ident).collect();
        let placeholders: Vec<String> = (1..=record.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&self.table),
            columns.join(", "),
            placeholders.join(", ")
        );

        let values = record.iter().map(|(_, v)| to_sql_value(v));
        self.conn.execute(&sql, params_from_iter(values))?;
        Ok(())
    }
}

impl HistorySink for SqliteSink {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    fn location(&self) -> &Path {
        &self.path
    }

    fn create(&mut self, record: &FlatRecord) -> Result<(), SinkError> {
        if record.is_empty() {
            return Err(SinkError::EmptyRecord);
        }

        let columns: Vec<String> = record
            .iter()
            .map(|(key, value)| match column_type(value) {
                Some(ty) => format!("{} {}", quote_ident(key), ty),
                None => quote_ident(key),
            })
            .collect();
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(&self.table),
            columns.join(", ")
        );
        self.conn.execute(&sql, [])?;

        // An existing table from an earlier shape must not swallow this row.
        let stored = self.stored_columns()?;
        ensure_same_columns(self.kind(), &stored, record)?;
        self.insert(record)?;

        debug!(table = %self.table, columns = record.len(), "sqlite history created");
        Ok(())
    }

    fn append(&mut self, record: &FlatRecord) -> Result<(), SinkError> {
        let stored = self.stored_columns()?;
        if stored.is_empty() {
            return Err(SinkError::NotCreated {
                sink: "sqlite",
                location: self.path.clone(),
            });
        }
        ensure_same_columns(self.kind(), &stored, record)?;
        self.insert(record)?;

        debug!(table = %self.table, "sqlite row appended");
        Ok(())
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_type(value: &Value) -> Option<&'static str> {
    match value {
        Value::Null => None,
        Value::Bool(_) => Some("INTEGER"),
        Value::Number(n) if n.is_i64() => Some("INTEGER"),
        Value::Number(_) => Some("REAL"),
        Value::String(_) | Value::Array(_) | Value::Object(_) => Some("TEXT"),
    }
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}
