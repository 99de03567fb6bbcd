//! Fill-if-null merges: a [`Delta`] of column values applied to one row
//! without overwriting anything already set.

use rusqlite::types::{ToSqlOutput, Value as SqlValue};
use rusqlite::{params_from_iter, Connection, ToSql};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::ident::quote_ident;

/// A single column value carried by a [`Delta`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Real(f64),
    Text(String),
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Self::Real(r) => ToSqlOutput::Owned(SqlValue::Real(*r)),
            Self::Text(s) => ToSqlOutput::Borrowed(rusqlite::types::ValueRef::Text(s.as_bytes())),
        })
    }
}

/// An ordered set of `(column, value)` pairs to insert or merge.
///
/// Builders drop absent values: `None`, and text that is empty after
/// trimming, never enter a delta. A delta therefore only ever carries
/// information, which is what makes fill-if-null merging idempotent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delta {
    entries: Vec<(String, Value)>,
}

impl Delta {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn text(mut self, column: &str, value: Option<&str>) -> Self {
        if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
            self.set(column, Value::Text(v.to_string()));
        }
        self
    }

    #[must_use]
    pub fn integer(mut self, column: &str, value: Option<i64>) -> Self {
        if let Some(v) = value {
            self.set(column, Value::Integer(v));
        }
        self
    }

    #[must_use]
    pub fn real(mut self, column: &str, value: Option<f64>) -> Self {
        if let Some(v) = value.filter(|v| v.is_finite()) {
            self.set(column, Value::Real(v));
        }
        self
    }

    /// Add an already typed value, with the same absent-value rules.
    #[must_use]
    pub fn value(self, column: &str, value: &Value) -> Self {
        match value {
            Value::Integer(i) => self.integer(column, Some(*i)),
            Value::Real(r) => self.real(column, Some(*r)),
            Value::Text(s) => self.text(column, Some(s)),
        }
    }

    fn set(&mut self, column: &str, value: Value) {
        if let Some(entry) = self.entries.iter_mut().find(|(c, _)| c == column) {
            entry.1 = value;
        } else {
            self.entries.push((column.to_string(), value));
        }
    }

    /// Add `column` only if the delta does not already carry it.
    #[must_use]
    pub fn or_text(self, column: &str, value: &str) -> Self {
        if self.contains(column) {
            self
        } else {
            self.text(column, Some(value))
        }
    }

    /// Drop a column from the delta.
    #[must_use]
    pub fn without(mut self, column: &str) -> Self {
        self.entries.retain(|(c, _)| c != column);
        self
    }

    #[must_use]
    pub fn contains(&self, column: &str) -> bool {
        self.entries.iter().any(|(c, _)| c == column)
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
    }

    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        self.entries.iter().map(|(c, _)| c.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(c, v)| (c.as_str(), v))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Insert the delta as a new row of `table`, returning its rowid.
    pub fn insert(&self, conn: &Connection, table: &str) -> Result<i64> {
        if self.is_empty() {
            return Err(Error::InvalidData(format!(
                "refusing to insert an empty row into {table}"
            )));
        }
        let columns = self
            .entries
            .iter()
            .map(|(c, _)| quote_ident(c))
            .collect::<Result<Vec<_>>>()?;
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table)?,
            columns.join(", "),
            placeholders.join(", ")
        );
        conn.execute(&sql, params_from_iter(self.entries.iter().map(|(_, v)| v)))
            .map_err(|e| Error::from(e).with_integrity_context(format!("insert into {table}")))?;
        Ok(conn.last_insert_rowid())
    }
}

/// Merge `delta` into one row, filling only columns that are NULL or empty.
///
/// Each column is written as `COALESCE(NULLIF(col, ''), new)`, restricted to
/// rows where the column is actually blank so the returned list names
/// exactly the columns that changed. Populated values are never touched,
/// so applying the same delta twice changes nothing the second time.
pub fn merge_fill_if_null(
    conn: &Connection,
    table: &str,
    id_column: &str,
    id: i64,
    delta: &Delta,
) -> Result<Vec<String>> {
    let table_q = quote_ident(table)?;
    let id_q = quote_ident(id_column)?;
    let mut changed = Vec::new();

    for (column, value) in delta.iter() {
        let col_q = quote_ident(column)?;
        let sql = format!(
            "UPDATE {table_q} SET {col_q} = COALESCE(NULLIF({col_q}, ''), ?1) \
             WHERE {id_q} = ?2 AND ({col_q} IS NULL OR {col_q} = '')"
        );
        let rows = conn
            .execute(&sql, rusqlite::params![value, id])
            .map_err(|e| Error::from(e).with_integrity_context(format!("{table}.{column}")))?;
        if rows > 0 {
            changed.push(column.to_string());
        }
    }

    if !changed.is_empty() {
        log::debug!("{table} {id}: filled {}", changed.join(", "));
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE Actors (
                actor_id INTEGER PRIMARY KEY,
                first_name TEXT,
                last_name TEXT,
                birth_date TEXT,
                birth_place TEXT
            );
            INSERT INTO Actors (actor_id, first_name, last_name, birth_place)
                VALUES (1, 'Nana', 'Visitor', '');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_builders_skip_absent_values() {
        let delta = Delta::new()
            .text("a", None)
            .text("b", Some("   "))
            .text("c", Some(" x "))
            .integer("d", None)
            .real("e", Some(f64::NAN))
            .real("f", Some(7.5));
        assert_eq!(delta.columns(), vec!["c", "f"]);
        assert_eq!(delta.get("c"), Some(&Value::Text("x".to_string())));
    }

    #[test]
    fn test_fill_if_null_never_overwrites() {
        let conn = setup();
        let delta = Delta::new()
            .text("first_name", Some("Nancy"))
            .text("birth_date", Some("1957-07-26"))
            .text("birth_place", Some("New York City"));

        let changed = merge_fill_if_null(&conn, "Actors", "actor_id", 1, &delta).unwrap();
        assert_eq!(changed, vec!["birth_date", "birth_place"]);

        let first: String = conn
            .query_row("SELECT first_name FROM Actors WHERE actor_id = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(first, "Nana");
    }

    #[test]
    fn test_merge_twice_is_idempotent() {
        let conn = setup();
        let delta = Delta::new().text("birth_date", Some("1957-07-26"));
        merge_fill_if_null(&conn, "Actors", "actor_id", 1, &delta).unwrap();

        let later = Delta::new().text("birth_date", Some("1960-01-01"));
        let changed = merge_fill_if_null(&conn, "Actors", "actor_id", 1, &later).unwrap();
        assert!(changed.is_empty());

        let date: String = conn
            .query_row("SELECT birth_date FROM Actors WHERE actor_id = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(date, "1957-07-26");
    }

    #[test]
    fn test_insert_returns_rowid() {
        let conn = setup();
        let id = Delta::new()
            .text("first_name", Some("Armin"))
            .text("last_name", Some("Shimerman"))
            .insert(&conn, "Actors")
            .unwrap();
        assert_eq!(id, 2);
    }

    #[test]
    fn test_rejects_bad_identifiers() {
        let conn = setup();
        let delta = Delta::new().text("x; DROP TABLE Actors", Some("1"));
        assert!(matches!(
            merge_fill_if_null(&conn, "Actors", "actor_id", 1, &delta),
            Err(Error::InvalidIdentifier(_))
        ));
    }
}
