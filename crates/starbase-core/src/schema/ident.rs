//! Validation and quoting of SQL identifiers and column types.
//!
//! Table and column names cannot be bound as parameters, so anything that
//! reaches DDL or dynamic DML goes through here first.

use crate::error::{Error, Result};

/// True for `[A-Za-z_][A-Za-z0-9_]*`.
#[must_use]
pub fn is_valid_ident(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validate `name` and return it double-quoted.
pub fn quote_ident(name: &str) -> Result<String> {
    if is_valid_ident(name) {
        Ok(format!("\"{name}\""))
    } else {
        Err(Error::InvalidIdentifier(name.to_string()))
    }
}

/// Validate a declared column type such as `DECIMAL(3,1)` or
/// `VARCHAR(20)`. Letters, digits, spaces, parentheses and commas only.
pub fn validate_sql_type(sql_type: &str) -> Result<&str> {
    let t = sql_type.trim();
    let ok = !t.is_empty()
        && t.starts_with(|c: char| c.is_ascii_alphabetic())
        && t
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '(' | ')' | ',' | '_'));
    if ok {
        Ok(t)
    } else {
        Err(Error::InvalidData(format!("invalid column type: {sql_type:?}")))
    }
}
