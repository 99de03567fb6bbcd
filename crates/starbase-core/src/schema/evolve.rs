//! In-place schema changes on a live database.
//!
//! Additive changes use `ALTER TABLE ... ADD COLUMN` and are idempotent.
//! Column drops and renames rebuild the table: a shadow table with the new
//! shape is created, rows are copied column by column, counts are compared,
//! and only then is the original replaced.
//!
//! ```no_run
//! use starbase_core::schema::{ensure_column, ColumnSpec, Database};
//!
//! let db = Database::open("startrek.db").unwrap();
//! let spec = ColumnSpec::new("imdb_rating", "DECIMAL(3,1)");
//! ensure_column(db.conn(), "Episodes", &spec).unwrap();
//! ```

use regex::Regex;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};
use crate::schema::db::Database;
use crate::schema::ident::{quote_ident, validate_sql_type};

/// Suffix of the shadow table built during a rebuild.
pub const SHADOW_SUFFIX: &str = "_new";

// ---------------------------------------------------------------------------
// Additive path
// ---------------------------------------------------------------------------

/// Default value of a new column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    Integer(i64),
    Real(f64),
    Text(String),
    Null,
}

impl DefaultValue {
    /// Read a default typed on the command line: `NULL`, an integer, a
    /// real, or anything else as text.
    #[must_use]
    pub fn parse_literal(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("null") {
            Self::Null
        } else if let Ok(i) = raw.parse() {
            Self::Integer(i)
        } else if let Ok(r) = raw.parse::<f64>() {
            Self::Real(r)
        } else {
            Self::Text(raw.trim_matches('\'').to_string())
        }
    }

    /// Render as a SQL literal. Text is single-quoted with quotes doubled.
    #[must_use]
    pub fn to_sql_literal(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Real(r) if r.is_finite() => format!("{r:?}"),
            Self::Real(_) => "NULL".to_string(),
            Self::Text(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }
}

/// A column to add: name, declared type and optional default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub sql_type: String,
    #[serde(default)]
    pub default: Option<DefaultValue>,
}

impl ColumnSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            default: None,
        }
    }

    #[must_use]
    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Column definition as it appears in `ADD COLUMN`.
    pub fn definition(&self) -> Result<String> {
        let mut def = format!(
            "{} {}",
            quote_ident(&self.name)?,
            validate_sql_type(&self.sql_type)?
        );
        if let Some(default) = &self.default {
            def.push_str(" DEFAULT ");
            def.push_str(&default.to_sql_literal());
        }
        Ok(def)
    }
}

/// Result of [`ensure_column`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnChange {
    Added,
    AlreadyPresent,
}

impl fmt::Display for ColumnChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => f.write_str("added"),
            Self::AlreadyPresent => f.write_str("already present"),
        }
    }
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2 COLLATE NOCASE",
        [table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Ensure `table` has the column described by `spec`.
///
/// Running this twice leaves the schema unchanged; a "duplicate column
/// name" failure from the engine is reported as [`ColumnChange::AlreadyPresent`].
pub fn ensure_column(conn: &Connection, table: &str, spec: &ColumnSpec) -> Result<ColumnChange> {
    let definition = spec.definition()?;
    if column_exists(conn, table, &spec.name)? {
        log::debug!("{table}.{} already present", spec.name);
        return Ok(ColumnChange::AlreadyPresent);
    }

    let sql = format!("ALTER TABLE {} ADD COLUMN {definition}", quote_ident(table)?);
    match conn.execute_batch(&sql) {
        Ok(()) => {
            log::info!("Added column {table}.{} {}", spec.name, spec.sql_type);
            Ok(ColumnChange::Added)
        }
        Err(rusqlite::Error::SqliteFailure(_, Some(msg))) if msg.contains("duplicate column name") => {
            Ok(ColumnChange::AlreadyPresent)
        }
        Err(e) => Err(e.into()),
    }
}

/// Apply several [`ensure_column`] calls, reporting each outcome.
pub fn ensure_columns(
    conn: &Connection,
    table: &str,
    specs: &[ColumnSpec],
) -> Result<Vec<(String, ColumnChange)>> {
    specs
        .iter()
        .map(|spec| Ok((spec.name.clone(), ensure_column(conn, table, spec)?)))
        .collect()
}

/// Create a named index unless one by that name exists. Returns `true`
/// when the index was created.
pub fn ensure_index(
    conn: &Connection,
    name: &str,
    table: &str,
    columns: &[&str],
    unique: bool,
) -> Result<bool> {
    let exists: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?1",
        [name],
        |row| row.get(0),
    )?;
    if exists > 0 {
        return Ok(false);
    }
    if columns.is_empty() {
        return Err(Error::InvalidData(format!("index {name} has no columns")));
    }
    let cols = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Result<Vec<_>>>()?;
    let sql = format!(
        "CREATE {}INDEX {} ON {}({})",
        if unique { "UNIQUE " } else { "" },
        quote_ident(name)?,
        quote_ident(table)?,
        cols.join(", ")
    );
    conn.execute_batch(&sql)?;
    log::info!("Created index {name} on {table}");
    Ok(true)
}

// ---------------------------------------------------------------------------
// Live table shape
// ---------------------------------------------------------------------------

/// One column as reported by `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub sql_type: String,
    pub not_null: bool,
    /// Default expression text, as stored.
    pub default_sql: Option<String>,
    /// 1-based position in the primary key, 0 if not part of it.
    pub pk: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    /// (local column, referenced column) pairs.
    pub columns: Vec<(String, Option<String>)>,
    pub table: String,
    pub on_update: String,
    pub on_delete: String,
}

/// A foreign key in another table that names a column of this one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundKey {
    pub table: String,
    pub column: String,
    pub referenced: String,
}

/// An explicitly created index and its stored DDL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
    pub sql: String,
}

/// Everything about a table that a rebuild has to carry over.
///
/// CHECK constraints, collations and generated columns are not modelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableShape {
    pub table: String,
    pub columns: Vec<ColumnInfo>,
    pub autoincrement: bool,
    pub unique_constraints: Vec<Vec<String>>,
    pub foreign_keys: Vec<ForeignKey>,
    pub indexes: Vec<IndexDef>,
    /// Foreign keys elsewhere that reference a named column here. Keys that
    /// rely on the implicit primary key are not listed.
    pub referenced_by: Vec<InboundKey>,
}

impl TableShape {
    /// Read the current shape of `table`.
    pub fn read(conn: &Connection, table: &str) -> Result<Self> {
        quote_ident(table)?;

        let create_sql: Option<String> = conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get(0),
            )
            .optional()?;
        let Some(create_sql) = create_sql else {
            return Err(Error::NotFound {
                entity: "table",
                id: table.to_string(),
            });
        };

        let mut stmt = conn.prepare(
            "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid",
        )?;
        let columns = stmt
            .query_map([table], |row| {
                Ok(ColumnInfo {
                    name: row.get(0)?,
                    sql_type: row.get(1)?,
                    not_null: row.get::<_, i64>(2)? != 0,
                    default_sql: row.get(3)?,
                    pk: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut unique_constraints = Vec::new();
        let mut indexes = Vec::new();
        let mut stmt = conn.prepare("SELECT name, origin FROM pragma_index_list(?1) ORDER BY seq")?;
        let index_list = stmt
            .query_map([table], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for (name, origin) in index_list {
            match origin.as_str() {
                "u" => {
                    let mut info =
                        conn.prepare("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")?;
                    let cols = info
                        .query_map([&name], |row| row.get::<_, Option<String>>(0))?
                        .collect::<rusqlite::Result<Vec<_>>>()?;
                    unique_constraints.push(cols.into_iter().flatten().collect());
                }
                "c" => {
                    let sql: Option<String> = conn.query_row(
                        "SELECT sql FROM sqlite_master WHERE type = 'index' AND name = ?1",
                        [&name],
                        |row| row.get(0),
                    )?;
                    if let Some(sql) = sql {
                        indexes.push(IndexDef { name, sql });
                    }
                }
                _ => {}
            }
        }

        let mut stmt = conn.prepare(
            "SELECT id, \"table\", \"from\", \"to\", on_update, on_delete
             FROM pragma_foreign_key_list(?1) ORDER BY id, seq",
        )?;
        let rows = stmt
            .query_map([table], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let mut grouped: BTreeMap<i64, ForeignKey> = BTreeMap::new();
        for (id, ref_table, from, to, on_update, on_delete) in rows {
            grouped
                .entry(id)
                .or_insert_with(|| ForeignKey {
                    columns: Vec::new(),
                    table: ref_table,
                    on_update,
                    on_delete,
                })
                .columns
                .push((from, to));
        }

        let mut stmt = conn.prepare(
            "SELECT m.name, f.\"from\", f.\"to\"
             FROM sqlite_master m JOIN pragma_foreign_key_list(m.name) f
             WHERE m.type = 'table' AND m.name <> ?1
               AND f.\"table\" = ?1 COLLATE NOCASE AND f.\"to\" IS NOT NULL
             ORDER BY m.name, f.id, f.seq",
        )?;
        let referenced_by = stmt
            .query_map([table], |row| {
                Ok(InboundKey {
                    table: row.get(0)?,
                    column: row.get(1)?,
                    referenced: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Self {
            table: table.to_string(),
            columns,
            autoincrement: create_sql.to_ascii_uppercase().contains("AUTOINCREMENT"),
            unique_constraints,
            foreign_keys: grouped.into_values().collect(),
            indexes,
            referenced_by,
        })
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// `CREATE TABLE` statement for this shape under another name.
    pub fn create_sql(&self, name: &str) -> Result<String> {
        let pk_cols: Vec<&ColumnInfo> = {
            let mut cols: Vec<&ColumnInfo> = self.columns.iter().filter(|c| c.pk > 0).collect();
            cols.sort_by_key(|c| c.pk);
            cols
        };
        let inline_pk = pk_cols.len() == 1 && pk_cols[0].sql_type.eq_ignore_ascii_case("INTEGER");

        let mut defs = Vec::new();
        for col in &self.columns {
            let mut def = quote_ident(&col.name)?;
            if !col.sql_type.is_empty() {
                def.push(' ');
                def.push_str(validate_sql_type(&col.sql_type)?);
            }
            if inline_pk && col.pk == 1 {
                def.push_str(" PRIMARY KEY");
                if self.autoincrement {
                    def.push_str(" AUTOINCREMENT");
                }
            }
            if col.not_null {
                def.push_str(" NOT NULL");
            }
            if let Some(default) = &col.default_sql {
                def.push_str(&format!(" DEFAULT ({default})"));
            }
            defs.push(def);
        }

        if !inline_pk && !pk_cols.is_empty() {
            let cols = pk_cols
                .iter()
                .map(|c| quote_ident(&c.name))
                .collect::<Result<Vec<_>>>()?;
            defs.push(format!("PRIMARY KEY ({})", cols.join(", ")));
        }

        for unique in &self.unique_constraints {
            let cols = unique
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Result<Vec<_>>>()?;
            defs.push(format!("UNIQUE ({})", cols.join(", ")));
        }

        for fk in &self.foreign_keys {
            let from = fk
                .columns
                .iter()
                .map(|(f, _)| quote_ident(f))
                .collect::<Result<Vec<_>>>()?;
            let mut clause = format!(
                "FOREIGN KEY ({}) REFERENCES {}",
                from.join(", "),
                quote_ident(&fk.table)?
            );
            let to = fk
                .columns
                .iter()
                .filter_map(|(_, t)| t.as_deref())
                .map(quote_ident)
                .collect::<Result<Vec<_>>>()?;
            if to.len() == fk.columns.len() {
                clause.push_str(&format!("({})", to.join(", ")));
            }
            for (action, rule) in [("UPDATE", &fk.on_update), ("DELETE", &fk.on_delete)] {
                if !rule.eq_ignore_ascii_case("NO ACTION") {
                    clause.push_str(&format!(" ON {action} {rule}"));
                }
            }
            defs.push(clause);
        }

        Ok(format!(
            "CREATE TABLE {} (\n    {}\n)",
            quote_ident(name)?,
            defs.join(",\n    ")
        ))
    }
}

// ---------------------------------------------------------------------------
// Destructive path
// ---------------------------------------------------------------------------

/// A declarative table change: columns to drop, rename and add.
///
/// In TOML:
///
/// ```toml
/// [[migration]]
/// table = "Actors"
/// drop = ["bio"]
/// rename = { nationality = "birth_place" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationDescriptor {
    pub table: String,
    #[serde(default)]
    pub drop: Vec<String>,
    /// Old name to new name.
    #[serde(default)]
    pub rename: BTreeMap<String, String>,
    #[serde(default)]
    pub add: Vec<ColumnSpec>,
}

#[derive(Debug, Deserialize)]
struct MigrationFile {
    #[serde(default)]
    migration: Vec<MigrationDescriptor>,
}

impl MigrationDescriptor {
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn drop_column(mut self, column: impl Into<String>) -> Self {
        self.drop.push(column.into());
        self
    }

    #[must_use]
    pub fn rename_column(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.rename.insert(from.into(), to.into());
        self
    }

    #[must_use]
    pub fn add_column(mut self, spec: ColumnSpec) -> Self {
        self.add.push(spec);
        self
    }

    /// Parse every `[[migration]]` entry of a TOML document.
    pub fn parse_all(content: &str) -> Result<Vec<Self>> {
        let file: MigrationFile = toml::from_str(content)
            .map_err(|e| Error::InvalidData(format!("invalid migration file: {e}")))?;
        Ok(file.migration)
    }

    pub fn load_all(path: &Path) -> Result<Vec<Self>> {
        Self::parse_all(&std::fs::read_to_string(path)?)
    }

    /// Whether applying this needs a rebuild rather than `ADD COLUMN`.
    #[must_use]
    pub fn is_destructive(&self) -> bool {
        !self.drop.is_empty() || !self.rename.is_empty()
    }

    /// Plan the rebuild against the live shape of the table.
    pub fn plan(&self, conn: &Connection) -> Result<RebuildPlan> {
        let shape = TableShape::read(conn, &self.table)?;
        RebuildPlan::from_shape(&shape, self)
    }
}

/// Everything needed to rebuild one table, computed up front so it can be
/// printed for a dry run before anything runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildPlan {
    pub table: String,
    pub shadow: String,
    pub create_shadow: String,
    /// Columns read from the original, in copy order.
    pub source_columns: Vec<String>,
    /// Matching columns written to the shadow.
    pub target_columns: Vec<String>,
    /// Index DDL to run after the rename.
    pub indexes: Vec<String>,
    pub warnings: Vec<String>,
}

impl RebuildPlan {
    /// Build a plan from a table shape and a descriptor.
    pub fn from_shape(shape: &TableShape, desc: &MigrationDescriptor) -> Result<Self> {
        let table = &shape.table;
        let find = |name: &str| {
            shape
                .columns
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(name))
                .map(|c| c.name.clone())
        };

        let mut dropped = Vec::new();
        for col in &desc.drop {
            let actual = find(col).ok_or_else(|| {
                Error::InvalidData(format!("cannot drop {table}.{col}: no such column"))
            })?;
            if shape.columns.iter().any(|c| c.name == actual && c.pk > 0) {
                return Err(Error::InvalidData(format!(
                    "cannot drop {table}.{actual}: part of the primary key"
                )));
            }
            dropped.push(actual);
        }

        let mut renames: BTreeMap<String, String> = BTreeMap::new();
        for (from, to) in &desc.rename {
            quote_ident(to)?;
            let actual = find(from).ok_or_else(|| {
                Error::InvalidData(format!("cannot rename {table}.{from}: no such column"))
            })?;
            if dropped.contains(&actual) {
                return Err(Error::InvalidData(format!(
                    "{table}.{actual} is both dropped and renamed"
                )));
            }
            let clashes = shape.columns.iter().any(|c| {
                c.name.eq_ignore_ascii_case(to)
                    && !c.name.eq_ignore_ascii_case(&actual)
                    && !dropped.contains(&c.name)
            });
            if clashes {
                return Err(Error::InvalidData(format!(
                    "cannot rename {table}.{actual} to {to}: column exists"
                )));
            }
            renames.insert(actual, to.clone());
        }

        for key in &shape.referenced_by {
            let touched = dropped
                .iter()
                .chain(renames.keys())
                .any(|c| c.eq_ignore_ascii_case(&key.referenced));
            if touched {
                return Err(Error::InvalidData(format!(
                    "cannot change {table}.{}: referenced by {}.{}",
                    key.referenced, key.table, key.column
                )));
            }
        }

        let mut new_shape = shape.clone();
        new_shape.columns.retain(|c| !dropped.contains(&c.name));
        if new_shape.columns.is_empty() {
            return Err(Error::InvalidData(format!(
                "cannot drop every column of {table}"
            )));
        }

        let mut warnings = Vec::new();
        let source_columns: Vec<String> = new_shape.columns.iter().map(|c| c.name.clone()).collect();
        let rename = |name: &str| renames.get(name).cloned().unwrap_or_else(|| name.to_string());
        for col in &mut new_shape.columns {
            col.name = rename(&col.name);
        }
        let target_columns: Vec<String> = new_shape.columns.iter().map(|c| c.name.clone()).collect();

        new_shape.unique_constraints = shape
            .unique_constraints
            .iter()
            .filter_map(|cols| {
                if cols.iter().any(|c| dropped.contains(c)) {
                    warnings.push(format!(
                        "UNIQUE ({}) dropped with its column",
                        cols.join(", ")
                    ));
                    None
                } else {
                    Some(cols.iter().map(|c| rename(c)).collect())
                }
            })
            .collect();

        new_shape.foreign_keys = shape
            .foreign_keys
            .iter()
            .filter_map(|fk| {
                if fk.columns.iter().any(|(from, _)| dropped.contains(from)) {
                    warnings.push(format!("foreign key to {} dropped with its column", fk.table));
                    None
                } else {
                    let mut fk = fk.clone();
                    for (from, _) in &mut fk.columns {
                        *from = rename(from);
                    }
                    Some(fk)
                }
            })
            .collect();

        for spec in &desc.add {
            if new_shape.has_column(&spec.name) {
                return Err(Error::InvalidData(format!(
                    "cannot add {table}.{}: column exists",
                    spec.name
                )));
            }
            validate_sql_type(&spec.sql_type)?;
            new_shape.columns.push(ColumnInfo {
                name: spec.name.clone(),
                sql_type: spec.sql_type.trim().to_string(),
                not_null: false,
                default_sql: spec.default.as_ref().map(DefaultValue::to_sql_literal),
                pk: 0,
            });
        }

        let mut indexes = Vec::new();
        for index in &shape.indexes {
            match rewrite_index(&index.sql, &dropped, &renames)? {
                Some(sql) => indexes.push(sql),
                None => warnings.push(format!(
                    "index {} skipped: it uses a dropped column",
                    index.name
                )),
            }
        }

        let shadow = format!("{table}{SHADOW_SUFFIX}");
        Ok(Self {
            create_shadow: new_shape.create_sql(&shadow)?,
            table: table.clone(),
            shadow,
            source_columns,
            target_columns,
            indexes,
            warnings,
        })
    }

    fn copy_sql(&self) -> Result<String> {
        let quote_all = |cols: &[String]| -> Result<String> {
            Ok(cols
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Result<Vec<_>>>()?
                .join(", "))
        };
        Ok(format!(
            "INSERT OR IGNORE INTO {} ({}) SELECT {} FROM {}",
            quote_ident(&self.shadow)?,
            quote_all(&self.target_columns)?,
            quote_all(&self.source_columns)?,
            quote_ident(&self.table)?
        ))
    }

    /// The SQL the rebuild will run, in order.
    pub fn statements(&self) -> Result<Vec<String>> {
        let mut out = vec![self.create_shadow.clone(), self.copy_sql()?];
        out.push(format!("DROP TABLE {}", quote_ident(&self.table)?));
        out.push(format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_ident(&self.shadow)?,
            quote_ident(&self.table)?
        ));
        out.extend(self.indexes.iter().cloned());
        Ok(out)
    }
}

/// Rewrite an index definition for the rebuilt table. `None` means the
/// index references a dropped column and cannot be recreated.
fn rewrite_index(
    sql: &str,
    dropped: &[String],
    renames: &BTreeMap<String, String>,
) -> Result<Option<String>> {
    let Some(open) = sql.find('(') else {
        return Ok(Some(sql.to_string()));
    };
    let (head, body) = sql.split_at(open);

    for col in dropped {
        let re = word_regex(col)?;
        if re.is_match(body) {
            return Ok(None);
        }
    }

    let mut body = body.to_string();
    for (from, to) in renames {
        let re = word_regex(from)?;
        body = re.replace_all(&body, to.as_str()).into_owned();
    }
    Ok(Some(format!("{head}{body}")))
}

fn word_regex(column: &str) -> Result<Regex> {
    Regex::new(&format!(r#"(?i)\b{}\b"#, regex::escape(column)))
        .map_err(|e| Error::InvalidData(format!("bad column pattern {column}: {e}")))
}

/// Summary of a completed rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildReport {
    pub rows: i64,
    pub indexes: usize,
    pub foreign_key_violations: usize,
}

fn count_rows(conn: &Connection, table: &str) -> Result<i64> {
    Ok(conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_ident(table)?),
        [],
        |row| row.get(0),
    )?)
}

/// Run a rebuild plan.
///
/// Phase one creates and fills the shadow in its own transaction and
/// compares row counts. A mismatch returns [`Error::RowCountMismatch`] with
/// the original untouched and the shadow kept for inspection. Phase two
/// swaps the tables inside a second transaction with foreign-key
/// enforcement suspended, so a failure there rolls back to the original.
pub fn rebuild_table(db: &Database, plan: &RebuildPlan) -> Result<RebuildReport> {
    let conn = db.conn();
    if !conn.is_autocommit() {
        return Err(Error::InvalidData(
            "rebuild_table must not run inside an open transaction".to_string(),
        ));
    }
    if db.has_table(&plan.shadow)? {
        return Err(Error::ShadowExists {
            table: plan.table.clone(),
            shadow: plan.shadow.clone(),
        });
    }
    for warning in &plan.warnings {
        log::warn!("{}: {warning}", plan.table);
    }

    // Phase one: build and fill the shadow.
    let copy = plan.copy_sql()?;
    conn.execute_batch("BEGIN")?;
    let filled = (|| -> Result<(i64, i64)> {
        conn.execute_batch(&plan.create_shadow)?;
        conn.execute_batch(&copy)?;
        Ok((count_rows(conn, &plan.table)?, count_rows(conn, &plan.shadow)?))
    })();
    let (original, copied) = match filled {
        Ok(counts) => {
            conn.execute_batch("COMMIT")?;
            counts
        }
        Err(e) => {
            conn.execute_batch("ROLLBACK")?;
            return Err(e);
        }
    };
    if original != copied {
        log::error!(
            "{}: copied {copied} of {original} rows into {}; aborting",
            plan.table,
            plan.shadow
        );
        return Err(Error::RowCountMismatch {
            table: plan.table.clone(),
            original,
            copied,
            shadow: plan.shadow.clone(),
        });
    }

    // Phase two: swap. PRAGMA foreign_keys is a no-op inside a transaction.
    let fk_enabled: bool = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
    conn.execute_batch("PRAGMA foreign_keys = OFF")?;
    conn.execute_batch("BEGIN")?;
    let swapped = (|| -> Result<usize> {
        conn.execute_batch(&format!("DROP TABLE {}", quote_ident(&plan.table)?))?;
        conn.execute_batch(&format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_ident(&plan.shadow)?,
            quote_ident(&plan.table)?
        ))?;
        for index in &plan.indexes {
            conn.execute_batch(index)?;
        }
        let violations: i64 =
            conn.query_row("SELECT COUNT(*) FROM pragma_foreign_key_check", [], |row| {
                row.get(0)
            })?;
        Ok(usize::try_from(violations).unwrap_or(0))
    })();
    let result = match swapped {
        Ok(violations) => conn.execute_batch("COMMIT").map(|()| violations).map_err(Error::from),
        Err(e) => {
            log::error!("{}: swap failed, rolling back: {e}", plan.table);
            conn.execute_batch("ROLLBACK")?;
            Err(e)
        }
    };
    if fk_enabled {
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
    }
    let violations = result?;

    if violations > 0 {
        log::warn!(
            "{}: {violations} foreign key violations after rebuild",
            plan.table
        );
    }
    log::info!(
        "Rebuilt {} ({copied} rows, {} indexes)",
        plan.table,
        plan.indexes.len()
    );
    Ok(RebuildReport {
        rows: copied,
        indexes: plan.indexes.len(),
        foreign_key_violations: violations,
    })
}

/// Apply a descriptor: additive-only descriptors use `ADD COLUMN`, anything
/// with drops or renames goes through [`rebuild_table`].
pub fn apply_descriptor(db: &Database, desc: &MigrationDescriptor) -> Result<Option<RebuildReport>> {
    if desc.is_destructive() {
        let plan = desc.plan(db.conn())?;
        return rebuild_table(db, &plan).map(Some);
    }
    ensure_columns(db.conn(), &desc.table, &desc.add)?;
    Ok(None)
}
