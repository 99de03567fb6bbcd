//! Duplicate detection and cleanup for databases created before the
//! identity keys were enforced by constraints.

use rusqlite::Connection;
use serde::Serialize;
use std::fmt;

use crate::error::Result;

/// A logical identity key that should be unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DuplicateKey {
    Episodes,
    Characters,
    Actors,
    Species,
    Organizations,
    Ships,
    CharacterActors,
}

/// How a referencing row follows its target when duplicates collapse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Follow {
    /// Association rows are re-pointed, and dropped when that would make
    /// them duplicates themselves.
    Link,
    /// A pointer column on an entity row is only ever re-pointed.
    Attribute,
}

/// Tables and columns that point at rows of a keyed table.
type References = &'static [(&'static str, &'static str, Follow)];

impl DuplicateKey {
    pub const ALL: &'static [Self] = &[
        Self::Episodes,
        Self::Characters,
        Self::Actors,
        Self::Species,
        Self::Organizations,
        Self::Ships,
        Self::CharacterActors,
    ];

    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::Episodes => "Episodes",
            Self::Characters => "Characters",
            Self::Actors => "Actors",
            Self::Species => "Species",
            Self::Organizations => "Organizations",
            Self::Ships => "Ships",
            Self::CharacterActors => "Character_Actors",
        }
    }

    const fn id_column(self) -> &'static str {
        match self {
            Self::Episodes => "episode_id",
            Self::Characters => "character_id",
            Self::Actors => "actor_id",
            Self::Species => "species_id",
            Self::Organizations => "organization_id",
            Self::Ships => "ship_id",
            Self::CharacterActors => "character_actor_id",
        }
    }

    /// Grouping expressions that make up the key.
    const fn key_exprs(self) -> &'static str {
        match self {
            Self::Episodes => "series_id, season, episode_number",
            Self::Characters | Self::Species | Self::Organizations => "LOWER(name)",
            Self::Actors => "LOWER(first_name), LOWER(last_name)",
            Self::Ships => "LOWER(name), IFNULL(registry, '')",
            Self::CharacterActors => "character_id, actor_id, IFNULL(series, '')",
        }
    }

    /// Human-readable rendering of the key for reports.
    const fn label_expr(self) -> &'static str {
        match self {
            Self::Episodes => "series_id || ' S' || season || 'E' || episode_number",
            Self::Characters | Self::Species | Self::Organizations => "name",
            Self::Actors => "TRIM(first_name || ' ' || last_name)",
            Self::Ships => "name || IFNULL(' ' || registry, '')",
            Self::CharacterActors => {
                "character_id || '/' || actor_id || '/' || IFNULL(series, '-')"
            }
        }
    }

    const fn references(self) -> References {
        match self {
            Self::Episodes => &[("Character_Episodes", "episode_id", Follow::Link)],
            Self::Characters => &[
                ("Character_Actors", "character_id", Follow::Link),
                ("Character_Episodes", "character_id", Follow::Link),
                ("Character_Organizations", "character_id", Follow::Link),
                ("Character_Ships", "character_id", Follow::Link),
            ],
            // primary_actor_id only exists once the cast pass has run.
            Self::Actors => &[
                ("Character_Actors", "actor_id", Follow::Link),
                ("Characters", "primary_actor_id", Follow::Attribute),
            ],
            Self::Species => &[("Characters", "species_id", Follow::Attribute)],
            Self::Organizations => &[
                ("Character_Organizations", "organization_id", Follow::Link),
                ("Ships", "organization_id", Follow::Attribute),
            ],
            Self::Ships => &[("Character_Ships", "ship_id", Follow::Link)],
            Self::CharacterActors => &[],
        }
    }
}

impl fmt::Display for DuplicateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Rows sharing one key value. `ids[0]` is the row that cleanup keeps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub key: DuplicateKey,
    pub label: String,
    pub ids: Vec<i64>,
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(n > 0)
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2 COLLATE NOCASE",
        [table, column],
        |row| row.get(0),
    )?;
    Ok(n > 0)
}

fn groups_for(conn: &Connection, key: DuplicateKey) -> Result<Vec<DuplicateGroup>> {
    if !table_exists(conn, key.table())? {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT MIN({label}), GROUP_CONCAT({id}) FROM \"{table}\"
         GROUP BY {keys} HAVING COUNT(*) > 1 ORDER BY MIN({id})",
        label = key.label_expr(),
        id = key.id_column(),
        table = key.table(),
        keys = key.key_exprs(),
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, String>(1)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows
        .into_iter()
        .map(|(label, ids)| {
            let mut ids: Vec<i64> = ids.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            ids.sort_unstable();
            DuplicateGroup {
                key,
                label: label.unwrap_or_default(),
                ids,
            }
        })
        .collect())
}

/// Report every group of rows that violates a logical identity key.
pub fn audit_duplicates(conn: &Connection) -> Result<Vec<DuplicateGroup>> {
    let mut all = Vec::new();
    for key in DuplicateKey::ALL {
        let groups = groups_for(conn, *key)?;
        if !groups.is_empty() {
            log::info!("{key}: {} duplicate groups", groups.len());
        }
        all.extend(groups);
    }
    Ok(all)
}

/// Collapse each duplicate group of `key` onto its lowest id.
///
/// Rows in referencing tables are re-pointed at the kept row first; a
/// reference that would itself become a duplicate is dropped. Returns the
/// number of rows deleted from the keyed table.
pub fn remove_duplicates(conn: &Connection, key: DuplicateKey) -> Result<usize> {
    let groups = groups_for(conn, key)?;
    if groups.is_empty() {
        return Ok(0);
    }

    let mut references = Vec::new();
    for (table, column, follow) in key.references() {
        if table_exists(conn, table)? && column_exists(conn, table, column)? {
            references.push((*table, *column, *follow));
        }
    }

    let tx = conn.unchecked_transaction()?;
    let mut deleted = 0;
    for group in &groups {
        let Some((keep, rest)) = group.ids.split_first() else {
            continue;
        };
        for dup in rest {
            for (table, column, follow) in &references {
                match follow {
                    Follow::Link => {
                        tx.execute(
                            &format!("UPDATE OR IGNORE \"{table}\" SET \"{column}\" = ?1 WHERE \"{column}\" = ?2"),
                            [keep, dup],
                        )?;
                        tx.execute(
                            &format!("DELETE FROM \"{table}\" WHERE \"{column}\" = ?1"),
                            [dup],
                        )?;
                    }
                    Follow::Attribute => {
                        tx.execute(
                            &format!("UPDATE \"{table}\" SET \"{column}\" = ?1 WHERE \"{column}\" = ?2"),
                            [keep, dup],
                        )?;
                    }
                }
            }
            deleted += tx.execute(
                &format!(
                    "DELETE FROM \"{}\" WHERE \"{}\" = ?1",
                    key.table(),
                    key.id_column()
                ),
                [dup],
            )?;
        }
    }
    tx.commit()?;

    log::info!("{key}: removed {deleted} duplicate rows");
    Ok(deleted)
}
