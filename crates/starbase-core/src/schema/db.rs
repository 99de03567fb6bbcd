use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::model::{ActorId, Episode, EpisodeId, EpisodeKey, SeriesId, Ship, ShipId};
use crate::reconcile::{merge_fill_if_null, Delta, UpsertOutcome};
use crate::taxonomy::SeriesCode;

use super::migrations::{MIGRATIONS, TABLES};

/// How long a write waits for a lock held by another connection.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A database connection with the versioned schema applied.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Database {
    /// Open (or create) a database at the given path and apply migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        let db = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        db.configure()?;
        db.apply_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn, path: None };
        db.configure()?;
        db.apply_migrations()?;
        Ok(db)
    }

    /// Get a reference to the underlying connection (for advanced queries).
    #[must_use]
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }

    /// File backing this database, `None` when in memory.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn configure(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(())
    }

    fn apply_migrations(&self) -> Result<()> {
        // Create migrations table if it doesn't exist
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )?;

        let mut stmt = self
            .conn
            .prepare("SELECT version FROM schema_migrations ORDER BY version")?;
        let applied: Vec<u32> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for migration in MIGRATIONS {
            if !applied.contains(&migration.version) {
                log::info!(
                    "Applying migration {} ({})",
                    migration.version,
                    migration.name
                );
                self.conn.execute_batch(migration.sql)?;
                self.conn.execute(
                    "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
                    rusqlite::params![migration.version, migration.name],
                )?;
            }
        }

        Ok(())
    }

    /// Highest applied migration version.
    pub fn schema_version(&self) -> Result<u32> {
        Ok(self.conn.query_row(
            "SELECT IFNULL(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )?)
    }
}

// Batched transactions
impl Database {
    /// Open a transaction unless one is already open.
    pub fn begin(&self) -> Result<()> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }

    /// Commit the open transaction, if any.
    pub fn commit(&self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    /// Roll back the open transaction, if any.
    pub fn rollback(&self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }
}

/// Counts processed records and commits every `every` of them.
///
/// The batch holds no borrow of the database, so it can live across
/// `.await` points while the database is borrowed only for each call.
#[derive(Debug, Clone, Copy)]
pub struct CommitBatch {
    every: usize,
    pending: usize,
    commits: usize,
}

impl CommitBatch {
    #[must_use]
    pub fn new(every: usize) -> Self {
        Self {
            every: every.max(1),
            pending: 0,
            commits: 0,
        }
    }

    /// Start the first transaction.
    pub fn start(&mut self, db: &Database) -> Result<()> {
        db.begin()
    }

    /// Count one processed record, committing and reopening the transaction
    /// when the batch is full. Returns `true` when a commit happened.
    pub fn tick(&mut self, db: &Database) -> Result<bool> {
        self.pending += 1;
        if self.pending < self.every {
            return Ok(false);
        }
        db.commit()?;
        db.begin()?;
        self.pending = 0;
        self.commits += 1;
        log::debug!("Committed batch {}", self.commits);
        Ok(true)
    }

    /// Commit whatever is pending.
    pub fn finish(&mut self, db: &Database) -> Result<()> {
        db.commit()?;
        if self.pending > 0 {
            self.commits += 1;
            self.pending = 0;
        }
        Ok(())
    }

    #[must_use]
    pub const fn commits(&self) -> usize {
        self.commits
    }
}

/// An actor and how many distinct characters they have played.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActorCredit {
    pub actor_id: ActorId,
    pub name: String,
    pub characters: i64,
}

// Lookups and reports
impl Database {
    /// Row count of each data table, in dependency order.
    pub fn table_counts(&self) -> Result<Vec<(&'static str, i64)>> {
        TABLES
            .iter()
            .map(|table| {
                let count: i64 =
                    self.conn
                        .query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| {
                            row.get(0)
                        })?;
                Ok((*table, count))
            })
            .collect()
    }

    /// Actors ordered by the number of distinct characters they played.
    pub fn top_actors(&self, limit: usize) -> Result<Vec<ActorCredit>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(
            "SELECT a.actor_id,
                    TRIM(a.first_name || ' ' || a.last_name),
                    COUNT(DISTINCT ca.character_id) AS n
             FROM Actors a
             JOIN Character_Actors ca ON ca.actor_id = a.actor_id
             GROUP BY a.actor_id
             ORDER BY n DESC, a.actor_id
             LIMIT ?1",
        )?;
        let credits = stmt
            .query_map([limit], |row| {
                Ok(ActorCredit {
                    actor_id: row.get(0)?,
                    name: row.get(1)?,
                    characters: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(credits)
    }

    /// Find a series by abbreviation, falling back to its full title.
    pub fn series_id(&self, code: SeriesCode) -> Result<Option<SeriesId>> {
        Ok(self
            .conn
            .query_row(
                "SELECT series_id FROM Series
                 WHERE abbreviation = ?1 OR LOWER(name) = LOWER(?2)
                 ORDER BY series_id LIMIT 1",
                [code.as_str(), code.title()],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Find an episode by its natural key.
    pub fn episode_id(&self, key: &EpisodeKey) -> Result<Option<EpisodeId>> {
        Ok(self
            .conn
            .query_row(
                "SELECT episode_id FROM Episodes
                 WHERE series_id = ?1 AND season = ?2 AND episode_number = ?3",
                rusqlite::params![key.series_id, key.season, key.episode_number],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Find an episode by IMDb id. `None` when the column has not been
    /// added yet.
    pub fn episode_by_imdb_id(&self, imdb_id: &str) -> Result<Option<EpisodeId>> {
        if !self.has_column("Episodes", "imdb_id")? {
            return Ok(None);
        }
        Ok(self
            .conn
            .query_row(
                "SELECT episode_id FROM Episodes WHERE imdb_id = ?1 ORDER BY episode_id LIMIT 1",
                [imdb_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Whether `table` has a column named `column`.
    pub fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
            [table, column],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Whether a table (or view) called `name` exists.
    pub fn has_table(&self, name: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

// Natural-key upserts for tables the name reconciler cannot key
impl Database {
    /// Insert an episode, or fill-if-null merge it into the row with the
    /// same (series, season, episode number).
    pub fn upsert_episode(&self, episode: &Episode) -> Result<(EpisodeId, UpsertOutcome)> {
        if let Some(id) = self.episode_id(&episode.key)? {
            let changed =
                merge_fill_if_null(&self.conn, "Episodes", "episode_id", id.get(), &episode.delta())?;
            return Ok((id, filled(changed)));
        }
        let row = Delta::new()
            .integer("series_id", Some(episode.key.series_id.get()))
            .integer("season", Some(episode.key.season))
            .integer("episode_number", Some(episode.key.episode_number));
        let id = append(row, &episode.delta()).insert(&self.conn, "Episodes")?;
        Ok((EpisodeId::from_row(id), UpsertOutcome::Inserted))
    }

    /// Find a ship by name and registry.
    ///
    /// Names repeat across refits ("USS Enterprise"), so a registry on both
    /// sides must agree; a row or record without one matches on name alone.
    /// An exact registry match is preferred.
    pub fn find_ship(&self, name: &str, registry: Option<&str>) -> Result<Option<ShipId>> {
        Ok(self
            .conn
            .query_row(
                "SELECT ship_id FROM Ships
                 WHERE LOWER(name) = LOWER(?1)
                   AND (?2 IS NULL OR registry IS NULL OR registry = '' OR registry = ?2)
                 ORDER BY (registry = ?2) DESC, ship_id
                 LIMIT 1",
                rusqlite::params![name.trim(), registry],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn upsert_ship(&self, ship: &Ship) -> Result<(ShipId, UpsertOutcome)> {
        if ship.name.trim().is_empty() {
            return Err(Error::InvalidData("ship without a name".to_string()));
        }
        if let Some(id) = self.find_ship(&ship.name, ship.registry.as_deref())? {
            let changed = merge_fill_if_null(&self.conn, "Ships", "ship_id", id.get(), &ship.delta())?;
            return Ok((id, filled(changed)));
        }
        let id = ship.delta().insert(&self.conn, "Ships")?;
        Ok((ShipId::from_row(id), UpsertOutcome::Inserted))
    }
}

fn append(mut row: Delta, extra: &Delta) -> Delta {
    for (column, value) in extra.iter() {
        row = row.value(column, value);
    }
    row
}

fn filled(changed: Vec<String>) -> UpsertOutcome {
    if changed.is_empty() {
        UpsertOutcome::Unchanged
    } else {
        UpsertOutcome::Updated(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(db.schema_version().unwrap(), 1);
    }

    #[test]
    fn test_reopen_does_not_reapply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("startrek.db");
        {
            let db = Database::open(&path).unwrap();
            db.conn()
                .execute("INSERT INTO Species (name) VALUES ('Vulcan')", [])
                .unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.path(), Some(path.as_path()));
        let counts = db.table_counts().unwrap();
        assert_eq!(counts[0], ("Species", 1));
        assert_eq!(counts.len(), TABLES.len());
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let db = Database::open_in_memory().unwrap();
        let result = db.conn().execute(
            "INSERT INTO Episodes (series_id, title, season, episode_number) VALUES (99, 'x', 1, 1)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_commit_batch() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("batch.db")).unwrap();
        let mut batch = CommitBatch::new(2);
        batch.start(&db).unwrap();
        assert!(!db.conn().is_autocommit());

        for name in ["Vulcan", "Andorian", "Tellarite"] {
            db.conn()
                .execute("INSERT INTO Species (name) VALUES (?1)", [name])
                .unwrap();
            batch.tick(&db).unwrap();
        }
        assert_eq!(batch.commits(), 1);
        batch.finish(&db).unwrap();
        assert_eq!(batch.commits(), 2);
        assert!(db.conn().is_autocommit());
    }

    #[test]
    fn test_top_actors() {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute_batch(
                "INSERT INTO Actors (actor_id, first_name, last_name) VALUES
                    (1, 'Jeffrey', 'Combs'), (2, 'Avery', 'Brooks');
                 INSERT INTO Characters (character_id, name) VALUES
                    (1, 'Weyoun'), (2, 'Brunt'), (3, 'Shran'), (4, 'Benjamin Sisko');
                 INSERT INTO Character_Actors (character_id, actor_id, series) VALUES
                    (1, 1, 'DS9'), (2, 1, 'DS9'), (3, 1, 'ENT'), (4, 2, 'DS9'),
                    (1, 1, NULL);",
            )
            .unwrap();
        let top = db.top_actors(5).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].name, "Jeffrey Combs");
        assert_eq!(top[0].characters, 3);
        assert_eq!(top[1].characters, 1);
    }

    #[test]
    fn test_series_lookup_by_title() {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute(
                "INSERT INTO Series (name) VALUES ('Star Trek: Deep Space Nine')",
                [],
            )
            .unwrap();
        assert!(db.series_id(SeriesCode::Ds9).unwrap().is_some());
        assert!(db.series_id(SeriesCode::Voy).unwrap().is_none());
        assert!(db.has_column("Series", "abbreviation").unwrap());
        assert!(!db.has_column("Series", "imdb_id").unwrap());
    }

    #[test]
    fn test_upsert_episode_by_natural_key() {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute("INSERT INTO Series (series_id, name) VALUES (1, 'Star Trek: Voyager')", [])
            .unwrap();
        let key = EpisodeKey {
            series_id: SeriesId::from_row(1),
            season: 3,
            episode_number: 26,
        };
        let (id, outcome) = db.upsert_episode(&Episode::new(key, "Scorpion")).unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);

        let dated = Episode::new(key, "Scorpion, Part I")
            .with_air_date(chrono::NaiveDate::from_ymd_opt(1997, 5, 21).unwrap());
        let (again, outcome) = db.upsert_episode(&dated).unwrap();
        assert_eq!(again, id);
        assert_eq!(outcome, UpsertOutcome::Updated(vec!["air_date".to_string()]));

        let title: String = db
            .conn()
            .query_row("SELECT title FROM Episodes", [], |r| r.get(0))
            .unwrap();
        assert_eq!(title, "Scorpion");
    }

    #[test]
    fn test_ships_keyed_by_registry() {
        let db = Database::open_in_memory().unwrap();
        let mut original = Ship::new("USS Enterprise");
        original.registry = Some("NCC-1701".to_string());
        let mut refit = Ship::new("USS Enterprise");
        refit.registry = Some("NCC-1701-D".to_string());

        let (a, _) = db.upsert_ship(&original).unwrap();
        let (b, outcome) = db.upsert_ship(&refit).unwrap();
        assert_ne!(a, b);
        assert_eq!(outcome, UpsertOutcome::Inserted);

        assert_eq!(db.find_ship("uss enterprise", Some("NCC-1701-D")).unwrap(), Some(b));
        assert_eq!(db.find_ship("USS Enterprise", None).unwrap(), Some(a));

        let mut classed = Ship::new("USS Enterprise");
        classed.registry = Some("NCC-1701".to_string());
        classed.class = Some("Constitution class".to_string());
        let (c, outcome) = db.upsert_ship(&classed).unwrap();
        assert_eq!(c, a);
        assert_eq!(outcome, UpsertOutcome::Updated(vec!["class".to_string()]));
    }
}
