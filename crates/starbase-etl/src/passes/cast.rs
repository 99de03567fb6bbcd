//! Cast pass: pick each character's primary actor from a curated list of
//! regular cast members.

use serde::{Deserialize, Serialize};
use std::path::Path;

use starbase_core::model::{ActorId, CharacterId};
use starbase_core::reconcile::{
    link_casting, merge_fill_if_null, AliasTable, CastingLink, Delta, EntityKind, Reconciler,
    RelationScope,
};
use starbase_core::schema::{ensure_column, ColumnChange, ColumnSpec, CommitBatch, Database};
use starbase_core::taxonomy::SeriesCode;

use crate::error::{IngestError, IngestResult};
use crate::passes::{apply_all, Describe};
use crate::stats::RunStats;

/// One regular-cast credit: `{"series": "TNG", "actor": "...", "character": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastEntry {
    pub series: String,
    pub actor: String,
    pub character: String,
}

impl CastEntry {
    /// Read a JSON array of entries.
    pub fn load_all(path: &Path) -> IngestResult<Vec<Self>> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| IngestError::Input(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| IngestError::Input(format!("{}: {e}", path.display())))
    }
}

impl Describe for CastEntry {
    fn describe(&self) -> String {
        format!("{} as {} ({})", self.actor, self.character, self.series)
    }
}

/// Set `Characters.primary_actor_id` for every entry, adding the column if
/// the database predates it, and record the casting itself.
///
/// The actor is matched with the relationship tier scoped to the
/// character, so "Jonathan Frakes" finds an actor stored as "Jonathan
/// Scott Frakes" once the two are linked. An already assigned primary
/// actor is kept.
pub fn apply_cast(
    db: &Database,
    aliases: &AliasTable,
    entries: &[CastEntry],
    commit_every: usize,
) -> IngestResult<RunStats> {
    let column = ColumnSpec::new("primary_actor_id", "INTEGER");
    if ensure_column(db.conn(), "Characters", &column)? == ColumnChange::Added {
        log::info!("Added Characters.primary_actor_id");
    }

    let reconciler = Reconciler::new(db.conn(), aliases);
    apply_all(
        db,
        CommitBatch::new(commit_every),
        "cast",
        entries,
        |entry, stats| {
            let character_id = reconciler
                .reconcile(EntityKind::Character, &entry.character)?
                .id()
                .map(CharacterId::from_row)
                .ok_or_else(|| IngestError::not_found("character", entry.character.as_str()))?;
            let scope = RelationScope::actors_of_character(character_id.get());
            let actor_id = reconciler
                .reconcile_scoped(EntityKind::Actor, &entry.actor, Some(&scope))?
                .id()
                .map(ActorId::from_row)
                .ok_or_else(|| IngestError::not_found("actor", entry.actor.as_str()))?;

            let primary = Delta::new().integer("primary_actor_id", Some(actor_id.get()));
            let changed = merge_fill_if_null(
                db.conn(),
                "Characters",
                "character_id",
                character_id.get(),
                &primary,
            )?;
            stats.filled(&changed);

            let mut link = CastingLink::new(character_id, actor_id);
            match entry.series.parse::<SeriesCode>() {
                Ok(code) => link = link.with_series(code),
                Err(_) => log::warn!("cast: unknown series '{}'", entry.series),
            }
            stats.cast(link_casting(db.conn(), &link)?);
            Ok(())
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute_batch(
                "INSERT INTO Actors (actor_id, first_name, last_name) VALUES
                    (1, 'Patrick', 'Stewart'), (2, 'Leonard', 'Nimoy'), (3, 'Zachary', 'Quinto');
                 INSERT INTO Characters (character_id, name) VALUES
                    (1, 'Jean-Luc Picard'), (2, 'Spock');",
            )
            .unwrap();
        db
    }

    fn entry(series: &str, actor: &str, character: &str) -> CastEntry {
        CastEntry {
            series: series.to_string(),
            actor: actor.to_string(),
            character: character.to_string(),
        }
    }

    fn primary(db: &Database, character: &str) -> Option<i64> {
        db.conn()
            .query_row(
                "SELECT primary_actor_id FROM Characters WHERE name = ?1",
                [character],
                |r| r.get(0),
            )
            .unwrap()
    }

    #[test]
    fn test_first_credit_wins() {
        let db = setup();
        let entries = [
            entry("TOS", "Leonard Nimoy", "Spock"),
            entry("SNW", "Ethan Peck", "Spock"),
            entry("TNG", "Patrick Stewart", "Jean-Luc Picard"),
            entry("TNG", "Patrick Stewart", "Jean-Luc Picard"),
        ];
        let stats = apply_cast(&db, &AliasTable::default(), &entries, 10).unwrap();

        assert!(db.has_column("Characters", "primary_actor_id").unwrap());
        assert_eq!(primary(&db, "Spock"), Some(2));
        assert_eq!(primary(&db, "Jean-Luc Picard"), Some(1));
        assert_eq!(stats.processed, 4);
        assert_eq!(stats.not_found, 1);
        assert_eq!(stats.linked, 2);

        let series: String = db
            .conn()
            .query_row(
                "SELECT series FROM Character_Actors WHERE character_id = 2",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(series, "TOS");
    }

    #[test]
    fn test_rerun_keeps_assignment() {
        let db = setup();
        let aliases = AliasTable::default();
        apply_cast(&db, &aliases, &[entry("TOS", "Leonard Nimoy", "Spock")], 10).unwrap();
        let stats = apply_cast(&db, &aliases, &[entry("DIS", "Zachary Quinto", "Spock")], 10).unwrap();
        assert_eq!(primary(&db, "Spock"), Some(2));
        assert_eq!(stats.linked, 1);
    }

    #[test]
    fn test_load_all() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cast.json");
        std::fs::write(
            &path,
            r#"[{"series": "DS9", "actor": "Avery Brooks", "character": "Benjamin Sisko"}]"#,
        )
        .unwrap();
        let entries = CastEntry::load_all(&path).unwrap();
        assert_eq!(entries[0].character, "Benjamin Sisko");

        std::fs::write(&path, "{").unwrap();
        assert!(matches!(
            CastEntry::load_all(&path),
            Err(IngestError::Input(_))
        ));
    }
}
