//! Writes to the associative tables.
//!
//! `Character_Actors` rows are keyed by (character, actor, series). A row
//! with no series is a placeholder written by a pass that knew the pairing
//! but not the series; a later, better-informed pass claims it instead of
//! adding a sibling row.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::ids::{ActorId, CharacterId};
use crate::reconcile::merge::{merge_fill_if_null, Delta};
use crate::taxonomy::SeriesCode;

const CASTING_TABLE: &str = "Character_Actors";
const CASTING_ID: &str = "character_actor_id";

/// One (character, actor, series) casting fact plus optional details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastingLink {
    pub character_id: CharacterId,
    pub actor_id: ActorId,
    pub series: Option<SeriesCode>,
    pub first_appearance: Option<String>,
    pub last_appearance: Option<String>,
    pub episodes_count: Option<i64>,
}

impl CastingLink {
    #[must_use]
    pub const fn new(character_id: CharacterId, actor_id: ActorId) -> Self {
        Self {
            character_id,
            actor_id,
            series: None,
            first_appearance: None,
            last_appearance: None,
            episodes_count: None,
        }
    }

    #[must_use]
    pub const fn with_series(mut self, series: SeriesCode) -> Self {
        self.series = Some(series);
        self
    }

    #[must_use]
    pub fn with_appearances(
        mut self,
        first: Option<String>,
        last: Option<String>,
        episodes_count: Option<i64>,
    ) -> Self {
        self.first_appearance = first;
        self.last_appearance = last;
        self.episodes_count = episodes_count;
        self
    }

    fn details(&self) -> Delta {
        Delta::new()
            .text("first_appearance", self.first_appearance.as_deref())
            .text("last_appearance", self.last_appearance.as_deref())
            .integer("episodes_count", self.episodes_count)
    }
}

/// What [`link_casting`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Inserted,
    /// An existing row for the same key received new details.
    Updated,
    /// A placeholder row without a series was given this link's series.
    ClaimedBlank,
    Unchanged,
}

/// Record a casting, choosing between insert, update and skip.
///
/// With a series: merge into the row for that series if there is one,
/// otherwise claim the pair's blank row, otherwise insert. Without a
/// series: merge into the blank row if there is one, do nothing if the pair
/// is already linked under some series, otherwise insert a blank row.
pub fn link_casting(conn: &Connection, link: &CastingLink) -> Result<LinkOutcome> {
    link_casting_inner(conn, link).map_err(|e| {
        e.with_integrity_context(format!(
            "{CASTING_TABLE} ({}, {}, {})",
            link.character_id,
            link.actor_id,
            link.series.map_or("-", SeriesCode::as_str)
        ))
    })
}

fn link_casting_inner(conn: &Connection, link: &CastingLink) -> Result<LinkOutcome> {
    let details = link.details();

    if let Some(series) = link.series {
        let same_series: Option<i64> = conn
            .query_row(
                "SELECT character_actor_id FROM Character_Actors
                 WHERE character_id = ?1 AND actor_id = ?2 AND series = ?3
                 ORDER BY character_actor_id LIMIT 1",
                params![link.character_id, link.actor_id, series.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = same_series {
            return merged(conn, id, &details);
        }

        if let Some(id) = blank_row(conn, link)? {
            conn.execute(
                "UPDATE Character_Actors SET series = ?1 WHERE character_actor_id = ?2",
                params![series.as_str(), id],
            )?;
            merge_fill_if_null(conn, CASTING_TABLE, CASTING_ID, id, &details)?;
            return Ok(LinkOutcome::ClaimedBlank);
        }

        insert_row(conn, link, Some(series.as_str()), &details)?;
        return Ok(LinkOutcome::Inserted);
    }

    if let Some(id) = blank_row(conn, link)? {
        return merged(conn, id, &details);
    }

    let any: i64 = conn.query_row(
        "SELECT COUNT(*) FROM Character_Actors WHERE character_id = ?1 AND actor_id = ?2",
        params![link.character_id, link.actor_id],
        |row| row.get(0),
    )?;
    if any > 0 {
        return Ok(LinkOutcome::Unchanged);
    }

    insert_row(conn, link, None, &details)?;
    Ok(LinkOutcome::Inserted)
}

fn blank_row(conn: &Connection, link: &CastingLink) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT character_actor_id FROM Character_Actors
             WHERE character_id = ?1 AND actor_id = ?2 AND (series IS NULL OR series = '')
             ORDER BY character_actor_id LIMIT 1",
            params![link.character_id, link.actor_id],
            |row| row.get(0),
        )
        .optional()?)
}

fn merged(conn: &Connection, id: i64, details: &Delta) -> Result<LinkOutcome> {
    let changed = merge_fill_if_null(conn, CASTING_TABLE, CASTING_ID, id, details)?;
    Ok(if changed.is_empty() {
        LinkOutcome::Unchanged
    } else {
        LinkOutcome::Updated
    })
}

fn insert_row(
    conn: &Connection,
    link: &CastingLink,
    series: Option<&str>,
    details: &Delta,
) -> Result<()> {
    let mut row = Delta::new()
        .integer("character_id", Some(link.character_id.get()))
        .integer("actor_id", Some(link.actor_id.get()))
        .text("series", series);
    for (column, value) in details.iter() {
        row = row.value(column, value);
    }
    row.insert(conn, CASTING_TABLE)?;
    Ok(())
}

/// The pair-keyed associative tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PairLink {
    CharacterEpisode,
    CharacterOrganization,
    CharacterShip,
}

impl PairLink {
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::CharacterEpisode => "Character_Episodes",
            Self::CharacterOrganization => "Character_Organizations",
            Self::CharacterShip => "Character_Ships",
        }
    }

    #[must_use]
    pub const fn other_column(self) -> &'static str {
        match self {
            Self::CharacterEpisode => "episode_id",
            Self::CharacterOrganization => "organization_id",
            Self::CharacterShip => "ship_id",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairOutcome {
    Inserted,
    AlreadyPresent,
}

/// Link a character to an episode, organization or ship. Re-linking an
/// existing pair is a no-op.
pub fn link_pair(
    conn: &Connection,
    kind: PairLink,
    character_id: CharacterId,
    other_id: i64,
) -> Result<PairOutcome> {
    let sql = format!(
        "INSERT OR IGNORE INTO {} (character_id, {}) VALUES (?1, ?2)",
        kind.table(),
        kind.other_column()
    );
    let rows = conn
        .execute(&sql, params![character_id, other_id])
        .map_err(|e| {
            Error::from(e).with_integrity_context(format!(
                "{} ({character_id}, {other_id})",
                kind.table()
            ))
        })?;
    Ok(if rows > 0 {
        PairOutcome::Inserted
    } else {
        PairOutcome::AlreadyPresent
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Database;

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute_batch(
                "INSERT INTO Actors (actor_id, first_name, last_name) VALUES (1, 'Jeri', 'Ryan');
                 INSERT INTO Characters (character_id, name) VALUES (1, 'Seven of Nine');
                 INSERT INTO Organizations (organization_id, name) VALUES (1, 'Fenris Rangers');",
            )
            .unwrap();
        db
    }

    fn count(db: &Database) -> i64 {
        db.conn()
            .query_row("SELECT COUNT(*) FROM Character_Actors", [], |r| r.get(0))
            .unwrap()
    }

    fn seven() -> CastingLink {
        CastingLink::new(CharacterId::from_row(1), ActorId::from_row(1))
    }

    #[test]
    fn test_blank_row_is_claimed_then_second_series_added() {
        let db = setup();
        let conn = db.conn();

        assert_eq!(link_casting(conn, &seven()).unwrap(), LinkOutcome::Inserted);
        assert_eq!(link_casting(conn, &seven()).unwrap(), LinkOutcome::Unchanged);

        let voy = seven().with_series(SeriesCode::Voy);
        assert_eq!(link_casting(conn, &voy).unwrap(), LinkOutcome::ClaimedBlank);
        assert_eq!(count(&db), 1);

        let pic = seven().with_series(SeriesCode::Pic);
        assert_eq!(link_casting(conn, &pic).unwrap(), LinkOutcome::Inserted);
        assert_eq!(link_casting(conn, &pic).unwrap(), LinkOutcome::Unchanged);
        assert_eq!(count(&db), 2);

        // The pair is already linked, so a series-less link adds nothing.
        assert_eq!(link_casting(conn, &seven()).unwrap(), LinkOutcome::Unchanged);
        assert_eq!(count(&db), 2);
    }

    #[test]
    fn test_details_fill_once() {
        let db = setup();
        let conn = db.conn();
        let voy = seven()
            .with_series(SeriesCode::Voy)
            .with_appearances(Some("Scorpion, Part II".to_string()), None, Some(100));
        assert_eq!(link_casting(conn, &voy).unwrap(), LinkOutcome::Inserted);

        let later = seven()
            .with_series(SeriesCode::Voy)
            .with_appearances(None, Some("Endgame".to_string()), Some(3));
        assert_eq!(link_casting(conn, &later).unwrap(), LinkOutcome::Updated);

        let (last, episodes): (String, i64) = conn
            .query_row(
                "SELECT last_appearance, episodes_count FROM Character_Actors",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(last, "Endgame");
        assert_eq!(episodes, 100);
    }

    #[test]
    fn test_duplicate_triple_rejected_by_index() {
        let db = setup();
        let conn = db.conn();
        conn.execute(
            "INSERT INTO Character_Actors (character_id, actor_id, series) VALUES (1, 1, 'VOY')",
            [],
        )
        .unwrap();
        let err: Error = conn
            .execute(
                "INSERT INTO Character_Actors (character_id, actor_id, series) VALUES (1, 1, 'VOY')",
                [],
            )
            .unwrap_err()
            .into();
        assert!(matches!(
            err.with_integrity_context("t"),
            Error::Integrity { .. }
        ));
    }

    #[test]
    fn test_link_pair_is_idempotent() {
        let db = setup();
        let conn = db.conn();
        let seven = CharacterId::from_row(1);
        assert_eq!(
            link_pair(conn, PairLink::CharacterOrganization, seven, 1).unwrap(),
            PairOutcome::Inserted
        );
        assert_eq!(
            link_pair(conn, PairLink::CharacterOrganization, seven, 1).unwrap(),
            PairOutcome::AlreadyPresent
        );
    }

    #[test]
    fn test_link_pair_to_missing_row_is_integrity_error() {
        let db = setup();
        let err = link_pair(db.conn(), PairLink::CharacterShip, CharacterId::from_row(1), 99)
            .unwrap_err();
        assert!(matches!(err, Error::Integrity { .. }));
    }
}
