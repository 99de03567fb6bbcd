//! Seed pass: create the core rows from the source's search listings.

use serde_json::Value;

use starbase_core::model::{
    Actor, Character, Episode, EpisodeKey, Organization, Series, SeriesId, Ship, Species,
};
use starbase_core::reconcile::{EntityKind, Reconciled, Reconciler};
use starbase_core::schema::Database;
use starbase_core::taxonomy::{OrgKind, SeriesCode};

use crate::error::{IngestError, IngestResult};
use crate::passes::{apply_all, Driver};
use crate::record;
use crate::source::Endpoint;
use crate::stats::RunStats;

/// Endpoints in the order their rows can reference each other.
pub const SEED_ORDER: [Endpoint; 7] = [
    Endpoint::Series,
    Endpoint::Species,
    Endpoint::Organization,
    Endpoint::Performer,
    Endpoint::Character,
    Endpoint::Spacecraft,
    Endpoint::Episode,
];

impl Driver {
    /// Insert every listed series, species, organization, performer,
    /// character, spacecraft and episode that is not stored yet, filling
    /// blank columns of the ones that are.
    pub async fn seed(&self, db: &mut Database) -> IngestResult<RunStats> {
        let mut total = RunStats::default();
        for endpoint in SEED_ORDER {
            let records = self.records(endpoint, &mut total).await;
            let stats = self.seed_records(db, endpoint, &records)?;
            total.absorb(&stats);
        }
        log::info!("Seed complete: {total}");
        Ok(total)
    }

    /// Apply one endpoint's listing.
    pub fn seed_records(
        &self,
        db: &Database,
        endpoint: Endpoint,
        records: &[Value],
    ) -> IngestResult<RunStats> {
        let reconciler = Reconciler::new(db.conn(), self.aliases());
        let label = format!("seed {endpoint}");
        apply_all(db, self.batch(), &label, records, |rec, stats| {
            seed_one(db, &reconciler, endpoint, rec, stats)
        })
    }
}

fn seed_one(
    db: &Database,
    reconciler: &Reconciler<'_>,
    endpoint: Endpoint,
    rec: &Value,
    stats: &mut RunStats,
) -> IngestResult<()> {
    let Some(name) = record::text(rec, endpoint.name_field()) else {
        stats.skipped += 1;
        return Ok(());
    };

    match endpoint {
        Endpoint::Series => {
            let upserted =
                reconciler.upsert_by_name(EntityKind::Series, name, &series(name, rec).delta())?;
            stats.upserted(&upserted.outcome);
        }
        Endpoint::Species => {
            let upserted =
                reconciler.upsert_by_name(EntityKind::Species, name, &species(name, rec).delta())?;
            stats.upserted(&upserted.outcome);
        }
        Endpoint::Organization => {
            let mut org = Organization::new(name);
            org.kind = OrgKind::from_flags(rec);
            let upserted =
                reconciler.upsert_by_name(EntityKind::Organization, name, &org.delta())?;
            stats.upserted(&upserted.outcome);
        }
        Endpoint::Performer => {
            let actor = performer(name, rec);
            let upserted = reconciler.upsert_by_name(EntityKind::Actor, name, &actor.delta())?;
            if let Some(tier) = upserted.tier {
                log::debug!("performer '{name}' matched {tier}");
            }
            stats.upserted(&upserted.outcome);
        }
        Endpoint::Character => {
            let mut character = Character::new(name);
            character.gender = record::text(rec, "gender").map(str::to_string);
            character.birth_year = record::integer(rec, "yearOfBirth");
            character.death_year = record::integer(rec, "yearOfDeath");
            let upserted =
                reconciler.upsert_by_name(EntityKind::Character, name, &character.delta())?;
            stats.upserted(&upserted.outcome);
        }
        Endpoint::Spacecraft => {
            let mut ship = Ship::new(name);
            ship.registry = record::text(rec, "registry").map(str::to_string);
            ship.class = record::nested_name(rec, "spacecraftClass").map(str::to_string);
            ship.organization_id = ["owner", "operator"]
                .iter()
                .filter_map(|k| record::nested_name(rec, k))
                .find_map(|org| {
                    reconciler
                        .reconcile(EntityKind::Organization, org)
                        .ok()
                        .and_then(Reconciled::id)
                })
                .map(starbase_core::model::OrganizationId::from_row);
            let (_, outcome) = db.upsert_ship(&ship)?;
            stats.upserted(&outcome);
        }
        Endpoint::Episode => {
            let Some(episode) = episode(db, reconciler, name, rec)? else {
                stats.skipped += 1;
                return Ok(());
            };
            let (_, outcome) = db.upsert_episode(&episode)?;
            stats.upserted(&outcome);
        }
    }
    Ok(())
}

fn series(title: &str, rec: &Value) -> Series {
    let mut series = Series::new(title);
    if let Some(code) = record::text(rec, "abbreviation").and_then(|a| a.parse().ok()) {
        series.code = Some(code);
    }
    series.start_year = record::integer(rec, "productionStartYear");
    series.end_year = record::integer(rec, "productionEndYear");
    series.num_seasons = record::integer(rec, "seasonsCount");
    series.num_episodes = record::integer(rec, "episodesCount");
    series
}

fn species(name: &str, rec: &Value) -> Species {
    let mut species = Species::new(name);
    species.homeworld = record::nested_name(rec, "homeworld").map(str::to_string);
    species.warp_capable = rec.get("warpCapableSpecies").and_then(Value::as_bool);
    species
}

/// Performer records spell the birth fields two ways.
pub(crate) fn performer(name: &str, rec: &Value) -> Actor {
    let mut actor = Actor::from_display_name(name);
    actor.birth_date = record::date(rec, "birthDate").or_else(|| record::date(rec, "dateOfBirth"));
    actor.birth_place = record::text(rec, "placeOfBirth").map(str::to_string);
    actor
}

/// The series a record belongs to, from its nested `series.title`.
pub(crate) fn series_of(
    db: &Database,
    reconciler: &Reconciler<'_>,
    rec: &Value,
) -> IngestResult<Option<SeriesId>> {
    let Some(title) = rec.get("series").and_then(|s| record::text(s, "title")) else {
        return Ok(None);
    };
    if let Some(code) = SeriesCode::from_title(title) {
        if let Some(id) = db.series_id(code)? {
            return Ok(Some(id));
        }
    }
    Ok(reconciler
        .reconcile(EntityKind::Series, title)?
        .id()
        .map(SeriesId::from_row))
}

/// Films and specials carry no season or episode number and are skipped.
fn episode(
    db: &Database,
    reconciler: &Reconciler<'_>,
    title: &str,
    rec: &Value,
) -> IngestResult<Option<Episode>> {
    let (Some(season), Some(episode_number)) = (
        record::integer(rec, "seasonNumber"),
        record::integer(rec, "episodeNumber"),
    ) else {
        return Ok(None);
    };
    let Some(series_id) = series_of(db, reconciler, rec)? else {
        let series = rec
            .get("series")
            .and_then(|s| record::text(s, "title"))
            .unwrap_or("<none>");
        return Err(IngestError::not_found("series", series));
    };

    let mut episode = Episode::new(
        EpisodeKey {
            series_id,
            season,
            episode_number,
        },
        title,
    );
    episode.air_date = record::date(rec, "usAirDate");
    Ok(Some(episode))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::FixtureSource;
    use serde_json::json;
    use starbase_core::reconcile::AliasTable;
    use std::sync::Arc;

    fn driver(source: FixtureSource) -> Driver {
        Driver::new(Arc::new(source), AliasTable::default())
    }

    fn count(db: &Database, table: &str) -> i64 {
        db.conn()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .unwrap()
    }

    fn source() -> FixtureSource {
        FixtureSource::new()
            .with_records(
                Endpoint::Series,
                vec![json!({
                    "uid": "SEMA1", "title": "Star Trek: Deep Space Nine",
                    "abbreviation": "DS9", "productionStartYear": 1993,
                    "productionEndYear": 1999, "seasonsCount": 7, "episodesCount": 176
                })],
            )
            .with_records(
                Endpoint::Organization,
                vec![json!({"uid": "ORMA1", "name": "Bajoran Militia", "militaryOrganization": true})],
            )
            .with_records(
                Endpoint::Performer,
                vec![json!({"uid": "PEMA1", "name": "Nana Visitor", "birthDate": "1957-07-26"})],
            )
            .with_records(
                Endpoint::Character,
                vec![
                    json!({"uid": "CHMA1", "name": "Kira Nerys", "gender": "F"}),
                    json!({"uid": "CHMA2"}),
                ],
            )
            .with_records(
                Endpoint::Spacecraft,
                vec![json!({
                    "uid": "SRMA1", "name": "USS Defiant", "registry": "NX-74205",
                    "spacecraftClass": {"name": "Defiant class"}
                })],
            )
            .with_records(
                Endpoint::Episode,
                vec![
                    json!({
                        "uid": "EPMA1", "title": "Emissary", "seasonNumber": 1,
                        "episodeNumber": 1, "usAirDate": "1993-01-03",
                        "series": {"title": "Star Trek: Deep Space Nine"}
                    }),
                    json!({"uid": "EPMA2", "title": "Star Trek: First Contact"}),
                ],
            )
    }

    #[tokio::test]
    async fn test_seed_inserts_then_is_idempotent() {
        let mut db = Database::open_in_memory().unwrap();
        let driver = driver(source());

        let first = driver.seed(&mut db).await.unwrap();
        assert_eq!(first.inserted, 6);
        assert_eq!(first.skipped, 2);
        assert_eq!(count(&db, "Episodes"), 1);

        let second = driver.seed(&mut db).await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.unchanged, 6);
        assert_eq!(count(&db, "Actors"), 1);

        let (abbr, seasons): (String, i64) = db
            .conn()
            .query_row("SELECT abbreviation, num_seasons FROM Series", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!((abbr.as_str(), seasons), ("DS9", 7));

        let kind: String = db
            .conn()
            .query_row("SELECT type FROM Organizations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(kind, "military");
    }

    #[tokio::test]
    async fn test_accented_performer_merges() {
        let mut db = Database::open_in_memory().unwrap();
        db.conn()
            .execute(
                "INSERT INTO Actors (first_name, last_name) VALUES ('René', 'Auberjonois')",
                [],
            )
            .unwrap();
        let driver = driver(FixtureSource::new().with_records(
            Endpoint::Performer,
            vec![json!({"name": "Rene Auberjonois", "birthDate": "1940-06-01"})],
        ));

        let stats = driver.seed(&mut db).await.unwrap();
        assert_eq!(stats.updated, 1);
        assert_eq!(count(&db, "Actors"), 1);
        let born: String = db
            .conn()
            .query_row("SELECT birth_date FROM Actors", [], |r| r.get(0))
            .unwrap();
        assert_eq!(born, "1940-06-01");
    }

    #[tokio::test]
    async fn test_episode_of_unknown_series_is_not_found() {
        let mut db = Database::open_in_memory().unwrap();
        let driver = driver(FixtureSource::new().with_records(
            Endpoint::Episode,
            vec![json!({
                "title": "Caretaker", "seasonNumber": 1, "episodeNumber": 1,
                "series": {"title": "Star Trek: Voyager"}
            })],
        ));
        let stats = driver.seed(&mut db).await.unwrap();
        assert_eq!(stats.not_found, 1);
        assert_eq!(count(&db, "Episodes"), 0);
    }

    #[tokio::test]
    async fn test_characters_containing_known_names_are_inserted() {
        let mut db = Database::open_in_memory().unwrap();
        let driver = driver(FixtureSource::new().with_records(
            Endpoint::Character,
            vec![
                json!({"name": "Odo"}),
                json!({"name": "Odo's mother", "gender": "F"}),
                json!({"name": "Data"}),
                json!({"name": "Data (mirror)", "yearOfBirth": 2400}),
            ],
        ));

        let stats = driver.seed(&mut db).await.unwrap();
        assert_eq!(stats.inserted, 4);
        assert_eq!(stats.updated, 0);

        let mut stmt = db
            .conn()
            .prepare("SELECT name, gender, birth_year FROM Characters ORDER BY character_id")
            .unwrap();
        let rows: Vec<(String, Option<String>, Option<i64>)> = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            rows,
            vec![
                ("Odo".to_string(), None, None),
                ("Odo's mother".to_string(), Some("F".to_string()), None),
                ("Data".to_string(), None, None),
                ("Data (mirror)".to_string(), None, Some(2400)),
            ]
        );
    }
}
