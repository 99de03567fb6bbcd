//! Link pass: fill the associative tables from character and episode
//! detail records.

use serde_json::Value;

use starbase_core::model::{ActorId, CharacterId, EpisodeId, EpisodeKey};
use starbase_core::reconcile::{
    link_casting, link_pair, CastingLink, EntityKind, LinkOutcome, PairLink, Reconciled,
    Reconciler, RelationScope,
};
use starbase_core::schema::{CommitBatch, Database};
use starbase_core::taxonomy::SeriesCode;

use crate::error::{IngestError, IngestResult};
use crate::passes::seed::series_of;
use crate::passes::{contain, Describe, Driver};
use crate::record;
use crate::source::Endpoint;
use crate::stats::RunStats;

const LABEL: &str = "link";

impl Driver {
    /// Link characters to their performers, organizations and ships, and
    /// episodes to the characters appearing in them.
    ///
    /// Rows that are not stored yet are counted as not found and never
    /// trigger a detail request.
    pub async fn link(&self, db: &mut Database) -> IngestResult<RunStats> {
        let mut stats = RunStats::default();
        let mut batch = self.batch();
        batch.start(db)?;
        let result = self.link_all(db, &mut batch, &mut stats).await;
        batch.finish(db)?;
        result?;
        log::info!("Link complete: {stats}");
        Ok(stats)
    }

    async fn link_all(
        &self,
        db: &mut Database,
        batch: &mut CommitBatch,
        stats: &mut RunStats,
    ) -> IngestResult<()> {
        let characters = self.records(Endpoint::Character, stats).await;
        for rec in &characters {
            stats.processed += 1;
            let Some(uid) = record::text(rec, "uid") else {
                stats.skipped += 1;
                continue;
            };
            let character_id = match self.character_for(db, rec) {
                Ok(id) => id,
                Err(e) => {
                    contain(LABEL, &rec.describe(), e, stats)?;
                    continue;
                }
            };
            match self.source().detail(Endpoint::Character, uid).await {
                Ok(detail) => self.link_character(db, character_id, &detail, stats)?,
                Err(e) => contain(LABEL, &rec.describe(), e, stats)?,
            }
            batch.tick(db)?;
        }

        let episodes = self.records(Endpoint::Episode, stats).await;
        for rec in &episodes {
            stats.processed += 1;
            let Some(uid) = record::text(rec, "uid") else {
                stats.skipped += 1;
                continue;
            };
            let episode_id = match self.episode_for(db, rec) {
                Ok(id) => id,
                Err(e) => {
                    contain(LABEL, &rec.describe(), e, stats)?;
                    continue;
                }
            };
            match self.source().detail(Endpoint::Episode, uid).await {
                Ok(detail) => self.link_episode(db, episode_id, &detail, stats)?,
                Err(e) => contain(LABEL, &rec.describe(), e, stats)?,
            }
            batch.tick(db)?;
        }
        Ok(())
    }

    fn character_for(&self, db: &Database, rec: &Value) -> IngestResult<CharacterId> {
        let name = record::text(rec, "name").unwrap_or_default();
        Reconciler::new(db.conn(), self.aliases())
            .identify(EntityKind::Character, name)?
            .id()
            .map(CharacterId::from_row)
            .ok_or_else(|| IngestError::not_found("character", name))
    }

    fn episode_for(&self, db: &Database, rec: &Value) -> IngestResult<EpisodeId> {
        let title = record::text(rec, "title").unwrap_or_default();
        let reconciler = Reconciler::new(db.conn(), self.aliases());
        let key = match (
            series_of(db, &reconciler, rec)?,
            record::integer(rec, "seasonNumber"),
            record::integer(rec, "episodeNumber"),
        ) {
            (Some(series_id), Some(season), Some(episode_number)) => EpisodeKey {
                series_id,
                season,
                episode_number,
            },
            _ => return Err(IngestError::not_found("episode", title)),
        };
        db.episode_id(&key)?
            .ok_or_else(|| IngestError::not_found("episode", title))
    }

    /// Apply one character detail record. Each link is its own record for
    /// error handling: a missing actor does not stop the ship links.
    pub fn link_character(
        &self,
        db: &Database,
        character_id: CharacterId,
        detail: &Value,
        stats: &mut RunStats,
    ) -> IngestResult<()> {
        let reconciler = Reconciler::new(db.conn(), self.aliases());
        let episodes = record::list(detail, &["episodes"]);

        for performer in record::list(detail, &["performers"]) {
            let Some(name) = record::text(performer, "name") else {
                continue;
            };
            let result = cast_performer(db, &reconciler, character_id, name, performer, episodes);
            match result {
                Ok(outcomes) => outcomes.into_iter().for_each(|o| stats.cast(o)),
                Err(e) => contain(LABEL, name, e, stats)?,
            }
        }

        for org in record::list(detail, &["characterOrganizations", "organizations"]) {
            let Some(name) = record::text(org, "name") else {
                continue;
            };
            let result = reconciler
                .reconcile(EntityKind::Organization, name)
                .map_err(IngestError::from)
                .and_then(|r| found(r, "organization", name))
                .and_then(|id| {
                    Ok(link_pair(
                        db.conn(),
                        PairLink::CharacterOrganization,
                        character_id,
                        id,
                    )?)
                });
            match result {
                Ok(outcome) => stats.paired(outcome),
                Err(e) => contain(LABEL, name, e, stats)?,
            }
        }

        for ship in record::list(detail, &["characterSpacecrafts", "spacecrafts"]) {
            let Some(name) = record::text(ship, "name") else {
                continue;
            };
            let result = db
                .find_ship(name, record::text(ship, "registry"))
                .map_err(IngestError::from)
                .and_then(|id| id.ok_or_else(|| IngestError::not_found("spacecraft", name)))
                .and_then(|id| {
                    Ok(link_pair(
                        db.conn(),
                        PairLink::CharacterShip,
                        character_id,
                        id.get(),
                    )?)
                });
            match result {
                Ok(outcome) => stats.paired(outcome),
                Err(e) => contain(LABEL, name, e, stats)?,
            }
        }
        Ok(())
    }

    pub fn link_episode(
        &self,
        db: &Database,
        episode_id: EpisodeId,
        detail: &Value,
        stats: &mut RunStats,
    ) -> IngestResult<()> {
        let reconciler = Reconciler::new(db.conn(), self.aliases());
        for character in record::list(detail, &["characters"]) {
            let Some(name) = record::text(character, "name") else {
                continue;
            };
            let result = reconciler
                .identify(EntityKind::Character, name)
                .map_err(IngestError::from)
                .and_then(|r| found(r, "character", name))
                .and_then(|id| {
                    Ok(link_pair(
                        db.conn(),
                        PairLink::CharacterEpisode,
                        CharacterId::from_row(id),
                        episode_id.get(),
                    )?)
                });
            match result {
                Ok(outcome) => stats.paired(outcome),
                Err(e) => contain(LABEL, name, e, stats)?,
            }
        }
        Ok(())
    }
}

fn found(reconciled: Reconciled, entity: &str, name: &str) -> IngestResult<i64> {
    reconciled
        .id()
        .ok_or_else(|| IngestError::not_found(entity, name))
}

/// Record the casting of one performer, once per series they are credited
/// for. Series come from the performer's flags, falling back to the series
/// of the character's first-aired episode.
fn cast_performer(
    db: &Database,
    reconciler: &Reconciler<'_>,
    character_id: CharacterId,
    name: &str,
    performer: &Value,
    episodes: &[Value],
) -> IngestResult<Vec<LinkOutcome>> {
    let scope = RelationScope::actors_of_character(character_id.get());
    let actor_id = reconciler
        .reconcile_scoped(EntityKind::Actor, name, Some(&scope))
        .map_err(IngestError::from)
        .and_then(|r| found(r, "actor", name))
        .map(ActorId::from_row)?;

    let mut series = SeriesCode::from_performer_flags(performer);
    if series.is_empty() {
        series.extend(first_aired_series(episodes));
    }

    let base = CastingLink::new(character_id, actor_id);
    if series.is_empty() {
        return Ok(vec![link_casting(db.conn(), &base)?]);
    }

    series
        .into_iter()
        .map(|code| {
            let (first, last, count) = appearances(episodes, code);
            let link = base
                .clone()
                .with_series(code)
                .with_appearances(first, last, count);
            Ok(link_casting(db.conn(), &link)?)
        })
        .collect()
}

fn episode_series(episode: &Value) -> Option<SeriesCode> {
    episode
        .get("series")
        .and_then(|s| record::text(s, "title"))
        .and_then(SeriesCode::from_title)
}

/// Series of the earliest episode by `usAirDate`. Undated episodes only
/// count when nothing is dated.
fn first_aired_series(episodes: &[Value]) -> Option<SeriesCode> {
    episodes
        .iter()
        .filter_map(|e| Some((record::text(e, "usAirDate"), episode_series(e)?)))
        .min_by_key(|(aired, _)| (aired.is_none(), *aired))
        .map(|(_, code)| code)
}

/// First and last episode titles by air date, and the episode count, for
/// one series.
fn appearances(episodes: &[Value], code: SeriesCode) -> (Option<String>, Option<String>, Option<i64>) {
    let mut in_series: Vec<&Value> = episodes
        .iter()
        .filter(|e| episode_series(e) == Some(code))
        .collect();
    if in_series.is_empty() {
        return (None, None, None);
    }
    let aired = |e: &Value| record::text(e, "usAirDate").unwrap_or_default().to_string();
    in_series.sort_by(|a, b| aired(a).cmp(&aired(b)));
    let title = |e: Option<&&Value>| e.and_then(|e| record::text(e, "title")).map(str::to_string);
    (
        title(in_series.first()),
        title(in_series.last()),
        i64::try_from(in_series.len()).ok(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::FixtureSource;
    use serde_json::json;
    use starbase_core::reconcile::AliasTable;
    use std::sync::Arc;

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute_batch(
                "INSERT INTO Series (series_id, name, abbreviation) VALUES
                    (1, 'Star Trek: Voyager', 'VOY'), (2, 'Star Trek: Picard', 'PIC');
                 INSERT INTO Episodes (episode_id, series_id, title, season, episode_number) VALUES
                    (1, 1, 'Scorpion, Part II', 4, 1), (2, 1, 'Endgame', 7, 25);
                 INSERT INTO Actors (actor_id, first_name, last_name) VALUES (1, 'Jeri', 'Ryan');
                 INSERT INTO Characters (character_id, name) VALUES (1, 'Seven of Nine');
                 INSERT INTO Organizations (organization_id, name) VALUES (1, 'Fenris Rangers');
                 INSERT INTO Ships (ship_id, name, registry) VALUES (1, 'USS Voyager', 'NCC-74656');",
            )
            .unwrap();
        db
    }

    fn voyager_episode(title: &str, aired: &str) -> Value {
        json!({"title": title, "usAirDate": aired, "series": {"title": "Star Trek: Voyager"}})
    }

    fn seven_detail() -> Value {
        json!({
            "uid": "CHMA1",
            "name": "Seven of Nine",
            "performers": [
                {"name": "Jeri Ryan", "voyPerformer": true},
                {"name": "Unknown Stand-in"}
            ],
            "episodes": [
                voyager_episode("Endgame", "2001-05-23"),
                voyager_episode("Scorpion, Part II", "1997-09-03"),
            ],
            "organizations": [{"name": "Fenris Rangers"}, {"name": "Borg Collective"}],
            "characterSpacecrafts": [{"name": "USS Voyager", "registry": "NCC-74656"}]
        })
    }

    fn source() -> FixtureSource {
        FixtureSource::new()
            .with_records(
                Endpoint::Character,
                vec![
                    json!({"uid": "CHMA1", "name": "Seven of Nine"}),
                    json!({"uid": "CHMA2", "name": "Not Stored"}),
                ],
            )
            .with_detail(Endpoint::Character, "CHMA1", seven_detail())
            .with_records(
                Endpoint::Episode,
                vec![json!({
                    "uid": "EPMA1", "title": "Endgame", "seasonNumber": 7, "episodeNumber": 25,
                    "series": {"title": "Star Trek: Voyager"}
                })],
            )
            .with_detail(
                Endpoint::Episode,
                "EPMA1",
                json!({"characters": [{"name": "Seven of Nine"}]}),
            )
    }

    #[tokio::test]
    async fn test_link_pass() {
        let mut db = setup();
        let source = Arc::new(source());
        let driver = Driver::new(source.clone(), AliasTable::default());

        let stats = driver.link(&mut db).await.unwrap();
        // Seven's detail plus the episode detail; the unknown character is
        // resolved locally and never fetched.
        assert_eq!(source.detail_calls(), 2);
        assert_eq!(stats.linked, 4);
        assert_eq!(stats.not_found, 3);

        let (series, first, last, count): (String, String, String, i64) = db
            .conn()
            .query_row(
                "SELECT series, first_appearance, last_appearance, episodes_count
                 FROM Character_Actors",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap();
        assert_eq!(series, "VOY");
        assert_eq!(first, "Scorpion, Part II");
        assert_eq!(last, "Endgame");
        assert_eq!(count, 2);

        let again = driver.link(&mut db).await.unwrap();
        assert_eq!(again.linked, 0);
        assert_eq!(again.unchanged, 4);
    }

    #[tokio::test]
    async fn test_transient_detail_failure_is_counted() {
        let mut db = setup();
        let source = FixtureSource::new()
            .with_records(
                Endpoint::Character,
                vec![json!({"uid": "CHMA1", "name": "Seven of Nine"})],
            )
            .with_failing_detail(Endpoint::Character, "CHMA1");
        let driver = Driver::new(Arc::new(source), AliasTable::default());

        let stats = driver.link(&mut db).await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.linked, 0);
    }

    #[test]
    fn test_series_falls_back_to_episodes() {
        let db = setup();
        let driver = Driver::new(Arc::new(FixtureSource::new()), AliasTable::default());
        let detail = json!({
            "performers": [{"name": "Jeri Ryan"}],
            "episodes": [voyager_episode("Endgame", "2001-05-23")]
        });
        let mut stats = RunStats::default();
        driver
            .link_character(&db, CharacterId::from_row(1), &detail, &mut stats)
            .unwrap();
        assert_eq!(stats.linked, 1);
        let series: String = db
            .conn()
            .query_row("SELECT series FROM Character_Actors", [], |r| r.get(0))
            .unwrap();
        assert_eq!(series, "VOY");
    }

    #[test]
    fn test_fallback_series_is_first_aired() {
        let episodes = [
            json!({"title": "Et in Arcadia Ego", "usAirDate": "2020-03-19",
                   "series": {"title": "Star Trek: Picard"}}),
            json!({"title": "Untitled", "series": {"title": "Star Trek: Enterprise"}}),
            voyager_episode("Scorpion, Part II", "1997-09-03"),
        ];
        assert_eq!(first_aired_series(&episodes), Some(SeriesCode::Voy));
        assert_eq!(first_aired_series(&episodes[1..2]), Some(SeriesCode::Ent));
        assert_eq!(first_aired_series(&[]), None);
    }

    #[tokio::test]
    async fn test_episode_characters_are_not_matched_by_containment() {
        let mut db = setup();
        let source = FixtureSource::new()
            .with_records(
                Endpoint::Character,
                vec![json!({"uid": "CHMA9", "name": "Seven"})],
            )
            .with_records(
                Endpoint::Episode,
                vec![json!({
                    "uid": "EPMA1", "title": "Endgame", "seasonNumber": 7, "episodeNumber": 25,
                    "series": {"title": "Star Trek: Voyager"}
                })],
            )
            .with_detail(
                Endpoint::Episode,
                "EPMA1",
                json!({"characters": [{"name": "Seven of Nine (future)"}]}),
            );
        let source = Arc::new(source);
        let driver = Driver::new(source.clone(), AliasTable::default());

        let stats = driver.link(&mut db).await.unwrap();
        // "Seven" is not stored under that name, and the future Seven is a
        // separate character; neither resolves to Seven of Nine.
        assert_eq!(source.detail_calls(), 1);
        assert_eq!(stats.not_found, 2);
        assert_eq!(stats.linked, 0);
        let linked: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM Character_Episodes", [], |r| r.get(0))
            .unwrap();
        assert_eq!(linked, 0);
    }

    #[test]
    fn test_appearances_for_other_series_are_empty() {
        let episodes = [voyager_episode("Endgame", "2001-05-23")];
        assert_eq!(appearances(&episodes, SeriesCode::Pic), (None, None, None));
    }
}
