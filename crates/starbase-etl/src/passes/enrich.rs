//! Enrich pass: fill blank attributes of stored rows from detail records.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use starbase_core::model::SpeciesId;
use starbase_core::reconcile::{merge_fill_if_null, Delta, EntityKind, Reconciler};
use starbase_core::schema::{CommitBatch, Database};
use starbase_core::taxonomy::OrgKind;

use crate::cache::UidCache;
use crate::error::{IngestError, IngestResult};
use crate::passes::{contain, Driver};
use crate::passes::seed::performer;
use crate::record;
use crate::source::Endpoint;
use crate::stats::RunStats;

/// The row families the enrich pass can fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichTarget {
    Characters,
    Actors,
    Organizations,
    Ships,
}

const ALL: [EnrichTarget; 4] = [
    EnrichTarget::Characters,
    EnrichTarget::Actors,
    EnrichTarget::Organizations,
    EnrichTarget::Ships,
];

impl EnrichTarget {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Characters => "characters",
            Self::Actors => "actors",
            Self::Organizations => "organizations",
            Self::Ships => "ships",
        }
    }

    pub fn all() -> impl Iterator<Item = Self> {
        ALL.iter().copied()
    }

    #[must_use]
    pub const fn endpoint(self) -> Endpoint {
        match self {
            Self::Characters => Endpoint::Character,
            Self::Actors => Endpoint::Performer,
            Self::Organizations => Endpoint::Organization,
            Self::Ships => Endpoint::Spacecraft,
        }
    }

    const fn table(self) -> (&'static str, &'static str) {
        match self {
            Self::Characters => ("Characters", "character_id"),
            Self::Actors => ("Actors", "actor_id"),
            Self::Organizations => ("Organizations", "organization_id"),
            Self::Ships => ("Ships", "ship_id"),
        }
    }

    /// Rows with at least one column this pass could fill, as
    /// (id, name, registry).
    const fn pending_sql(self) -> &'static str {
        match self {
            Self::Characters => {
                "SELECT character_id, name, NULL FROM Characters
                 WHERE species_id IS NULL
                    OR IFNULL(gender, '') = ''
                    OR IFNULL(occupation, '') = ''
                    OR (IFNULL(rank, '') = '' AND IFNULL(title, '') = '')
                 ORDER BY character_id"
            }
            Self::Actors => {
                "SELECT actor_id, TRIM(first_name || ' ' || last_name), NULL FROM Actors
                 WHERE IFNULL(birth_date, '') = '' OR IFNULL(birth_place, '') = ''
                 ORDER BY actor_id"
            }
            Self::Organizations => {
                "SELECT organization_id, name, NULL FROM Organizations
                 WHERE IFNULL(type, '') = ''
                 ORDER BY organization_id"
            }
            Self::Ships => {
                "SELECT ship_id, name, NULLIF(registry, '') FROM Ships
                 WHERE IFNULL(type, '') = '' OR launched_year IS NULL
                 ORDER BY ship_id"
            }
        }
    }
}

impl fmt::Display for EnrichTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnrichTarget {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| IngestError::Input(format!("unknown enrich target: {s}")))
    }
}

impl Driver {
    /// Fill blank columns of `target` rows from their detail records.
    ///
    /// Rows are looked up by name in a uid cache built from the search
    /// listing; a row missing from the cache is counted as not found
    /// without a detail request.
    pub async fn enrich(&self, db: &mut Database, target: EnrichTarget) -> IngestResult<RunStats> {
        let label = format!("enrich {target}");
        let mut stats = RunStats::default();
        let pending = pending_rows(db, target)?;
        if pending.is_empty() {
            log::info!("{label}: nothing to fill");
            return Ok(stats);
        }

        let cache = match UidCache::build(self.source(), target.endpoint(), self.max_pages).await {
            Ok(cache) => cache,
            Err(e) => {
                log::warn!("{label}: could not list {}: {e}", target.endpoint());
                stats.errored(&e);
                return Ok(stats);
            }
        };

        let mut batch = self.batch();
        batch.start(db)?;
        let result = self
            .enrich_rows(db, target, &label, &cache, &pending, &mut batch, &mut stats)
            .await;
        batch.finish(db)?;
        result?;
        log::info!("{label}: {stats}");
        Ok(stats)
    }

    #[allow(clippy::too_many_arguments)]
    async fn enrich_rows(
        &self,
        db: &mut Database,
        target: EnrichTarget,
        label: &str,
        cache: &UidCache,
        pending: &[PendingRow],
        batch: &mut CommitBatch,
        stats: &mut RunStats,
    ) -> IngestResult<()> {
        for (id, name, registry) in pending {
            stats.processed += 1;
            let Some(uid) = cache.get_registered(name, registry.as_deref()) else {
                log::debug!("{label}: no uid for '{name}'");
                stats.not_found += 1;
                continue;
            };
            let applied = match self.source().detail(target.endpoint(), uid).await {
                Ok(detail) => self.apply_detail(db, target, *id, &detail),
                Err(e) => Err(e),
            };
            match applied {
                Ok(changed) => stats.filled(&changed),
                Err(e) => contain(label, name, e, stats)?,
            }
            batch.tick(db)?;
        }
        Ok(())
    }

    /// Merge one detail record into row `id`, returning the filled columns.
    pub fn apply_detail(
        &self,
        db: &Database,
        target: EnrichTarget,
        id: i64,
        detail: &Value,
    ) -> IngestResult<Vec<String>> {
        let delta = match target {
            EnrichTarget::Characters => self.character_delta(db, detail)?,
            EnrichTarget::Actors => {
                let name = record::text(detail, "name").unwrap_or_default();
                let actor = performer(name, detail);
                Delta::new()
                    .text(
                        "birth_date",
                        actor.birth_date.map(|d| d.to_string()).as_deref(),
                    )
                    .text("birth_place", actor.birth_place.as_deref())
            }
            EnrichTarget::Organizations => {
                Delta::new().text("type", OrgKind::from_flags(detail).map(OrgKind::as_str))
            }
            EnrichTarget::Ships => ship_delta(detail),
        };
        let (table, id_column) = target.table();
        Ok(merge_fill_if_null(db.conn(), table, id_column, id, &delta)?)
    }

    fn character_delta(&self, db: &Database, detail: &Value) -> IngestResult<Delta> {
        let species_id = match record::first_name_in(detail, "characterSpecies") {
            Some(species) => Reconciler::new(db.conn(), self.aliases())
                .reconcile(EntityKind::Species, species)?
                .id()
                .map(SpeciesId::from_row),
            None => None,
        };
        let (rank, title) = rank_and_title(record::list(detail, &["titles"]));
        Ok(Delta::new()
            .integer("species_id", species_id.map(SpeciesId::get))
            .text("gender", record::text(detail, "gender"))
            .integer("birth_year", record::integer(detail, "yearOfBirth"))
            .integer("death_year", record::integer(detail, "yearOfDeath"))
            .text(
                "occupation",
                record::first_name_in(detail, "occupations"),
            )
            .text("rank", rank)
            .text("title", title))
    }
}

type PendingRow = (i64, String, Option<String>);

fn pending_rows(db: &Database, target: EnrichTarget) -> IngestResult<Vec<PendingRow>> {
    let mut stmt = db
        .conn()
        .prepare(target.pending_sql())
        .map_err(starbase_core::Error::from)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .map_err(starbase_core::Error::from)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(starbase_core::Error::from)?;
    Ok(rows)
}

/// Split a character's titles into a rank and a position.
///
/// The first military or fleet rank is the rank and the first position is
/// the title. A title that is neither is kept as the title when nothing
/// else has been found.
fn rank_and_title(titles: &[Value]) -> (Option<&str>, Option<&str>) {
    let mut rank = None;
    let mut title = None;
    for entry in titles {
        let Some(name) = record::text(entry, "name") else {
            continue;
        };
        let is_rank = record::flag(entry, "militaryRank") || record::flag(entry, "fleetRank");
        if is_rank && rank.is_none() {
            rank = Some(name);
        } else if record::flag(entry, "position") && title.is_none() {
            title = Some(name);
        } else if rank.is_none() && title.is_none() {
            title = Some(name);
        }
    }
    (rank, title)
}

/// `dateStatus` is sometimes a year and sometimes prose ("29th century");
/// only whole years are kept.
fn ship_delta(detail: &Value) -> Delta {
    Delta::new()
        .text("type", record::first_name_in(detail, "spacecraftTypes"))
        .integer("launched_year", record::integer(detail, "dateStatus"))
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
                "INSERT INTO Species (species_id, name) VALUES (1, 'Klingon');
                 INSERT INTO Characters (character_id, name, rank) VALUES
                    (1, 'Worf', 'Lieutenant'), (2, 'Kurn', NULL);
                 INSERT INTO Organizations (organization_id, name) VALUES (1, 'Klingon Defense Force');
                 INSERT INTO Ships (ship_id, name) VALUES (1, 'IKS Rotarran'), (2, 'USS Enterprise');",
            )
            .unwrap();
        db
    }

    fn worf() -> Value {
        json!({
            "uid": "CHMA1", "name": "Worf", "gender": "M", "yearOfBirth": 2340,
            "characterSpecies": [{"name": "Klingon"}],
            "occupations": [{"name": "Security officer"}],
            "titles": [
                {"name": "Commander", "militaryRank": true},
                {"name": "Ambassador", "position": true}
            ]
        })
    }

    #[test]
    fn test_target_parsing() {
        assert_eq!("Ships".parse::<EnrichTarget>().unwrap(), EnrichTarget::Ships);
        assert!("planets".parse::<EnrichTarget>().is_err());
        assert_eq!(EnrichTarget::all().count(), 4);
    }

    #[test]
    fn test_rank_and_title() {
        let titles = [
            json!({"name": "Captain", "fleetRank": true}),
            json!({"name": "Admiral", "militaryRank": true}),
            json!({"name": "Chancellor", "position": true}),
        ];
        assert_eq!(rank_and_title(&titles), (Some("Captain"), Some("Chancellor")));

        let unclear = [json!({"name": "Son of Mogh"}), json!({"name": "Gowron"})];
        assert_eq!(rank_and_title(&unclear), (None, Some("Son of Mogh")));
    }

    #[tokio::test]
    async fn test_enrich_characters_fills_blanks_only() {
        let mut db = setup();
        let source = Arc::new(
            FixtureSource::new()
                .with_records(Endpoint::Character, vec![json!({"uid": "CHMA1", "name": "Worf"})])
                .with_detail(Endpoint::Character, "CHMA1", worf()),
        );
        let driver = Driver::new(source.clone(), AliasTable::default());

        let stats = driver.enrich(&mut db, EnrichTarget::Characters).await.unwrap();
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.updated, 1);
        // Kurn is not listed, so no detail request is made for him.
        assert_eq!(stats.not_found, 1);
        assert_eq!(source.detail_calls(), 1);

        let (species, rank, title, occupation): (i64, String, String, String) = db
            .conn()
            .query_row(
                "SELECT species_id, rank, title, occupation FROM Characters WHERE name = 'Worf'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap();
        assert_eq!(species, 1);
        assert_eq!(rank, "Lieutenant");
        assert_eq!(title, "Ambassador");
        assert_eq!(occupation, "Security officer");
    }

    #[tokio::test]
    async fn test_enrich_ships_and_organizations() {
        let mut db = setup();
        let source = Arc::new(
            FixtureSource::new()
                .with_records(
                    Endpoint::Spacecraft,
                    vec![
                        json!({"uid": "SRMA1", "name": "IKS Rotarran"}),
                        json!({"uid": "SRMA2", "name": "USS Enterprise"}),
                    ],
                )
                .with_detail(
                    Endpoint::Spacecraft,
                    "SRMA1",
                    json!({"spacecraftTypes": [{"name": "Bird-of-Prey"}], "dateStatus": "2360"}),
                )
                .with_detail(
                    Endpoint::Spacecraft,
                    "SRMA2",
                    json!({"spacecraftTypes": [], "dateStatus": "22nd century"}),
                )
                .with_records(
                    Endpoint::Organization,
                    vec![json!({"uid": "ORMA1", "name": "Klingon Defense Force"})],
                )
                .with_detail(
                    Endpoint::Organization,
                    "ORMA1",
                    json!({"militaryOrganization": true}),
                ),
        );
        let driver = Driver::new(source, AliasTable::default());

        let ships = driver.enrich(&mut db, EnrichTarget::Ships).await.unwrap();
        assert_eq!((ships.updated, ships.unchanged), (1, 1));
        let (kind, year): (String, i64) = db
            .conn()
            .query_row(
                "SELECT type, launched_year FROM Ships WHERE ship_id = 1",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!((kind.as_str(), year), ("Bird-of-Prey", 2360));

        let orgs = driver
            .enrich(&mut db, EnrichTarget::Organizations)
            .await
            .unwrap();
        assert_eq!(orgs.updated, 1);
        let again = driver
            .enrich(&mut db, EnrichTarget::Organizations)
            .await
            .unwrap();
        assert_eq!(again.processed, 0);
    }
}
