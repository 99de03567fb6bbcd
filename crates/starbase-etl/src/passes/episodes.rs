//! Episode import: merge already-scraped episode details into `Episodes`.

use std::path::Path;

use starbase_core::model::{EpisodeDetails, EpisodeId, EpisodeKey};
use starbase_core::reconcile::merge_fill_if_null;
use starbase_core::schema::{
    ensure_columns, ensure_index, ColumnChange, ColumnSpec, CommitBatch, Database,
};
use starbase_core::taxonomy::SeriesCode;

use crate::error::{IngestError, IngestResult};
use crate::passes::{apply_all, Describe};
use crate::stats::RunStats;

fn enrichment_columns() -> [ColumnSpec; 6] {
    [
        ColumnSpec::new("imdb_id", "VARCHAR(20)"),
        ColumnSpec::new("imdb_rating", "DECIMAL(3,1)"),
        ColumnSpec::new("imdb_votes", "INTEGER"),
        ColumnSpec::new("description", "TEXT"),
        ColumnSpec::new("director", "TEXT"),
        ColumnSpec::new("writer", "TEXT"),
    ]
}

/// Read a JSON array of scraped episode records.
pub fn load_episodes(path: &Path) -> IngestResult<Vec<EpisodeDetails>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| IngestError::Input(format!("{}: {e}", path.display())))?;
    serde_json::from_str(&content)
        .map_err(|e| IngestError::Input(format!("{}: {e}", path.display())))
}

impl Describe for EpisodeDetails {
    fn describe(&self) -> String {
        format!("{} S{:02}E{:02}", self.series, self.season, self.episode)
    }
}

/// Fill the enrichment columns of stored episodes from `records`.
///
/// Records are matched by (series, season, episode) and then by IMDb id.
/// Episodes are never created here; an unmatched record is counted as not
/// found.
pub fn import_episodes(
    db: &Database,
    records: &[EpisodeDetails],
    commit_every: usize,
) -> IngestResult<RunStats> {
    for (column, change) in ensure_columns(db.conn(), "Episodes", &enrichment_columns())? {
        if change == ColumnChange::Added {
            log::info!("Added Episodes.{column}");
        }
    }
    ensure_index(db.conn(), "idx_episodes_imdb_id", "Episodes", &["imdb_id"], false)?;

    apply_all(
        db,
        CommitBatch::new(commit_every),
        "import episodes",
        records,
        |details, stats| {
            let episode_id = locate(db, details)?
                .ok_or_else(|| IngestError::not_found("episode", details.describe()))?;
            let delta = details.delta().text("title", details.title.as_deref());
            let changed =
                merge_fill_if_null(db.conn(), "Episodes", "episode_id", episode_id.get(), &delta)?;
            stats.filled(&changed);
            Ok(())
        },
    )
}

fn locate(db: &Database, details: &EpisodeDetails) -> IngestResult<Option<EpisodeId>> {
    if let Ok(code) = details.series.parse::<SeriesCode>() {
        if let Some(series_id) = db.series_id(code)? {
            let key = EpisodeKey {
                series_id,
                season: details.season,
                episode_number: details.episode,
            };
            if let Some(id) = db.episode_id(&key)? {
                return Ok(Some(id));
            }
        }
    }
    match details.imdb_id.as_deref() {
        Some(imdb_id) if !imdb_id.trim().is_empty() => Ok(db.episode_by_imdb_id(imdb_id.trim())?),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute_batch(
                "INSERT INTO Series (series_id, name, abbreviation) VALUES
                    (1, 'Star Trek: The Next Generation', 'TNG');
                 INSERT INTO Episodes (episode_id, series_id, title, season, episode_number) VALUES
                    (1, 1, 'The Best of Both Worlds', 3, 26),
                    (2, 1, '', 4, 1);",
            )
            .unwrap();
        db
    }

    fn details(season: i64, episode: i64) -> EpisodeDetails {
        EpisodeDetails {
            series: "TNG".to_string(),
            season,
            episode,
            imdb_id: None,
            title: None,
            description: None,
            rating: None,
            votes: None,
            director: None,
            writer: None,
        }
    }

    #[test]
    fn test_import_adds_columns_and_fills() {
        let db = setup();
        let mut bobw = details(3, 26);
        bobw.imdb_id = Some("tt0708648".to_string());
        bobw.rating = Some(9.4);
        bobw.writer = Some("Writers, Michael Piller".to_string());
        let mut part_two = details(4, 1);
        part_two.title = Some("The Best of Both Worlds, Part II".to_string());

        let stats = import_episodes(&db, &[bobw, part_two, details(9, 9)], 10).unwrap();
        assert_eq!((stats.updated, stats.not_found), (2, 1));
        assert!(db.has_column("Episodes", "imdb_votes").unwrap());

        let (writer, rating): (String, f64) = db
            .conn()
            .query_row(
                "SELECT writer, imdb_rating FROM Episodes WHERE episode_id = 1",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(writer, "Michael Piller");
        assert!((rating - 9.4).abs() < f64::EPSILON);

        let title: String = db
            .conn()
            .query_row("SELECT title FROM Episodes WHERE episode_id = 2", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(title, "The Best of Both Worlds, Part II");
    }

    #[test]
    fn test_match_by_imdb_id_and_rerun() {
        let db = setup();
        let mut first = details(3, 26);
        first.imdb_id = Some("tt0708648".to_string());
        import_episodes(&db, &[first], 10).unwrap();

        // Wrong numbering, right IMDb id.
        let mut renumbered = details(3, 27);
        renumbered.imdb_id = Some("tt0708648".to_string());
        renumbered.director = Some("Cliff Bole".to_string());
        let stats = import_episodes(&db, &[renumbered.clone()], 10).unwrap();
        assert_eq!(stats.updated, 1);

        let again = import_episodes(&db, &[renumbered], 10).unwrap();
        assert_eq!(again.unchanged, 1);
    }

    #[test]
    fn test_load_episodes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episodes.json");
        std::fs::write(
            &path,
            r#"[{"series": "VOY", "season": 7, "episode": 25, "rating": 8.8}]"#,
        )
        .unwrap();
        let records = load_episodes(&path).unwrap();
        assert_eq!(records[0].rating, Some(8.8));
        assert!(records[0].imdb_id.is_none());
    }
}
