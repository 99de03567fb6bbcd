use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::ids::SeriesId;
use crate::reconcile::Delta;
use crate::taxonomy::SeriesCode;

/// A television series or the film line, stored in `Series`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    pub code: Option<SeriesCode>,
    pub start_year: Option<i64>,
    pub end_year: Option<i64>,
    pub num_seasons: Option<i64>,
    pub num_episodes: Option<i64>,
}

impl Series {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            code: SeriesCode::from_title(&name),
            name,
            start_year: None,
            end_year: None,
            num_seasons: None,
            num_episodes: None,
        }
    }

    #[must_use]
    pub fn delta(&self) -> Delta {
        Delta::new()
            .text("name", Some(self.name.as_str()))
            .text("abbreviation", self.code.map(SeriesCode::as_str))
            .integer("start_year", self.start_year)
            .integer("end_year", self.end_year)
            .integer("num_seasons", self.num_seasons)
            .integer("num_episodes", self.num_episodes)
    }
}

/// The natural key of an episode: series, season and episode number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EpisodeKey {
    pub series_id: SeriesId,
    pub season: i64,
    pub episode_number: i64,
}

/// One episode, stored in `Episodes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub key: EpisodeKey,
    pub title: String,
    pub air_date: Option<NaiveDate>,
}

impl Episode {
    #[must_use]
    pub fn new(key: EpisodeKey, title: impl Into<String>) -> Self {
        Self {
            key,
            title: title.into(),
            air_date: None,
        }
    }

    #[must_use]
    pub fn with_air_date(mut self, date: NaiveDate) -> Self {
        self.air_date = Some(date);
        self
    }

    /// Non-key columns, for insert or fill-if-null merge.
    #[must_use]
    pub fn delta(&self) -> Delta {
        Delta::new().text("title", Some(self.title.as_str())).text(
            "air_date",
            self.air_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .as_deref(),
        )
    }
}

/// Enrichment scraped from an episode page, already extracted from HTML.
///
/// Every field except the locating key is optional; fields that are absent
/// are simply not merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeDetails {
    /// Series abbreviation such as "TNG".
    pub series: String,
    pub season: i64,
    pub episode: i64,
    #[serde(default)]
    pub imdb_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub votes: Option<i64>,
    #[serde(default)]
    pub director: Option<String>,
    #[serde(default)]
    pub writer: Option<String>,
}

impl EpisodeDetails {
    /// Column values for the enrichment columns of `Episodes`.
    #[must_use]
    pub fn delta(&self) -> Delta {
        Delta::new()
            .text("imdb_id", self.imdb_id.as_deref())
            .text("description", self.description.as_deref())
            .real("imdb_rating", self.rating)
            .integer("imdb_votes", self.votes)
            .text("director", self.director.as_deref())
            .text("writer", clean_writer_credit(self.writer.as_deref()).as_deref())
    }
}

/// Strip the "Writers" section label scrapers leave at the head of a
/// credit line. A bare label yields `None`.
#[must_use]
pub fn clean_writer_credit(raw: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    let stripped = raw
        .strip_prefix("Writers,")
        .or_else(|| raw.strip_prefix("Writer,"))
        .map_or(raw, str::trim_start);
    if stripped.is_empty() || stripped == "Writers" || stripped == "Writer" {
        None
    } else {
        Some(stripped.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_code_from_title() {
        let series = Series::new("Star Trek: Deep Space Nine");
        assert_eq!(series.code, Some(SeriesCode::Ds9));
        assert!(series.delta().columns().contains(&"abbreviation"));
    }

    #[test]
    fn test_clean_writer_credit() {
        assert_eq!(
            clean_writer_credit(Some("Writers, Gene Roddenberry")),
            Some("Gene Roddenberry".to_string())
        );
        assert_eq!(clean_writer_credit(Some("Writers")), None);
        assert_eq!(
            clean_writer_credit(Some("D.C. Fontana")),
            Some("D.C. Fontana".to_string())
        );
        assert_eq!(clean_writer_credit(None), None);
    }

    #[test]
    fn test_details_deserialize_with_missing_fields() {
        let details: EpisodeDetails =
            serde_json::from_str(r#"{"series": "TNG", "season": 3, "episode": 15, "rating": 8.9}"#)
                .unwrap();
        assert_eq!(details.rating, Some(8.9));
        assert_eq!(details.delta().columns(), vec!["imdb_rating"]);
    }
}
