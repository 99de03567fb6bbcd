use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Series abbreviation used as the casting discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SeriesCode {
    Tos,
    Tas,
    Tng,
    Ds9,
    Voy,
    Ent,
    Dis,
    Pic,
    Ld,
    Pro,
    Snw,
    Film,
}

/// Performer flags on a source performer record, in the order they are
/// reported.
const PERFORMER_FLAGS: &[(&str, SeriesCode)] = &[
    ("tosPerformer", SeriesCode::Tos),
    ("tasPerformer", SeriesCode::Tas),
    ("tngPerformer", SeriesCode::Tng),
    ("ds9Performer", SeriesCode::Ds9),
    ("voyPerformer", SeriesCode::Voy),
    ("entPerformer", SeriesCode::Ent),
    ("disPerformer", SeriesCode::Dis),
    ("filmPerformer", SeriesCode::Film),
];

/// Full titles as they appear in source records.
const TITLES: &[(&str, SeriesCode)] = &[
    ("Star Trek: The Original Series", SeriesCode::Tos),
    ("Star Trek", SeriesCode::Tos),
    ("Star Trek: The Animated Series", SeriesCode::Tas),
    ("Star Trek: The Next Generation", SeriesCode::Tng),
    ("Star Trek: Deep Space Nine", SeriesCode::Ds9),
    ("Star Trek: Voyager", SeriesCode::Voy),
    ("Star Trek: Enterprise", SeriesCode::Ent),
    ("Enterprise", SeriesCode::Ent),
    ("Star Trek: Discovery", SeriesCode::Dis),
    ("Star Trek: Picard", SeriesCode::Pic),
    ("Star Trek: Lower Decks", SeriesCode::Ld),
    ("Star Trek: Prodigy", SeriesCode::Pro),
    ("Star Trek: Strange New Worlds", SeriesCode::Snw),
];

const ALL: &[SeriesCode] = &[
    SeriesCode::Tos,
    SeriesCode::Tas,
    SeriesCode::Tng,
    SeriesCode::Ds9,
    SeriesCode::Voy,
    SeriesCode::Ent,
    SeriesCode::Dis,
    SeriesCode::Pic,
    SeriesCode::Ld,
    SeriesCode::Pro,
    SeriesCode::Snw,
    SeriesCode::Film,
];

impl SeriesCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tos => "TOS",
            Self::Tas => "TAS",
            Self::Tng => "TNG",
            Self::Ds9 => "DS9",
            Self::Voy => "VOY",
            Self::Ent => "ENT",
            Self::Dis => "DIS",
            Self::Pic => "PIC",
            Self::Ld => "LD",
            Self::Pro => "PRO",
            Self::Snw => "SNW",
            Self::Film => "FILM",
        }
    }

    /// Canonical full title; films share the franchise title.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Tos => "Star Trek: The Original Series",
            Self::Tas => "Star Trek: The Animated Series",
            Self::Tng => "Star Trek: The Next Generation",
            Self::Ds9 => "Star Trek: Deep Space Nine",
            Self::Voy => "Star Trek: Voyager",
            Self::Ent => "Star Trek: Enterprise",
            Self::Dis => "Star Trek: Discovery",
            Self::Pic => "Star Trek: Picard",
            Self::Ld => "Star Trek: Lower Decks",
            Self::Pro => "Star Trek: Prodigy",
            Self::Snw => "Star Trek: Strange New Worlds",
            Self::Film => "Star Trek (films)",
        }
    }

    /// Look up a series by its full title, case-insensitively.
    #[must_use]
    pub fn from_title(title: &str) -> Option<Self> {
        let title = title.trim();
        TITLES
            .iter()
            .find(|(t, _)| t.eq_ignore_ascii_case(title))
            .map(|(_, code)| *code)
    }

    /// Series a performer record is flagged for, in table order.
    #[must_use]
    pub fn from_performer_flags(performer: &serde_json::Value) -> Vec<Self> {
        PERFORMER_FLAGS
            .iter()
            .filter(|(flag, _)| {
                performer.get(*flag).and_then(serde_json::Value::as_bool) == Some(true)
            })
            .map(|(_, code)| *code)
            .collect()
    }

    pub fn all() -> impl Iterator<Item = Self> {
        ALL.iter().copied()
    }
}

impl fmt::Display for SeriesCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeriesCode {
    type Err = Error;

    /// Accepts an abbreviation ("ds9") or a full title.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .find(|code| code.as_str().eq_ignore_ascii_case(s.trim()))
            .or_else(|| Self::from_title(s))
            .ok_or_else(|| Error::InvalidData(format!("unknown series: {s}")))
    }
}
