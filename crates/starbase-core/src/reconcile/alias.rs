//! Curated aliases for names the matching tiers cannot bridge on their own.
//!
//! Aliases are keyed by the folded external name. Honorifics are stripped
//! from the front of a name before retrying. The file format is TOML:
//!
//! ```toml
//! honorifics = ["Sir", "Dame", "Dr.", "Lt."]
//!
//! [characters]
//! "raffi musiker" = "Raffaela Musiker"
//!
//! [actors]
//! "jonathan frakes" = "Jonathan Frakes"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::reconcile::normalize::fold;
use crate::reconcile::EntityKind;

const DEFAULT_HONORIFICS: &[&str] = &["Sir", "Dame", "Dr.", "Lt."];

const DEFAULT_CHARACTER_ALIASES: &[(&str, &str)] = &[
    ("raffi musiker", "Raffaela Musiker"),
    ("raffi", "Raffaela Musiker"),
    ("book", "Cleveland Booker"),
    ("cleveland \"book\" booker", "Cleveland Booker"),
    ("diviner", "The Diviner"),
    ("asencia/the vindicator", "Asencia"),
];

/// Per-kind alias maps plus the honorific prefixes to strip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasTable {
    #[serde(default)]
    pub honorifics: Vec<String>,
    #[serde(default)]
    pub actors: BTreeMap<String, String>,
    #[serde(default)]
    pub characters: BTreeMap<String, String>,
    #[serde(default)]
    pub species: BTreeMap<String, String>,
    #[serde(default)]
    pub organizations: BTreeMap<String, String>,
    #[serde(default)]
    pub ships: BTreeMap<String, String>,
    #[serde(default)]
    pub series: BTreeMap<String, String>,
}

impl Default for AliasTable {
    fn default() -> Self {
        Self {
            honorifics: DEFAULT_HONORIFICS.iter().map(|s| (*s).to_string()).collect(),
            actors: BTreeMap::new(),
            characters: DEFAULT_CHARACTER_ALIASES
                .iter()
                .map(|(from, to)| ((*from).to_string(), (*to).to_string()))
                .collect(),
            species: BTreeMap::new(),
            organizations: BTreeMap::new(),
            ships: BTreeMap::new(),
            series: BTreeMap::new(),
        }
    }
}

impl AliasTable {
    /// An alias table with no entries and no honorifics.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            honorifics: Vec::new(),
            actors: BTreeMap::new(),
            characters: BTreeMap::new(),
            species: BTreeMap::new(),
            organizations: BTreeMap::new(),
            ships: BTreeMap::new(),
            series: BTreeMap::new(),
        }
    }

    /// Parse an alias table from TOML. Keys are folded on load, so the file
    /// may spell them with any case or accents.
    pub fn from_toml(content: &str) -> Result<Self> {
        let table: Self = toml::from_str(content)
            .map_err(|e| Error::InvalidData(format!("invalid alias file: {e}")))?;
        Ok(table.folded())
    }

    /// Load from `path`, falling back to the built-in defaults when the file
    /// does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No alias file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let table = Self::from_toml(&content)?;
        log::info!(
            "Loaded {} aliases from {}",
            table.len(),
            path.display()
        );
        Ok(table)
    }

    /// Render the table as TOML, for `aliases init`.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::InvalidData(format!("cannot render alias table: {e}")))
    }

    fn folded(mut self) -> Self {
        for map in [
            &mut self.actors,
            &mut self.characters,
            &mut self.species,
            &mut self.organizations,
            &mut self.ships,
            &mut self.series,
        ] {
            *map = std::mem::take(map)
                .into_iter()
                .map(|(k, v)| (fold(&k), v))
                .collect();
        }
        self
    }

    fn map_for(&self, kind: EntityKind) -> &BTreeMap<String, String> {
        match kind {
            EntityKind::Actor => &self.actors,
            EntityKind::Character => &self.characters,
            EntityKind::Species => &self.species,
            EntityKind::Organization => &self.organizations,
            EntityKind::Ship => &self.ships,
            EntityKind::Series => &self.series,
        }
    }

    /// Total number of alias entries across all kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actors.len()
            + self.characters.len()
            + self.species.len()
            + self.organizations.len()
            + self.ships.len()
            + self.series.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Candidate rewrites of `name`, in the order they should be tried.
    ///
    /// The curated alias comes first, then the name with a leading
    /// honorific removed. The input itself is never returned.
    #[must_use]
    pub fn rewrites(&self, kind: EntityKind, name: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let folded = fold(name);

        if let Some(alias) = self.map_for(kind).get(&folded) {
            out.push(alias.clone());
        }

        if let Some(stripped) = self.strip_honorific(name) {
            if let Some(alias) = self.map_for(kind).get(&fold(&stripped)) {
                out.push(alias.clone());
            }
            out.push(stripped);
        }

        out.retain(|candidate| fold(candidate) != folded);
        out.dedup();
        out
    }

    fn strip_honorific(&self, name: &str) -> Option<String> {
        let trimmed = name.trim();
        self.honorifics.iter().find_map(|h| {
            let head = trimmed.get(..h.len())?;
            let rest = trimmed.get(h.len()..)?;
            (head.eq_ignore_ascii_case(h) && rest.starts_with(char::is_whitespace))
                .then(|| rest.trim().to_string())
                .filter(|r| !r.is_empty())
        })
    }
}
