use serde::{Deserialize, Serialize};

use crate::model::ids::SpeciesId;
use crate::reconcile::Delta;

/// A fictional character, stored in `Characters` and keyed by `name`.
///
/// Characters are created on first sighting and enriched in place by later
/// passes; every attribute besides the name is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    pub species_id: Option<SpeciesId>,
    pub gender: Option<String>,
    pub rank: Option<String>,
    pub title: Option<String>,
    pub occupation: Option<String>,
    pub birth_year: Option<i64>,
    pub death_year: Option<i64>,
}

impl Character {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            species_id: None,
            gender: None,
            rank: None,
            title: None,
            occupation: None,
            birth_year: None,
            death_year: None,
        }
    }

    #[must_use]
    pub fn with_species(mut self, species_id: SpeciesId) -> Self {
        self.species_id = Some(species_id);
        self
    }

    #[must_use]
    pub fn with_gender(mut self, gender: impl Into<String>) -> Self {
        self.gender = Some(gender.into());
        self
    }

    #[must_use]
    pub fn with_rank(mut self, rank: impl Into<String>) -> Self {
        self.rank = Some(rank.into());
        self
    }

    #[must_use]
    pub fn with_occupation(mut self, occupation: impl Into<String>) -> Self {
        self.occupation = Some(occupation.into());
        self
    }

    #[must_use]
    pub fn delta(&self) -> Delta {
        Delta::new()
            .text("name", Some(self.name.as_str()))
            .integer("species_id", self.species_id.map(i64::from))
            .text("gender", self.gender.as_deref())
            .text("rank", self.rank.as_deref())
            .text("title", self.title.as_deref())
            .text("occupation", self.occupation.as_deref())
            .integer("birth_year", self.birth_year)
            .integer("death_year", self.death_year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_builder() {
        let character = Character::new("Odo")
            .with_gender("M")
            .with_occupation("Chief of security");
        let delta = character.delta();
        assert_eq!(delta.columns(), vec!["name", "gender", "occupation"]);
    }
}
