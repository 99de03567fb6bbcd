use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::reconcile::normalize::split_person_name;
use crate::reconcile::Delta;

/// A performer, stored in `Actors`.
///
/// No external identifier is kept for performers, so identity is the
/// `(first_name, last_name)` pair and incoming records are matched against
/// it by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub first_name: String,
    pub last_name: String,
    pub birth_date: Option<NaiveDate>,
    pub birth_place: Option<String>,
}

impl Actor {
    #[must_use]
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            birth_date: None,
            birth_place: None,
        }
    }

    /// Build an actor from a single display string such as "Nichelle Nichols".
    ///
    /// Everything after the first whitespace becomes the last name, so
    /// "Majel Barrett Roddenberry" keeps the full compound surname.
    #[must_use]
    pub fn from_display_name(name: &str) -> Self {
        let (first, last) = split_person_name(name);
        Self::new(first, last)
    }

    #[must_use]
    pub fn with_birth_date(mut self, date: NaiveDate) -> Self {
        self.birth_date = Some(date);
        self
    }

    #[must_use]
    pub fn with_birth_place(mut self, place: impl Into<String>) -> Self {
        self.birth_place = Some(place.into());
        self
    }

    #[must_use]
    pub fn display_name(&self) -> String {
        if self.last_name.is_empty() {
            self.first_name.clone()
        } else {
            format!("{} {}", self.first_name, self.last_name)
        }
    }

    /// Column values for insert or fill-if-null merge.
    #[must_use]
    pub fn delta(&self) -> Delta {
        Delta::new()
            .text("first_name", Some(self.first_name.as_str()))
            .text("last_name", Some(self.last_name.as_str()))
            .text(
                "birth_date",
                self.birth_date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .as_deref(),
            )
            .text("birth_place", self.birth_place.as_deref())
    }
}
