use serde::{Deserialize, Serialize};

use crate::model::ids::OrganizationId;
use crate::reconcile::Delta;
use crate::taxonomy::OrgKind;

/// An organization (government, fleet, agency, ...), keyed by `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub name: String,
    pub kind: Option<OrgKind>,
}

impl Organization {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: None,
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: OrgKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn delta(&self) -> Delta {
        Delta::new()
            .text("name", Some(self.name.as_str()))
            .text("type", self.kind.map(OrgKind::as_str))
    }
}

/// A spacecraft, keyed by `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ship {
    pub name: String,
    pub registry: Option<String>,
    pub class: Option<String>,
    pub organization_id: Option<OrganizationId>,
    /// Spacecraft type, e.g. "Starship".
    pub kind: Option<String>,
    pub launched_year: Option<i64>,
}

impl Ship {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry: None,
            class: None,
            organization_id: None,
            kind: None,
            launched_year: None,
        }
    }

    #[must_use]
    pub fn delta(&self) -> Delta {
        Delta::new()
            .text("name", Some(self.name.as_str()))
            .text("registry", self.registry.as_deref())
            .text("class", self.class.as_deref())
            .integer("organization_id", self.organization_id.map(i64::from))
            .text("type", self.kind.as_deref())
            .integer("launched_year", self.launched_year)
    }
}

/// A species, keyed by `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Species {
    pub name: String,
    pub homeworld: Option<String>,
    pub warp_capable: Option<bool>,
}

impl Species {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            homeworld: None,
            warp_capable: None,
        }
    }

    #[must_use]
    pub fn delta(&self) -> Delta {
        Delta::new()
            .text("name", Some(self.name.as_str()))
            .text("homeworld", self.homeworld.as_deref())
            .integer("warp_capable", self.warp_capable.map(i64::from))
    }
}
