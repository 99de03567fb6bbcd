use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Organization classification, stored in `Organizations.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrgKind {
    Government,
    Military,
    GovernmentAgency,
    LawEnforcement,
    Research,
    Medical,
    Sport,
    Intergovernmental,
    MilitaryUnit,
}

/// Source boolean flag for each kind, in priority order.
const FLAG_TABLE: &[(&str, OrgKind)] = &[
    ("government", OrgKind::Government),
    ("militaryOrganization", OrgKind::Military),
    ("governmentAgency", OrgKind::GovernmentAgency),
    ("lawEnforcementAgency", OrgKind::LawEnforcement),
    ("researchOrganization", OrgKind::Research),
    ("medicalOrganization", OrgKind::Medical),
    ("sportOrganization", OrgKind::Sport),
    ("intergovernmentalOrganization", OrgKind::Intergovernmental),
    ("militaryUnit", OrgKind::MilitaryUnit),
];

impl OrgKind {
    /// Stored label, e.g. "law enforcement".
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Government => "government",
            Self::Military => "military",
            Self::GovernmentAgency => "government agency",
            Self::LawEnforcement => "law enforcement",
            Self::Research => "research",
            Self::Medical => "medical",
            Self::Sport => "sport",
            Self::Intergovernmental => "intergovernmental",
            Self::MilitaryUnit => "military unit",
        }
    }

    /// Classify a detail record by its boolean flags. The first flag in
    /// priority order that is `true` wins; no true flag yields `None`.
    #[must_use]
    pub fn from_flags(record: &serde_json::Value) -> Option<Self> {
        FLAG_TABLE
            .iter()
            .find(|(flag, _)| record.get(*flag).and_then(serde_json::Value::as_bool) == Some(true))
            .map(|(_, kind)| *kind)
    }

    /// Every kind, in priority order.
    pub fn all() -> impl Iterator<Item = Self> {
        FLAG_TABLE.iter().map(|(_, kind)| *kind)
    }
}

impl fmt::Display for OrgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrgKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidData(format!("unknown organization type: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_true_flag_wins() {
        let record = json!({
            "name": "Starfleet Security",
            "government": false,
            "militaryOrganization": true,
            "lawEnforcementAgency": true
        });
        assert_eq!(OrgKind::from_flags(&record), Some(OrgKind::Military));
    }

    #[test]
    fn test_no_flags() {
        let record = json!({ "name": "Maquis", "government": false, "militaryUnit": null });
        assert_eq!(OrgKind::from_flags(&record), None);
    }

    #[test]
    fn test_label_round_trip() {
        for kind in OrgKind::all() {
            assert_eq!(kind.as_str().parse::<OrgKind>().unwrap(), kind);
        }
        assert!("guild".parse::<OrgKind>().is_err());
    }
}
