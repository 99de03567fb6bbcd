use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            #[must_use]
            pub const fn from_row(rowid: i64) -> Self {
                Self(rowid)
            }

            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl rusqlite::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(rusqlite::types::ToSqlOutput::from(self.0))
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                i64::column_result(value).map(Self)
            }
        }
    };
}

define_id!(ActorId, "Row id of a performer in `Actors`.");
define_id!(CharacterId, "Row id of a character in `Characters`.");
define_id!(EpisodeId, "Row id of an episode in `Episodes`.");
define_id!(SeriesId, "Row id of a series in `Series`.");
define_id!(OrganizationId, "Row id of an organization in `Organizations`.");
define_id!(ShipId, "Row id of a spacecraft in `Ships`.");
define_id!(SpeciesId, "Row id of a species in `Species`.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_round_trips_through_sqlite() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let id: ActorId = conn
            .query_row("SELECT ?1", [ActorId::from_row(42)], |row| row.get(0))
            .unwrap();
        assert_eq!(id.get(), 42);
    }

    #[test]
    fn test_id_display() {
        assert_eq!(CharacterId::from_row(7).to_string(), "7");
    }

    #[test]
    fn test_id_serializes_as_bare_integer() {
        let json = serde_json::to_string(&EpisodeId::from_row(3)).unwrap();
        assert_eq!(json, "3");
    }
}
