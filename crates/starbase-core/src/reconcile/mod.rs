//! Entity reconciliation: deciding whether an external record names a row
//! that already exists.
//!
//! Matching is tiered and stops at the first hit:
//!
//! 1. [`MatchTier::Exact`]: case-insensitive equality on the display name.
//! 2. [`MatchTier::Normalized`]: equality after [`normalize::fold`].
//! 3. [`MatchTier::Contains`]: whole-word containment either way, for
//!    people and characters only, and only when exactly one row qualifies.
//! 4. [`MatchTier::Related`]: a looser token match restricted to rows
//!    already linked to an anchor through a [`RelationScope`].
//! 5. [`MatchTier::Alias`]: curated rewrites from an [`AliasTable`], retried
//!    with tiers 1 and 2.
//!
//! [`Reconciler::identify`] skips tiers 3 and 4; it backs every
//! insert-or-update decision. A miss is [`Reconciled::NotFound`], never an
//! error.

pub mod alias;
pub mod merge;
pub mod normalize;
pub mod relation;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

pub use alias::AliasTable;
pub use merge::{merge_fill_if_null, Delta, Value};
pub use relation::{link_casting, link_pair, CastingLink, LinkOutcome, PairLink, PairOutcome};

use normalize::{contains_words, fold, split_person_name, words};

/// Minimum folded length for a name to take part in the looser tiers.
const MIN_NEEDLE_LEN: usize = 3;

/// The tables the reconciler knows how to match against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Actor,
    Character,
    Species,
    Organization,
    Ship,
    Series,
}

impl EntityKind {
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::Actor => "Actors",
            Self::Character => "Characters",
            Self::Species => "Species",
            Self::Organization => "Organizations",
            Self::Ship => "Ships",
            Self::Series => "Series",
        }
    }

    #[must_use]
    pub const fn id_column(self) -> &'static str {
        match self {
            Self::Actor => "actor_id",
            Self::Character => "character_id",
            Self::Species => "species_id",
            Self::Organization => "organization_id",
            Self::Ship => "ship_id",
            Self::Series => "series_id",
        }
    }

    /// SQL expression producing the display name of a row.
    #[must_use]
    pub const fn display_expr(self) -> &'static str {
        match self {
            Self::Actor => "TRIM(IFNULL(first_name, '') || ' ' || IFNULL(last_name, ''))",
            _ => "name",
        }
    }

    /// Whether the contains tier may be used at global scope.
    ///
    /// Organization and species names are too short and generic:
    /// "Starfleet" would otherwise absorb "Starfleet Academy".
    #[must_use]
    pub const fn allows_contains(self) -> bool {
        matches!(self, Self::Actor | Self::Character)
    }

    /// The identity columns of a freshly inserted row built from `name`.
    fn identity_delta(self, name: &str) -> Delta {
        match self {
            Self::Actor => {
                let (first, last) = split_person_name(name);
                Delta::new()
                    .text("first_name", Some(&first))
                    .text("last_name", Some(&last))
            }
            _ => Delta::new().text("name", Some(name)),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Which tier produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MatchTier {
    Exact,
    Normalized,
    Contains,
    Related,
    Alias,
}

impl fmt::Display for MatchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Exact => "exact",
            Self::Normalized => "normalized",
            Self::Contains => "contains",
            Self::Related => "related",
            Self::Alias => "alias",
        };
        f.write_str(s)
    }
}

/// Outcome of matching one external name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    Matched { id: i64, tier: MatchTier },
    NotFound,
}

impl Reconciled {
    #[must_use]
    pub const fn id(self) -> Option<i64> {
        match self {
            Self::Matched { id, .. } => Some(id),
            Self::NotFound => None,
        }
    }
}

/// Restricts the related tier to rows linked to one anchor row.
///
/// For example, the actors already linked to character 7 are
/// `RelationScope::new("Character_Actors", "character_id", 7, "actor_id")`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationScope {
    pub table: &'static str,
    pub anchor_column: &'static str,
    pub anchor_id: i64,
    pub target_column: &'static str,
}

impl RelationScope {
    #[must_use]
    pub const fn new(
        table: &'static str,
        anchor_column: &'static str,
        anchor_id: i64,
        target_column: &'static str,
    ) -> Self {
        Self {
            table,
            anchor_column,
            anchor_id,
            target_column,
        }
    }

    /// Actors already cast as the given character.
    #[must_use]
    pub const fn actors_of_character(character_id: i64) -> Self {
        Self::new("Character_Actors", "character_id", character_id, "actor_id")
    }

    /// Characters already played by the given actor.
    #[must_use]
    pub const fn characters_of_actor(actor_id: i64) -> Self {
        Self::new("Character_Actors", "actor_id", actor_id, "character_id")
    }
}

/// Whether the contains and related tiers may run.
#[derive(Debug, Clone, Copy)]
enum Loose<'s> {
    Allowed(Option<&'s RelationScope>),
    Denied,
}

/// What [`Reconciler::upsert_by_name`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// Matched, and these columns were filled.
    Updated(Vec<String>),
    /// Matched, nothing to fill.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upserted {
    pub id: i64,
    pub outcome: UpsertOutcome,
    pub tier: Option<MatchTier>,
}

/// Tiered name matcher over one connection.
#[derive(Debug)]
pub struct Reconciler<'a> {
    conn: &'a Connection,
    aliases: &'a AliasTable,
}

impl<'a> Reconciler<'a> {
    #[must_use]
    pub const fn new(conn: &'a Connection, aliases: &'a AliasTable) -> Self {
        Self { conn, aliases }
    }

    /// Match `name` against `kind` using tiers 1, 2, 3 and 5.
    pub fn reconcile(&self, kind: EntityKind, name: &str) -> Result<Reconciled> {
        self.reconcile_scoped(kind, name, None)
    }

    /// Match `name`, additionally allowing the related tier within `scope`.
    pub fn reconcile_scoped(
        &self,
        kind: EntityKind,
        name: &str,
        scope: Option<&RelationScope>,
    ) -> Result<Reconciled> {
        self.resolve(kind, name, Loose::Allowed(scope))
    }

    /// Match `name` as the same entity: tiers 1, 2 and 5 only.
    ///
    /// Containment is not identity. "Odo's mother" contains "Odo" but is a
    /// different character, so insert-or-update decisions and lookups of
    /// names taken verbatim from the record source go through here.
    pub fn identify(&self, kind: EntityKind, name: &str) -> Result<Reconciled> {
        self.resolve(kind, name, Loose::Denied)
    }

    fn resolve(&self, kind: EntityKind, name: &str, loose: Loose<'_>) -> Result<Reconciled> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(Reconciled::NotFound);
        }

        if let Some(id) = self.exact(kind, name)? {
            return Ok(matched(id, MatchTier::Exact));
        }

        let candidates = self.candidates(kind)?;
        let folded = fold(name);

        if let Some(id) = normalized(&candidates, &folded) {
            return Ok(matched(id, MatchTier::Normalized));
        }

        if let Loose::Allowed(scope) = loose {
            if kind.allows_contains() {
                if let Some(id) = contains(&candidates, &folded) {
                    return Ok(matched(id, MatchTier::Contains));
                }
            }

            if let Some(scope) = scope {
                if let Some(id) = self.related(kind, &folded, scope)? {
                    return Ok(matched(id, MatchTier::Related));
                }
            }
        }

        for rewrite in self.aliases.rewrites(kind, name) {
            let hit = match self.exact(kind, &rewrite)? {
                Some(id) => Some(id),
                None => normalized(&candidates, &fold(&rewrite)),
            };
            if let Some(id) = hit {
                log::debug!("{kind}: '{name}' matched via alias '{rewrite}'");
                return Ok(matched(id, MatchTier::Alias));
            }
        }

        Ok(Reconciled::NotFound)
    }

    /// [`Reconciler::identify`] `name`, then fill-if-null merge `delta` into
    /// the match, or insert a new row built from `name` and `delta` when
    /// nothing matches.
    pub fn upsert_by_name(&self, kind: EntityKind, name: &str, delta: &Delta) -> Result<Upserted> {
        match self.identify(kind, name)? {
            Reconciled::Matched { id, tier } => {
                let changed =
                    merge_fill_if_null(self.conn, kind.table(), kind.id_column(), id, delta)?;
                let outcome = if changed.is_empty() {
                    UpsertOutcome::Unchanged
                } else {
                    UpsertOutcome::Updated(changed)
                };
                Ok(Upserted {
                    id,
                    outcome,
                    tier: Some(tier),
                })
            }
            Reconciled::NotFound => {
                let mut row = kind.identity_delta(name);
                for (column, value) in delta.iter() {
                    if !row.contains(column) {
                        row = row.value(column, value);
                    }
                }
                if row.is_empty() {
                    return Err(Error::InvalidData(format!("{kind}: empty name")));
                }
                let id = row.insert(self.conn, kind.table())?;
                log::debug!("{kind}: inserted '{name}' as {id}");
                Ok(Upserted {
                    id,
                    outcome: UpsertOutcome::Inserted,
                    tier: None,
                })
            }
        }
    }

    fn exact(&self, kind: EntityKind, name: &str) -> Result<Option<i64>> {
        let sql = format!(
            "SELECT {id} FROM {table} WHERE LOWER({display}) = LOWER(?1) ORDER BY {id} LIMIT 1",
            id = kind.id_column(),
            table = kind.table(),
            display = kind.display_expr(),
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut rows = stmt.query_map([name], |row| row.get::<_, i64>(0))?;
        Ok(rows.next().transpose()?)
    }

    fn candidates(&self, kind: EntityKind) -> Result<Vec<(i64, String)>> {
        let sql = format!(
            "SELECT {id}, {display} FROM {table} ORDER BY {id}",
            id = kind.id_column(),
            table = kind.table(),
            display = kind.display_expr(),
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows
            .into_iter()
            .filter_map(|(id, name)| name.map(|n| (id, fold(&n))))
            .collect())
    }

    fn related(
        &self,
        kind: EntityKind,
        folded: &str,
        scope: &RelationScope,
    ) -> Result<Option<i64>> {
        let tokens: Vec<&str> = words(folded)
            .filter(|w| w.chars().count() >= MIN_NEEDLE_LEN)
            .collect();
        if tokens.is_empty() {
            return Ok(None);
        }

        let sql = format!(
            "SELECT DISTINCT t.{id}, {display} FROM {table} t \
             JOIN \"{rel}\" r ON r.\"{target}\" = t.{id} \
             WHERE r.\"{anchor}\" = ?1 ORDER BY t.{id}",
            id = kind.id_column(),
            display = kind.display_expr(),
            table = kind.table(),
            rel = scope.table,
            target = scope.target_column,
            anchor = scope.anchor_column,
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let linked = stmt
            .query_map([scope.anchor_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(linked.into_iter().find_map(|(id, name)| {
            let candidate = fold(&name?);
            tokens
                .iter()
                .any(|t| contains_words(&candidate, t))
                .then_some(id)
        }))
    }
}

const fn matched(id: i64, tier: MatchTier) -> Reconciled {
    Reconciled::Matched { id, tier }
}

fn normalized(candidates: &[(i64, String)], folded: &str) -> Option<i64> {
    candidates
        .iter()
        .find(|(_, name)| name == folded)
        .map(|(id, _)| *id)
}

fn contains(candidates: &[(i64, String)], folded: &str) -> Option<i64> {
    if folded.chars().count() < MIN_NEEDLE_LEN {
        return None;
    }
    let mut hits = candidates.iter().filter(|(_, name)| {
        name.chars().count() >= MIN_NEEDLE_LEN
            && (contains_words(name, folded) || contains_words(folded, name))
    });
    match (hits.next(), hits.next()) {
        (Some((id, _)), None) => Some(*id),
        (Some(_), Some(_)) => {
            log::debug!("ambiguous contains match for '{folded}', skipping tier");
            None
        }
        _ => None,
    }
}
