//! Closed vocabularies derived from loosely typed source flags.
//!
//! Each vocabulary is an enum plus an ordered table of
//! `(source flag or title, variant)` pairs. Lookups walk the table in order
//! and return the first hit, so priority is the table order.

pub mod org_kind;
pub mod series;

pub use org_kind::OrgKind;
pub use series::SeriesCode;
