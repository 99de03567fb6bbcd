//! Core of the starbase trivia database.
//!
//! This crate owns the SQLite schema and its versioned migrations, the
//! schema evolver that adds, drops and renames columns on a live file, and
//! the entity reconciler that matches loosely spelled external names
//! against stored rows.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod error;
pub mod model;
pub mod reconcile;
pub mod schema;
pub mod taxonomy;

pub use error::{Error, Result};
