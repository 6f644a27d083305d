//! # Flashlists
//!
//! A flashlist is a named, periodically refreshed table of monitoring rows
//! published by one data-acquisition service. This module holds the registry
//! of recognised flashlist types, the typed row accessor used by every entity
//! update, and the in-memory payload handed to the dispatcher each cycle.

/// Registry of recognised flashlist types.
pub mod types;
/// Typed, fallible access to the fields of one row.
pub mod row;
/// One retrieved flashlist and the LAS payload parser.
pub mod payload;

pub use payload::{Flashlist, FlashlistError};
pub use row::{Row, RowError};
pub use types::FlashlistType;
