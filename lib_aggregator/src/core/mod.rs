//! # Core Update Engine
//!
//! This module turns one cycle's worth of flashlists into a refreshed entity
//! graph. Its components run in a fixed order every cycle and share no hidden
//! state: the session context and the match reporter are passed explicitly.
//!
//! ## Core Components:
//!
//! - **`dispatcher`**: the per-type dispatch plan. It filters rows, picks the
//!   matcher and entity pool for each flashlist type, applies the matched rows
//!   through the update contract and records the outcome.
//!
//! - **`derive`**: the derived-metric pass. Runs once all flashlists of the
//!   cycle are applied, first per parent (trigger ranges, RU masking) and then
//!   globally (FED-builder and BU summaries).
//!
//! - **`reporter`**: process-lifetime counters of matched, missing and failed
//!   rows per flashlist type, shareable with health tooling.
//!
//! - **`tcds`**: decoding of the TCDS partition manager TTS channel table.
//!
//! - **`cycle`**: the `Aggregator`, which owns the graph, serialises the
//!   application of one cycle and publishes the completed graph atomically.
//!
//! - **`session`**: the session-scoped filter values.

/// Owns the graph and drives one cycle at a time.
pub mod cycle;
/// The derived-metric pass.
pub mod derive;
/// Routes flashlist rows to entities.
pub mod dispatcher;
/// Match accounting per flashlist type.
pub mod reporter;
/// Session-scoped filter values.
pub mod session;
/// TCDS TTS channel decoding.
pub mod tcds;

pub use cycle::Aggregator;
pub use derive::calculate_derived_values;
pub use dispatcher::FlashlistDispatcher;
pub use reporter::{MappingStats, MatchReporter};
pub use session::SessionContext;
