//! # DAQ Aggregator Library
//!
//! Projects periodic monitoring tables ("flashlists") onto a typed entity graph
//! describing the data-acquisition topology: FEDs, FRLs, readout units, builder
//! units, FMMs, TTC partitions and subsystems.
//!
//! ## Layout
//!
//! - **`flashlist`**: the flashlist registry, the typed row accessor and the
//!   LAS payload representation.
//! - **`model`**: the entity graph (arenas keyed by typed ids), the update
//!   contract and the topology builder.
//! - **`matchers`**: row-to-entity correspondence strategies.
//! - **`core`**: the dispatcher, the derived-metric pass, the match reporter
//!   and the cycle driver that publishes completed graphs.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

pub mod core;
pub mod flashlist;
pub mod matchers;
pub mod model;

pub use crate::core::{Aggregator, FlashlistDispatcher, MappingStats, MatchReporter, SessionContext};
pub use crate::flashlist::{Flashlist, FlashlistError, FlashlistType, Row, RowError};
pub use crate::model::{Daq, EntityRef, FlashlistUpdatable, TopologyError, TopologySpec, UidAllocator};
