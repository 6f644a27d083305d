//! # Matchers
//!
//! A matcher resolves the rows of one flashlist to the entities they describe.
//! Each strategy implements one correspondence rule:
//!
//! - **[`HostnameMatcher`]**: the host part of a `host:port` column against a
//!   hostname index.
//! - **[`GeoMatcher`]**: a structural position (host, slot, input) built from
//!   row columns against the position each entity occupies in the topology.
//! - **[`InstanceMatcher`]**: a small integer instance id.
//! - **[`IdListMatcher`]**: every id listed in one or more list columns, so one
//!   row may address many entities.
//!
//! Matchers only read the graph. They return a [`MatchOutcome`]; applying the
//! rows is left to the dispatcher, which holds the only mutable borrow.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::EntityRef;

pub mod geo;
pub mod hostname;
pub mod id_list;
pub mod instance;

pub use geo::{GeoFinder, GeoKey, GeoMatcher};
pub use hostname::{hostname_from_context, port_from_context, HostnameMatcher};
pub use id_list::IdListMatcher;
pub use instance::InstanceMatcher;

/// Result of matching one table against one entity pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchOutcome {
    /// Entity to index of the row that will be applied to it. When several
    /// rows resolve to the same entity the last one is kept.
    pub correspondences: BTreeMap<EntityRef, usize>,
    /// Resolved units (rows, or list entries for [`IdListMatcher`]).
    pub matched: usize,
    /// Units that resolved to nothing.
    pub unmatched: usize,
    /// Rows with at least one resolved unit.
    pub resolved_rows: BTreeSet<usize>,
    /// Rows with at least one unit that resolved to nothing.
    pub missed_rows: BTreeSet<usize>,
}

impl MatchOutcome {
    pub(crate) fn assign(&mut self, entity: EntityRef, row: usize) {
        self.correspondences.insert(entity, row);
    }

    /// Counts one resolved unit of row `row`.
    pub(crate) fn hit(&mut self, row: usize) {
        self.matched += 1;
        self.resolved_rows.insert(row);
    }

    /// Counts one unit of row `row` that resolved to nothing.
    pub(crate) fn miss(&mut self, row: usize) {
        self.unmatched += 1;
        self.missed_rows.insert(row);
    }

    /// Row assigned to `entity`, if any.
    pub fn row_for(&self, entity: EntityRef) -> Option<usize> {
        self.correspondences.get(&entity).copied()
    }

    pub fn total(&self) -> usize {
        self.matched + self.unmatched
    }

    /// Rows that resolved nothing at all.
    pub fn unresolved_rows(&self) -> impl Iterator<Item = usize> + '_ {
        self.missed_rows.difference(&self.resolved_rows).copied()
    }
}
