//! # Entity Graph
//!
//! The DAQ topology is stored flat: every entity type lives in its own arena
//! on the [`Daq`] root and relationships are typed indices into those arenas.
//! Entities that are reachable from several parents (a FED through its FRL and
//! through the RU error lists, a TTC partition shared by several
//! sub-FED-builders) therefore exist exactly once, and serialising the root
//! writes each entity once with its references as plain ids.
//!
//! Besides its arena index every entity carries a [`Uid`], handed out once by
//! the topology builder from a [`UidAllocator`] and never reused, so exported
//! identities stay unique across sessions of one process.

use serde::{Deserialize, Serialize};

use crate::flashlist::{FlashlistType, Row, RowError};

/// Root of the graph, run information and global aggregates.
pub mod daq;
/// Front-end drivers.
pub mod fed;
/// FED builders and sub-FED-builders.
pub mod fed_builder;
/// Per-field update plans.
pub mod field;
/// FRLs and FRL PCs.
pub mod frl;
/// Builder units.
pub mod builder_unit;
/// Readout units.
pub mod readout_unit;
/// Topology description and builder.
pub mod topology;
/// FMMs, TTC partitions and subsystems.
pub mod trigger;

pub use builder_unit::Bu;
pub use daq::{BuSummary, Daq, FedBuilderSummary, GlobalTtsState, Indexes, RunInfo, TcdsGlobalInfo};
pub use fed::Fed;
pub use fed_builder::{FedBuilder, SubFedBuilder};
pub use field::{AccumulatedCounter, Conversion, FieldSpec};
pub use frl::{Frl, FrlKind, FrlPc};
pub use readout_unit::Ru;
pub use topology::{TopologyError, TopologySpec};
pub use trigger::{Fmm, FmmApplication, SubSystem, TcdsPartitionInfo, TtcPartition};

/// Process-unique identity of one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(pub u64);

/// Hands out [`Uid`]s. Keep one allocator for the whole process and pass it
/// to every topology build so identities are never reused.
#[derive(Debug, Clone)]
pub struct UidAllocator {
    next: u64,
}

impl UidAllocator {
    /// Starts at 1.
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Returns the next unused identity.
    pub fn allocate(&mut self) -> Uid {
        let uid = Uid(self.next);
        self.next += 1;
        uid
    }
}

impl Default for UidAllocator {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! entity_id {
    ($($(#[$meta:meta])* $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(pub u32);

            impl $name {
                /// Position in the owning arena.
                pub fn index(self) -> usize {
                    self.0 as usize
                }

                pub(crate) fn from_index(index: usize) -> Self {
                    Self(index as u32)
                }
            }
        )*
    };
}

entity_id! {
    /// Index of a [`Fed`].
    FedId;
    /// Index of a [`Frl`].
    FrlId;
    /// Index of a [`FrlPc`].
    FrlPcId;
    /// Index of a [`Ru`].
    RuId;
    /// Index of a [`Bu`].
    BuId;
    /// Index of a [`FedBuilder`].
    FedBuilderId;
    /// Index of a [`SubFedBuilder`].
    SubFedBuilderId;
    /// Index of a [`Fmm`].
    FmmId;
    /// Index of a [`FmmApplication`].
    FmmApplicationId;
    /// Index of a [`TtcPartition`].
    TtcPartitionId;
    /// Index of a [`SubSystem`].
    SubSystemId;
}

/// Any entity that can receive flashlist rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityRef {
    /// Run-level information on the root.
    Run,
    /// TCDS global information on the root.
    TcdsGlobalInfo,
    /// A FED.
    Fed(FedId),
    /// An FRL.
    Frl(FrlId),
    /// An FRL PC.
    FrlPc(FrlPcId),
    /// A readout unit.
    Ru(RuId),
    /// A builder unit.
    Bu(BuId),
    /// An FMM.
    Fmm(FmmId),
    /// An FMM application.
    FmmApplication(FmmApplicationId),
    /// A TTC partition.
    TtcPartition(TtcPartitionId),
    /// A subsystem.
    SubSystem(SubSystemId),
}

/// The update contract every flashlist-fed entity implements.
pub trait FlashlistUpdatable {
    /// Applies one row of the named flashlist.
    ///
    /// Implementations read every field they need before assigning anything,
    /// so an `Err` leaves the entity exactly as it was. Flashlist types the
    /// entity does not consume return `Ok(())` without touching it.
    fn update_from_flashlist(&mut self, flashlist_type: FlashlistType, row: &dyn Row) -> Result<(), RowError>;

    /// Zeroes every periodically updated field, keeping identity and topology.
    fn reset(&mut self);
}

/// Reads the crash state from a job-control row: a process counts as crashed
/// as soon as one of its jobs reports a status other than `alive`.
pub(crate) fn crashed_from_job_table(row: &dyn Row) -> Result<bool, RowError> {
    let jobs = row.table("jobTable")?;
    let mut crashed = false;
    for job in jobs {
        let status = job.text("status")?;
        if !status.eq_ignore_ascii_case("alive") {
            crashed = true;
        }
    }
    Ok(crashed)
}
