use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{crashed_from_job_table, FedId, FlashlistUpdatable, FrlPcId, SubFedBuilderId, Uid};
use crate::flashlist::{FlashlistType, Row, RowError};

/// Hardware generation of an FRL card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrlKind {
    /// Legacy FEROL, two inputs.
    #[default]
    Ferol,
    /// FEROL40, up to four streams.
    Ferol40,
}

impl FrlKind {
    /// The status flashlist this kind of card publishes.
    pub fn status_flashlist(self) -> FlashlistType {
        match self {
            FrlKind::Ferol => FlashlistType::FerolStatus,
            FrlKind::Ferol40 => FlashlistType::Ferol40Status,
        }
    }
}

/// A readout card in one slot of a readout crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frl {
    pub uid: Uid,
    pub geo_slot: u32,
    pub kind: FrlKind,
    pub sub_fed_builder: SubFedBuilderId,
    /// PC that controls this card, inherited from the sub-FED-builder.
    pub frl_pc: Option<FrlPcId>,
    /// FEDs keyed by the input they are plugged into.
    pub feds: BTreeMap<u8, FedId>,

    pub state_name: Option<String>,
}

impl Frl {
    pub fn new(uid: Uid, geo_slot: u32, kind: FrlKind, sub_fed_builder: SubFedBuilderId) -> Self {
        Self {
            uid,
            geo_slot,
            kind,
            sub_fed_builder,
            frl_pc: None,
            feds: BTreeMap::new(),
            state_name: None,
        }
    }
}

impl FlashlistUpdatable for Frl {
    fn update_from_flashlist(&mut self, flashlist_type: FlashlistType, row: &dyn Row) -> Result<(), RowError> {
        if flashlist_type == self.kind.status_flashlist() {
            self.state_name = Some(row.text("stateName")?);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.state_name = None;
    }
}

/// A PC driving one or more FRL crates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrlPc {
    pub uid: Uid,
    pub hostname: String,
    pub crashed: bool,
}

impl FrlPc {
    pub fn new(uid: Uid, hostname: impl Into<String>) -> Self {
        Self { uid, hostname: hostname.into(), crashed: false }
    }
}

impl FlashlistUpdatable for FrlPc {
    fn update_from_flashlist(&mut self, flashlist_type: FlashlistType, row: &dyn Row) -> Result<(), RowError> {
        if flashlist_type == FlashlistType::JobControl {
            self.crashed = crashed_from_job_table(row)?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.crashed = false;
    }
}
