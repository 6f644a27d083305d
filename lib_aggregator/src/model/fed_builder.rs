use serde::{Deserialize, Serialize};

use super::{FedBuilderId, FrlId, FrlPcId, RuId, SubFedBuilderId, TtcPartitionId, Uid};

/// One event-building slice: a set of sub-FED-builders read out by one RU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FedBuilder {
    pub uid: Uid,
    pub name: String,
    pub sub_fed_builders: Vec<SubFedBuilderId>,
    pub ru: RuId,
}

/// One physical line of FRLs sharing a TTC partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubFedBuilder {
    pub uid: Uid,
    pub name: String,
    pub fed_builder: FedBuilderId,
    pub frls: Vec<FrlId>,
    pub ttc_partition: TtcPartitionId,
    pub frl_pc: Option<FrlPcId>,

    /// Lowest trigger counter over the owned FEDs, recomputed every cycle.
    pub min_trig: u64,
    /// Highest trigger counter over the owned FEDs, recomputed every cycle.
    pub max_trig: u64,
}

impl SubFedBuilder {
    /// Stores the trigger range of the owned FEDs. An empty range means no FEDs.
    pub fn set_trigger_range(&mut self, counters: impl IntoIterator<Item = u64>) {
        let mut range: Option<(u64, u64)> = None;
        for counter in counters {
            range = Some(match range {
                None => (counter, counter),
                Some((min, max)) => (min.min(counter), max.max(counter)),
            });
        }
        (self.min_trig, self.max_trig) = range.unwrap_or((0, 0));
    }
}
