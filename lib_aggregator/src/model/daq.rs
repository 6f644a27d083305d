//! # DAQ Root
//!
//! [`Daq`] owns every arena of the graph together with the run-level
//! information and the global aggregates recomputed by the derived pass.
//! Lookup indexes (by hostname, instance, FED id, subsystem name) are not part
//! of the exported graph; they are rebuilt from the arenas with
//! [`Daq::rebuild_indexes`] whenever a graph is assembled or deserialised.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::{
    Bu, BuId, EntityRef, Fed, FedBuilder, FedBuilderId, FedId, FlashlistUpdatable, Fmm, FmmApplication,
    FmmApplicationId, FmmId, Frl, FrlId, FrlPc, FrlPcId, Ru, RuId, SubFedBuilder, SubFedBuilderId, SubSystem,
    SubSystemId, TtcPartition, TtcPartitionId, Uid,
};
use crate::flashlist::{FlashlistType, Row, RowError};

/// Run-level values published by the level-zero function manager.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunInfo {
    pub session_id: Option<i64>,
    pub run_number: Option<i64>,
    pub level_zero_state: Option<String>,
    pub daq_state: Option<String>,
    pub lhc_machine_mode: Option<String>,
    pub lhc_beam_mode: Option<String>,
    /// Completion time of the last cycle, milliseconds since the epoch.
    pub last_update: u64,
}

impl FlashlistUpdatable for RunInfo {
    fn update_from_flashlist(&mut self, flashlist_type: FlashlistType, row: &dyn Row) -> Result<(), RowError> {
        match flashlist_type {
            FlashlistType::LevelZeroFmDynamic => {
                let session_id = row.int("SID")?;
                let run_number = row.int("RUN_NUMBER")?;
                let state = row.text("STATE")?;
                let machine_mode = optional_text(row, "LHC_MACHINE_MODE")?;
                let beam_mode = optional_text(row, "LHC_BEAM_MODE")?;

                self.session_id = Some(session_id);
                self.run_number = Some(run_number);
                self.level_zero_state = Some(state);
                self.lhc_machine_mode = machine_mode;
                self.lhc_beam_mode = beam_mode;
            }
            FlashlistType::LevelZeroFmSubsys => {
                self.daq_state = Some(row.text("STATE")?);
            }
            _ => {}
        }
        Ok(())
    }

    /// The session id survives a reset: it is what the next cycle filters
    /// `LEVEL_ZERO_FM_SUBSYS` rows on. After a session boundary the old id
    /// stays in force until a `LEVEL_ZERO_FM_DYNAMIC` row of the new session is
    /// applied. That table is dispatched first in every cycle, so a cycle that
    /// carries both tables filters its subsystem rows on the new id. A cycle
    /// without the dynamic table keeps filtering on the old one.
    fn reset(&mut self) {
        *self = RunInfo { session_id: self.session_id, ..RunInfo::default() };
    }
}

fn optional_text(row: &dyn Row, key: &str) -> Result<Option<String>, RowError> {
    if row.has(key) {
        row.text(key).map(Some)
    } else {
        Ok(None)
    }
}

/// State of one global TTS output read from the TCDS partition manager.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalTtsState {
    pub state: String,
    pub percent_busy: f64,
    pub percent_warning: f64,
}

/// Trigger counters, deadtimes, rates and TTS states of the TCDS partition manager in use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TcdsGlobalInfo {
    pub tcds_controller_service_name: Option<String>,
    pub tcds_controller_context: Option<String>,

    pub trg_cnt_total: u64,
    pub sup_trg_cnt_total: u64,

    pub deadtime_total: f64,
    pub deadtime_tts: f64,
    pub deadtime_trg_rules: f64,
    pub deadtime_bunch_mask_veto: f64,
    pub deadtime_retri: f64,
    pub deadtime_daq_bp: f64,

    pub trg_rate_total: f64,
    pub sup_trg_rate_total: f64,
    pub trg_rate_beamactive_total: f64,

    pub cnt_resync: u64,
    pub cnt_oc0: u64,
    pub cnt_hard_reset: u64,
    pub cnt_start: u64,

    pub global_tts_states: BTreeMap<String, GlobalTtsState>,
}

impl FlashlistUpdatable for TcdsGlobalInfo {
    fn update_from_flashlist(&mut self, flashlist_type: FlashlistType, row: &dyn Row) -> Result<(), RowError> {
        match flashlist_type {
            FlashlistType::TcdsCpmCounts => {
                let trg_cnt_total = row.uint("trg_cnt_total")?;
                let sup_trg_cnt_total = row.uint("sup_trg_cnt_total")?;

                self.trg_cnt_total = trg_cnt_total;
                self.sup_trg_cnt_total = sup_trg_cnt_total;
            }
            FlashlistType::TcdsCpmDeadtimes => {
                let total = row.float("deadtime_total")?;
                let tts = row.float("deadtime_tts")?;
                let trg_rules = row.float("deadtime_trg_rules")?;
                let bunch_mask_veto = row.float("deadtime_bunch_mask_veto")?;
                let retri = row.float("deadtime_retri")?;
                let daq_bp = row.float("deadtime_daq_bp")?;

                self.deadtime_total = total;
                self.deadtime_tts = tts;
                self.deadtime_trg_rules = trg_rules;
                self.deadtime_bunch_mask_veto = bunch_mask_veto;
                self.deadtime_retri = retri;
                self.deadtime_daq_bp = daq_bp;
            }
            FlashlistType::TcdsCpmRates => {
                let total = row.float("trg_rate_total")?;
                let suppressed = row.float("sup_trg_rate_total")?;
                let beam_active = row.float("trg_rate_beamactive_total")?;

                self.trg_rate_total = total;
                self.sup_trg_rate_total = suppressed;
                self.trg_rate_beamactive_total = beam_active;
            }
            FlashlistType::TcdsPmActionCounts => {
                let resync = row.uint("cnt_resync")?;
                let oc0 = row.uint("cnt_oc0")?;
                let hard_reset = row.uint("cnt_hard_reset")?;
                let start = row.uint("cnt_start")?;

                self.cnt_resync = resync;
                self.cnt_oc0 = oc0;
                self.cnt_hard_reset = hard_reset;
                self.cnt_start = start;
            }
            _ => {}
        }
        Ok(())
    }

    fn reset(&mut self) {
        *self = TcdsGlobalInfo::default();
    }
}

/// Aggregate over all readout units.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FedBuilderSummary {
    pub rate: f64,
    pub throughput: f64,
    pub super_fragment_size_mean: f64,
    pub super_fragment_size_stddev: f64,
    pub delta_events: u64,
    pub sum_events_in_ru: u64,
    pub sum_fragments_in_ru: u64,
    pub sum_requests: u64,
}

/// Aggregate over all builder units.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuSummary {
    pub rate: f64,
    pub throughput: f64,
    pub event_size_mean: f64,
    pub events_in_bu: u64,
    pub events_built: u64,
    pub number_of_bus: usize,
}

/// Lookup tables over the arenas. Not exported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Indexes {
    pub rus_by_hostname: HashMap<String, RuId>,
    pub bus_by_hostname: HashMap<String, BuId>,
    pub frl_pcs_by_hostname: HashMap<String, FrlPcId>,
    pub fmm_applications_by_hostname: HashMap<String, FmmApplicationId>,
    pub rus_by_instance: HashMap<u32, RuId>,
    pub bus_by_instance: HashMap<u32, BuId>,
    pub feds_by_id: HashMap<u32, FedId>,
    pub feds_by_expected_id: HashMap<u32, FedId>,
    pub sub_systems_by_name: HashMap<String, SubSystemId>,
}

/// Root of the entity graph for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Daq {
    pub uid: Uid,
    pub run: RunInfo,
    pub fed_builder_summary: FedBuilderSummary,
    pub bu_summary: BuSummary,
    pub tcds_global_info: TcdsGlobalInfo,

    pub fed_builders: Vec<FedBuilder>,
    pub sub_fed_builders: Vec<SubFedBuilder>,
    pub frls: Vec<Frl>,
    pub frl_pcs: Vec<FrlPc>,
    pub feds: Vec<Fed>,
    pub rus: Vec<Ru>,
    pub bus: Vec<Bu>,
    pub fmms: Vec<Fmm>,
    pub fmm_applications: Vec<FmmApplication>,
    pub ttc_partitions: Vec<TtcPartition>,
    pub sub_systems: Vec<SubSystem>,

    #[serde(skip)]
    indexes: Indexes,
}

impl Daq {
    /// An empty graph. Arenas are filled by the topology builder.
    pub fn new(uid: Uid) -> Self {
        Self {
            uid,
            run: RunInfo::default(),
            fed_builder_summary: FedBuilderSummary::default(),
            bu_summary: BuSummary::default(),
            tcds_global_info: TcdsGlobalInfo::default(),
            fed_builders: Vec::new(),
            sub_fed_builders: Vec::new(),
            frls: Vec::new(),
            frl_pcs: Vec::new(),
            feds: Vec::new(),
            rus: Vec::new(),
            bus: Vec::new(),
            fmms: Vec::new(),
            fmm_applications: Vec::new(),
            ttc_partitions: Vec::new(),
            sub_systems: Vec::new(),
            indexes: Indexes::default(),
        }
    }

    /// Session id the level-zero tables are filtered on.
    pub fn session_id(&self) -> Option<i64> {
        self.run.session_id
    }

    pub fn indexes(&self) -> &Indexes {
        &self.indexes
    }

    /// Recomputes every lookup table from the arenas. When two entities share
    /// a key the one registered first keeps it.
    pub fn rebuild_indexes(&mut self) {
        let mut indexes = Indexes::default();
        for (i, ru) in self.rus.iter().enumerate() {
            indexes.rus_by_hostname.entry(ru.hostname.clone()).or_insert(RuId::from_index(i));
            if let Some(instance) = ru.instance {
                indexes.rus_by_instance.entry(instance).or_insert(RuId::from_index(i));
            }
        }
        for (i, bu) in self.bus.iter().enumerate() {
            indexes.bus_by_hostname.entry(bu.hostname.clone()).or_insert(BuId::from_index(i));
            if let Some(instance) = bu.instance {
                indexes.bus_by_instance.entry(instance).or_insert(BuId::from_index(i));
            }
        }
        for (i, pc) in self.frl_pcs.iter().enumerate() {
            indexes.frl_pcs_by_hostname.entry(pc.hostname.clone()).or_insert(FrlPcId::from_index(i));
        }
        for (i, app) in self.fmm_applications.iter().enumerate() {
            indexes
                .fmm_applications_by_hostname
                .entry(app.hostname.clone())
                .or_insert(FmmApplicationId::from_index(i));
        }
        for (i, fed) in self.feds.iter().enumerate() {
            indexes.feds_by_id.entry(fed.id).or_insert(FedId::from_index(i));
            indexes.feds_by_expected_id.entry(fed.src_id_expected).or_insert(FedId::from_index(i));
        }
        for (i, subsystem) in self.sub_systems.iter().enumerate() {
            indexes.sub_systems_by_name.entry(subsystem.name.clone()).or_insert(SubSystemId::from_index(i));
        }
        self.indexes = indexes;
    }

    /// The FED with the given id, if the topology has one.
    pub fn fed_by_id(&self, id: u32) -> Option<&Fed> {
        self.indexes.feds_by_id.get(&id).and_then(|fed| self.feds.get(fed.index()))
    }

    /// The RU on the given host, if any.
    pub fn ru_by_hostname(&self, hostname: &str) -> Option<&Ru> {
        self.indexes.rus_by_hostname.get(hostname).and_then(|ru| self.rus.get(ru.index()))
    }

    /// The event manager, if the topology has one.
    pub fn evm(&self) -> Option<&Ru> {
        self.rus.iter().find(|ru| ru.is_evm)
    }

    /// FEDs plugged into the FRLs of one sub-FED-builder.
    pub fn sub_fed_builder_feds(&self, id: SubFedBuilderId) -> impl Iterator<Item = &Fed> + '_ {
        self.sub_fed_builders
            .get(id.index())
            .into_iter()
            .flat_map(|sfb| sfb.frls.iter())
            .filter_map(move |frl| self.frls.get(frl.index()))
            .flat_map(|frl| frl.feds.values())
            .filter_map(move |fed| self.feds.get(fed.index()))
    }

    /// FEDs read out through one FED builder.
    pub fn fed_builder_feds(&self, id: FedBuilderId) -> impl Iterator<Item = &Fed> + '_ {
        self.fed_builders
            .get(id.index())
            .into_iter()
            .flat_map(|fb| fb.sub_fed_builders.iter())
            .flat_map(move |sfb| self.sub_fed_builder_feds(*sfb))
    }

    /// Every entity that accepts flashlist rows, in a stable order.
    pub fn entity_refs(&self) -> impl Iterator<Item = EntityRef> + '_ {
        let fixed = [EntityRef::Run, EntityRef::TcdsGlobalInfo].into_iter();
        fixed
            .chain((0..self.feds.len()).map(|i| EntityRef::Fed(FedId::from_index(i))))
            .chain((0..self.frls.len()).map(|i| EntityRef::Frl(FrlId::from_index(i))))
            .chain((0..self.frl_pcs.len()).map(|i| EntityRef::FrlPc(FrlPcId::from_index(i))))
            .chain((0..self.rus.len()).map(|i| EntityRef::Ru(RuId::from_index(i))))
            .chain((0..self.bus.len()).map(|i| EntityRef::Bu(BuId::from_index(i))))
            .chain((0..self.fmms.len()).map(|i| EntityRef::Fmm(FmmId::from_index(i))))
            .chain(
                (0..self.fmm_applications.len()).map(|i| EntityRef::FmmApplication(FmmApplicationId::from_index(i))),
            )
            .chain((0..self.ttc_partitions.len()).map(|i| EntityRef::TtcPartition(TtcPartitionId::from_index(i))))
            .chain((0..self.sub_systems.len()).map(|i| EntityRef::SubSystem(SubSystemId::from_index(i))))
    }

    /// Mutable access to one entity through the update contract.
    pub fn entity_mut(&mut self, entity: EntityRef) -> Option<&mut dyn FlashlistUpdatable> {
        fn upd<T: FlashlistUpdatable>(e: &mut T) -> &mut dyn FlashlistUpdatable {
            e
        }
        match entity {
            EntityRef::Run => Some(upd(&mut self.run)),
            EntityRef::TcdsGlobalInfo => Some(upd(&mut self.tcds_global_info)),
            EntityRef::Fed(id) => self.feds.get_mut(id.index()).map(upd),
            EntityRef::Frl(id) => self.frls.get_mut(id.index()).map(upd),
            EntityRef::FrlPc(id) => self.frl_pcs.get_mut(id.index()).map(upd),
            EntityRef::Ru(id) => self.rus.get_mut(id.index()).map(upd),
            EntityRef::Bu(id) => self.bus.get_mut(id.index()).map(upd),
            EntityRef::Fmm(id) => self.fmms.get_mut(id.index()).map(upd),
            EntityRef::FmmApplication(id) => self.fmm_applications.get_mut(id.index()).map(upd),
            EntityRef::TtcPartition(id) => self.ttc_partitions.get_mut(id.index()).map(upd),
            EntityRef::SubSystem(id) => self.sub_systems.get_mut(id.index()).map(upd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dynamic_level_zero_row_sets_run_info() {
        let mut run = RunInfo::default();
        let row = json!({"SID": "351", "RUN_NUMBER": 300123, "STATE": "Running", "LHC_BEAM_MODE": "STABLE BEAMS"});
        run.update_from_flashlist(FlashlistType::LevelZeroFmDynamic, &row).unwrap();

        assert_eq!(run.session_id, Some(351));
        assert_eq!(run.run_number, Some(300123));
        assert_eq!(run.lhc_beam_mode.as_deref(), Some("STABLE BEAMS"));
        assert_eq!(run.lhc_machine_mode, None);

        run.reset();
        assert_eq!(run.session_id, Some(351));
        assert_eq!(run.run_number, None);
    }

    #[test]
    fn tcds_deadtimes_apply_as_a_whole() {
        let mut tcds = TcdsGlobalInfo::default();
        let partial = json!({"deadtime_total": 1.5, "deadtime_tts": 0.2});
        assert!(tcds.update_from_flashlist(FlashlistType::TcdsCpmDeadtimes, &partial).is_err());
        assert_eq!(tcds, TcdsGlobalInfo::default());

        let full = json!({
            "deadtime_total": 1.5, "deadtime_tts": 0.2, "deadtime_trg_rules": 0.3,
            "deadtime_bunch_mask_veto": 0.0, "deadtime_retri": 0.1, "deadtime_daq_bp": 0.9
        });
        tcds.update_from_flashlist(FlashlistType::TcdsCpmDeadtimes, &full).unwrap();
        assert_eq!(tcds.deadtime_total, 1.5);
        assert_eq!(tcds.deadtime_daq_bp, 0.9);
    }

    #[test]
    fn entity_mut_resolves_every_arena() {
        let mut daq = Daq::new(Uid(1));
        daq.feds.push(Fed::new(Uid(2), 7, 7));
        daq.rebuild_indexes();

        let refs: Vec<_> = daq.entity_refs().collect();
        assert_eq!(refs, vec![EntityRef::Run, EntityRef::TcdsGlobalInfo, EntityRef::Fed(FedId(0))]);
        assert!(daq.entity_mut(EntityRef::Fed(FedId(0))).is_some());
        assert!(daq.entity_mut(EntityRef::Fed(FedId(1))).is_none());
        assert_eq!(daq.fed_by_id(7).map(|fed| fed.uid), Some(Uid(2)));
    }
}
