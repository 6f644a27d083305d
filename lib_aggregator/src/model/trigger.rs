//! Trigger-throttling side of the topology: FMMs, the applications that
//! drive them, TTC partitions and the subsystems that own the partitions.

use serde::{Deserialize, Serialize};

use super::field::FieldSpec;
use super::{crashed_from_job_table, FedId, FlashlistUpdatable, FmmApplicationId, FmmId, SubSystemId, TtcPartitionId, Uid};
use crate::flashlist::{FlashlistType, Row, RowError};

/// Columns describing one FMM output.
struct FmmOutput {
    state: FieldSpec,
    busy: FieldSpec,
    warning: FieldSpec,
}

const OUTPUT_A: FmmOutput = FmmOutput {
    state: FieldSpec::direct("outputStateA"),
    busy: FieldSpec::percent("outputFractionBusyA"),
    warning: FieldSpec::percent("outputFractionWarningA"),
};

const OUTPUT_B: FmmOutput = FmmOutput {
    state: FieldSpec::direct("outputStateB"),
    busy: FieldSpec::percent("outputFractionBusyB"),
    warning: FieldSpec::percent("outputFractionWarningB"),
};

impl FmmOutput {
    fn for_io(io: u8) -> &'static FmmOutput {
        if io == 0 {
            &OUTPUT_A
        } else {
            &OUTPUT_B
        }
    }

    fn read(&self, row: &dyn Row) -> Result<(String, f64, f64), RowError> {
        Ok((self.state.read_text(row)?, self.busy.read_float(row)?, self.warning.read_float(row)?))
    }
}

/// A fast merging module in one slot of an FMM crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fmm {
    pub uid: Uid,
    pub geoslot: u32,
    pub dual: bool,
    pub fmm_application: FmmApplicationId,
    pub ttc_partition: Option<TtcPartitionId>,
    pub feds: Vec<FedId>,

    pub output_state_a: Option<String>,
    pub output_state_b: Option<String>,
    pub percent_busy: f64,
    pub percent_warning: f64,
}

impl Fmm {
    pub fn new(uid: Uid, geoslot: u32, fmm_application: FmmApplicationId) -> Self {
        Self {
            uid,
            geoslot,
            dual: false,
            fmm_application,
            ttc_partition: None,
            feds: Vec::new(),
            output_state_a: None,
            output_state_b: None,
            percent_busy: 0.0,
            percent_warning: 0.0,
        }
    }
}

impl FlashlistUpdatable for Fmm {
    fn update_from_flashlist(&mut self, flashlist_type: FlashlistType, row: &dyn Row) -> Result<(), RowError> {
        if flashlist_type == FlashlistType::FmmStatus {
            let (state_a, busy, warning) = OUTPUT_A.read(row)?;
            let state_b = OUTPUT_B.state.read_text(row)?;

            self.output_state_a = Some(state_a);
            self.output_state_b = Some(state_b);
            self.percent_busy = busy;
            self.percent_warning = warning;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.output_state_a = None;
        self.output_state_b = None;
        self.percent_busy = 0.0;
        self.percent_warning = 0.0;
    }
}

/// The XDAQ application controlling a crate of FMMs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FmmApplication {
    pub uid: Uid,
    pub hostname: String,
    pub crashed: bool,
}

impl FmmApplication {
    pub fn new(uid: Uid, hostname: impl Into<String>) -> Self {
        Self { uid, hostname: hostname.into(), crashed: false }
    }
}

impl FlashlistUpdatable for FmmApplication {
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

/// Where a TTC partition is wired into the TCDS partition manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TcdsPartitionInfo {
    pub pm_nr: i64,
    pub ici_nr: i64,
    /// Set when the partition could not be located in TCDS; published as both TCDS states.
    pub null_cause: Option<String>,
}

/// A TTC partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtcPartition {
    pub uid: Uid,
    pub name: String,
    pub ttcp_nr: u32,
    /// Top-level FMM merging the partition's TTS states.
    pub fmm: Option<FmmId>,
    /// Output of `fmm` carrying this partition (0 = A, 1 = B).
    pub fmm_io: u8,
    pub sub_system: Option<SubSystemId>,
    pub tcds_partition_info: TcdsPartitionInfo,

    pub tts_state: Option<String>,
    pub percent_busy: f64,
    pub percent_warning: f64,
    pub tcds_pm_tts_state: Option<String>,
    pub tcds_apv_pm_tts_state: Option<String>,
}

impl TtcPartition {
    pub fn new(uid: Uid, name: impl Into<String>, ttcp_nr: u32) -> Self {
        Self {
            uid,
            name: name.into(),
            ttcp_nr,
            fmm: None,
            fmm_io: 0,
            sub_system: None,
            tcds_partition_info: TcdsPartitionInfo::default(),
            tts_state: None,
            percent_busy: 0.0,
            percent_warning: 0.0,
            tcds_pm_tts_state: None,
            tcds_apv_pm_tts_state: None,
        }
    }
}

impl FlashlistUpdatable for TtcPartition {
    fn update_from_flashlist(&mut self, flashlist_type: FlashlistType, row: &dyn Row) -> Result<(), RowError> {
        if flashlist_type == FlashlistType::FmmStatus {
            let (state, busy, warning) = FmmOutput::for_io(self.fmm_io).read(row)?;
            self.tts_state = Some(state);
            self.percent_busy = busy;
            self.percent_warning = warning;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.tts_state = None;
        self.percent_busy = 0.0;
        self.percent_warning = 0.0;
        self.tcds_pm_tts_state = None;
        self.tcds_apv_pm_tts_state = None;
    }
}

/// A detector subsystem as seen by the level-zero function manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubSystem {
    pub uid: Uid,
    pub name: String,
    pub ttc_partitions: Vec<TtcPartitionId>,
    pub status: Option<String>,
}

impl SubSystem {
    pub fn new(uid: Uid, name: impl Into<String>) -> Self {
        Self { uid, name: name.into(), ttc_partitions: Vec::new(), status: None }
    }
}

impl FlashlistUpdatable for SubSystem {
    fn update_from_flashlist(&mut self, flashlist_type: FlashlistType, row: &dyn Row) -> Result<(), RowError> {
        if flashlist_type == FlashlistType::LevelZeroFmSubsys {
            self.status = Some(row.text("STATE")?);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.status = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn status_row() -> serde_json::Value {
        json!({
            "context": "http://fmmpc-s1d12-12-01.cms:9999", "geoslot": 5,
            "outputStateA": "Ready", "outputStateB": "Busy",
            "outputFractionBusyA": 0.0, "outputFractionWarningA": 0.02,
            "outputFractionBusyB": 0.5, "outputFractionWarningB": 0.0
        })
    }

    #[test]
    fn partition_reads_the_output_it_is_wired_to() {
        let mut on_a = TtcPartition::new(Uid(1), "TOTDET", 1);
        let mut on_b = TtcPartition::new(Uid(2), "TRACKER", 2);
        on_b.fmm_io = 1;

        on_a.update_from_flashlist(FlashlistType::FmmStatus, &status_row()).unwrap();
        on_b.update_from_flashlist(FlashlistType::FmmStatus, &status_row()).unwrap();

        assert_eq!(on_a.tts_state.as_deref(), Some("Ready"));
        assert!((on_a.percent_warning - 2.0).abs() < 1e-9);
        assert_eq!(on_b.tts_state.as_deref(), Some("Busy"));
        assert_eq!(on_b.percent_busy, 50.0);
    }

    #[test]
    fn fmm_takes_both_output_states() {
        let mut fmm = Fmm::new(Uid(1), 5, FmmApplicationId(0));
        fmm.update_from_flashlist(FlashlistType::FmmStatus, &status_row()).unwrap();
        assert_eq!(fmm.output_state_a.as_deref(), Some("Ready"));
        assert_eq!(fmm.output_state_b.as_deref(), Some("Busy"));

        fmm.reset();
        assert_eq!(fmm.output_state_a, None);
        assert_eq!(fmm.geoslot, 5);
    }

    #[test]
    fn subsystem_status_from_level_zero() {
        let mut subsystem = SubSystem::new(Uid(1), "ECAL");
        subsystem
            .update_from_flashlist(FlashlistType::LevelZeroFmSubsys, &json!({"STATE": "Running"}))
            .unwrap();
        assert_eq!(subsystem.status.as_deref(), Some("Running"));
    }
}
