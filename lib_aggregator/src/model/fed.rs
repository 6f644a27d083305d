use serde::{Deserialize, Serialize};

use super::field::{AccumulatedCounter, FieldSpec};
use super::{FedId, FlashlistUpdatable, FmmId, FrlId, Uid};
use crate::flashlist::{FlashlistType, Row, RowError};

const FRACTION_WARNING: FieldSpec = FieldSpec::percent("fractionWarning");
const FRACTION_BUSY: FieldSpec = FieldSpec::percent("fractionBusy");
const INPUT_STATE: FieldSpec = FieldSpec::direct("inputState");
const FMM_MASK: FieldSpec = FieldSpec::inverted("isActive");

const WRONG_FED_ID: FieldSpec = FieldSpec::direct("WrongFEDId");
const LINK_CRC_ERRORS: FieldSpec = FieldSpec::direct("LinkCRCError");
const FED_CRC_ERRORS: FieldSpec = FieldSpec::direct("FEDCRCError");
const TRIGGER_NUMBER: FieldSpec = FieldSpec::direct("TriggerNumber");
const EVENT_COUNTER: FieldSpec = FieldSpec::direct("EventCounter");
const ACC_BACKPRESSURE: FieldSpec = FieldSpec::direct("AccBackpressureSecond");

const STREAM_MASK: FieldSpec = FieldSpec::inverted("enable");

/// One front-end driver channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fed {
    pub uid: Uid,
    pub id: u32,
    pub src_id_expected: u32,
    pub frl: Option<FrlId>,
    /// Input of the FRL this FED is plugged into (0 or 1).
    pub frl_io: Option<u8>,
    pub fmm: Option<FmmId>,
    pub fmm_io: Option<u32>,
    /// For pseudo-FEDs: the real FEDs whose TTS they stand in for.
    pub main_feds: Vec<FedId>,
    pub has_slink: bool,
    pub has_tts: bool,

    pub src_id_received: i64,
    pub num_scrc_errors: u64,
    pub num_frc_errors: u64,
    pub num_triggers: u64,
    pub event_counter: u64,
    pub percent_backpressure: f64,
    pub percent_warning: f64,
    pub percent_busy: f64,
    pub tts_state: Option<String>,
    pub fmm_masked: bool,
    pub frl_masked: bool,
    pub ru_fed_in_error: bool,
    pub ru_fed_without_fragments: bool,
    /// Timestamp of the last input stream row applied.
    pub timestamp: Option<String>,

    #[serde(skip)]
    backpressure: AccumulatedCounter,
}

impl Fed {
    pub fn new(uid: Uid, id: u32, src_id_expected: u32) -> Self {
        Self {
            uid,
            id,
            src_id_expected,
            frl: None,
            frl_io: None,
            fmm: None,
            fmm_io: None,
            main_feds: Vec::new(),
            has_slink: false,
            has_tts: false,
            src_id_received: 0,
            num_scrc_errors: 0,
            num_frc_errors: 0,
            num_triggers: 0,
            event_counter: 0,
            percent_backpressure: 0.0,
            percent_warning: 0.0,
            percent_busy: 0.0,
            tts_state: None,
            fmm_masked: false,
            frl_masked: false,
            ru_fed_in_error: false,
            ru_fed_without_fragments: false,
            timestamp: None,
            backpressure: AccumulatedCounter::default(),
        }
    }

    fn update_from_input_stream(&mut self, row: &dyn Row) -> Result<(), RowError> {
        let src_id_received = row.int(WRONG_FED_ID.column)?;
        let num_scrc_errors = LINK_CRC_ERRORS.read_uint(row)?;
        let num_frc_errors = FED_CRC_ERRORS.read_uint(row)?;
        let num_triggers = TRIGGER_NUMBER.read_uint(row)?;
        let event_counter = EVENT_COUNTER.read_uint(row)?;
        let timestamp = row.timestamp("timestamp")?;
        let acc_backpressure = ACC_BACKPRESSURE.read_float(row)?;

        self.src_id_received = src_id_received;
        self.num_scrc_errors = num_scrc_errors;
        self.num_frc_errors = num_frc_errors;
        self.num_triggers = num_triggers;
        self.event_counter = event_counter;
        if self.backpressure.observe(&timestamp, acc_backpressure) {
            self.percent_backpressure = self.backpressure.delta();
        }
        self.timestamp = Some(timestamp);
        Ok(())
    }

    /// Drops the RU problem-list flags. Only FEDs an RU row names in the
    /// current cycle carry them.
    pub(crate) fn clear_ru_flags(&mut self) {
        self.ru_fed_in_error = false;
        self.ru_fed_without_fragments = false;
    }

    fn update_from_ru_lists(&mut self, row: &dyn Row) -> Result<(), RowError> {
        let with_errors = optional_list(row, "fedIdsWithErrors")?;
        let without_fragments = optional_list(row, "fedIdsWithoutFragments")?;
        let expected = i64::from(self.src_id_expected);

        self.ru_fed_in_error = with_errors.contains(&expected);
        self.ru_fed_without_fragments = without_fragments.contains(&expected);
        Ok(())
    }
}

fn optional_list(row: &dyn Row, key: &str) -> Result<Vec<i64>, RowError> {
    if row.has(key) {
        row.int_list(key)
    } else {
        Ok(Vec::new())
    }
}

impl FlashlistUpdatable for Fed {
    fn update_from_flashlist(&mut self, flashlist_type: FlashlistType, row: &dyn Row) -> Result<(), RowError> {
        match flashlist_type {
            FlashlistType::FmmInput => {
                let percent_warning = FRACTION_WARNING.read_float(row)?;
                let percent_busy = FRACTION_BUSY.read_float(row)?;
                let tts_state = INPUT_STATE.read_text(row)?;
                let fmm_masked = FMM_MASK.read_flag(row)?;

                self.percent_warning = percent_warning;
                self.percent_busy = percent_busy;
                self.tts_state = Some(tts_state);
                self.fmm_masked = fmm_masked;
            }
            FlashlistType::FerolInputStream | FlashlistType::Ferol40InputStream => {
                self.update_from_input_stream(row)?;
            }
            FlashlistType::FerolConfiguration => {
                let column = match self.frl_io {
                    Some(0) => "enableStream0",
                    Some(1) => "enableStream1",
                    _ => return Ok(()),
                };
                self.frl_masked = FieldSpec::inverted(column).read_flag(row)?;
            }
            FlashlistType::Ferol40StreamConfiguration => {
                self.frl_masked = STREAM_MASK.read_flag(row)?;
            }
            FlashlistType::Ru => {
                self.update_from_ru_lists(row)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.src_id_received = 0;
        self.num_scrc_errors = 0;
        self.num_frc_errors = 0;
        self.num_triggers = 0;
        self.event_counter = 0;
        self.percent_backpressure = 0.0;
        self.percent_warning = 0.0;
        self.percent_busy = 0.0;
        self.tts_state = None;
        self.fmm_masked = false;
        self.frl_masked = false;
        self.clear_ru_flags();
        self.timestamp = None;
        self.backpressure.reset();
    }
}
