use serde::{Deserialize, Serialize};

use super::field::FieldSpec;
use super::{crashed_from_job_table, FedBuilderId, FlashlistUpdatable, Uid};
use crate::flashlist::{FlashlistType, Row, RowError};
use crate::matchers::port_from_context;

const EVENT_RATE: FieldSpec = FieldSpec::direct("eventRate");
const SUPER_FRAGMENT_SIZE: FieldSpec = FieldSpec::direct("superFragmentSize");
const SUPER_FRAGMENT_SIZE_STDDEV: FieldSpec = FieldSpec::direct("superFragmentSizeStdDev");
const EVENTS_IN_RU: FieldSpec = FieldSpec::direct("eventsInRU");
const FRAGMENTS_IN_RU: FieldSpec = FieldSpec::direct("fragmentsInRU");
const EVENT_COUNT: FieldSpec = FieldSpec::direct("eventCount");
const ACTIVE_REQUESTS: FieldSpec = FieldSpec::direct("activeRequests");
const INCOMPLETE_SUPER_FRAGMENTS: FieldSpec = FieldSpec::direct("incompleteSuperFragmentCount");
const ALLOCATE_RATE: FieldSpec = FieldSpec::direct("allocateRate");
const ALLOCATE_RETRY_RATE: FieldSpec = FieldSpec::direct("allocateRetryRate");

/// A readout unit. One readout unit per session is flagged as the event manager (EVM).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ru {
    pub uid: Uid,
    pub hostname: String,
    pub instance: Option<u32>,
    pub is_evm: bool,
    pub fed_builder: FedBuilderId,

    pub port: u16,
    pub state_name: Option<String>,
    pub error_msg: Option<String>,
    pub rate: f64,
    /// `rate * super_fragment_size_mean`.
    pub throughput: f64,
    pub super_fragment_size_mean: f64,
    pub super_fragment_size_stddev: f64,
    pub fragments_in_ru: u64,
    pub events_in_ru: u64,
    pub event_count: u64,
    pub requests: u64,
    pub incomplete_super_fragment_count: u64,

    // Per-BU parallel lists, index-aligned and of equal length.
    pub throughput_per_bu: Vec<f64>,
    pub bu_tids: Vec<i64>,
    pub fragment_rate_per_bu: Vec<f64>,
    pub retry_rate_per_bu: Vec<f64>,

    pub allocate_rate: f64,
    pub allocate_retry_rate: f64,

    pub masked: bool,
    pub crashed: bool,
}

/// Values read from one RU or EVM row, held until the whole row validated.
struct RuRow {
    port: u16,
    state_name: String,
    error_msg: String,
    rate: f64,
    super_fragment_size_mean: f64,
    super_fragment_size_stddev: f64,
    fragments_in_ru: u64,
    events_in_ru: u64,
    event_count: u64,
    requests: u64,
    incomplete_super_fragment_count: u64,
    throughput_per_bu: Vec<f64>,
    bu_tids: Vec<i64>,
    fragment_rate_per_bu: Vec<f64>,
    retry_rate_per_bu: Vec<f64>,
    allocation: Option<(f64, f64)>,
}

impl RuRow {
    fn read(row: &dyn Row, with_allocation: bool) -> Result<Self, RowError> {
        let context = row.text("context")?;
        let port = port_from_context(&context)
            .ok_or_else(|| RowError::malformed("context", format!("no port in '{context}'")))?;

        let throughput_per_bu = row.float_list("throughputPerBU")?;
        let bu_tids = row.int_list("buTids")?;
        let fragment_rate_per_bu = row.float_list("fragmentRatePerBU")?;
        let retry_rate_per_bu = row.float_list("retryRatePerBU")?;
        let expected = throughput_per_bu.len();
        for (column, len) in [
            ("buTids", bu_tids.len()),
            ("fragmentRatePerBU", fragment_rate_per_bu.len()),
            ("retryRatePerBU", retry_rate_per_bu.len()),
        ] {
            if len != expected {
                return Err(RowError::malformed(
                    column,
                    format!("{len} entries where throughputPerBU has {expected}"),
                ));
            }
        }

        let allocation = if with_allocation {
            let retry = if row.has(ALLOCATE_RETRY_RATE.column) { ALLOCATE_RETRY_RATE.read_float(row)? } else { 0.0 };
            Some((ALLOCATE_RATE.read_float(row)?, retry))
        } else {
            None
        };

        Ok(Self {
            port,
            state_name: row.text("stateName")?,
            error_msg: row.text("errorMsg")?,
            rate: EVENT_RATE.read_float(row)?,
            super_fragment_size_mean: SUPER_FRAGMENT_SIZE.read_float(row)?,
            super_fragment_size_stddev: SUPER_FRAGMENT_SIZE_STDDEV.read_float(row)?,
            fragments_in_ru: FRAGMENTS_IN_RU.read_uint(row)?,
            events_in_ru: EVENTS_IN_RU.read_uint(row)?,
            event_count: EVENT_COUNT.read_uint(row)?,
            requests: ACTIVE_REQUESTS.read_uint(row)?,
            incomplete_super_fragment_count: INCOMPLETE_SUPER_FRAGMENTS.read_uint(row)?,
            throughput_per_bu,
            bu_tids,
            fragment_rate_per_bu,
            retry_rate_per_bu,
            allocation,
        })
    }
}

impl Ru {
    pub fn new(uid: Uid, hostname: impl Into<String>, fed_builder: FedBuilderId) -> Self {
        Self {
            uid,
            hostname: hostname.into(),
            instance: None,
            is_evm: false,
            fed_builder,
            port: 0,
            state_name: None,
            error_msg: None,
            rate: 0.0,
            throughput: 0.0,
            super_fragment_size_mean: 0.0,
            super_fragment_size_stddev: 0.0,
            fragments_in_ru: 0,
            events_in_ru: 0,
            event_count: 0,
            requests: 0,
            incomplete_super_fragment_count: 0,
            throughput_per_bu: Vec::new(),
            bu_tids: Vec::new(),
            fragment_rate_per_bu: Vec::new(),
            retry_rate_per_bu: Vec::new(),
            allocate_rate: 0.0,
            allocate_retry_rate: 0.0,
            masked: false,
            crashed: false,
        }
    }

    fn apply(&mut self, values: RuRow) {
        self.port = values.port;
        self.state_name = Some(values.state_name);
        self.error_msg = Some(values.error_msg);
        self.rate = values.rate;
        self.super_fragment_size_mean = values.super_fragment_size_mean;
        self.super_fragment_size_stddev = values.super_fragment_size_stddev;
        self.throughput = values.rate * values.super_fragment_size_mean;
        self.fragments_in_ru = values.fragments_in_ru;
        self.events_in_ru = values.events_in_ru;
        self.event_count = values.event_count;
        self.requests = values.requests;
        self.incomplete_super_fragment_count = values.incomplete_super_fragment_count;
        self.throughput_per_bu = values.throughput_per_bu;
        self.bu_tids = values.bu_tids;
        self.fragment_rate_per_bu = values.fragment_rate_per_bu;
        self.retry_rate_per_bu = values.retry_rate_per_bu;
        if let Some((rate, retry)) = values.allocation {
            self.allocate_rate = rate;
            self.allocate_retry_rate = retry;
        }
    }
}

impl FlashlistUpdatable for Ru {
    fn update_from_flashlist(&mut self, flashlist_type: FlashlistType, row: &dyn Row) -> Result<(), RowError> {
        match flashlist_type {
            // The EVM reports through its own table.
            FlashlistType::Ru if self.is_evm => {}
            FlashlistType::Ru => {
                let values = RuRow::read(row, false)?;
                self.apply(values);
            }
            FlashlistType::Evm => {
                let values = RuRow::read(row, true)?;
                self.apply(values);
            }
            FlashlistType::JobControl => {
                self.crashed = crashed_from_job_table(row)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.port = 0;
        self.state_name = None;
        self.error_msg = None;
        self.rate = 0.0;
        self.throughput = 0.0;
        self.super_fragment_size_mean = 0.0;
        self.super_fragment_size_stddev = 0.0;
        self.fragments_in_ru = 0;
        self.events_in_ru = 0;
        self.event_count = 0;
        self.requests = 0;
        self.incomplete_super_fragment_count = 0;
        self.throughput_per_bu.clear();
        self.bu_tids.clear();
        self.fragment_rate_per_bu.clear();
        self.retry_rate_per_bu.clear();
        self.allocate_rate = 0.0;
        self.allocate_retry_rate = 0.0;
        self.masked = false;
        self.crashed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn ru_row() -> Value {
        json!({
            "context": "http://ru-c2e12-27-01.cms:11100",
            "stateName": "Enabled",
            "errorMsg": "",
            "eventRate": 100000,
            "superFragmentSize": "2048",
            "superFragmentSizeStdDev": 12,
            "fragmentsInRU": 40,
            "eventsInRU": 250,
            "eventCount": 123456789u64,
            "activeRequests": 8,
            "incompleteSuperFragmentCount": 0,
            "throughputPerBU": [1000, 2000],
            "buTids": [31, 32],
            "fragmentRatePerBU": [500, 600],
            "retryRatePerBU": [0.0, 0.5]
        })
    }

    #[test]
    fn ru_table_sets_direct_and_derived_fields() {
        let mut ru = Ru::new(Uid(1), "ru-c2e12-27-01.cms", FedBuilderId(0));
        ru.update_from_flashlist(FlashlistType::Ru, &ru_row()).unwrap();

        assert_eq!(ru.port, 11100);
        assert_eq!(ru.rate, 100000.0);
        assert_eq!(ru.throughput, 100000.0 * 2048.0);
        assert_eq!(ru.bu_tids, vec![31, 32]);
        assert_eq!(ru.events_in_ru, 250);
        assert_eq!(ru.state_name.as_deref(), Some("Enabled"));
    }

    #[test]
    fn evm_ignores_the_ru_table_but_takes_its_own() {
        let mut evm = Ru::new(Uid(1), "ru-c2e12-27-01.cms", FedBuilderId(0));
        evm.is_evm = true;
        let pristine = evm.clone();

        evm.update_from_flashlist(FlashlistType::Ru, &ru_row()).unwrap();
        assert_eq!(evm, pristine);

        let mut row = ru_row();
        row["allocateRate"] = json!(99000);
        evm.update_from_flashlist(FlashlistType::Evm, &row).unwrap();
        assert_eq!(evm.allocate_rate, 99000.0);
        assert_eq!(evm.rate, 100000.0);
    }

    #[test]
    fn unequal_per_bu_lists_are_malformed() {
        let mut ru = Ru::new(Uid(1), "ru-c2e12-27-01.cms", FedBuilderId(0));
        let mut row = ru_row();
        row["buTids"] = json!([31]);

        let err = ru.update_from_flashlist(FlashlistType::Ru, &row).unwrap_err();
        assert!(matches!(err, RowError::Malformed { ref field, .. } if field == "buTids"));
        assert!(ru.throughput_per_bu.is_empty());
        assert_eq!(ru.rate, 0.0);
    }

    #[test]
    fn reset_keeps_identity() {
        let mut ru = Ru::new(Uid(7), "ru-c2e12-27-01.cms", FedBuilderId(3));
        ru.instance = Some(4);
        ru.update_from_flashlist(FlashlistType::Ru, &ru_row()).unwrap();
        ru.crashed = true;

        ru.reset();

        assert_eq!(ru.hostname, "ru-c2e12-27-01.cms");
        assert_eq!(ru.uid, Uid(7));
        assert_eq!(ru.instance, Some(4));
        assert_eq!(ru.fed_builder, FedBuilderId(3));
        assert_eq!(ru.rate, 0.0);
        assert_eq!(ru.throughput, 0.0);
        assert_eq!(ru.events_in_ru, 0);
        assert!(ru.throughput_per_bu.is_empty());
        assert!(ru.bu_tids.is_empty());
        assert!(ru.fragment_rate_per_bu.is_empty());
        assert!(ru.retry_rate_per_bu.is_empty());
        assert!(!ru.crashed);
    }
}
