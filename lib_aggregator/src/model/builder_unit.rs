use serde::{Deserialize, Serialize};

use super::field::FieldSpec;
use super::{crashed_from_job_table, FlashlistUpdatable, Uid};
use crate::flashlist::{FlashlistType, Row, RowError};
use crate::matchers::port_from_context;

const EVENT_RATE: FieldSpec = FieldSpec::direct("eventRate");
const BANDWIDTH: FieldSpec = FieldSpec::direct("bandwidth");
const EVENT_SIZE: FieldSpec = FieldSpec::direct("eventSize");
const EVENT_SIZE_STDDEV: FieldSpec = FieldSpec::direct("eventSizeStdDev");
const EVENTS_IN_BU: FieldSpec = FieldSpec::direct("nbEventsInBU");
const EVENTS_BUILT: FieldSpec = FieldSpec::direct("nbEventsBuilt");
const REQUEST_RATE: FieldSpec = FieldSpec::direct("requestRate");

/// A builder unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bu {
    pub uid: Uid,
    pub hostname: String,
    pub instance: Option<u32>,

    pub port: u16,
    pub state_name: Option<String>,
    pub error_msg: Option<String>,
    pub rate: f64,
    pub throughput: f64,
    pub event_size_mean: f64,
    pub event_size_stddev: f64,
    pub events_in_bu: u64,
    pub events_built: u64,
    pub request_rate: f64,
    pub crashed: bool,
}

impl Bu {
    pub fn new(uid: Uid, hostname: impl Into<String>) -> Self {
        Self {
            uid,
            hostname: hostname.into(),
            instance: None,
            port: 0,
            state_name: None,
            error_msg: None,
            rate: 0.0,
            throughput: 0.0,
            event_size_mean: 0.0,
            event_size_stddev: 0.0,
            events_in_bu: 0,
            events_built: 0,
            request_rate: 0.0,
            crashed: false,
        }
    }
}

impl FlashlistUpdatable for Bu {
    fn update_from_flashlist(&mut self, flashlist_type: FlashlistType, row: &dyn Row) -> Result<(), RowError> {
        match flashlist_type {
            FlashlistType::Bu => {
                let context = row.text("context")?;
                let port = port_from_context(&context)
                    .ok_or_else(|| RowError::malformed("context", format!("no port in '{context}'")))?;
                let state_name = row.text("stateName")?;
                let error_msg = row.text("errorMsg")?;
                let rate = EVENT_RATE.read_float(row)?;
                let throughput = BANDWIDTH.read_float(row)?;
                let event_size_mean = EVENT_SIZE.read_float(row)?;
                let event_size_stddev = EVENT_SIZE_STDDEV.read_float(row)?;
                let events_in_bu = EVENTS_IN_BU.read_uint(row)?;
                let events_built = EVENTS_BUILT.read_uint(row)?;
                let request_rate = REQUEST_RATE.read_float(row)?;

                self.port = port;
                self.state_name = Some(state_name);
                self.error_msg = Some(error_msg);
                self.rate = rate;
                self.throughput = throughput;
                self.event_size_mean = event_size_mean;
                self.event_size_stddev = event_size_stddev;
                self.events_in_bu = events_in_bu;
                self.events_built = events_built;
                self.request_rate = request_rate;
            }
            FlashlistType::JobControl => {
                self.crashed = crashed_from_job_table(row)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn reset(&mut self) {
        *self = Self {
            instance: self.instance,
            ..Self::new(self.uid, std::mem::take(&mut self.hostname))
        };
    }
}
