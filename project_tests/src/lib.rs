//! # Aggregator Test Fixtures
//!
//! Shared topology and row builders for the integration tests under `tests/`.
//!
//! The fixture session has two FED builders:
//! - **FB-1**: RU `ru-1` (the EVM), one FEROL in slot 5 of `frlpc-1` carrying
//!   FEDs 7 and 9.
//! - **FB-2**: RU `ru-2`, FEROLs in slots 6 and 7 carrying FEDs 12, 13 and 14.
//!
//! Builder units are `host1` and `host2`; FEDs 7 and 9 report TTS through the
//! FMM in slot 3 of `fmmpc-1`.

use lib_aggregator::{Daq, TopologySpec, UidAllocator};
use serde_json::{json, Value};

pub const SESSION_ID: i64 = 351;

pub fn topology_json() -> Value {
    json!({
        "sessionId": SESSION_ID,
        "subsystems": [{"name": "ECAL"}, {"name": "HCAL"}],
        "ttcPartitions": [
            {"name": "EB-", "ttcpNr": 1, "subsystem": "ECAL",
             "fmm": {"application": "fmmpc-1", "geoslot": 3}, "fmmIo": 0,
             "tcds": {"pmNr": 1, "iciNr": 2}},
            {"name": "HBHE", "ttcpNr": 2, "subsystem": "HCAL",
             "tcds": {"pmNr": 1, "iciNr": 3}}
        ],
        "frlPcs": ["frlpc-1"],
        "fmmApplications": ["fmmpc-1"],
        "fmms": [{"application": "fmmpc-1", "geoslot": 3}],
        "bus": [{"hostname": "host1", "instance": 0}, {"hostname": "host2", "instance": 1}],
        "fedBuilders": [
            {"name": "FB-1", "ru": {"hostname": "ru-1", "instance": 0, "evm": true},
             "subFedBuilders": [{"name": "FB-1a", "ttcPartition": "EB-", "frlPc": "frlpc-1",
                 "frls": [{"geoSlot": 5, "feds": [
                     {"id": 7, "io": 0, "fmm": {"application": "fmmpc-1", "geoslot": 3, "io": 0}},
                     {"id": 9, "io": 1, "fmm": {"application": "fmmpc-1", "geoslot": 3, "io": 1}}]}]}]},
            {"name": "FB-2", "ru": {"hostname": "ru-2", "instance": 1},
             "subFedBuilders": [{"name": "FB-2a", "ttcPartition": "HBHE", "frlPc": "frlpc-1",
                 "frls": [
                     {"geoSlot": 6, "feds": [{"id": 12, "io": 0}, {"id": 13, "io": 1}]},
                     {"geoSlot": 7, "feds": [{"id": 14, "io": 0}]}]}]}
        ]
    })
}

/// Builds the fixture graph with a fresh allocator.
pub fn build_daq() -> Daq {
    let spec: TopologySpec = serde_json::from_value(topology_json()).expect("fixture topology parses");
    spec.build(&mut UidAllocator::new()).expect("fixture topology builds")
}

pub fn bu_row(context: &str, rate: f64) -> Value {
    json!({
        "context": context, "instance": "0",
        "eventRate": rate, "bandwidth": rate * 1000.0,
        "eventSize": 1000, "eventSizeStdDev": 10,
        "nbEventsInBU": 4, "nbEventsBuilt": 100, "requestRate": 5,
        "stateName": "Enabled", "errorMsg": ""
    })
}

/// An RU or EVM row. `events_in_ru` feeds the FED builder event spread; every
/// row reports the same `eventCount`.
pub fn ru_row(host: &str, rate: f64, events_in_ru: u64) -> Value {
    json!({
        "context": format!("http://{host}:11100"),
        "stateName": "Enabled", "errorMsg": "",
        "eventRate": rate, "superFragmentSize": 2048, "superFragmentSizeStdDev": 64,
        "eventsInRU": events_in_ru, "fragmentsInRU": 20, "eventCount": 1000,
        "activeRequests": 3, "incompleteSuperFragmentCount": 0,
        "throughputPerBU": [1.0, 2.0], "buTids": [10, 11],
        "fragmentRatePerBU": [5.0, 6.0], "retryRatePerBU": [0.0, 0.0],
        "allocateRate": 100.0,
        "fedIdsWithErrors": [], "fedIdsWithoutFragments": []
    })
}

pub fn input_stream_row(slot: i64, stream: i64, timestamp: &str, acc_backpressure: f64, events: u64) -> Value {
    json!({
        "context": "http://frlpc-1:11100", "slotNumber": slot, "streamNumber": stream,
        "WrongFEDId": 0, "LinkCRCError": 0, "FEDCRCError": 0,
        "TriggerNumber": events, "EventCounter": events,
        "timestamp": timestamp, "AccBackpressureSecond": acc_backpressure
    })
}

pub fn ferol_configuration_row(slot: i64, stream0: bool, stream1: bool) -> Value {
    json!({
        "context": "http://frlpc-1:11100", "slotNumber": slot,
        "enableStream0": stream0, "enableStream1": stream1
    })
}
