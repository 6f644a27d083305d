//! # TCDS TTS Channels
//!
//! The partition manager publishes one row per TTS channel, addressed by
//! service, channel type, partition-manager number and ICI number. Two channel
//! types describe individual TTC partitions (`tts_ici` for the partition's own
//! TTS state, `tts_apve` for the APV emulator in front of it); every other type
//! present for the service is a global TTS output and is read from its first
//! channel, `(0, 0)`.

use std::collections::{BTreeMap, BTreeSet};

use crate::flashlist::{Row, RowError};
use crate::model::{Daq, GlobalTtsState};

use super::SessionContext;

const ICI_TYPE: &str = "tts_ici";
const APVE_TYPE: &str = "tts_apve";
const UNUSED_LABEL: &str = "Unused";

/// Decodes the numeric TTS code the partition manager publishes.
pub fn decode_tts_state(code: i64) -> &'static str {
    match code {
        0 => "DISCONNECTED",
        1 => "WARNING",
        2 => "OUT_OF_SYNC",
        4 => "BUSY",
        8 => "READY",
        12 => "ERROR",
        15 => "DISCONNECTED",
        _ => "INVALID",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ChannelKey {
    service: String,
    channel_type: String,
    pm_nr: i64,
    ici_nr: i64,
}

/// Channel rows indexed by their address. Services compare case-insensitively.
pub struct TtsChannelTree<'a, R> {
    channels: BTreeMap<ChannelKey, (usize, &'a R)>,
}

impl<'a, R: Row> TtsChannelTree<'a, R> {
    /// Indexes `rows`. Rows without a complete address are dropped; a later
    /// row with the same address replaces an earlier one.
    pub fn from_rows(rows: &'a [R]) -> Self {
        let mut channels = BTreeMap::new();
        for (i, row) in rows.iter().enumerate() {
            match Self::key(row) {
                Ok(key) => {
                    channels.insert(key, (i, row));
                }
                Err(e) => log::debug!("TTS channel row {} skipped: {}", i, e),
            }
        }
        Self { channels }
    }

    fn key(row: &R) -> Result<ChannelKey, RowError> {
        Ok(ChannelKey {
            service: row.text("service")?.to_ascii_lowercase(),
            channel_type: row.text("type")?,
            pm_nr: row.int("pm_number")?,
            ici_nr: row.int("ici_number")?,
        })
    }

    /// The row for one channel with its index in the table.
    pub fn channel(&self, service: &str, channel_type: &str, pm_nr: i64, ici_nr: i64) -> Option<(usize, &'a R)> {
        let key = ChannelKey {
            service: service.to_ascii_lowercase(),
            channel_type: channel_type.to_string(),
            pm_nr,
            ici_nr,
        };
        self.channels.get(&key).copied()
    }

    /// Rows of `service` with a complete address, superseded ones included.
    fn addressed_rows(rows: &[R], service: &str) -> usize {
        let service = service.to_ascii_lowercase();
        rows.iter()
            .filter(|row| Self::key(row).is_ok_and(|key| key.service == service))
            .count()
    }

    /// Channel types present for `service`.
    pub fn types(&self, service: &str) -> BTreeSet<&str> {
        let service = service.to_ascii_lowercase();
        self.channels
            .keys()
            .filter(|key| key.service == service)
            .map(|key| key.channel_type.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Per-cycle accounting of a TTS channel table. Rows of other services are
/// filtered out and counted in neither field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TtsChannelReport {
    /// Rows of the service read into a partition or a global output.
    pub matched: usize,
    /// Rows of the service that reached nothing.
    pub unmatched: usize,
    /// Channels found but carrying an unreadable value.
    pub failed: usize,
}

/// # Apply TTS Channels
///
/// Sets the TCDS TTS states of every TTC partition and the global TTS states
/// of the root from one `TCDS_PM_TTS_CHANNEL` table.
///
/// - A partition with a `null_cause` publishes that cause as both TCDS states
///   and is not looked up.
/// - An APV emulator channel labelled `Unused` publishes `x`.
/// - A partition whose channel is absent keeps its previous state.
///
/// Returns `None` without touching the graph when the session has no TCDS
/// partition manager.
pub fn apply_tts_channels<R: Row>(daq: &mut Daq, rows: &[R], session: &SessionContext) -> Option<TtsChannelReport> {
    let (service, context) = session.tcds()?;
    let tree = TtsChannelTree::from_rows(rows);
    let mut report = TtsChannelReport::default();
    let mut used = BTreeSet::new();

    for partition in &mut daq.ttc_partitions {
        let info = &partition.tcds_partition_info;
        if let Some(cause) = &info.null_cause {
            partition.tcds_pm_tts_state = Some(cause.clone());
            partition.tcds_apv_pm_tts_state = Some(cause.clone());
            continue;
        }
        let (pm_nr, ici_nr) = (info.pm_nr, info.ici_nr);

        let ici = tree.channel(service, ICI_TYPE, pm_nr, ici_nr);
        let apve = tree.channel(service, APVE_TYPE, pm_nr, ici_nr);
        if ici.is_none() && apve.is_none() {
            log::debug!("No TCDS channel for partition {} (PM {}, ICI {})", partition.name, pm_nr, ici_nr);
            continue;
        }
        used.extend(ici.iter().chain(apve.iter()).map(|&(i, _)| i));
        let (ici, apve) = (ici.map(|(_, row)| row), apve.map(|(_, row)| row));

        let ici_state = ici.map(|row| row.int("value").map(decode_tts_state)).transpose();
        let apve_state = apve.map(read_apve_state).transpose();
        match (ici_state, apve_state) {
            (Ok(ici_state), Ok(apve_state)) => {
                if let Some(state) = ici_state {
                    partition.tcds_pm_tts_state = Some(state.to_string());
                }
                if let Some(state) = apve_state {
                    partition.tcds_apv_pm_tts_state = Some(state.to_string());
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                log::warn!("TCDS channel of partition {} unreadable: {}", partition.name, e);
                report.failed += 1;
            }
        }
    }

    for channel_type in tree.types(service) {
        if channel_type == ICI_TYPE || channel_type == APVE_TYPE {
            continue;
        }
        let Some((i, row)) = tree.channel(service, channel_type, 0, 0) else {
            log::debug!("Global TTS output {} has no (0, 0) channel", channel_type);
            continue;
        };
        used.insert(i);
        match read_global_state(row) {
            Ok(state) => {
                log::debug!("Global TTS state {} is {}", channel_type, state.state);
                daq.tcds_global_info.global_tts_states.insert(channel_type.to_string(), state);
            }
            Err(e) => {
                log::warn!("Global TTS output {} unreadable: {}", channel_type, e);
                report.failed += 1;
            }
        }
    }

    daq.tcds_global_info.tcds_controller_service_name = Some(service.to_string());
    daq.tcds_global_info.tcds_controller_context = Some(context.to_string());
    report.matched = used.len();
    report.unmatched = TtsChannelTree::<R>::addressed_rows(rows, service).saturating_sub(used.len());
    Some(report)
}

fn read_apve_state<R: Row>(row: &R) -> Result<&'static str, RowError> {
    if row.text("label")?.eq_ignore_ascii_case(UNUSED_LABEL) {
        return Ok("x");
    }
    row.int("value").map(decode_tts_state)
}

fn read_global_state<R: Row>(row: &R) -> Result<GlobalTtsState, RowError> {
    let state = decode_tts_state(row.int("value")?);
    let percent_busy = if row.has("outputFractionBusy") { row.float("outputFractionBusy")? } else { 0.0 };
    let percent_warning = if row.has("outputFractionWarning") { row.float("outputFractionWarning")? } else { 0.0 };
    Ok(GlobalTtsState { state: state.to_string(), percent_busy, percent_warning })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TcdsPartitionInfo, TtcPartition, Uid};
    use serde_json::{json, Value};

    fn channel(service: &str, ty: &str, pm: i64, ici: i64, value: i64, label: &str) -> Value {
        json!({"service": service, "type": ty, "pm_number": pm, "ici_number": ici, "value": value, "label": label})
    }

    fn daq() -> Daq {
        let mut daq = Daq::new(Uid(1));
        let mut tracker = TtcPartition::new(Uid(2), "TRK", 40);
        tracker.tcds_partition_info = TcdsPartitionInfo { pm_nr: 1, ici_nr: 2, null_cause: None };
        let mut muon = TtcPartition::new(Uid(3), "DT", 50);
        muon.tcds_partition_info = TcdsPartitionInfo { pm_nr: 1, ici_nr: 3, null_cause: None };
        let mut missing = TtcPartition::new(Uid(4), "CASTOR", 60);
        missing.tcds_partition_info.null_cause = Some("no ICI".into());
        let unlisted = TtcPartition::new(Uid(5), "ZDC", 70);
        daq.ttc_partitions = vec![tracker, muon, missing, unlisted];
        daq
    }

    #[test]
    fn decodes_known_codes() {
        assert_eq!(decode_tts_state(8), "READY");
        assert_eq!(decode_tts_state(4), "BUSY");
        assert_eq!(decode_tts_state(15), "DISCONNECTED");
        assert_eq!(decode_tts_state(3), "INVALID");
    }

    #[test]
    fn partitions_and_global_outputs_are_set() {
        let mut daq = daq();
        let session = SessionContext::new("toppro").with_tcds("cpm-pri", "http://tcds-cpm:2050");
        let rows = vec![
            channel("CPM-PRI", "tts_ici", 1, 2, 8, "TRK"),
            channel("cpm-pri", "tts_apve", 1, 2, 4, "TRK"),
            channel("cpm-pri", "tts_ici", 1, 3, 1, "DT"),
            channel("cpm-pri", "tts_apve", 1, 3, 8, "Unused"),
            json!({"service": "cpm-pri", "type": "tts_pm", "pm_number": 0, "ici_number": 0, "value": "12",
                   "label": "", "outputFractionBusy": "0.5"}),
            channel("cpm-sec", "tts_ici", 1, 2, 4, "TRK"),
            channel("cpm-pri", "tts_ici", 1, 9, 8, "HF"),
        ];

        let report = apply_tts_channels(&mut daq, &rows, &session).unwrap();

        // One row per channel of cpm-pri; the cpm-sec row is filtered out.
        assert_eq!(report, TtsChannelReport { matched: 5, unmatched: 1, failed: 0 });
        let p = &daq.ttc_partitions;
        assert_eq!(p[0].tcds_pm_tts_state.as_deref(), Some("READY"));
        assert_eq!(p[0].tcds_apv_pm_tts_state.as_deref(), Some("BUSY"));
        assert_eq!(p[1].tcds_pm_tts_state.as_deref(), Some("WARNING"));
        assert_eq!(p[1].tcds_apv_pm_tts_state.as_deref(), Some("x"));
        assert_eq!(p[2].tcds_pm_tts_state.as_deref(), Some("no ICI"));
        assert_eq!(p[2].tcds_apv_pm_tts_state.as_deref(), Some("no ICI"));
        assert_eq!(p[3].tcds_pm_tts_state, None);

        let global = &daq.tcds_global_info.global_tts_states["tts_pm"];
        assert_eq!(global.state, "ERROR");
        assert_eq!(global.percent_busy, 0.5);
        assert_eq!(global.percent_warning, 0.0);
        assert_eq!(daq.tcds_global_info.tcds_controller_service_name.as_deref(), Some("cpm-pri"));
    }

    #[test]
    fn nothing_happens_without_a_partition_manager() {
        let mut daq = daq();
        let rows = vec![channel("cpm-pri", "tts_ici", 1, 2, 8, "TRK")];
        assert_eq!(apply_tts_channels(&mut daq, &rows, &SessionContext::new("toppro")), None);
        assert_eq!(daq.ttc_partitions[0].tcds_pm_tts_state, None);
        assert_eq!(daq.tcds_global_info.tcds_controller_service_name, None);
    }
}
