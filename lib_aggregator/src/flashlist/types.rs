use serde::{Deserialize, Serialize};
use std::fmt;

const URN_PREFIX: &str = "urn:xdaq-flashlist:";

/// Every flashlist the aggregator knows how to dispatch.
///
/// Names that do not resolve to one of these variants are ignored by the
/// dispatcher, so new flashlists published by the monitoring system never
/// break a running aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlashlistType {
    /// Readout unit monitoring.
    Ru,
    /// Event manager (the distinguished readout unit).
    Evm,
    /// Builder unit monitoring.
    Bu,
    /// Per-stream counters of legacy FEROLs.
    FerolInputStream,
    /// FMM inputs (one row per FED TTS input).
    FmmInput,
    /// Legacy FEROL status.
    FerolStatus,
    /// Legacy FEROL configuration (stream enable flags).
    FerolConfiguration,
    /// FRL controller link monitoring.
    FrlMonitoring,
    /// FMM outputs.
    FmmStatus,
    /// XDAQ job control (process liveness).
    JobControl,
    /// Level-zero function manager, static part.
    LevelZeroFmStatic,
    /// Level-zero function manager, per-subsystem states.
    LevelZeroFmSubsys,
    /// Level-zero function manager, run-level dynamic values.
    LevelZeroFmDynamic,
    /// TCDS central partition manager trigger counts.
    TcdsCpmCounts,
    /// TCDS central partition manager deadtimes.
    TcdsCpmDeadtimes,
    /// TCDS central partition manager rates.
    TcdsCpmRates,
    /// TCDS partition manager action counters.
    TcdsPmActionCounts,
    /// TCDS partition manager TTS channels.
    TcdsPmTtsChannel,
    /// Per-stream counters of FEROL40s.
    Ferol40InputStream,
    /// FEROL40 per-stream configuration.
    Ferol40StreamConfiguration,
    /// FEROL40 status.
    Ferol40Status,
    /// FEROL40 configuration.
    Ferol40Configuration,
}

impl FlashlistType {
    /// All recognised types, in registry order.
    pub const ALL: [FlashlistType; 22] = [
        FlashlistType::Ru,
        FlashlistType::Evm,
        FlashlistType::Bu,
        FlashlistType::FerolInputStream,
        FlashlistType::FmmInput,
        FlashlistType::FerolStatus,
        FlashlistType::FerolConfiguration,
        FlashlistType::FrlMonitoring,
        FlashlistType::FmmStatus,
        FlashlistType::JobControl,
        FlashlistType::LevelZeroFmStatic,
        FlashlistType::LevelZeroFmSubsys,
        FlashlistType::LevelZeroFmDynamic,
        FlashlistType::TcdsCpmCounts,
        FlashlistType::TcdsCpmDeadtimes,
        FlashlistType::TcdsCpmRates,
        FlashlistType::TcdsPmActionCounts,
        FlashlistType::TcdsPmTtsChannel,
        FlashlistType::Ferol40InputStream,
        FlashlistType::Ferol40StreamConfiguration,
        FlashlistType::Ferol40Status,
        FlashlistType::Ferol40Configuration,
    ];

    /// Short name used in logs and match reports.
    pub fn as_str(self) -> &'static str {
        match self {
            FlashlistType::Ru => "RU",
            FlashlistType::Evm => "EVM",
            FlashlistType::Bu => "BU",
            FlashlistType::FerolInputStream => "FEROL_INPUT_STREAM",
            FlashlistType::FmmInput => "FMM_INPUT",
            FlashlistType::FerolStatus => "FEROL_STATUS",
            FlashlistType::FerolConfiguration => "FEROL_CONFIGURATION",
            FlashlistType::FrlMonitoring => "FRL_MONITORING",
            FlashlistType::FmmStatus => "FMM_STATUS",
            FlashlistType::JobControl => "JOB_CONTROL",
            FlashlistType::LevelZeroFmStatic => "LEVEL_ZERO_FM_STATIC",
            FlashlistType::LevelZeroFmSubsys => "LEVEL_ZERO_FM_SUBSYS",
            FlashlistType::LevelZeroFmDynamic => "LEVEL_ZERO_FM_DYNAMIC",
            FlashlistType::TcdsCpmCounts => "TCDS_CPM_COUNTS",
            FlashlistType::TcdsCpmDeadtimes => "TCDS_CPM_DEADTIMES",
            FlashlistType::TcdsCpmRates => "TCDS_CPM_RATES",
            FlashlistType::TcdsPmActionCounts => "TCDS_PM_ACTION_COUNTS",
            FlashlistType::TcdsPmTtsChannel => "TCDS_PM_TTS_CHANNEL",
            FlashlistType::Ferol40InputStream => "FEROL40_INPUT_STREAM",
            FlashlistType::Ferol40StreamConfiguration => "FEROL40_STREAM_CONFIGURATION",
            FlashlistType::Ferol40Status => "FEROL40_STATUS",
            FlashlistType::Ferol40Configuration => "FEROL40_CONFIGURATION",
        }
    }

    /// The table name under which the monitoring system publishes this flashlist.
    pub fn flashlist_name(self) -> &'static str {
        match self {
            FlashlistType::Ru => "urn:xdaq-flashlist:RU",
            FlashlistType::Evm => "urn:xdaq-flashlist:EVM",
            FlashlistType::Bu => "urn:xdaq-flashlist:BU",
            FlashlistType::FerolInputStream => "urn:xdaq-flashlist:ferolInputStream",
            FlashlistType::FmmInput => "urn:xdaq-flashlist:FMMInput",
            FlashlistType::FerolStatus => "urn:xdaq-flashlist:ferolStatus",
            FlashlistType::FerolConfiguration => "urn:xdaq-flashlist:ferolConfiguration",
            FlashlistType::FrlMonitoring => "urn:xdaq-flashlist:frlcontrollerLink",
            FlashlistType::FmmStatus => "urn:xdaq-flashlist:FMMStatus",
            FlashlistType::JobControl => "urn:xdaq-flashlist:jobcontrol",
            FlashlistType::LevelZeroFmStatic => "urn:xdaq-flashlist:levelZeroFM_static",
            FlashlistType::LevelZeroFmSubsys => "urn:xdaq-flashlist:levelZeroFM_subsys",
            FlashlistType::LevelZeroFmDynamic => "urn:xdaq-flashlist:levelZeroFM_dynamic",
            FlashlistType::TcdsCpmCounts => "urn:xdaq-flashlist:tcds_cpm_counts",
            FlashlistType::TcdsCpmDeadtimes => "urn:xdaq-flashlist:tcds_cpm_deadtimes",
            FlashlistType::TcdsCpmRates => "urn:xdaq-flashlist:tcds_cpm_rates",
            FlashlistType::TcdsPmActionCounts => "urn:xdaq-flashlist:tcds_pm_action_counts",
            FlashlistType::TcdsPmTtsChannel => "urn:xdaq-flashlist:tcds_pm_tts_channel",
            FlashlistType::Ferol40InputStream => "urn:xdaq-flashlist:ferol40InputStream",
            FlashlistType::Ferol40StreamConfiguration => "urn:xdaq-flashlist:ferol40StreamConfiguration",
            FlashlistType::Ferol40Status => "urn:xdaq-flashlist:ferol40Status",
            FlashlistType::Ferol40Configuration => "urn:xdaq-flashlist:ferol40Configuration",
        }
    }

    /// Resolves a flashlist by its published name, with or without the
    /// `urn:xdaq-flashlist:` prefix, or by its short report name.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        let bare = name.strip_prefix(URN_PREFIX).unwrap_or(name);
        FlashlistType::ALL.iter().copied().find(|ty| {
            ty.as_str() == name || ty.flashlist_name()[URN_PREFIX.len()..] == *bare
        })
    }

    /// Lower values are dispatched first within one cycle.
    ///
    /// The dynamic level-zero table carries the session id that the
    /// per-subsystem table is filtered on, so it always goes first.
    pub fn dispatch_priority(self) -> u8 {
        match self {
            FlashlistType::LevelZeroFmDynamic => 0,
            _ => 1,
        }
    }
}

impl fmt::Display for FlashlistType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_published_and_short_names() {
        assert_eq!(FlashlistType::from_name("urn:xdaq-flashlist:RU"), Some(FlashlistType::Ru));
        assert_eq!(FlashlistType::from_name("ferolInputStream"), Some(FlashlistType::FerolInputStream));
        assert_eq!(FlashlistType::from_name("TCDS_CPM_RATES"), Some(FlashlistType::TcdsCpmRates));
        assert_eq!(FlashlistType::from_name("urn:xdaq-flashlist:somethingNew"), None);
    }

    #[test]
    fn every_type_round_trips_through_its_name() {
        for ty in FlashlistType::ALL {
            assert_eq!(FlashlistType::from_name(ty.flashlist_name()), Some(ty));
        }
    }

    #[test]
    fn session_table_is_dispatched_first() {
        assert!(FlashlistType::LevelZeroFmDynamic.dispatch_priority() < FlashlistType::LevelZeroFmSubsys.dispatch_priority());
    }
}
