//! Structural position matching.
//!
//! A [`GeoFinder`] knows, for one kind of table, which columns of a row form
//! the position key and which position each candidate entity occupies. Keys
//! are (host, slot, input); the input is absent for whole-card tables.

use std::collections::HashMap;

use super::{hostname_from_context, MatchOutcome};
use crate::flashlist::{Row, RowError};
use crate::model::{Daq, EntityRef, Fed, FedId, FmmId, FrlId, FrlKind, TtcPartitionId};

/// Structural position of a row or an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeoKey {
    pub host: String,
    pub slot: i64,
    pub io: Option<i64>,
}

impl GeoKey {
    pub fn new(host: impl Into<String>, slot: i64, io: Option<i64>) -> Self {
        Self { host: host.into(), slot, io }
    }
}

/// The position rule of one table kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoFinder {
    /// FED on a legacy FEROL input stream: context, `slotNumber`, `streamNumber`.
    FedInFerolInputStream,
    /// FED on a FEROL40 stream: context, `slotNumber`, `streamNumber`.
    FedInFerol40Stream,
    /// FED on a legacy FRL, addressed per card: the row stands for both inputs.
    FedInFrl,
    /// FED on an FMM input: context, `geoslot`, `io`.
    FedInFmm,
    /// FRL card: context, `slotNumber`.
    Frl,
    /// FMM: context, `geoslot`.
    Fmm,
    /// TTC partition through the FMM output it is wired to.
    TtcPartition,
}

impl GeoFinder {
    /// Keys a row resolves under. Whole-card rows of dual-output tables expand
    /// into one key per output.
    pub fn row_keys(&self, row: &dyn Row) -> Result<Vec<GeoKey>, RowError> {
        let context = row.text("context")?;
        let host = hostname_from_context(&context);
        let keys = match self {
            GeoFinder::FedInFerolInputStream | GeoFinder::FedInFerol40Stream => {
                vec![GeoKey::new(host, row.int("slotNumber")?, Some(row.int("streamNumber")?))]
            }
            GeoFinder::FedInFrl => {
                let slot = row.int("slotNumber")?;
                vec![GeoKey::new(host, slot, Some(0)), GeoKey::new(host, slot, Some(1))]
            }
            GeoFinder::FedInFmm => vec![GeoKey::new(host, row.int("geoslot")?, Some(row.int("io")?))],
            GeoFinder::Frl => vec![GeoKey::new(host, row.int("slotNumber")?, None)],
            GeoFinder::Fmm => vec![GeoKey::new(host, row.int("geoslot")?, None)],
            GeoFinder::TtcPartition => {
                let slot = row.int("geoslot")?;
                vec![GeoKey::new(host, slot, Some(0)), GeoKey::new(host, slot, Some(1))]
            }
        };
        Ok(keys)
    }

    /// Position of every candidate, in arena order. Entities whose position
    /// cannot be derived (no controlling host) are left out.
    pub fn entity_keys(&self, daq: &Daq) -> Vec<(GeoKey, EntityRef)> {
        match self {
            GeoFinder::FedInFerolInputStream | GeoFinder::FedInFrl => fed_keys(daq, |fed| frl_key(daq, fed, FrlKind::Ferol)),
            GeoFinder::FedInFerol40Stream => fed_keys(daq, |fed| frl_key(daq, fed, FrlKind::Ferol40)),
            GeoFinder::FedInFmm => fed_keys(daq, |fed| {
                let fmm = daq.fmms.get(fed.fmm?.index())?;
                let app = daq.fmm_applications.get(fmm.fmm_application.index())?;
                Some(GeoKey::new(&app.hostname, i64::from(fmm.geoslot), Some(i64::from(fed.fmm_io?))))
            }),
            GeoFinder::Frl => daq
                .frls
                .iter()
                .enumerate()
                .filter_map(|(i, frl)| {
                    let pc = daq.frl_pcs.get(frl.frl_pc?.index())?;
                    let key = GeoKey::new(&pc.hostname, i64::from(frl.geo_slot), None);
                    Some((key, EntityRef::Frl(FrlId::from_index(i))))
                })
                .collect(),
            GeoFinder::Fmm => daq
                .fmms
                .iter()
                .enumerate()
                .filter_map(|(i, fmm)| {
                    let app = daq.fmm_applications.get(fmm.fmm_application.index())?;
                    let key = GeoKey::new(&app.hostname, i64::from(fmm.geoslot), None);
                    Some((key, EntityRef::Fmm(FmmId::from_index(i))))
                })
                .collect(),
            GeoFinder::TtcPartition => daq
                .ttc_partitions
                .iter()
                .enumerate()
                .filter_map(|(i, partition)| {
                    let fmm = daq.fmms.get(partition.fmm?.index())?;
                    let app = daq.fmm_applications.get(fmm.fmm_application.index())?;
                    let key = GeoKey::new(&app.hostname, i64::from(fmm.geoslot), Some(i64::from(partition.fmm_io)));
                    Some((key, EntityRef::TtcPartition(TtcPartitionId::from_index(i))))
                })
                .collect(),
        }
    }
}

fn fed_keys(daq: &Daq, key: impl Fn(&Fed) -> Option<GeoKey>) -> Vec<(GeoKey, EntityRef)> {
    daq.feds
        .iter()
        .enumerate()
        .filter_map(|(i, fed)| Some((key(fed)?, EntityRef::Fed(FedId::from_index(i)))))
        .collect()
}

fn frl_key(daq: &Daq, fed: &Fed, kind: FrlKind) -> Option<GeoKey> {
    let frl = daq.frls.get(fed.frl?.index())?;
    if frl.kind != kind {
        return None;
    }
    let pc = daq.frl_pcs.get(frl.frl_pc?.index())?;
    Some(GeoKey::new(&pc.hostname, i64::from(frl.geo_slot), Some(i64::from(fed.frl_io?))))
}

/// Resolves rows by structural position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeoMatcher {
    finder: GeoFinder,
}

impl GeoMatcher {
    pub const fn new(finder: GeoFinder) -> Self {
        Self { finder }
    }

    pub fn finder(&self) -> GeoFinder {
        self.finder
    }

    /// Matches `rows` against the entities of `daq` the finder addresses.
    ///
    /// When two entities occupy the same position the one registered first
    /// keeps it. A row counts as matched when at least one of its keys
    /// resolves.
    pub fn match_rows<R: Row>(&self, rows: &[R], daq: &Daq) -> MatchOutcome {
        let mut index: HashMap<GeoKey, EntityRef> = HashMap::new();
        for (key, entity) in self.finder.entity_keys(daq) {
            if let Some(winner) = index.get(&key) {
                log::debug!("{:?}: {:?} shares position {:?} with {:?}, ignored", self.finder, entity, key, winner);
                continue;
            }
            index.insert(key, entity);
        }

        let mut outcome = MatchOutcome::default();
        for (i, row) in rows.iter().enumerate() {
            let keys = match self.finder.row_keys(row) {
                Ok(keys) => keys,
                Err(e) => {
                    log::debug!("{:?}: row {} has no usable position: {}", self.finder, i, e);
                    outcome.miss(i);
                    continue;
                }
            };
            let mut resolved = false;
            for key in &keys {
                if let Some(&entity) = index.get(key) {
                    outcome.assign(entity, i);
                    resolved = true;
                }
            }
            if resolved {
                outcome.hit(i);
            } else {
                outcome.miss(i);
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TopologySpec, UidAllocator};
    use serde_json::json;

    fn daq() -> Daq {
        let spec: TopologySpec = serde_json::from_value(json!({
            "ttcPartitions": [
                {"name": "A", "ttcpNr": 1, "fmm": {"application": "fmmpc", "geoslot": 3}, "fmmIo": 0},
                {"name": "B", "ttcpNr": 2, "fmm": {"application": "fmmpc", "geoslot": 3}, "fmmIo": 1}
            ],
            "frlPcs": ["frlpc"],
            "fmmApplications": ["fmmpc"],
            "fmms": [{"application": "fmmpc", "geoslot": 3, "dual": true}],
            "fedBuilders": [{
                "name": "FB", "ru": {"hostname": "ru", "evm": true},
                "subFedBuilders": [{
                    "name": "S", "ttcPartition": "A", "frlPc": "frlpc",
                    "frls": [
                        {"geoSlot": 7, "feds": [
                            {"id": 1, "io": 0, "fmm": {"application": "fmmpc", "geoslot": 3, "io": 0}},
                            {"id": 2, "io": 1, "fmm": {"application": "fmmpc", "geoslot": 3, "io": 1}}
                        ]},
                        {"geoSlot": 8, "kind": "FEROL40", "feds": [{"id": 3, "io": 2}]}
                    ]
                }]
            }]
        }))
        .unwrap();
        spec.build(&mut UidAllocator::new()).unwrap()
    }

    #[test]
    fn input_stream_rows_resolve_one_fed_each() {
        let daq = daq();
        let rows = vec![
            json!({"context": "http://frlpc:1", "slotNumber": 7, "streamNumber": 1}),
            json!({"context": "http://frlpc:1", "slotNumber": 7, "streamNumber": 3}),
            json!({"context": "http://frlpc:1", "slotNumber": "x", "streamNumber": 0}),
        ];
        let outcome = GeoMatcher::new(GeoFinder::FedInFerolInputStream).match_rows(&rows, &daq);

        assert_eq!(outcome.row_for(EntityRef::Fed(FedId(1))), Some(0));
        assert_eq!(outcome.correspondences.len(), 1);
        assert_eq!((outcome.matched, outcome.unmatched), (1, 2));
    }

    #[test]
    fn ferol40_streams_only_see_ferol40_cards() {
        let daq = daq();
        let rows = vec![
            json!({"context": "http://frlpc:1", "slotNumber": 8, "streamNumber": 2}),
            json!({"context": "http://frlpc:1", "slotNumber": 7, "streamNumber": 0}),
        ];
        let outcome = GeoMatcher::new(GeoFinder::FedInFerol40Stream).match_rows(&rows, &daq);
        assert_eq!(outcome.row_for(EntityRef::Fed(FedId(2))), Some(0));
        assert_eq!((outcome.matched, outcome.unmatched), (1, 1));
    }

    #[test]
    fn card_level_row_reaches_both_inputs() {
        let daq = daq();
        let rows = vec![json!({"context": "http://frlpc:1", "slotNumber": 7})];
        let outcome = GeoMatcher::new(GeoFinder::FedInFrl).match_rows(&rows, &daq);

        assert_eq!(outcome.correspondences.len(), 2);
        assert_eq!((outcome.matched, outcome.unmatched), (1, 0));
    }

    #[test]
    fn dual_fmm_feeds_both_partitions() {
        let daq = daq();
        let rows = vec![json!({"context": "http://fmmpc:9", "geoslot": 3})];

        let partitions = GeoMatcher::new(GeoFinder::TtcPartition).match_rows(&rows, &daq);
        assert_eq!(partitions.correspondences.len(), 2);

        let fmms = GeoMatcher::new(GeoFinder::Fmm).match_rows(&rows, &daq);
        assert_eq!(fmms.row_for(EntityRef::Fmm(FmmId(0))), Some(0));
    }

    #[test]
    fn first_registered_entity_keeps_a_shared_position() {
        let mut daq = daq();
        // Move FED 2 onto FED 1's FMM input.
        daq.feds[1].fmm_io = Some(0);
        let rows = vec![json!({"context": "fmmpc:9", "geoslot": 3, "io": 0})];

        let outcome = GeoMatcher::new(GeoFinder::FedInFmm).match_rows(&rows, &daq);
        assert_eq!(outcome.row_for(EntityRef::Fed(FedId(0))), Some(0));
        assert_eq!(outcome.row_for(EntityRef::Fed(FedId(1))), None);
    }
}
