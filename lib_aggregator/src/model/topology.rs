//! # Topology
//!
//! The static structure of a session is described in JSON and assembled into
//! a [`Daq`] once, before the first cycle. Every entity receives its [`Uid`]
//! here. Every cross reference is checked, so a topology that builds is one the
//! dispatcher can route into without further validation.
//!
//! ```json
//! {
//!   "sessionId": 351,
//!   "subsystems": [{ "name": "ECAL" }],
//!   "ttcPartitions": [{ "name": "EB-", "ttcpNr": 1, "subsystem": "ECAL",
//!                       "fmm": { "application": "fmmpc-1", "geoslot": 5 }, "fmmIo": 0,
//!                       "tcds": { "pmNr": 1, "iciNr": 2 } }],
//!   "frlPcs": ["frlpc-1"],
//!   "fmmApplications": ["fmmpc-1"],
//!   "fmms": [{ "application": "fmmpc-1", "geoslot": 5 }],
//!   "bus": [{ "hostname": "bu-1", "instance": 0 }],
//!   "fedBuilders": [{
//!     "name": "EB-1",
//!     "ru": { "hostname": "ru-1", "instance": 0, "evm": true },
//!     "subFedBuilders": [{
//!       "name": "EB-1a", "ttcPartition": "EB-", "frlPc": "frlpc-1",
//!       "frls": [{ "geoSlot": 5, "kind": "FEROL",
//!                  "feds": [{ "id": 610, "io": 0,
//!                             "fmm": { "application": "fmmpc-1", "geoslot": 5, "io": 3 } }] }]
//!     }]
//!   }]
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    Bu, Daq, Fed, FedBuilder, FedBuilderId, FedId, Fmm, FmmApplication, FmmApplicationId, FmmId, Frl, FrlId,
    FrlKind, FrlPc, FrlPcId, Ru, RuId, SubFedBuilder, SubFedBuilderId, SubSystem, SubSystemId, TcdsPartitionInfo,
    TtcPartition, TtcPartitionId, UidAllocator,
};

/// Reasons a topology cannot be assembled. All of them are fatal for the session.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("cannot read topology file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid topology description: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{kind} '{name}' is referenced but not declared")]
    UnknownReference { kind: &'static str, name: String },

    #[error("{kind} hostname '{hostname}' is declared twice")]
    DuplicateHostname { kind: &'static str, hostname: String },

    #[error("{kind} '{name}' is declared twice")]
    DuplicateName { kind: &'static str, name: String },

    #[error("FED {0} is declared twice")]
    DuplicateFedId(u32),

    #[error("FED {fed} uses input {io} which a {kind:?} card does not have")]
    FrlIoOutOfRange { fed: u32, io: u8, kind: FrlKind },

    #[error("FED {fed} uses input {io} which is already taken on its FRL")]
    FrlIoTaken { fed: u32, io: u8 },

    #[error("more than one event manager declared: {0:?}")]
    MultipleEvms(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubSystemSpec {
    pub name: String,
}

/// An FMM identified by the application that drives it and its slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FmmRef {
    pub application: String,
    pub geoslot: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FmmInputRef {
    pub application: String,
    pub geoslot: u32,
    pub io: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TcdsPartitionSpec {
    pub pm_nr: i64,
    pub ici_nr: i64,
    #[serde(default)]
    pub null_cause: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtcPartitionSpec {
    pub name: String,
    pub ttcp_nr: u32,
    #[serde(default)]
    pub subsystem: Option<String>,
    #[serde(default)]
    pub fmm: Option<FmmRef>,
    #[serde(default)]
    pub fmm_io: u8,
    #[serde(default)]
    pub tcds: Option<TcdsPartitionSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FmmSpec {
    pub application: String,
    pub geoslot: u32,
    #[serde(default)]
    pub dual: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitSpec {
    pub hostname: String,
    #[serde(default)]
    pub instance: Option<u32>,
    #[serde(default)]
    pub evm: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FedSpec {
    pub id: u32,
    /// Defaults to `id`.
    #[serde(default)]
    pub src_id_expected: Option<u32>,
    #[serde(default)]
    pub io: u8,
    #[serde(default)]
    pub fmm: Option<FmmInputRef>,
    #[serde(default = "default_true")]
    pub slink: bool,
    #[serde(default = "default_true")]
    pub tts: bool,
    #[serde(default)]
    pub main_feds: Vec<u32>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrlSpec {
    pub geo_slot: u32,
    #[serde(default)]
    pub kind: FrlKind,
    #[serde(default)]
    pub feds: Vec<FedSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubFedBuilderSpec {
    pub name: String,
    pub ttc_partition: String,
    #[serde(default)]
    pub frl_pc: Option<String>,
    #[serde(default)]
    pub frls: Vec<FrlSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FedBuilderSpec {
    pub name: String,
    pub ru: UnitSpec,
    #[serde(default)]
    pub sub_fed_builders: Vec<SubFedBuilderSpec>,
}

/// Declarative description of one session's topology.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologySpec {
    #[serde(default)]
    pub session_id: Option<i64>,
    #[serde(default)]
    pub subsystems: Vec<SubSystemSpec>,
    #[serde(default)]
    pub ttc_partitions: Vec<TtcPartitionSpec>,
    #[serde(default)]
    pub frl_pcs: Vec<String>,
    #[serde(default)]
    pub fmm_applications: Vec<String>,
    #[serde(default)]
    pub fmms: Vec<FmmSpec>,
    #[serde(default)]
    pub bus: Vec<UnitSpec>,
    #[serde(default)]
    pub fed_builders: Vec<FedBuilderSpec>,
}

impl TopologySpec {
    /// Reads a topology description from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TopologyError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| TopologyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, TopologyError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Assembles the graph, drawing one uid per entity from `uids`.
    pub fn build(&self, uids: &mut UidAllocator) -> Result<Daq, TopologyError> {
        let mut daq = Daq::new(uids.allocate());
        daq.run.session_id = self.session_id;

        let mut subsystems: HashMap<&str, SubSystemId> = HashMap::new();
        for spec in &self.subsystems {
            if subsystems.contains_key(spec.name.as_str()) {
                return Err(TopologyError::DuplicateName { kind: "subsystem", name: spec.name.clone() });
            }
            subsystems.insert(&spec.name, SubSystemId::from_index(daq.sub_systems.len()));
            daq.sub_systems.push(SubSystem::new(uids.allocate(), &spec.name));
        }

        let mut fmm_applications: HashMap<&str, FmmApplicationId> = HashMap::new();
        for hostname in &self.fmm_applications {
            if fmm_applications.contains_key(hostname.as_str()) {
                return Err(duplicate_host("FMM application", hostname));
            }
            fmm_applications.insert(hostname, FmmApplicationId::from_index(daq.fmm_applications.len()));
            daq.fmm_applications.push(FmmApplication::new(uids.allocate(), hostname));
        }

        let mut fmms: HashMap<(&str, u32), FmmId> = HashMap::new();
        for spec in &self.fmms {
            let application = lookup(&fmm_applications, spec.application.as_str(), "FMM application")?;
            if fmms.contains_key(&(spec.application.as_str(), spec.geoslot)) {
                return Err(TopologyError::DuplicateName {
                    kind: "FMM",
                    name: format!("{}:{}", spec.application, spec.geoslot),
                });
            }
            fmms.insert((spec.application.as_str(), spec.geoslot), FmmId::from_index(daq.fmms.len()));
            let mut fmm = Fmm::new(uids.allocate(), spec.geoslot, application);
            fmm.dual = spec.dual;
            daq.fmms.push(fmm);
        }

        let mut ttc_partitions: HashMap<&str, TtcPartitionId> = HashMap::new();
        for spec in &self.ttc_partitions {
            if ttc_partitions.contains_key(spec.name.as_str()) {
                return Err(TopologyError::DuplicateName { kind: "TTC partition", name: spec.name.clone() });
            }
            let id = TtcPartitionId::from_index(daq.ttc_partitions.len());
            let mut partition = TtcPartition::new(uids.allocate(), &spec.name, spec.ttcp_nr);
            partition.fmm_io = spec.fmm_io;
            if let Some(tcds) = &spec.tcds {
                partition.tcds_partition_info = TcdsPartitionInfo {
                    pm_nr: tcds.pm_nr,
                    ici_nr: tcds.ici_nr,
                    null_cause: tcds.null_cause.clone(),
                };
            }
            if let Some(fmm_ref) = &spec.fmm {
                let fmm = fmm_id(&fmms, &fmm_ref.application, fmm_ref.geoslot)?;
                partition.fmm = Some(fmm);
                daq.fmms[fmm.index()].ttc_partition = Some(id);
            }
            if let Some(name) = &spec.subsystem {
                let subsystem = lookup(&subsystems, name.as_str(), "subsystem")?;
                partition.sub_system = Some(subsystem);
                daq.sub_systems[subsystem.index()].ttc_partitions.push(id);
            }
            ttc_partitions.insert(&spec.name, id);
            daq.ttc_partitions.push(partition);
        }

        let mut frl_pcs: HashMap<&str, FrlPcId> = HashMap::new();
        for hostname in &self.frl_pcs {
            if frl_pcs.contains_key(hostname.as_str()) {
                return Err(duplicate_host("FRL PC", hostname));
            }
            frl_pcs.insert(hostname, FrlPcId::from_index(daq.frl_pcs.len()));
            daq.frl_pcs.push(FrlPc::new(uids.allocate(), hostname));
        }

        let mut bu_hosts: HashSet<&str> = HashSet::new();
        for spec in &self.bus {
            if !bu_hosts.insert(&spec.hostname) {
                return Err(duplicate_host("BU", &spec.hostname));
            }
            let mut bu = Bu::new(uids.allocate(), &spec.hostname);
            bu.instance = spec.instance;
            daq.bus.push(bu);
        }

        let mut fed_ids: HashMap<u32, FedId> = HashMap::new();
        let mut ru_hosts: HashSet<&str> = HashSet::new();
        let mut evms = Vec::new();
        for fb_spec in &self.fed_builders {
            if !ru_hosts.insert(&fb_spec.ru.hostname) {
                return Err(duplicate_host("RU", &fb_spec.ru.hostname));
            }
            let fed_builder = FedBuilderId::from_index(daq.fed_builders.len());
            let ru = RuId::from_index(daq.rus.len());
            let mut unit = Ru::new(uids.allocate(), &fb_spec.ru.hostname, fed_builder);
            unit.instance = fb_spec.ru.instance;
            unit.is_evm = fb_spec.ru.evm;
            if unit.is_evm {
                evms.push(unit.hostname.clone());
            }
            daq.rus.push(unit);

            let mut sub_fed_builders = Vec::with_capacity(fb_spec.sub_fed_builders.len());
            for sfb_spec in &fb_spec.sub_fed_builders {
                let sub_fed_builder = SubFedBuilderId::from_index(daq.sub_fed_builders.len());
                let ttc_partition = lookup(&ttc_partitions, sfb_spec.ttc_partition.as_str(), "TTC partition")?;
                let frl_pc = match &sfb_spec.frl_pc {
                    Some(hostname) => Some(lookup(&frl_pcs, hostname.as_str(), "FRL PC")?),
                    None => None,
                };

                let mut frls = Vec::with_capacity(sfb_spec.frls.len());
                for frl_spec in &sfb_spec.frls {
                    let frl_id = FrlId::from_index(daq.frls.len());
                    let mut frl = Frl::new(uids.allocate(), frl_spec.geo_slot, frl_spec.kind, sub_fed_builder);
                    frl.frl_pc = frl_pc;

                    for fed_spec in &frl_spec.feds {
                        let max_io = match frl_spec.kind {
                            FrlKind::Ferol => 1,
                            FrlKind::Ferol40 => 3,
                        };
                        if fed_spec.io > max_io {
                            return Err(TopologyError::FrlIoOutOfRange {
                                fed: fed_spec.id,
                                io: fed_spec.io,
                                kind: frl_spec.kind,
                            });
                        }
                        if frl.feds.contains_key(&fed_spec.io) {
                            return Err(TopologyError::FrlIoTaken { fed: fed_spec.id, io: fed_spec.io });
                        }
                        if fed_ids.contains_key(&fed_spec.id) {
                            return Err(TopologyError::DuplicateFedId(fed_spec.id));
                        }

                        let id = FedId::from_index(daq.feds.len());
                        let mut fed =
                            Fed::new(uids.allocate(), fed_spec.id, fed_spec.src_id_expected.unwrap_or(fed_spec.id));
                        fed.frl = Some(frl_id);
                        fed.frl_io = Some(fed_spec.io);
                        fed.has_slink = fed_spec.slink;
                        fed.has_tts = fed_spec.tts;
                        if let Some(input) = &fed_spec.fmm {
                            let fmm = fmm_id(&fmms, &input.application, input.geoslot)?;
                            fed.fmm = Some(fmm);
                            fed.fmm_io = Some(input.io);
                            daq.fmms[fmm.index()].feds.push(id);
                        }

                        fed_ids.insert(fed_spec.id, id);
                        frl.feds.insert(fed_spec.io, id);
                        daq.feds.push(fed);
                    }

                    frls.push(frl_id);
                    daq.frls.push(frl);
                }

                daq.sub_fed_builders.push(SubFedBuilder {
                    uid: uids.allocate(),
                    name: sfb_spec.name.clone(),
                    fed_builder,
                    frls,
                    ttc_partition,
                    frl_pc,
                    min_trig: 0,
                    max_trig: 0,
                });
                sub_fed_builders.push(sub_fed_builder);
            }

            daq.fed_builders.push(FedBuilder {
                uid: uids.allocate(),
                name: fb_spec.name.clone(),
                sub_fed_builders,
                ru,
            });
        }

        if evms.len() > 1 {
            return Err(TopologyError::MultipleEvms(evms));
        }
        if evms.is_empty() {
            log::warn!("Topology declares no event manager; the EVM flashlist will find no target");
        }

        // Pseudo-FEDs reference FEDs that may be declared later.
        for fb_spec in &self.fed_builders {
            for fed_spec in fb_spec.sub_fed_builders.iter().flat_map(|s| &s.frls).flat_map(|f| &f.feds) {
                if fed_spec.main_feds.is_empty() {
                    continue;
                }
                let main_feds = fed_spec
                    .main_feds
                    .iter()
                    .map(|main| {
                        fed_ids.get(main).copied().ok_or_else(|| TopologyError::UnknownReference {
                            kind: "FED",
                            name: main.to_string(),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                if let Some(id) = fed_ids.get(&fed_spec.id) {
                    daq.feds[id.index()].main_feds = main_feds;
                }
            }
        }

        daq.rebuild_indexes();
        log::info!(
            "Topology built: {} FED builders, {} FRLs, {} FEDs, {} BUs, {} TTC partitions",
            daq.fed_builders.len(),
            daq.frls.len(),
            daq.feds.len(),
            daq.bus.len(),
            daq.ttc_partitions.len()
        );
        Ok(daq)
    }
}

fn lookup<T: Copy>(map: &HashMap<&str, T>, name: &str, kind: &'static str) -> Result<T, TopologyError> {
    map.get(name)
        .copied()
        .ok_or_else(|| TopologyError::UnknownReference { kind, name: name.to_string() })
}

fn fmm_id(fmms: &HashMap<(&str, u32), FmmId>, application: &str, geoslot: u32) -> Result<FmmId, TopologyError> {
    fmms.get(&(application, geoslot))
        .copied()
        .ok_or_else(|| TopologyError::UnknownReference { kind: "FMM", name: format!("{application}:{geoslot}") })
}

fn duplicate_host(kind: &'static str, hostname: &str) -> TopologyError {
    TopologyError::DuplicateHostname { kind, hostname: hostname.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Uid;
    use serde_json::json;

    fn spec() -> serde_json::Value {
        json!({
            "sessionId": 351,
            "subsystems": [{"name": "ECAL"}],
            "ttcPartitions": [{"name": "EB-", "ttcpNr": 1, "subsystem": "ECAL",
                               "fmm": {"application": "fmmpc-1", "geoslot": 5}}],
            "frlPcs": ["frlpc-1"],
            "fmmApplications": ["fmmpc-1"],
            "fmms": [{"application": "fmmpc-1", "geoslot": 5}],
            "bus": [{"hostname": "bu-1", "instance": 0}],
            "fedBuilders": [{
                "name": "EB-1",
                "ru": {"hostname": "ru-1", "instance": 1, "evm": true},
                "subFedBuilders": [{
                    "name": "EB-1a", "ttcPartition": "EB-", "frlPc": "frlpc-1",
                    "frls": [{"geoSlot": 5, "feds": [
                        {"id": 610, "io": 0, "fmm": {"application": "fmmpc-1", "geoslot": 5, "io": 3}},
                        {"id": 611, "io": 1, "mainFeds": [610]}
                    ]}]
                }]
            }]
        })
    }

    fn build(value: serde_json::Value) -> Result<Daq, TopologyError> {
        let spec: TopologySpec = serde_json::from_value(value)?;
        spec.build(&mut UidAllocator::new())
    }

    #[test]
    fn builds_linked_graph_with_unique_uids() {
        let daq = build(spec()).unwrap();

        assert_eq!(daq.session_id(), Some(351));
        assert_eq!(daq.feds.len(), 2);
        let fed = daq.fed_by_id(610).unwrap();
        assert_eq!(fed.frl, Some(FrlId(0)));
        assert_eq!(fed.fmm_io, Some(3));
        assert_eq!(daq.fed_by_id(611).unwrap().main_feds, vec![FedId(0)]);
        assert_eq!(daq.frls[0].frl_pc, Some(FrlPcId(0)));
        assert_eq!(daq.fmms[0].ttc_partition, Some(TtcPartitionId(0)));
        assert_eq!(daq.fmms[0].feds, vec![FedId(0)]);
        assert_eq!(daq.sub_systems[0].ttc_partitions, vec![TtcPartitionId(0)]);
        assert!(daq.evm().is_some());

        let mut uids: Vec<Uid> = vec![daq.uid];
        uids.extend(daq.feds.iter().map(|e| e.uid));
        uids.extend(daq.frls.iter().map(|e| e.uid));
        uids.extend(daq.rus.iter().map(|e| e.uid));
        uids.extend(daq.bus.iter().map(|e| e.uid));
        uids.extend(daq.fed_builders.iter().map(|e| e.uid));
        uids.extend(daq.sub_fed_builders.iter().map(|e| e.uid));
        let distinct: HashSet<_> = uids.iter().collect();
        assert_eq!(distinct.len(), uids.len());
    }

    #[test]
    fn uids_are_not_reused_across_sessions() {
        let spec: TopologySpec = serde_json::from_value(spec()).unwrap();
        let mut uids = UidAllocator::new();
        let first = spec.build(&mut uids).unwrap();
        let second = spec.build(&mut uids).unwrap();
        assert!(second.uid > first.feds[1].uid);
        assert_ne!(first.feds[0].uid, second.feds[0].uid);
    }

    #[test]
    fn rejects_unknown_partition() {
        let mut value = spec();
        value["fedBuilders"][0]["subFedBuilders"][0]["ttcPartition"] = json!("HCAL");
        assert!(matches!(
            build(value),
            Err(TopologyError::UnknownReference { kind: "TTC partition", .. })
        ));
    }

    #[test]
    fn rejects_second_input_beyond_legacy_card() {
        let mut value = spec();
        value["fedBuilders"][0]["subFedBuilders"][0]["frls"][0]["feds"][1]["io"] = json!(2);
        assert!(matches!(build(value), Err(TopologyError::FrlIoOutOfRange { fed: 611, io: 2, .. })));
    }

    #[test]
    fn rejects_duplicate_fed_and_two_evms() {
        let mut value = spec();
        value["fedBuilders"][0]["subFedBuilders"][0]["frls"][0]["feds"][1]["id"] = json!(610);
        assert!(matches!(build(value), Err(TopologyError::DuplicateFedId(610))));

        let mut value = spec();
        let mut second = value["fedBuilders"][0].clone();
        second["ru"]["hostname"] = json!("ru-2");
        second["subFedBuilders"] = json!([]);
        value["fedBuilders"].as_array_mut().unwrap().push(second);
        assert!(matches!(build(value), Err(TopologyError::MultipleEvms(_))));
    }
}
