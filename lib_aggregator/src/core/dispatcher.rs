//! # Flashlist Dispatcher
//!
//! The dispatcher is the routing table of the aggregator. For every flashlist
//! type it holds a fixed plan, a list of [`Route`]s, saying which rows are
//! considered, which matcher resolves them and which entity pool they resolve
//! into. A flashlist is applied route by route; rows are never dropped silently
//! except by an explicit filter.
//!
//! ## Dispatch Rules:
//!
//! 1.  **Skipping**: flashlists that were not retrieved, flashlists of an
//!     unknown name and (except for the EVM table) flashlists without rows are
//!     skipped before any route runs. Nothing is recorded for them.
//!
//! 2.  **Matching then applying**: every route first resolves the rows into a
//!     [`MatchOutcome`] while the graph is only read, then applies the rows
//!     through [`crate::model::FlashlistUpdatable`] in the deterministic order of the
//!     outcome's correspondences. An entity receives at most one row per route.
//!
//! 3.  **Accounting**: once per dispatched flashlist, `(matched, unmatched)`
//!     is recorded with the [`MatchReporter`] under the flashlist's type. A row
//!     is matched when any route resolved it and unmatched when every route
//!     that considered it missed. Rows a filter rejected are neither. Entries
//!     of the RU problem lists are counted apart from the rows. Entities whose
//!     update fails are logged, left untouched by the update contract, and
//!     recorded as failed.
//!
//! 4.  **Anomalies**: an EVM table with anything but exactly one row is logged
//!     at error level and not applied.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::flashlist::{Flashlist, FlashlistType, Row, RowError};
use crate::matchers::{GeoFinder, GeoMatcher, HostnameMatcher, IdListMatcher, InstanceMatcher, MatchOutcome};
use crate::model::{Daq, EntityRef, RuId};

use super::tcds::apply_tts_channels;
use super::{MatchReporter, SessionContext};

/// Hostname-indexed entity pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPool {
    Rus,
    Bus,
    FrlPcs,
    FmmApplications,
}

/// Instance-indexed entity pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstancePool {
    Rus,
    Bus,
}

/// One step of a flashlist type's dispatch plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `context` hostname into a hostname pool.
    Hostname(HostPool),
    /// Structural position.
    Geo(GeoFinder),
    /// RU FED problem lists into FEDs by expected source id.
    RuFedLists,
    /// The single EVM row into every EVM-flagged RU.
    Evm,
    /// Rows of the configured level-zero instance into the run information.
    LevelZeroDynamic,
    /// Rows of the current session into the run information and subsystems.
    LevelZeroSubsystems,
    /// The row of the configured TCDS service into the TCDS global information.
    TcdsService,
    /// The TTS channel tree into partitions and global TTS states.
    TtsChannels,
}

impl Route {
    /// The dispatch plan of one flashlist type.
    pub fn plan(flashlist_type: FlashlistType) -> &'static [Route] {
        use FlashlistType as T;
        match flashlist_type {
            T::Ru => &[Route::Hostname(HostPool::Rus), Route::RuFedLists],
            T::Evm => &[Route::Evm],
            T::Bu => &[Route::Hostname(HostPool::Bus)],
            T::JobControl => &[
                Route::Hostname(HostPool::FrlPcs),
                Route::Hostname(HostPool::FmmApplications),
                Route::Hostname(HostPool::Rus),
                Route::Hostname(HostPool::Bus),
            ],
            T::FerolInputStream => &[Route::Geo(GeoFinder::FedInFerolInputStream)],
            T::Ferol40InputStream | T::Ferol40StreamConfiguration => &[Route::Geo(GeoFinder::FedInFerol40Stream)],
            T::FmmInput => &[Route::Geo(GeoFinder::FedInFmm)],
            T::FerolStatus | T::Ferol40Status => &[Route::Geo(GeoFinder::Frl)],
            T::FerolConfiguration | T::FrlMonitoring => {
                &[Route::Hostname(HostPool::FrlPcs), Route::Geo(GeoFinder::FedInFrl)]
            }
            T::Ferol40Configuration => &[Route::Hostname(HostPool::FrlPcs)],
            T::FmmStatus => &[Route::Geo(GeoFinder::Fmm), Route::Geo(GeoFinder::TtcPartition)],
            T::LevelZeroFmDynamic => &[Route::LevelZeroDynamic],
            T::LevelZeroFmSubsys => &[Route::LevelZeroSubsystems],
            T::TcdsCpmCounts | T::TcdsCpmDeadtimes | T::TcdsCpmRates | T::TcdsPmActionCounts => &[Route::TcdsService],
            T::TcdsPmTtsChannel => &[Route::TtsChannels],
            T::LevelZeroFmStatic => &[],
        }
    }
}

/// Routes the rows of each flashlist to the entities they describe.
#[derive(Debug, Clone, Default)]
pub struct FlashlistDispatcher {
    hostname: HostnameMatcher,
    instance: InstanceMatcher,
}

impl FlashlistDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Dispatch
    ///
    /// Applies one flashlist to the graph following its type's plan.
    pub fn dispatch(&self, daq: &mut Daq, flashlist: &Flashlist, session: &SessionContext, reporter: &MatchReporter) {
        if !flashlist.available {
            log::debug!("{} was not retrieved this cycle, skipped", flashlist.name);
            return;
        }
        let Some(flashlist_type) = flashlist.flashlist_type else {
            log::debug!("{} is not a known flashlist, ignored", flashlist.name);
            return;
        };
        if flashlist.is_empty() && flashlist_type != FlashlistType::Evm {
            log::debug!("{} has no rows, skipped", flashlist_type);
            return;
        }

        let rows = flashlist.rows.as_slice();
        let mut tally: Option<RowTally> = None;
        for &route in Route::plan(flashlist_type) {
            if let Some(outcome) = self.run_route(route, daq, flashlist_type, rows, session, reporter) {
                tally.get_or_insert_with(RowTally::default).absorb(route, outcome);
            }
        }
        if let Some(tally) = tally {
            reporter.record_outcome(flashlist_type, tally.matched(), tally.unmatched());
        }
    }

    fn run_route(
        &self,
        route: Route,
        daq: &mut Daq,
        flashlist_type: FlashlistType,
        rows: &[Value],
        session: &SessionContext,
        reporter: &MatchReporter,
    ) -> Option<MatchOutcome> {
        let outcome = match route {
            Route::Hostname(pool) => self.match_hostnames(daq, rows, pool),
            Route::Geo(finder) => GeoMatcher::new(finder).match_rows(rows, daq),
            Route::RuFedLists => {
                let outcome =
                    IdListMatcher::RU_FED_LISTS.match_rows(rows, &daq.indexes().feds_by_expected_id, EntityRef::Fed);
                daq.feds.iter_mut().for_each(|fed| fed.clear_ru_flags());
                reporter.record_list_entries(flashlist_type, outcome.matched, outcome.unmatched);
                outcome
            }
            Route::Evm => evm_outcome(daq, rows)?,
            Route::LevelZeroDynamic => level_zero_dynamic_outcome(rows, session),
            Route::LevelZeroSubsystems => level_zero_subsystems_outcome(daq, rows, session),
            Route::TcdsService => tcds_service_outcome(rows, session)?,
            Route::TtsChannels => {
                match apply_tts_channels(daq, rows, session) {
                    Some(report) => {
                        reporter.record_outcome(flashlist_type, report.matched, report.unmatched);
                        reporter.record_failures(flashlist_type, report.failed);
                    }
                    None => log::debug!("No TCDS partition manager in this session, {} skipped", flashlist_type),
                }
                return None;
            }
        };

        log::debug!(
            "{} via {:?}: {} matched, {} unmatched, {} entities",
            flashlist_type,
            route,
            outcome.matched,
            outcome.unmatched,
            outcome.correspondences.len()
        );
        let failed = apply_outcome(daq, flashlist_type, rows, &outcome);
        reporter.record_failures(flashlist_type, failed);
        Some(outcome)
    }

    fn match_hostnames(&self, daq: &Daq, rows: &[Value], pool: HostPool) -> MatchOutcome {
        let indexes = daq.indexes();
        match pool {
            HostPool::Rus => self.hostname.match_rows(rows, &indexes.rus_by_hostname, EntityRef::Ru),
            HostPool::Bus => self.hostname.match_rows(rows, &indexes.bus_by_hostname, EntityRef::Bu),
            HostPool::FrlPcs => self.hostname.match_rows(rows, &indexes.frl_pcs_by_hostname, EntityRef::FrlPc),
            HostPool::FmmApplications => {
                self.hostname.match_rows(rows, &indexes.fmm_applications_by_hostname, EntityRef::FmmApplication)
            }
        }
    }

    /// # Dispatch Rows By Instance Id
    ///
    /// Applies the rows of a flashlist to RUs or BUs addressed by their XDAQ
    /// instance number. No flashlist type uses this in its plan; it serves
    /// tables whose rows carry no usable context.
    pub fn dispatch_rows_by_instance(
        &self,
        daq: &mut Daq,
        flashlist_type: FlashlistType,
        rows: &[Value],
        pool: InstancePool,
        reporter: &MatchReporter,
    ) {
        let indexes = daq.indexes();
        let outcome = match pool {
            InstancePool::Rus => self.instance.match_rows(rows, &indexes.rus_by_instance, EntityRef::Ru),
            InstancePool::Bus => self.instance.match_rows(rows, &indexes.bus_by_instance, EntityRef::Bu),
        };
        let failed = apply_outcome(daq, flashlist_type, rows, &outcome);
        let tally = RowTally::from(outcome);
        reporter.record_outcome(flashlist_type, tally.matched(), tally.unmatched());
        reporter.record_failures(flashlist_type, failed);
    }
}

/// Row accounting of one flashlist across the routes of its plan.
#[derive(Debug, Default)]
struct RowTally {
    resolved: BTreeSet<usize>,
    missed: BTreeSet<usize>,
}

impl RowTally {
    /// Misses of the RU problem lists are entry misses, not row misses: only
    /// the rows they resolved are taken.
    fn absorb(&mut self, route: Route, outcome: MatchOutcome) {
        self.resolved.extend(outcome.resolved_rows);
        if route != Route::RuFedLists {
            self.missed.extend(outcome.missed_rows);
        }
    }

    fn matched(&self) -> usize {
        self.resolved.len()
    }

    fn unmatched(&self) -> usize {
        self.missed.difference(&self.resolved).count()
    }
}

impl From<MatchOutcome> for RowTally {
    fn from(outcome: MatchOutcome) -> Self {
        Self { resolved: outcome.resolved_rows, missed: outcome.missed_rows }
    }
}

/// Applies each correspondence; returns the number of rejected updates.
fn apply_outcome(daq: &mut Daq, flashlist_type: FlashlistType, rows: &[Value], outcome: &MatchOutcome) -> usize {
    let mut failed = 0;
    for (&entity, &index) in &outcome.correspondences {
        let Some(row) = rows.get(index) else {
            continue;
        };
        if let Err(e) = apply_row(daq, entity, flashlist_type, row) {
            log::warn!("{} row {} rejected by {:?}: {}", flashlist_type, index, entity, e);
            failed += 1;
        }
    }
    failed
}

fn apply_row(
    daq: &mut Daq,
    entity: EntityRef,
    flashlist_type: FlashlistType,
    row: &Value,
) -> Result<(), RowError> {
    match daq.entity_mut(entity) {
        Some(target) => target.update_from_flashlist(flashlist_type, row),
        None => {
            log::debug!("{:?} is not in the graph", entity);
            Ok(())
        }
    }
}

fn evm_outcome(daq: &Daq, rows: &[Value]) -> Option<MatchOutcome> {
    if rows.len() != 1 {
        log::error!("EVM flashlist must carry exactly one row, got {}: {:?}", rows.len(), rows);
        return None;
    }
    let mut outcome = MatchOutcome::default();
    for (i, ru) in daq.rus.iter().enumerate() {
        if ru.is_evm {
            outcome.assign(EntityRef::Ru(RuId::from_index(i)), 0);
        }
    }
    if outcome.correspondences.is_empty() {
        outcome.miss(0);
    } else {
        outcome.hit(0);
    }
    Some(outcome)
}

fn fm_url_accepted(row: &Value, session: &SessionContext) -> bool {
    match row.text("FMURL") {
        Ok(url) => session.accepts_fm_url(&url),
        Err(e) => {
            log::debug!("Level-zero row without FMURL: {}", e);
            false
        }
    }
}

/// Every row of the configured level-zero instance goes to the run
/// information; a later row overrides an earlier one.
fn level_zero_dynamic_outcome(rows: &[Value], session: &SessionContext) -> MatchOutcome {
    let mut outcome = MatchOutcome::default();
    for (i, row) in rows.iter().enumerate() {
        if fm_url_accepted(row, session) {
            outcome.assign(EntityRef::Run, i);
            outcome.hit(i);
        }
    }
    outcome
}

/// Rows of the current session: the `DAQ` row of the configured level-zero
/// instance feeds the run information, every row feeds the subsystem it names.
fn level_zero_subsystems_outcome(daq: &Daq, rows: &[Value], session: &SessionContext) -> MatchOutcome {
    let mut outcome = MatchOutcome::default();
    let Some(session_id) = daq.session_id() else {
        log::debug!("No session id yet, level-zero subsystem rows ignored");
        return outcome;
    };
    let session_id = session_id.to_string();
    let subsystems = &daq.indexes().sub_systems_by_name;

    for (i, row) in rows.iter().enumerate() {
        match row.text("SID") {
            Ok(sid) if sid.contains(&session_id) => {}
            Ok(sid) => {
                log::debug!("Ignoring level-zero row of session {}", sid);
                continue;
            }
            Err(e) => {
                log::debug!("Level-zero row {} without SID: {}", i, e);
                continue;
            }
        }
        let name = match row.text("SUBSYS") {
            Ok(name) => name,
            Err(e) => {
                log::debug!("Level-zero row {} without SUBSYS: {}", i, e);
                outcome.miss(i);
                continue;
            }
        };

        let mut resolved = false;
        if name == "DAQ" && fm_url_accepted(row, session) {
            outcome.assign(EntityRef::Run, i);
            resolved = true;
        }
        if let Some(&id) = subsystems.get(&name) {
            outcome.assign(EntityRef::SubSystem(id), i);
            resolved = true;
        }
        if resolved {
            outcome.hit(i);
        } else {
            outcome.miss(i);
        }
    }
    outcome
}

/// The first row of the configured TCDS service. Rows of other services are
/// filtered out, so a table without the configured service counts nothing.
/// `None` when the session has no TCDS partition manager.
fn tcds_service_outcome(rows: &[Value], session: &SessionContext) -> Option<MatchOutcome> {
    let Some((service, _)) = session.tcds() else {
        log::debug!("No TCDS partition manager in this session, TCDS table skipped");
        return None;
    };
    let mut outcome = MatchOutcome::default();
    let found = rows
        .iter()
        .position(|row| row.text("service").is_ok_and(|s| s.eq_ignore_ascii_case(service)));
    match found {
        Some(i) => {
            outcome.assign(EntityRef::TcdsGlobalInfo, i);
            outcome.hit(i);
        }
        None => log::warn!("No row for TCDS service {} among {} rows", service, rows.len()),
    }
    Some(outcome)
}
