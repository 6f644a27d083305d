//! # Aggregator
//!
//! The `Aggregator` owns the live entity graph for one session and is the only
//! place it is mutated. A cycle is applied under `&mut self`, so two cycles can
//! never interleave, and the graph is published only once the derived pass has
//! run.
//!
//! ## Cycle Steps:
//!
//! 1.  **Ordering**: the flashlists are stably sorted by dispatch priority. The
//!     dynamic level-zero table carries the session id the per-subsystem table
//!     is filtered on, so it goes first; every other table keeps the order it
//!     arrived in.
//! 2.  **Dispatch**: each flashlist is handed to the [`FlashlistDispatcher`].
//! 3.  **Derived pass**: [`calculate_derived_values`] runs over the updated graph.
//! 4.  **Publication**: the graph is stamped with the cycle time, cloned into an
//!     `Arc<Daq>` and replaced into a `tokio::sync::watch` channel. Readers
//!     holding a receiver always see a complete cycle.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;

use crate::flashlist::Flashlist;
use crate::model::{Daq, EntityRef};

use super::{calculate_derived_values, FlashlistDispatcher, MatchReporter, SessionContext};

/// Owns the graph of one session and applies cycles to it.
pub struct Aggregator {
    daq: Daq,
    session: SessionContext,
    dispatcher: FlashlistDispatcher,
    reporter: Arc<MatchReporter>,
    publisher: watch::Sender<Option<Arc<Daq>>>,
    cycles: u64,
}

impl Aggregator {
    /// Takes ownership of a freshly built graph. Nothing is published until
    /// the first cycle completes.
    pub fn new(daq: Daq, session: SessionContext) -> Self {
        let (publisher, _) = watch::channel(None);
        Self {
            daq,
            session,
            dispatcher: FlashlistDispatcher::new(),
            reporter: Arc::new(MatchReporter::new()),
            publisher,
            cycles: 0,
        }
    }

    /// The live graph. Between cycles it equals the last published one.
    pub fn daq(&self) -> &Daq {
        &self.daq
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Replaces the session filters; takes effect with the next cycle.
    pub fn set_session(&mut self, session: SessionContext) {
        self.session = session;
    }

    /// Shared handle to the match accounting of this aggregator.
    pub fn reporter(&self) -> Arc<MatchReporter> {
        Arc::clone(&self.reporter)
    }

    /// A receiver of completed graphs. Holds `None` until the first cycle.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Daq>>> {
        self.publisher.subscribe()
    }

    /// The last published graph.
    pub fn latest(&self) -> Option<Arc<Daq>> {
        self.publisher.borrow().clone()
    }

    /// Number of cycles completed.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// # Run Cycle
    ///
    /// Applies one cycle's flashlists, runs the derived pass and publishes the
    /// result. `timestamp_ms` is recorded as the graph's last update time.
    /// Individual row failures are logged and counted; the cycle always
    /// completes.
    pub fn run_cycle(&mut self, mut flashlists: Vec<Flashlist>, timestamp_ms: u64) -> Arc<Daq> {
        let started = Instant::now();
        flashlists.sort_by_key(|flashlist| flashlist.flashlist_type.map_or(u8::MAX, |ty| ty.dispatch_priority()));

        for flashlist in &flashlists {
            self.dispatcher.dispatch(&mut self.daq, flashlist, &self.session, &self.reporter);
        }
        calculate_derived_values(&mut self.daq);
        self.daq.run.last_update = timestamp_ms;
        self.cycles += 1;

        let snapshot = Arc::new(self.daq.clone());
        self.publisher.send_replace(Some(Arc::clone(&snapshot)));
        log::info!(
            "Cycle {} applied {} flashlists in {:?} (run {:?})",
            self.cycles,
            flashlists.len(),
            started.elapsed(),
            self.daq.run.run_number
        );
        snapshot
    }

    /// # Reset Entities
    ///
    /// Zeroes the periodic fields of the given entities. Used when their data
    /// source disappears so stale values are not carried into the next export.
    pub fn reset_entities(&mut self, entities: &[EntityRef]) {
        for &entity in entities {
            match self.daq.entity_mut(entity) {
                Some(target) => target.reset(),
                None => log::warn!("Cannot reset {:?}: not in the graph", entity),
            }
        }
    }

    /// Resets every entity of the graph.
    pub fn reset_all(&mut self) {
        let entities: Vec<EntityRef> = self.daq.entity_refs().collect();
        log::info!("Resetting {} entities", entities.len());
        self.reset_entities(&entities);
    }
}
