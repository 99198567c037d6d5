//! Last-unit detection without a scheduler callback.
//!
//! The host runs coordination units one at a time. Each unit, once its own
//! work is done, asks the tracker whether any *other* registered unit is
//! still pending. The unit that finds nobody left is the last one and is
//! the only one allowed to publish.

use crate::error::{BuildInfoError, Result};
use crate::unit::{self, CoordinationUnit, UnitId};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Debug, Default)]
struct TrackerState {
    graph: Option<Vec<UnitId>>,
    remaining: Option<Vec<UnitId>>,
    claimed_by: Option<UnitId>,
}

/// Run-scoped task graph and remaining set.
///
/// Both are guarded by one lock so the remaining-set check and the trigger
/// claim are atomic when a host reports completions from several threads.
#[derive(Debug, Default)]
pub struct TaskGraphTracker {
    state: Mutex<TrackerState>,
}

impl TaskGraphTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Capture the run's graph. Only the first call has an effect; later
    /// calls return the cached graph.
    pub fn register(&self, units: &[CoordinationUnit]) -> Vec<UnitId> {
        let mut state = self.lock();
        Self::register_locked(&mut state, units).to_vec()
    }

    fn register_locked<'a>(
        state: &'a mut TrackerState,
        units: &[CoordinationUnit],
    ) -> &'a [UnitId] {
        state.graph.get_or_insert_with(|| {
            let graph: Vec<UnitId> = units.iter().map(|u| u.id.clone()).collect();
            debug!(units = graph.len(), "registered task graph");
            graph
        })
    }

    /// The cached graph, if registered.
    pub fn graph(&self) -> Option<Vec<UnitId>> {
        self.lock().graph.clone()
    }

    /// Units of the graph not yet seen as executed.
    pub fn remaining(&self) -> Vec<UnitId> {
        let state = self.lock();
        state
            .remaining
            .clone()
            .or_else(|| state.graph.clone())
            .unwrap_or_default()
    }

    /// The unit that was reported last, once one has been.
    pub fn claimed_by(&self) -> Option<UnitId> {
        self.lock().claimed_by.clone()
    }

    /// Whether `me` is the last unit of the run to finish.
    ///
    /// Drops every executed unit from the remaining set (using `current`,
    /// the host's fresh snapshot) and answers true when at most one unit
    /// remains and that unit, if any, is `me`. The first true answer claims
    /// the run; every later call answers false.
    pub fn is_last(&self, me: &UnitId, current: &[CoordinationUnit]) -> Result<bool> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let graph = Self::register_locked(state, current).to_vec();
        if !graph.contains(me) {
            return Err(BuildInfoError::UnknownUnit(me.to_string()));
        }

        let remaining = state.remaining.get_or_insert(graph);
        // Units missing from the snapshot stay pending.
        remaining.retain(|id| !unit::find(current, id).is_some_and(|u| u.executed));

        if state.claimed_by.is_some() {
            return Ok(false);
        }

        let last = remaining.iter().all(|id| id == me);
        debug!(
            unit = %me,
            remaining = remaining.len(),
            last,
            "checked remaining units"
        );
        if last {
            state.claimed_by = Some(me.clone());
        }
        Ok(last)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
