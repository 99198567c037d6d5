//! Coordination units as observed from the host build engine.
//!
//! The host owns unit state. The core only ever sees snapshots handed out
//! by a [`TaskGraphProvider`] and never mutates them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of a coordination unit within one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(String);

impl UnitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UnitId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Snapshot of one module-level step.
///
/// `executed` means the host has moved the unit to a terminal state: it ran,
/// was skipped, or was up to date. Skipped units must be reported as
/// executed so the remaining set can drain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinationUnit {
    pub id: UnitId,
    pub did_work: bool,
    pub executed: bool,
}

impl CoordinationUnit {
    pub fn pending(id: impl Into<UnitId>) -> Self {
        Self {
            id: id.into(),
            did_work: false,
            executed: false,
        }
    }
}

/// Host-engine introspection: every coordination unit registered for the
/// current run, in the host's execution order.
///
/// Hosts that run units in parallel call into the run context from several
/// threads, so providers must be shareable.
pub trait TaskGraphProvider: Send + Sync {
    fn units(&self) -> Vec<CoordinationUnit>;
}

impl<F> TaskGraphProvider for F
where
    F: Fn() -> Vec<CoordinationUnit> + Send + Sync,
{
    fn units(&self) -> Vec<CoordinationUnit> {
        self()
    }
}

/// Look up a unit's snapshot by id.
pub fn find<'a>(units: &'a [CoordinationUnit], id: &UnitId) -> Option<&'a CoordinationUnit> {
    units.iter().find(|u| &u.id == id)
}
