//! Run-scoped context: one per build invocation.

use crate::aggregator::ModuleExtractor;
use crate::client::ClientFactory;
use crate::config::PublishConfig;
use crate::coordinator::{PublishCoordinator, PublishReport, PublishState, RunInfo};
use crate::error::{BuildInfoError, Result};
use crate::tracker::TaskGraphTracker;
use crate::unit::{TaskGraphProvider, UnitId};
use tracing::{debug, error};

/// Result of reporting one unit's completion.
#[derive(Debug)]
pub enum UnitOutcome {
    /// Other units are still pending.
    Pending { remaining: usize },
    /// This unit was last and the run was published.
    Published(Box<PublishReport>),
    /// The run was already claimed by an earlier completion.
    AlreadyPublished,
    /// The unit is not in the registered graph. Nothing was published.
    UnknownUnit,
}

impl UnitOutcome {
    pub fn report(&self) -> Option<&PublishReport> {
        match self {
            Self::Published(report) => Some(report.as_ref()),
            _ => None,
        }
    }
}

pub struct RunContext {
    info: RunInfo,
    provider: Box<dyn TaskGraphProvider>,
    extractor: Box<dyn ModuleExtractor>,
    tracker: TaskGraphTracker,
    coordinator: PublishCoordinator,
}

impl RunContext {
    pub fn new(
        info: RunInfo,
        config: PublishConfig,
        provider: Box<dyn TaskGraphProvider>,
        extractor: Box<dyn ModuleExtractor>,
        clients: Box<dyn ClientFactory>,
    ) -> Self {
        Self {
            info,
            provider,
            extractor,
            tracker: TaskGraphTracker::new(),
            coordinator: PublishCoordinator::new(config, clients),
        }
    }

    pub fn info(&self) -> &RunInfo {
        &self.info
    }

    pub fn tracker(&self) -> &TaskGraphTracker {
        &self.tracker
    }

    pub fn state(&self) -> PublishState {
        self.coordinator.state()
    }

    /// Called by each unit once its own work is done. Only the last unit of
    /// the run drives the publish sequence.
    pub fn on_unit_complete(&self, unit: &UnitId) -> Result<UnitOutcome> {
        let units = self.provider.units();
        let last = match self.tracker.is_last(unit, &units) {
            Ok(last) => last,
            Err(BuildInfoError::UnknownUnit(id)) => {
                error!(unit = %id, "completed unit is not part of the registered task graph");
                return Ok(UnitOutcome::UnknownUnit);
            }
            Err(e) => return Err(e),
        };

        if !last {
            if self.tracker.claimed_by().is_some() {
                return Ok(UnitOutcome::AlreadyPublished);
            }
            let remaining = self.tracker.remaining().len();
            debug!(unit = %unit, remaining, "waiting for remaining units");
            return Ok(UnitOutcome::Pending { remaining });
        }

        let graph = self.tracker.graph().unwrap_or_default();
        let report =
            self.coordinator
                .publish(&self.info, &graph, &units, self.extractor.as_ref())?;
        Ok(match report {
            Some(report) => UnitOutcome::Published(Box::new(report)),
            None => UnitOutcome::AlreadyPublished,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_shareable<T: Send + Sync>() {}

    #[test]
    fn run_context_can_be_shared_across_threads() {
        assert_shareable::<RunContext>();
    }
}
