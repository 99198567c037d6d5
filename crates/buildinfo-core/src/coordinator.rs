//! The once-per-run deploy and publish sequence.
//!
//! Runs when the tracker reports the last unit: aggregate, deploy the
//! filtered deploy set, publish the build record (full or incremental),
//! export files, release the client, clean up the run's property file.

use crate::aggregator::{BuildFragmentAggregator, Collected, ModuleExtractor};
use crate::build::{format_started, Agent, AggregatedBuild};
use crate::client::{ClientFactory, ClientGuard};
use crate::config::{DeployFailurePolicy, PublishConfig};
use crate::deploy::DeployDetail;
use crate::error::Result;
use crate::export;
use crate::filter::ArtifactFilter;
use crate::unit::{CoordinationUnit, UnitId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Run-level facts the host knows before any unit completes.
#[derive(Debug, Clone)]
pub struct RunInfo {
    /// Name of the root project; the default build name.
    pub root_name: String,
    pub started_at: DateTime<Utc>,
}

impl RunInfo {
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            root_name: root_name.into(),
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishState {
    Idle,
    Triggered,
    Finalizing,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployFailure {
    pub path: String,
    pub message: String,
}

/// What the publish sequence did.
#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
    pub build_name: String,
    pub build_number: String,
    pub modules: usize,
    pub artifacts: usize,
    pub dependencies: usize,
    pub deployed: Vec<String>,
    /// Deploy candidates held back by include/exclude patterns.
    pub filtered: Vec<String>,
    pub failed: Vec<DeployFailure>,
    /// True once the build record reached the repository.
    pub published: bool,
    pub exported: Vec<PathBuf>,
    #[serde(skip)]
    pub build: AggregatedBuild,
}

impl PublishReport {
    fn new(build: &AggregatedBuild) -> Self {
        Self {
            build_name: build.name.clone(),
            build_number: build.number.clone(),
            modules: build.modules.len(),
            artifacts: build.artifact_count(),
            dependencies: build.dependency_count(),
            deployed: Vec::new(),
            filtered: Vec::new(),
            failed: Vec::new(),
            published: false,
            exported: Vec::new(),
            build: build.clone(),
        }
    }
}

pub struct PublishCoordinator {
    config: PublishConfig,
    clients: Box<dyn ClientFactory>,
    state: Mutex<PublishState>,
}

impl PublishCoordinator {
    pub fn new(config: PublishConfig, clients: Box<dyn ClientFactory>) -> Self {
        Self {
            config,
            clients,
            state: Mutex::new(PublishState::Idle),
        }
    }

    pub fn config(&self) -> &PublishConfig {
        &self.config
    }

    pub fn state(&self) -> PublishState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: PublishState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(from = ?*state, to = ?next, "publish state");
        *state = next;
    }

    /// Move Idle to Triggered. False if the sequence already started.
    fn trigger(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != PublishState::Idle {
            return false;
        }
        *state = PublishState::Triggered;
        true
    }

    /// Run the deploy and publish sequence. Returns `Ok(None)` without
    /// doing anything when the sequence has already run for this
    /// coordinator.
    pub fn publish(
        &self,
        run: &RunInfo,
        graph: &[UnitId],
        units: &[CoordinationUnit],
        extractor: &dyn ModuleExtractor,
    ) -> Result<Option<PublishReport>> {
        if !self.trigger() {
            debug!(state = ?self.state(), "publish already ran for this run");
            return Ok(None);
        }

        let result = self.run_sequence(run, graph, units, extractor);
        self.set_state(if result.is_ok() {
            PublishState::Done
        } else {
            PublishState::Failed
        });
        self.remove_props_file();
        result.map(Some)
    }

    fn run_sequence(
        &self,
        run: &RunInfo,
        graph: &[UnitId],
        units: &[CoordinationUnit],
        extractor: &dyn ModuleExtractor,
    ) -> Result<PublishReport> {
        let collected = BuildFragmentAggregator::new(&self.config).collect(
            self.header(run),
            run.started_at,
            graph,
            units,
            extractor,
        )?;
        let mut report = PublishReport::new(&collected.build);

        let mut client = match self.config.endpoint() {
            Some(endpoint) if self.wants_network() => {
                debug!(url = %endpoint.context_url, "connecting to repository");
                Some(ClientGuard::new(
                    self.clients.connect(&endpoint, &self.config)?,
                ))
            }
            Some(_) => None,
            None => {
                warn!("no repository context URL configured; skipping deploy and publish");
                None
            }
        };

        if let Some(client) = client.as_mut() {
            self.deploy(client, &collected, &mut report)?;
        }

        self.set_state(PublishState::Finalizing);
        let published = self.send_build_info(client.as_mut(), &collected.build);
        drop(client);

        let exported = self.export(&collected, &mut report);
        report.published = published?;
        exported?;

        info!(
            name = %report.build_name,
            number = %report.build_number,
            modules = report.modules,
            deployed = report.deployed.len(),
            filtered = report.filtered.len(),
            failed = report.failed.len(),
            published = report.published,
            "build run finalized"
        );
        Ok(report)
    }

    fn header(&self, run: &RunInfo) -> AggregatedBuild {
        let build = &self.config.build;
        let name = build.name.clone().unwrap_or_else(|| run.root_name.clone());
        let number = build
            .number
            .clone()
            .unwrap_or_else(|| run.started_at.timestamp_millis().to_string());

        let mut header = AggregatedBuild::new(name, number, format_started(run.started_at));
        header.duration_millis = u64::try_from((Utc::now() - run.started_at).num_milliseconds())
            .unwrap_or_default();
        header.agent = Some(build.agent.clone().unwrap_or_else(|| Agent {
            name: "buildinfo".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }));
        header.url = build.url.clone();
        header.principal = build.principal.clone();
        header.vcs_revision = build.vcs_revision.clone();
        header.vcs_url = build.vcs_url.clone();
        header.incremental = build.incremental;
        header
    }

    fn wants_network(&self) -> bool {
        self.config.publisher.publish_build_info
            || self.config.publisher.publish_artifacts
            || self
                .config
                .modules
                .values()
                .any(|m| m.publish_artifacts == Some(true))
    }

    /// The deploy batch: each unit's candidates judged by that unit's own
    /// patterns, then deduplicated by path. Paths held back everywhere they
    /// were reported land in `report.filtered`.
    fn deploy_batch<'c>(
        &self,
        collected: &'c Collected,
        report: &mut PublishReport,
    ) -> Result<Vec<&'c DeployDetail>> {
        let mut batch = Vec::new();
        let mut accepted = HashSet::new();
        let mut held = Vec::new();
        for unit in &collected.deploys {
            if !self.config.publish_artifacts_for(&unit.unit) {
                debug!(unit = %unit.unit, "artifact deployment disabled for unit");
                continue;
            }
            let filter = ArtifactFilter::compile(&self.config.patterns_for(&unit.unit))?;
            for detail in &unit.details {
                let path = detail.artifact_path.as_str();
                if filter.should_skip(path) {
                    held.push((&unit.unit, path));
                } else if accepted.insert(path) {
                    batch.push(detail);
                } else {
                    debug!(unit = %unit.unit, path, "duplicate deploy path collapsed");
                }
            }
        }
        for (unit, path) in held {
            if accepted.contains(path) || report.filtered.iter().any(|p| p == path) {
                continue;
            }
            warn!(unit = %unit, path, "skipping artifact excluded by patterns");
            report.filtered.push(path.to_string());
        }
        Ok(batch)
    }

    fn deploy(
        &self,
        client: &mut ClientGuard,
        collected: &Collected,
        report: &mut PublishReport,
    ) -> Result<()> {
        for detail in self.deploy_batch(collected, report)? {
            match client.deploy_artifact(detail) {
                Ok(()) => report.deployed.push(detail.artifact_path.clone()),
                Err(e) if self.config.deploy_failure_policy == DeployFailurePolicy::Continue => {
                    warn!(path = %detail.artifact_path, error = %e, "deploy failed; continuing");
                    report.failed.push(DeployFailure {
                        path: detail.artifact_path.clone(),
                        message: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
        info!(
            deployed = report.deployed.len(),
            filtered = report.filtered.len(),
            "artifact deployment finished"
        );
        Ok(())
    }

    /// Returns whether the record was sent.
    fn send_build_info(
        &self,
        client: Option<&mut ClientGuard>,
        build: &AggregatedBuild,
    ) -> Result<bool> {
        if !self.config.publisher.publish_build_info {
            debug!("build info publishing disabled");
            return Ok(false);
        }
        if let Some(path) = &self.config.build.export_file {
            export::save_build_info(build, path)?;
        }
        let Some(client) = client else {
            return Ok(false);
        };
        if build.incremental {
            client.send_module_info(build)?;
        } else {
            client.send_build_and_retention(build, &self.config)?;
        }
        info!(name = %build.name, number = %build.number, incremental = build.incremental, "published build info");
        Ok(true)
    }

    fn export(&self, collected: &Collected, report: &mut PublishReport) -> Result<()> {
        if let Some(path) = &self.config.build.build_info_output {
            export::save_build_info(&collected.build, path)?;
            report.exported.push(path.clone());
        }
        if let Some(path) = &self.config.build.deploy_manifest_output {
            export::save_deploy_manifest(&collected.deploy_details(), path)?;
            report.exported.push(path.clone());
        }
        Ok(())
    }

    fn remove_props_file(&self) {
        let Some(path) = &self.config.props_file else {
            return;
        };
        match crate::io::remove_if_exists(path) {
            Ok(true) => debug!(path = %path.display(), "removed run property file"),
            Ok(false) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove run property file"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
