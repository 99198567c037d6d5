use crate::output::print_json;
use crate::plan::{PlanExtractor, PlanHost, RunPlan};
use anyhow::Context;
use buildinfo_core::config::{PublishConfig, WarnLevel};
use buildinfo_core::coordinator::{PublishReport, RunInfo};
use buildinfo_core::http::HttpClientFactory;
use buildinfo_core::run::{RunContext, UnitOutcome};
use buildinfo_core::unit::UnitId;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub fn run(
    plan_path: &Path,
    config_path: Option<&Path>,
    props_file: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    let plan = RunPlan::load(plan_path)?;
    let mut config = match config_path {
        Some(path) => PublishConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PublishConfig::default(),
    };
    if props_file.is_some() {
        config.props_file = props_file;
    }
    for w in config.validate() {
        if w.level == WarnLevel::Warning {
            warn!("{}", w.message);
        }
    }
    config.ensure_valid()?;

    let base_dir = plan_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let host = PlanHost::new(&plan);
    let extractor = PlanExtractor::new(&plan, base_dir, config.publisher.repo_key.clone());
    let ctx = RunContext::new(
        RunInfo::new(plan.name.as_str()),
        config,
        Box::new(host.provider()),
        Box::new(extractor),
        Box::new(HttpClientFactory),
    );

    let mut published: Option<Box<PublishReport>> = None;
    for unit in &plan.units {
        host.finish(unit);
        let outcome = ctx
            .on_unit_complete(&UnitId::new(unit.id.as_str()))
            .with_context(|| format!("publishing failed after unit {}", unit.id))?;
        match outcome {
            UnitOutcome::Published(report) => published = Some(report),
            UnitOutcome::Pending { remaining } => {
                debug!(unit = %unit.id, remaining, "unit complete")
            }
            UnitOutcome::AlreadyPublished | UnitOutcome::UnknownUnit => {}
        }
    }

    let Some(report) = published else {
        anyhow::bail!("run finished without a last unit; nothing was published");
    };

    if json {
        print_json(&report)?;
        return Ok(());
    }

    println!("Build {} #{}", report.build_name, report.build_number);
    println!(
        "  modules: {}  artifacts: {}  dependencies: {}",
        report.modules, report.artifacts, report.dependencies
    );
    println!(
        "  deployed: {}  filtered: {}  failed: {}",
        report.deployed.len(),
        report.filtered.len(),
        report.failed.len()
    );
    for failure in &report.failed {
        println!("  [failed] {}: {}", failure.path, failure.message);
    }
    println!(
        "  build info: {}",
        if report.published {
            "published"
        } else {
            "not published"
        }
    );
    for path in &report.exported {
        println!("  exported: {}", path.display());
    }
    Ok(())
}
