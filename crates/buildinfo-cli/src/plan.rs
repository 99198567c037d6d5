//! File-driven host: a run plan stands in for the build engine.
//!
//! The plan lists the run's units in execution order together with the
//! module record and artifact files each one produced. Artifact files are
//! resolved relative to the plan's directory.

use anyhow::Context;
use buildinfo_core::aggregator::ModuleExtractor;
use buildinfo_core::build::{Artifact, Dependency, ModuleFragment, Properties};
use buildinfo_core::deploy::{sha256_file, Checksums, DeployDetail};
use buildinfo_core::unit::{CoordinationUnit, TaskGraphProvider, UnitId};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Deserialize)]
pub struct RunPlan {
    /// Root project name, the default build name.
    pub name: String,
    #[serde(default)]
    pub units: Vec<PlanUnit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlanUnit {
    pub id: String,
    /// False for units the engine skipped or found up to date.
    #[serde(default = "default_true")]
    pub did_work: bool,
    #[serde(default)]
    pub module: Option<PlanModule>,
    #[serde(default)]
    pub artifacts: Vec<PlanArtifact>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlanModule {
    pub id: String,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlanArtifact {
    pub file: PathBuf,
    /// Repository-relative deploy path.
    pub path: String,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default, rename = "type")]
    pub artifact_type: Option<String>,
    #[serde(default)]
    pub properties: Properties,
}

fn default_true() -> bool {
    true
}

impl RunPlan {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read run plan {}", path.display()))?;
        let plan: Self = serde_yaml::from_str(&data)
            .with_context(|| format!("invalid run plan {}", path.display()))?;
        if plan.units.is_empty() {
            anyhow::bail!("run plan {} has no units", path.display());
        }
        Ok(plan)
    }
}

// ---------------------------------------------------------------------------
// Host state
// ---------------------------------------------------------------------------

/// Unit states as the engine would report them, shared with the provider.
#[derive(Clone)]
pub struct PlanHost {
    units: Arc<Mutex<Vec<CoordinationUnit>>>,
}

impl PlanHost {
    pub fn new(plan: &RunPlan) -> Self {
        let units = plan
            .units
            .iter()
            .map(|u| CoordinationUnit::pending(u.id.as_str()))
            .collect();
        Self {
            units: Arc::new(Mutex::new(units)),
        }
    }

    fn lock(units: &Mutex<Vec<CoordinationUnit>>) -> MutexGuard<'_, Vec<CoordinationUnit>> {
        units.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn provider(&self) -> impl TaskGraphProvider + 'static {
        let units = self.units.clone();
        move || Self::lock(&units).clone()
    }

    /// Move a unit to its terminal state.
    pub fn finish(&self, unit: &PlanUnit) {
        let mut units = Self::lock(&self.units);
        if let Some(u) = units.iter_mut().find(|u| u.id.as_str() == unit.id) {
            u.executed = true;
            u.did_work = unit.did_work;
        }
    }
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

pub struct PlanExtractor {
    units: HashMap<UnitId, PlanUnit>,
    base_dir: PathBuf,
    repo_key: Option<String>,
}

impl PlanExtractor {
    pub fn new(plan: &RunPlan, base_dir: &Path, repo_key: Option<String>) -> Self {
        Self {
            units: plan
                .units
                .iter()
                .map(|u| (UnitId::new(u.id.as_str()), u.clone()))
                .collect(),
            base_dir: base_dir.to_path_buf(),
            repo_key,
        }
    }

    fn resolve(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.base_dir.join(file)
        }
    }
}

impl ModuleExtractor for PlanExtractor {
    fn fragment(&self, unit: &UnitId) -> buildinfo_core::Result<Option<ModuleFragment>> {
        let Some(plan_unit) = self.units.get(unit) else {
            return Ok(None);
        };
        let Some(module) = &plan_unit.module else {
            return Ok(None);
        };

        let mut fragment = ModuleFragment::new(module.id.as_str());
        fragment.properties = module.properties.clone();
        fragment.dependencies = module.dependencies.clone();
        for a in &plan_unit.artifacts {
            let file = self.resolve(&a.file);
            let mut artifact = Artifact::new(
                file.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| a.path.clone()),
            );
            artifact.artifact_type = a.artifact_type.clone();
            artifact.sha256 = Some(sha256_file(&file)?);
            artifact.path = Some(a.path.clone());
            fragment.artifacts.push(artifact);
        }
        Ok(Some(fragment))
    }

    fn deploy_details(&self, unit: &UnitId) -> buildinfo_core::Result<Vec<DeployDetail>> {
        let Some(plan_unit) = self.units.get(unit) else {
            return Ok(Vec::new());
        };
        plan_unit
            .artifacts
            .iter()
            .map(|a| {
                let file = self.resolve(&a.file);
                let repo = a
                    .repo
                    .clone()
                    .or_else(|| self.repo_key.clone())
                    .unwrap_or_default();
                Ok(DeployDetail {
                    artifact_path: a.path.clone(),
                    target_repository: repo,
                    checksums: Checksums {
                        sha256: Some(sha256_file(&file)?),
                        ..Default::default()
                    },
                    properties: a.properties.clone(),
                    file,
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PLAN: &str = r#"
name: shop
units:
  - id: ":api"
    module:
      id: "com.shop:api:1.0"
      dependencies:
        - id: "org.slf4j:slf4j-api:2.0.9"
          scopes: [compile]
          requiredBy: [["com.shop:api:1.0"]]
    artifacts:
      - file: api.jar
        path: com/shop/api/1.0/api-1.0.jar
        type: jar
  - id: ":docs"
    did_work: false
"#;

    fn write_plan(dir: &TempDir) -> RunPlan {
        std::fs::write(dir.path().join("api.jar"), b"abc").unwrap();
        let path = dir.path().join("run.yaml");
        std::fs::write(&path, PLAN).unwrap();
        RunPlan::load(&path).unwrap()
    }

    #[test]
    fn plan_parses_with_defaults() {
        let dir = TempDir::new().unwrap();
        let plan = write_plan(&dir);
        assert_eq!(plan.name, "shop");
        assert!(plan.units[0].did_work);
        assert!(!plan.units[1].did_work);
        assert!(plan.units[1].module.is_none());
    }

    #[test]
    fn extractor_reads_files_relative_to_plan() {
        let dir = TempDir::new().unwrap();
        let plan = write_plan(&dir);
        let extractor = PlanExtractor::new(&plan, dir.path(), Some("libs-release".into()));
        let unit = UnitId::new(":api");

        let fragment = extractor.fragment(&unit).unwrap().unwrap();
        assert_eq!(fragment.id, "com.shop:api:1.0");
        assert_eq!(fragment.artifacts[0].name, "api.jar");
        assert_eq!(
            fragment.artifacts[0].sha256.as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
        assert_eq!(fragment.dependencies[0].required_by, vec![vec!["com.shop:api:1.0".to_string()]]);

        let details = extractor.deploy_details(&unit).unwrap();
        assert_eq!(details[0].target_repository, "libs-release");
        assert_eq!(details[0].file, dir.path().join("api.jar"));
    }

    #[test]
    fn unit_without_module_has_no_fragment() {
        let dir = TempDir::new().unwrap();
        let plan = write_plan(&dir);
        let extractor = PlanExtractor::new(&plan, dir.path(), None);
        assert!(extractor.fragment(&UnitId::new(":docs")).unwrap().is_none());
        assert!(extractor.deploy_details(&UnitId::new(":docs")).unwrap().is_empty());
    }

    #[test]
    fn host_reports_finished_units() {
        let dir = TempDir::new().unwrap();
        let plan = write_plan(&dir);
        let host = PlanHost::new(&plan);
        let provider = host.provider();
        assert!(provider.units().iter().all(|u| !u.executed));

        host.finish(&plan.units[1]);
        let units = provider.units();
        assert!(units[1].executed);
        assert!(!units[1].did_work);
        assert!(!units[0].executed);
    }

    #[test]
    fn empty_plan_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.yaml");
        std::fs::write(&path, "name: x\nunits: []\n").unwrap();
        let err = RunPlan::load(&path).unwrap_err();
        assert!(err.to_string().contains("no units"));
    }
}
