//! Merge per-module fragments and deploy candidates into one snapshot.

use crate::build::{AggregatedBuild, ModuleFragment, Properties};
use crate::config::PublishConfig;
use crate::deploy::DeployDetail;
use crate::error::{BuildInfoError, Result};
use crate::unit::{self, CoordinationUnit, UnitId};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::debug;

pub const BUILD_NAME_PROP: &str = "build.name";
pub const BUILD_NUMBER_PROP: &str = "build.number";
pub const BUILD_TIMESTAMP_PROP: &str = "build.timestamp";

/// Produces what a unit built. Implemented by the build-tool integration.
pub trait ModuleExtractor: Send + Sync {
    /// The unit's module fragment; `None` when the unit produced none.
    fn fragment(&self, unit: &UnitId) -> Result<Option<ModuleFragment>>;

    /// Artifacts the unit wants deployed, in production order.
    fn deploy_details(&self, unit: &UnitId) -> Result<Vec<DeployDetail>>;
}

/// Deploy candidates reported by one unit, in production order. Paths may
/// repeat across units; the deploy step judges each copy by its own unit's
/// patterns before collapsing duplicates.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitDeploys {
    pub unit: UnitId,
    pub details: Vec<DeployDetail>,
}

#[derive(Debug, Clone)]
pub struct Collected {
    pub build: AggregatedBuild,
    pub deploys: Vec<UnitDeploys>,
}

impl Collected {
    /// The union of all units' deploy candidates, deduplicated by path.
    /// The first unit to report a path keeps it.
    pub fn deploy_details(&self) -> Vec<DeployDetail> {
        let mut seen = HashSet::new();
        self.deploys
            .iter()
            .flat_map(|d| d.details.iter())
            .filter(|d| seen.insert(d.artifact_path.as_str()))
            .cloned()
            .collect()
    }
}

pub struct BuildFragmentAggregator<'a> {
    config: &'a PublishConfig,
}

impl<'a> BuildFragmentAggregator<'a> {
    pub fn new(config: &'a PublishConfig) -> Self {
        Self { config }
    }

    /// Walk `graph` in registration order and fold in every unit that did
    /// work. `header` carries the run-level fields; its module list and
    /// properties are filled here.
    ///
    /// A unit that did work but has no fragment fails the whole
    /// aggregation: no partial build records.
    pub fn collect(
        &self,
        mut header: AggregatedBuild,
        started_at: DateTime<Utc>,
        graph: &[UnitId],
        units: &[CoordinationUnit],
        extractor: &dyn ModuleExtractor,
    ) -> Result<Collected> {
        let mut global = self.config.publisher.properties.clone();
        let mut modules = Vec::new();
        let mut deploys = Vec::new();

        let build_props = build_properties(&header, started_at);

        for id in worked_units(graph, units) {
            let mut fragment = extractor
                .fragment(&id)?
                .ok_or_else(|| BuildInfoError::MissingFragment(id.to_string()))?;

            let mut props = self.config.properties_for(&id);
            props.extend(std::mem::take(&mut fragment.properties));
            global.extend(props.iter().map(|(k, v)| (k.clone(), v.clone())));
            fragment.properties = props;

            let mut defaults = build_props.clone();
            defaults.extend(fragment.properties.iter().map(|(k, v)| (k.clone(), v.clone())));

            let details: Vec<DeployDetail> = extractor
                .deploy_details(&id)?
                .iter()
                .map(|d| d.with_default_properties(&defaults))
                .collect();

            debug!(
                unit = %id,
                module = %fragment.id,
                artifacts = fragment.artifacts.len(),
                dependencies = fragment.dependencies.len(),
                deployable = details.len(),
                "collected module fragment"
            );
            modules.push(fragment);
            deploys.push(UnitDeploys { unit: id, details });
        }

        header.modules = modules;
        header.properties = global;
        Ok(Collected {
            build: header,
            deploys,
        })
    }
}

/// Units of `graph` that did work, in registration order.
pub fn worked_units(graph: &[UnitId], units: &[CoordinationUnit]) -> Vec<UnitId> {
    graph
        .iter()
        .filter(|id| unit::find(units, id).is_some_and(|u| u.did_work))
        .cloned()
        .collect()
}

fn build_properties(header: &AggregatedBuild, started_at: DateTime<Utc>) -> Properties {
    let mut props = Properties::new();
    props.insert(BUILD_NAME_PROP.to_string(), header.name.clone());
    props.insert(BUILD_NUMBER_PROP.to_string(), header.number.clone());
    props.insert(
        BUILD_TIMESTAMP_PROP.to_string(),
        started_at.timestamp_millis().to_string(),
    );
    props
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::Artifact;
    use crate::config::ModuleOverride;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapExtractor {
        fragments: HashMap<String, ModuleFragment>,
        details: HashMap<String, Vec<DeployDetail>>,
    }

    impl MapExtractor {
        fn with(mut self, unit: &str, artifacts: &[&str]) -> Self {
            let mut fragment = ModuleFragment::new(unit.trim_start_matches(':'));
            fragment.artifacts = artifacts.iter().map(|a| Artifact::new(*a)).collect();
            self.fragments.insert(unit.to_string(), fragment);
            self.details.insert(
                unit.to_string(),
                artifacts
                    .iter()
                    .map(|a| DeployDetail::new(*a, "libs", format!("/out/{a}")))
                    .collect(),
            );
            self
        }
    }

    impl ModuleExtractor for MapExtractor {
        fn fragment(&self, unit: &UnitId) -> Result<Option<ModuleFragment>> {
            Ok(self.fragments.get(unit.as_str()).cloned())
        }

        fn deploy_details(&self, unit: &UnitId) -> Result<Vec<DeployDetail>> {
            Ok(self.details.get(unit.as_str()).cloned().unwrap_or_default())
        }
    }

    fn unit(id: &str, did_work: bool) -> CoordinationUnit {
        CoordinationUnit {
            id: UnitId::new(id),
            did_work,
            executed: true,
        }
    }

    fn graph_of(units: &[CoordinationUnit]) -> Vec<UnitId> {
        units.iter().map(|u| u.id.clone()).collect()
    }

    fn header() -> AggregatedBuild {
        AggregatedBuild::new("app", "7", "2024-01-01T00:00:00.000+0000")
    }

    #[test]
    fn skipped_unit_contributes_nothing() {
        let units = vec![unit(":a", true), unit(":b", false), unit(":c", true)];
        let extractor = MapExtractor::default()
            .with(":a", &["a.jar"])
            .with(":b", &["b.jar"])
            .with(":c", &["c.jar"]);
        let config = PublishConfig::default();
        let collected = BuildFragmentAggregator::new(&config)
            .collect(header(), Utc::now(), &graph_of(&units), &units, &extractor)
            .unwrap();

        let ids: Vec<&str> = collected.build.modules.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        let paths: Vec<String> = collected
            .deploy_details()
            .into_iter()
            .map(|d| d.artifact_path)
            .collect();
        assert_eq!(paths, vec!["a.jar", "c.jar"]);
    }

    #[test]
    fn registration_order_not_extractor_order() {
        let units = vec![unit(":z", true), unit(":a", true)];
        let extractor = MapExtractor::default()
            .with(":a", &["a.jar"])
            .with(":z", &["z.jar"]);
        let config = PublishConfig::default();
        let collected = BuildFragmentAggregator::new(&config)
            .collect(header(), Utc::now(), &graph_of(&units), &units, &extractor)
            .unwrap();
        assert_eq!(collected.build.modules[0].id, "z");
        assert_eq!(collected.build.modules[1].id, "a");
    }

    #[test]
    fn repeated_collection_is_byte_identical() {
        let units = vec![unit(":a", true), unit(":b", true)];
        let extractor = MapExtractor::default()
            .with(":a", &["a.jar", "a.pom"])
            .with(":b", &["b.jar"]);
        let config = PublishConfig::default();
        let started = Utc::now();
        let agg = BuildFragmentAggregator::new(&config);
        let one = agg
            .collect(header(), started, &graph_of(&units), &units, &extractor)
            .unwrap();
        let two = agg
            .collect(header(), started, &graph_of(&units), &units, &extractor)
            .unwrap();
        assert_eq!(
            one.build.to_json_string().unwrap(),
            two.build.to_json_string().unwrap()
        );
    }

    #[test]
    fn duplicate_paths_collapse_to_first_unit() {
        let units = vec![unit(":a", true), unit(":b", true)];
        let extractor = MapExtractor::default()
            .with(":a", &["shared.jar", "a.jar"])
            .with(":b", &["shared.jar", "b.jar"]);
        let config = PublishConfig::default();
        let collected = BuildFragmentAggregator::new(&config)
            .collect(header(), Utc::now(), &graph_of(&units), &units, &extractor)
            .unwrap();

        // each unit keeps its own copy until the deploy step filters
        assert_eq!(collected.deploys[1].details.len(), 2);
        let union = collected.deploy_details();
        let paths: Vec<&str> = union.iter().map(|d| d.artifact_path.as_str()).collect();
        assert_eq!(paths, vec!["shared.jar", "a.jar", "b.jar"]);
        // module records keep their own artifact lists
        assert_eq!(collected.build.modules[1].artifacts.len(), 2);
    }

    #[test]
    fn missing_fragment_fails_whole_aggregation() {
        let units = vec![unit(":a", true), unit(":ghost", true)];
        let extractor = MapExtractor::default().with(":a", &["a.jar"]);
        let config = PublishConfig::default();
        let err = BuildFragmentAggregator::new(&config)
            .collect(header(), Utc::now(), &graph_of(&units), &units, &extractor)
            .unwrap_err();
        assert!(matches!(err, BuildInfoError::MissingFragment(ref id) if id == ":ghost"));
    }

    #[test]
    fn module_properties_override_root() {
        let units = vec![unit(":a", true), unit(":b", true)];
        let mut extractor = MapExtractor::default()
            .with(":a", &["a.jar"])
            .with(":b", &["b.jar"]);
        extractor
            .fragments
            .get_mut(":b")
            .unwrap()
            .properties
            .insert("owner".into(), "fragment-b".into());

        let mut config = PublishConfig::default();
        config.publisher.properties.insert("owner".into(), "root".into());
        config.publisher.properties.insert("env".into(), "ci".into());
        config.modules.insert(
            ":a".into(),
            ModuleOverride {
                properties: [("owner".to_string(), "module-a".to_string())].into(),
                ..Default::default()
            },
        );

        let collected = BuildFragmentAggregator::new(&config)
            .collect(header(), Utc::now(), &graph_of(&units), &units, &extractor)
            .unwrap();
        let build = &collected.build;
        assert_eq!(build.module("a").unwrap().properties["owner"], "module-a");
        assert_eq!(build.module("b").unwrap().properties["owner"], "fragment-b");
        assert_eq!(build.module("a").unwrap().properties["env"], "ci");
        // later modules win in the global map
        assert_eq!(build.properties["owner"], "fragment-b");
        assert_eq!(build.properties["env"], "ci");

        let a_detail = &collected.deploys[0].details[0];
        assert_eq!(a_detail.properties["owner"], "module-a");
        assert_eq!(a_detail.properties[BUILD_NAME_PROP], "app");
        assert_eq!(a_detail.properties[BUILD_NUMBER_PROP], "7");
    }

    #[test]
    fn unit_absent_from_snapshot_is_not_worked() {
        let units = vec![unit(":a", true)];
        let graph = vec![UnitId::new(":a"), UnitId::new(":b")];
        assert_eq!(worked_units(&graph, &units), vec![UnitId::new(":a")]);
    }
}
