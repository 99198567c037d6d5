use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type Properties = BTreeMap<String, String>;

/// Default schema version stamped on every build record.
pub const BUILD_INFO_VERSION: &str = "1.0.1";

/// Timestamp layout of `AggregatedBuild::started`.
pub const STARTED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

pub fn format_started(ts: DateTime<Utc>) -> String {
    ts.format(STARTED_FORMAT).to_string()
}

// ---------------------------------------------------------------------------
// Module records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Artifact {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            artifact_type: None,
            sha1: None,
            sha256: None,
            md5: None,
            path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub id: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub dependency_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    /// Chains of module ids through which this dependency is pulled in.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_by: Vec<Vec<String>>,
}

impl Dependency {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            dependency_type: None,
            scopes: Vec::new(),
            sha1: None,
            sha256: None,
            md5: None,
            required_by: Vec::new(),
        }
    }
}

/// One module's contribution to the build record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleFragment {
    pub id: String,
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub properties: Properties,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

impl ModuleFragment {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            properties: Properties::new(),
            dependencies: Vec::new(),
            artifacts: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// AggregatedBuild
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub name: String,
    pub version: String,
}

/// The run-wide build record assembled once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedBuild {
    #[serde(default = "default_version")]
    pub version: String,
    pub name: String,
    pub number: String,
    pub started: String,
    #[serde(default)]
    pub duration_millis: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<Agent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcs_revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcs_url: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub incremental: bool,
    #[serde(default)]
    pub modules: Vec<ModuleFragment>,
}

fn default_version() -> String {
    BUILD_INFO_VERSION.to_string()
}

impl AggregatedBuild {
    pub fn new(
        name: impl Into<String>,
        number: impl Into<String>,
        started: impl Into<String>,
    ) -> Self {
        Self {
            version: default_version(),
            name: name.into(),
            number: number.into(),
            started: started.into(),
            duration_millis: 0,
            agent: None,
            url: None,
            principal: None,
            properties: Properties::new(),
            vcs_revision: None,
            vcs_url: None,
            incremental: false,
            modules: Vec::new(),
        }
    }

    pub fn module(&self, id: &str) -> Option<&ModuleFragment> {
        self.modules.iter().find(|m| m.id == id)
    }

    pub fn artifact_count(&self) -> usize {
        self.modules.iter().map(|m| m.artifacts.len()).sum()
    }

    pub fn dependency_count(&self) -> usize {
        self.modules.iter().map(|m| m.dependencies.len()).sum()
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json_str(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
