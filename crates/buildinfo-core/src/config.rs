use crate::build::{Agent, Properties};
use crate::error::{BuildInfoError, Result};
use crate::filter::IncludeExcludePatterns;
use crate::unit::UnitId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// PublisherConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Target repository for artifacts that do not name one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_key: Option<String>,
    #[serde(default)]
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default = "default_true")]
    pub publish_artifacts: bool,
    #[serde(default = "default_true")]
    pub publish_build_info: bool,
    /// Root properties, attached to every module and deployed artifact.
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub properties: Properties,
}

fn default_true() -> bool {
    true
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            context_url: None,
            username: None,
            password: None,
            repo_key: None,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            publish_artifacts: true,
            publish_build_info: true,
            properties: Properties::new(),
        }
    }
}

/// Resolved address and credentials of the artifact repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryEndpoint {
    pub context_url: String,
    pub username: String,
    pub password: String,
}

// ---------------------------------------------------------------------------
// ProxyConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ProxyConfig {
    /// A proxy is used only when both a non-blank host and a port are set.
    pub fn is_configured(&self) -> bool {
        !is_blank(self.host.as_deref()) && self.port.is_some()
    }

    pub fn has_credentials(&self) -> bool {
        !is_blank(self.username.as_deref())
    }
}

// ---------------------------------------------------------------------------
// RetentionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_builds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_days: Option<u32>,
    #[serde(default)]
    pub delete_build_artifacts: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_builds: Vec<String>,
    #[serde(default, rename = "async")]
    pub async_delete: bool,
}

impl RetentionConfig {
    pub fn is_enabled(&self) -> bool {
        self.max_builds.is_some() || self.max_days.is_some()
    }
}

// ---------------------------------------------------------------------------
// BuildInfoConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildInfoConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<Agent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcs_revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcs_url: Option<String>,
    /// Push module-by-module instead of one final record.
    #[serde(default)]
    pub incremental: bool,
    /// Saved right before the record is sent to the repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_info_output: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_manifest_output: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<RetentionConfig>,
}

// ---------------------------------------------------------------------------
// ModuleOverride
// ---------------------------------------------------------------------------

/// Publisher settings that apply to a single unit instead of the root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_patterns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_patterns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_artifacts: Option<bool>,
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub properties: Properties,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployFailurePolicy {
    /// First failed upload aborts the run.
    #[default]
    Abort,
    /// Record the failure and keep deploying the rest.
    Continue,
}

// ---------------------------------------------------------------------------
// PublishConfig (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default)]
    pub publisher: PublisherConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_retries: Option<u32>,
    #[serde(default)]
    pub build: BuildInfoConfig,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub modules: BTreeMap<String, ModuleOverride>,
    #[serde(default)]
    pub deploy_failure_policy: DeployFailurePolicy,
    /// Run-scoped property file removed once the run has published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props_file: Option<PathBuf>,
}

impl PublishConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&data)
    }

    pub fn from_yaml_str(data: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(data)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    /// The repository endpoint, or `None` when no context URL is set, which
    /// means network publishing is disabled for the run.
    pub fn endpoint(&self) -> Option<RepositoryEndpoint> {
        let url = self.publisher.context_url.as_deref()?.trim();
        if url.is_empty() {
            return None;
        }
        Some(RepositoryEndpoint {
            context_url: url.trim_end_matches('/').to_string(),
            username: non_blank(self.publisher.username.as_deref()),
            password: non_blank(self.publisher.password.as_deref()),
        })
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn patterns_for(&self, unit: &UnitId) -> IncludeExcludePatterns {
        let module = self.modules.get(unit.as_str());
        let include = module
            .and_then(|m| m.include_patterns.as_ref())
            .unwrap_or(&self.publisher.include_patterns);
        let exclude = module
            .and_then(|m| m.exclude_patterns.as_ref())
            .unwrap_or(&self.publisher.exclude_patterns);
        IncludeExcludePatterns::from_lists(include, exclude)
    }

    /// Root properties overridden by the unit's own properties.
    pub fn properties_for(&self, unit: &UnitId) -> Properties {
        let mut props = self.publisher.properties.clone();
        if let Some(module) = self.modules.get(unit.as_str()) {
            props.extend(module.properties.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        props
    }

    pub fn publish_artifacts_for(&self, unit: &UnitId) -> bool {
        self.modules
            .get(unit.as_str())
            .and_then(|m| m.publish_artifacts)
            .unwrap_or(self.publisher.publish_artifacts)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.endpoint().is_none()
            && (self.publisher.publish_artifacts || self.publisher.publish_build_info)
        {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "publisher.context_url is not set: deploy and publish will be skipped"
                    .to_string(),
            });
        }

        if self.endpoint().is_none() && !is_blank(self.publisher.username.as_deref()) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "publisher.username is set but publisher.context_url is not".to_string(),
            });
        }

        if self.endpoint().is_some()
            && self.publisher.publish_artifacts
            && is_blank(self.publisher.repo_key.as_deref())
        {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "publisher.repo_key is not set: artifacts must name their own target repository"
                    .to_string(),
            });
        }

        if self.proxy.host.is_some() && self.proxy.port.is_none() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "proxy.host is set without proxy.port".to_string(),
            });
        }

        if let Some(retries) = self.connection_retries {
            if retries > 10 {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("connection_retries={retries} (>10 is unusual)"),
                });
            }
        }

        if self.timeout_secs == Some(0) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "timeout_secs must be greater than zero".to_string(),
            });
        }

        if self.build.incremental && !self.publisher.publish_build_info {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "build.incremental has no effect while publish_build_info is false"
                    .to_string(),
            });
        }

        if let Some(retention) = &self.build.retention {
            if retention.max_builds == Some(0) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: "build.retention.max_builds must be greater than zero".to_string(),
                });
            }
            if self.build.incremental && retention.is_enabled() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: "build.retention is ignored for incremental publishing".to_string(),
                });
            }
        }

        let all_patterns = self
            .publisher
            .include_patterns
            .iter()
            .chain(&self.publisher.exclude_patterns)
            .map(|p| ("publisher".to_string(), p))
            .chain(self.modules.iter().flat_map(|(unit, m)| {
                m.include_patterns
                    .iter()
                    .chain(m.exclude_patterns.iter())
                    .flatten()
                    .map(move |p| (format!("modules.{unit}"), p))
            }));
        for (scope, pattern) in all_patterns {
            if pattern.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("{scope} has an empty include/exclude pattern"),
                });
            }
        }

        warnings
    }

    /// Fail on the first `Error`-level warning.
    pub fn ensure_valid(&self) -> Result<()> {
        match self.validate().into_iter().find(|w| w.level == WarnLevel::Error) {
            Some(w) => Err(BuildInfoError::Config(w.message)),
            None => Ok(()),
        }
    }
}

fn is_blank(s: Option<&str>) -> bool {
    s.map(|s| s.trim().is_empty()).unwrap_or(true)
}

fn non_blank(s: Option<&str>) -> String {
    if is_blank(s) {
        String::new()
    } else {
        s.unwrap_or_default().to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
