use crate::build::Properties;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksums {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// One artifact eligible for upload to the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployDetail {
    /// Repository-relative path; filters and deduplication key on this.
    #[serde(rename = "path")]
    pub artifact_path: String,
    #[serde(rename = "targetRepo")]
    pub target_repository: String,
    #[serde(default)]
    pub checksums: Checksums,
    #[serde(default)]
    pub properties: Properties,
    pub file: PathBuf,
}

impl DeployDetail {
    pub fn new(
        artifact_path: impl Into<String>,
        target_repository: impl Into<String>,
        file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            artifact_path: artifact_path.into(),
            target_repository: target_repository.into(),
            checksums: Checksums::default(),
            properties: Properties::new(),
            file: file.into(),
        }
    }

    /// Copy of this detail with `defaults` filled in under its own properties.
    pub fn with_default_properties(&self, defaults: &Properties) -> Self {
        let mut merged = defaults.clone();
        merged.extend(self.properties.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self {
            properties: merged,
            ..self.clone()
        }
    }
}

/// Hex-encoded SHA-256 of a file's content.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn sha256_of_known_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jar");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn detail_properties_win_over_defaults() {
        let mut d = DeployDetail::new("lib/a.jar", "libs-release", "/tmp/a.jar");
        d.properties.insert("team".into(), "core".into());
        let mut defaults = Properties::new();
        defaults.insert("team".into(), "root".into());
        defaults.insert("build.name".into(), "app".into());

        let merged = d.with_default_properties(&defaults);
        assert_eq!(merged.properties["team"], "core");
        assert_eq!(merged.properties["build.name"], "app");
        assert_eq!(merged.artifact_path, "lib/a.jar");
    }

    #[test]
    fn manifest_record_field_names() {
        let d = DeployDetail::new("lib/a.jar", "libs-release", "out/a.jar");
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["path"], "lib/a.jar");
        assert_eq!(json["targetRepo"], "libs-release");
        assert_eq!(json["file"], "out/a.jar");
    }
}
