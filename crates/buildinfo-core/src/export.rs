use crate::build::AggregatedBuild;
use crate::deploy::DeployDetail;
use crate::error::{BuildInfoError, Result};
use crate::io::atomic_write;
use std::path::Path;
use tracing::info;

/// Write the build record as pretty JSON.
pub fn save_build_info(build: &AggregatedBuild, path: &Path) -> Result<()> {
    let write = || -> Result<()> {
        let data = build.to_json_string()?;
        atomic_write(path, data.as_bytes())
    };
    write().map_err(|e| BuildInfoError::export(path, e))?;
    info!(path = %path.display(), modules = build.modules.len(), "exported build info");
    Ok(())
}

pub fn load_build_info(path: &Path) -> Result<AggregatedBuild> {
    let data = std::fs::read_to_string(path)?;
    AggregatedBuild::from_json_str(&data)
}

/// Write the deploy set as a JSON array, one record per artifact.
pub fn save_deploy_manifest(details: &[DeployDetail], path: &Path) -> Result<()> {
    let write = || -> Result<()> {
        let data = serde_json::to_string_pretty(details)?;
        atomic_write(path, data.as_bytes())
    };
    write().map_err(|e| BuildInfoError::export(path, e))?;
    info!(path = %path.display(), artifacts = details.len(), "exported deploy manifest");
    Ok(())
}

pub fn load_deploy_manifest(path: &Path) -> Result<Vec<DeployDetail>> {
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{Dependency, ModuleFragment};
    use tempfile::TempDir;

    #[test]
    fn build_info_roundtrip_keeps_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/build-info.json");

        let mut build = AggregatedBuild::new("app", "1", "2024-01-01T00:00:00.000+0000");
        for id in ["z", "a", "m"] {
            let mut module = ModuleFragment::new(id);
            let mut dep = Dependency::new(format!("org:{id}-dep:1"));
            dep.required_by = vec![vec![id.to_string(), "root".to_string()]];
            module.dependencies.push(dep);
            build.modules.push(module);
        }
        save_build_info(&build, &path).unwrap();

        let loaded = load_build_info(&path).unwrap();
        assert_eq!(loaded, build);
        let ids: Vec<&str> = loaded.modules.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "a", "m"]);
    }

    #[test]
    fn manifest_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deployed.json");
        let mut detail = DeployDetail::new("org/app.jar", "libs", "build/app.jar");
        detail.checksums.sha256 = Some("ff".into());
        save_deploy_manifest(std::slice::from_ref(&detail), &path).unwrap();
        assert_eq!(load_deploy_manifest(&path).unwrap(), vec![detail]);
    }

    #[test]
    fn unwritable_target_is_export_error() {
        let dir = TempDir::new().unwrap();
        // a regular file where a parent directory is expected
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let path = blocker.join("build-info.json");

        let build = AggregatedBuild::new("app", "1", "x");
        let err = save_build_info(&build, &path).unwrap_err();
        assert!(matches!(err, BuildInfoError::Export { ref path, .. } if path.ends_with("build-info.json")));
    }
}
