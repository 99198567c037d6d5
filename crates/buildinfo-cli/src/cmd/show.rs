use crate::output::{print_json, print_table};
use anyhow::Context;
use buildinfo_core::export::load_build_info;
use std::path::Path;

pub fn run(file: &Path, json: bool) -> anyhow::Result<()> {
    let build = load_build_info(file)
        .with_context(|| format!("failed to read build info {}", file.display()))?;

    if json {
        return print_json(&build);
    }

    println!("Build:    {} #{}", build.name, build.number);
    println!("Started:  {}", build.started);
    if let Some(rev) = &build.vcs_revision {
        println!("Revision: {rev}");
    }
    if build.incremental {
        println!("Mode:     incremental");
    }
    println!();

    let rows = build
        .modules
        .iter()
        .map(|m| {
            vec![
                m.id.clone(),
                m.artifacts.len().to_string(),
                m.dependencies.len().to_string(),
            ]
        })
        .collect();
    print_table(&["MODULE", "ARTIFACTS", "DEPENDENCIES"], rows);
    Ok(())
}
