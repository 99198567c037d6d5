#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn buildinfo(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("buildinfo").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("BUILDINFO_CONFIG")
        .env_remove("BUILDINFO_PROPFILE");
    cmd
}

const PLAN: &str = r#"
name: shop
units:
  - id: ":api"
    module:
      id: "com.shop:api:1.0"
      dependencies:
        - id: "org.slf4j:slf4j-api:2.0.9"
          scopes: [compile]
    artifacts:
      - file: out/api.jar
        path: com/shop/api/1.0/api-1.0.jar
      - file: out/api.pom
        path: com/shop/api/1.0/api-1.0.pom
  - id: ":docs"
    did_work: false
  - id: ":web"
    module:
      id: "com.shop:web:1.0"
    artifacts:
      - file: out/web.war
        path: com/shop/web/1.0/web-1.0.war
"#;

const OFFLINE_CONFIG: &str = r#"
build:
  name: shop-ci
  number: "17"
  build_info_output: exports/build-info.json
  deploy_manifest_output: exports/deployed.json
"#;

fn setup(dir: &TempDir) {
    let out = dir.path().join("out");
    std::fs::create_dir_all(&out).unwrap();
    for name in ["api.jar", "api.pom", "web.war"] {
        std::fs::write(out.join(name), name.as_bytes()).unwrap();
    }
    std::fs::write(dir.path().join("run.yaml"), PLAN).unwrap();
    std::fs::write(dir.path().join("publish.yaml"), OFFLINE_CONFIG).unwrap();
}

// ---------------------------------------------------------------------------
// buildinfo publish
// ---------------------------------------------------------------------------

#[test]
fn publish_exports_aggregated_build() {
    let dir = TempDir::new().unwrap();
    setup(&dir);

    buildinfo(&dir)
        .args(["publish", "--plan", "run.yaml", "--config", "publish.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Build shop-ci #17"))
        .stdout(predicate::str::contains("modules: 2"))
        .stdout(predicate::str::contains("not published"));

    let data = std::fs::read_to_string(dir.path().join("exports/build-info.json")).unwrap();
    let build: serde_json::Value = serde_json::from_str(&data).unwrap();
    assert_eq!(build["name"], "shop-ci");
    let modules = build["modules"].as_array().unwrap();
    assert_eq!(modules.len(), 2);
    assert_eq!(modules[0]["id"], "com.shop:api:1.0");
    assert_eq!(modules[1]["id"], "com.shop:web:1.0");

    let manifest = std::fs::read_to_string(dir.path().join("exports/deployed.json")).unwrap();
    let manifest: serde_json::Value = serde_json::from_str(&manifest).unwrap();
    assert_eq!(manifest.as_array().unwrap().len(), 3);
    assert_eq!(manifest[0]["path"], "com/shop/api/1.0/api-1.0.jar");
}

#[test]
fn publish_json_report() {
    let dir = TempDir::new().unwrap();
    setup(&dir);

    let output = buildinfo(&dir)
        .args(["publish", "--plan", "run.yaml", "--config", "publish.yaml", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["build_name"], "shop-ci");
    assert_eq!(report["modules"], 2);
    assert_eq!(report["artifacts"], 3);
    assert_eq!(report["published"], false);
}

#[test]
fn publish_defaults_name_to_plan_root() {
    let dir = TempDir::new().unwrap();
    setup(&dir);

    buildinfo(&dir)
        .args(["publish", "--plan", "run.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Build shop #"));
}

#[test]
fn publish_removes_props_file_from_env() {
    let dir = TempDir::new().unwrap();
    setup(&dir);
    let props = dir.path().join("buildinfo.properties");
    std::fs::write(&props, "buildInfo.build.name=shop\n").unwrap();

    buildinfo(&dir)
        .env("BUILDINFO_PROPFILE", &props)
        .args(["publish", "--plan", "run.yaml", "--config", "publish.yaml"])
        .assert()
        .success();
    assert!(!props.exists());
}

#[test]
fn publish_fails_when_worked_unit_has_no_module() {
    let dir = TempDir::new().unwrap();
    setup(&dir);
    std::fs::write(
        dir.path().join("broken.yaml"),
        "name: shop\nunits:\n  - id: \":ghost\"\n",
    )
    .unwrap();

    buildinfo(&dir)
        .args(["publish", "--plan", "broken.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("produced no module fragment"));
}

#[test]
fn publish_missing_plan_fails() {
    let dir = TempDir::new().unwrap();
    buildinfo(&dir)
        .args(["publish", "--plan", "nope.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read run plan"));
}

// ---------------------------------------------------------------------------
// buildinfo validate
// ---------------------------------------------------------------------------

#[test]
fn validate_reports_warnings() {
    let dir = TempDir::new().unwrap();
    setup(&dir);

    buildinfo(&dir)
        .args(["validate", "--config", "publish.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[warning]"))
        .stdout(predicate::str::contains("context_url"));
}

#[test]
fn validate_clean_config() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("publish.yaml"),
        "publisher:\n  context_url: http://localhost:8081/artifactory\n  repo_key: libs-release\n",
    )
    .unwrap();

    buildinfo(&dir)
        .args(["validate", "--config", "publish.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn validate_fails_on_errors() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("publish.yaml"),
        "proxy:\n  host: proxy.local\n",
    )
    .unwrap();

    buildinfo(&dir)
        .args(["validate", "--config", "publish.yaml"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error] proxy.host is set without proxy.port"))
        .stderr(predicate::str::contains("config validation found errors"));
}

#[test]
fn publish_refuses_invalid_config() {
    let dir = TempDir::new().unwrap();
    setup(&dir);
    std::fs::write(dir.path().join("bad.yaml"), "timeout_secs: 0\n").unwrap();

    buildinfo(&dir)
        .args(["publish", "--plan", "run.yaml", "--config", "bad.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("timeout_secs"));
    assert!(!dir.path().join("exports").exists());
}

// ---------------------------------------------------------------------------
// buildinfo show
// ---------------------------------------------------------------------------

#[test]
fn show_prints_module_table() {
    let dir = TempDir::new().unwrap();
    setup(&dir);
    buildinfo(&dir)
        .args(["publish", "--plan", "run.yaml", "--config", "publish.yaml"])
        .assert()
        .success();

    buildinfo(&dir)
        .args(["show", "exports/build-info.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Build:    shop-ci #17"))
        .stdout(predicate::str::contains("MODULE"))
        .stdout(predicate::str::contains("com.shop:web:1.0"));
}

#[test]
fn show_rejects_garbage() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("x.json"), "not json").unwrap();
    buildinfo(&dir)
        .args(["show", "x.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read build info"));
}
