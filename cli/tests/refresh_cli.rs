use serde_json::Value;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};

const ARTIFACTS: [&str; 5] = [
    "metadata.json",
    "trends.json",
    "seasonality.json",
    "spatial.json",
    "forecasting.json",
];

fn refresh() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_refresh"));
    command.env_remove("REFRESH_OUTPUT_DIR").env_remove("RUST_LOG");
    command
}

fn write_dataset(dir: &Path, columns: &[&str], rows: Value) -> std::path::PathBuf {
    let path = dir.join("incidents.json");
    let document = serde_json::json!({ "columns": columns, "rows": rows });
    fs::write(&path, document.to_string()).expect("write dataset");
    path
}

fn one_day_rows() -> Value {
    serde_json::json!([
        { "date": "2024-06-01T01:15:00", "primary_type": "THEFT", "latitude": 41.88, "longitude": -87.63 },
        { "date": "2024-06-01 12:00:00", "primary_type": "THEFT", "latitude": 41.881, "longitude": -87.631 },
        { "date": "2024-06-01", "primary_type": "ASSAULT", "latitude": null, "longitude": null }
    ])
}

fn exit_code(output: &Output) -> i32 {
    output.status.code().expect("process exited normally")
}

#[test]
fn degraded_run_succeeds_with_single_forecasting_warning() {
    let workdir = tempfile::tempdir().expect("tempdir");
    let output_dir = workdir.path().join("out");
    let dataset = write_dataset(
        workdir.path(),
        &["date", "primary_type", "latitude", "longitude"],
        one_day_rows(),
    );

    let output = refresh()
        .args(["run", "--json", "--dataset"])
        .arg(&dataset)
        .arg("--output-dir")
        .arg(&output_dir)
        .args(["--disable", "spatial", "--disable", "forecasting", "--disable", "importance"])
        .output()
        .expect("run refresh");
    assert_eq!(
        exit_code(&output),
        0,
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let report: Value = serde_json::from_slice(&output.stdout).expect("json report");
    assert_eq!(report["status"], "succeeded");
    let warnings = report["warnings"].as_array().expect("warnings");
    let forecasting = warnings
        .iter()
        .filter(|warning| warning["task"] == "forecasting")
        .count();
    assert_eq!(forecasting, 1);
    assert_eq!(report["artifacts"].as_array().expect("artifacts").len(), 5);

    for name in ARTIFACTS {
        assert!(output_dir.join(name).exists(), "{name} not written");
    }
    let forecast: Value =
        serde_json::from_str(&fs::read_to_string(output_dir.join("forecasting.json")).expect("read"))
            .expect("forecast json");
    assert_eq!(forecast["model"]["degraded"], true);
    assert_eq!(
        forecast["model"]["feature_importances"]
            .as_array()
            .expect("importances")
            .len(),
        5
    );
}

#[test]
fn missing_timestamp_column_is_fatal() {
    let workdir = tempfile::tempdir().expect("tempdir");
    let output_dir = workdir.path().join("out");
    let dataset = write_dataset(
        workdir.path(),
        &["primary_type", "latitude", "longitude"],
        serde_json::json!([]),
    );

    let output = refresh()
        .args(["run", "--dataset"])
        .arg(&dataset)
        .arg("--output-dir")
        .arg(&output_dir)
        .output()
        .expect("run refresh");
    assert_eq!(exit_code(&output), 3);
    assert!(String::from_utf8_lossy(&output.stdout).contains("date"));
    for name in ARTIFACTS {
        assert!(!output_dir.join(name).exists(), "{name} should not exist");
    }
}

#[test]
fn validate_reports_broken_artifact() {
    let workdir = tempfile::tempdir().expect("tempdir");
    let output_dir = workdir.path().join("out");
    let dataset = write_dataset(
        workdir.path(),
        &["date", "primary_type", "latitude", "longitude"],
        one_day_rows(),
    );

    let status = refresh()
        .args(["run", "--skip-reproducibility", "--dataset"])
        .arg(&dataset)
        .arg("--output-dir")
        .arg(&output_dir)
        .output()
        .expect("run refresh");
    assert_eq!(exit_code(&status), 0);

    let output = refresh()
        .args(["validate", "--output-dir"])
        .arg(&output_dir)
        .output()
        .expect("validate");
    assert_eq!(exit_code(&output), 0);

    fs::write(output_dir.join("metadata.json"), "[]").expect("break metadata");
    let output = refresh()
        .args(["validate", "--output-dir"])
        .arg(&output_dir)
        .output()
        .expect("validate");
    assert_eq!(exit_code(&output), 1);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("metadata"), "stdout: {stdout}");
    assert!(stdout.contains("wrong root type"), "stdout: {stdout}");
}

#[test]
fn output_directory_falls_back_to_environment() {
    let workdir = tempfile::tempdir().expect("tempdir");
    let output_dir = workdir.path().join("from-env");
    let dataset = write_dataset(workdir.path(), &["date", "latitude", "longitude"], serde_json::json!([]));

    let output = refresh()
        .env("REFRESH_OUTPUT_DIR", &output_dir)
        .args(["run", "--dataset"])
        .arg(&dataset)
        .output()
        .expect("run refresh");
    assert_eq!(
        exit_code(&output),
        0,
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    for name in ARTIFACTS {
        assert!(output_dir.join(name).exists(), "{name} not written");
    }
}

#[test]
fn date_only_dataset_runs_without_coordinates() {
    let workdir = tempfile::tempdir().expect("tempdir");
    let output_dir = workdir.path().join("out");
    let dataset = write_dataset(
        workdir.path(),
        &["date"],
        serde_json::json!([
            { "date": "2024-06-01T01:15:00" },
            { "date": "2024-06-02T09:00:00" }
        ]),
    );

    let output = refresh()
        .args(["run", "--json", "--dataset"])
        .arg(&dataset)
        .arg("--output-dir")
        .arg(&output_dir)
        .args(["--disable", "spatial", "--disable", "forecasting", "--disable", "importance"])
        .output()
        .expect("run refresh");
    assert_eq!(
        exit_code(&output),
        0,
        "stdout: {}",
        String::from_utf8_lossy(&output.stdout)
    );
    let spatial: Value =
        serde_json::from_str(&fs::read_to_string(output_dir.join("spatial.json")).expect("read"))
            .expect("spatial json");
    assert_eq!(spatial["total_points"], 0);
}

#[test]
fn config_file_supplies_dataset_and_disables_capabilities() {
    let workdir = tempfile::tempdir().expect("tempdir");
    let output_dir = workdir.path().join("out");
    let dataset = write_dataset(
        workdir.path(),
        &["date", "primary_type", "latitude", "longitude"],
        one_day_rows(),
    );
    let config = workdir.path().join("refresh.yaml");
    fs::write(
        &config,
        format!(
            "dataset: {}\nforecast_horizon: 7\ncapabilities:\n  spatial: false\n",
            dataset.display()
        ),
    )
    .expect("write config");

    let output = refresh()
        .args(["run", "--json", "--config"])
        .arg(&config)
        .arg("--output-dir")
        .arg(&output_dir)
        .output()
        .expect("run refresh");
    assert_eq!(exit_code(&output), 0);

    let report: Value = serde_json::from_slice(&output.stdout).expect("json report");
    let warned: Vec<&str> = report["warnings"]
        .as_array()
        .expect("warnings")
        .iter()
        .filter_map(|warning| warning["task"].as_str())
        .collect();
    assert_eq!(warned, vec!["spatial"]);

    let forecast: Value =
        serde_json::from_str(&fs::read_to_string(output_dir.join("forecasting.json")).expect("read"))
            .expect("forecast json");
    assert_eq!(forecast["horizon_days"], 7);
}

#[test]
fn missing_dataset_is_fatal() {
    let workdir = tempfile::tempdir().expect("tempdir");
    let output = refresh()
        .args(["run", "--output-dir"])
        .arg(workdir.path())
        .output()
        .expect("run refresh");
    assert_eq!(exit_code(&output), 3);
    assert!(String::from_utf8_lossy(&output.stderr).contains("no dataset"));
}
