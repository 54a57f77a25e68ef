use crate::artifact::{write_artifact, ArtifactKind, CapabilityWarning, ExportRun, WriteError};
use crate::capability::{Capabilities, CapabilityKind};
use crate::dataset::{self, Dataset};
use crate::payload::Payload;
use crate::tasks::{self, TaskOutput};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, info_span, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportSettings {
    pub forecast_horizon: usize,
    pub hotspot_limit: usize,
    pub point_limit: usize,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            forecast_horizon: 30,
            hotspot_limit: 20,
            point_limit: 5000,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("{task} export requires column '{column}', which the dataset does not provide")]
    MissingColumn { task: ArtifactKind, column: String },
    #[error("{task} export failed: {source}")]
    Write {
        task: ArtifactKind,
        #[source]
        source: WriteError,
    },
    #[error("failed to prepare shadow directory: {0}")]
    ShadowDirectory(#[source] std::io::Error),
}

/// Columns a task cannot run without. Coordinates are optional: Spatial
/// emits zero located points when they are absent.
pub fn required_columns(kind: ArtifactKind) -> &'static [&'static str] {
    match kind {
        ArtifactKind::Metadata
        | ArtifactKind::Trends
        | ArtifactKind::Seasonality
        | ArtifactKind::Spatial
        | ArtifactKind::Forecasting => &[dataset::DATE],
    }
}

/// Checks every task's input columns up front so a malformed dataset never
/// leaves a partially written artifact set behind.
pub fn check_required_columns(dataset: &Dataset) -> Result<(), ExportError> {
    for task in ArtifactKind::ALL {
        if let Some(column) = required_columns(task)
            .iter()
            .find(|column| !dataset.has_column(column))
        {
            return Err(ExportError::MissingColumn {
                task,
                column: (*column).to_string(),
            });
        }
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct Exporter {
    capabilities: Capabilities,
    settings: ExportSettings,
}

impl Exporter {
    pub fn new(capabilities: Capabilities, settings: ExportSettings) -> Self {
        Self {
            capabilities,
            settings,
        }
    }

    pub fn run(&self, dataset: &Dataset, output_root: &Path) -> Result<ExportRun, ExportError> {
        check_required_columns(dataset)?;

        let mut run = ExportRun::new(output_root);
        for task in ArtifactKind::ALL {
            let _span = info_span!("export", task = %task).entered();
            let output = self.build(task, dataset);

            if !output.missing.is_empty() {
                let warning = CapabilityWarning {
                    task,
                    reason: describe_missing(&output.missing),
                };
                warn!(task = %task, reason = %warning.reason, "task degraded");
                run.warnings.push(warning);
            }

            let artifact = write_artifact(task, Value::from(output.payload), output_root)
                .map_err(|source| ExportError::Write { task, source })?;
            info!(path = %artifact.path.display(), "artifact exported");
            run.artifacts.push(artifact);
        }
        Ok(run)
    }

    fn build(&self, task: ArtifactKind, dataset: &Dataset) -> TaskOutput<Payload> {
        match task {
            ArtifactKind::Metadata => TaskOutput::complete(Payload::Metadata(tasks::metadata(
                dataset,
                self.capabilities.presence(),
            ))),
            ArtifactKind::Trends => TaskOutput::complete(Payload::Trends(tasks::trends(dataset))),
            ArtifactKind::Seasonality => {
                TaskOutput::complete(Payload::Seasonality(tasks::seasonality(dataset)))
            }
            ArtifactKind::Spatial => {
                tasks::spatial(dataset, self.capabilities.spatial.as_deref(), &self.settings)
                    .map(Payload::Spatial)
            }
            ArtifactKind::Forecasting => tasks::forecasting(
                dataset,
                self.capabilities.modeler.as_deref(),
                self.capabilities.ranker.as_deref(),
                &self.settings,
            )
            .map(Payload::Forecasting),
        }
    }
}

fn describe_missing(missing: &[CapabilityKind]) -> String {
    let names: Vec<&str> = missing.iter().map(|kind| kind.name()).collect();
    format!("no {} provider; fallback payload emitted", names.join(" or "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical;
    use crate::dataset::Incident;
    use std::fs;
    use time::macros::datetime;

    fn three_rows_one_day() -> Dataset {
        let at = |hour: u8| {
            datetime!(2024-06-01 00:00:00)
                .replace_hour(hour)
                .expect("valid hour")
        };
        Dataset::new(
            ["date", "primary_type", "latitude", "longitude"],
            vec![
                Incident {
                    primary_type: Some("THEFT".to_string()),
                    latitude: Some(41.88),
                    longitude: Some(-87.63),
                    ..Incident::at(at(1))
                },
                Incident {
                    primary_type: Some("THEFT".to_string()),
                    latitude: Some(41.881),
                    longitude: Some(-87.631),
                    ..Incident::at(at(12))
                },
                Incident {
                    primary_type: Some("ASSAULT".to_string()),
                    ..Incident::at(at(18))
                },
            ],
        )
    }

    #[test]
    fn writes_one_artifact_per_task_in_order() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let exporter = Exporter::new(Capabilities::builtin(), ExportSettings::default());
        let run = exporter
            .run(&three_rows_one_day(), dir.path())
            .expect("export succeeds");

        let kinds: Vec<ArtifactKind> = run.artifacts.iter().map(|artifact| artifact.kind).collect();
        assert_eq!(kinds, ArtifactKind::ALL.to_vec());
        assert!(run.warnings.is_empty());
        for kind in ArtifactKind::ALL {
            assert!(dir.path().join(kind.file_name()).exists(), "{kind} missing");
        }
    }

    #[test]
    fn missing_capabilities_degrade_with_one_warning_per_task() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let exporter = Exporter::new(Capabilities::none(), ExportSettings::default());
        let run = exporter
            .run(&three_rows_one_day(), dir.path())
            .expect("degraded export still succeeds");

        let tasks: Vec<ArtifactKind> = run.warnings.iter().map(|warning| warning.task).collect();
        assert_eq!(tasks, vec![ArtifactKind::Spatial, ArtifactKind::Forecasting]);
        let forecasting = &run.warnings[1];
        assert!(forecasting.reason.contains("forecasting"));
        assert!(forecasting.reason.contains("importance"));
        assert_eq!(run.artifacts.len(), 5);
    }

    #[test]
    fn missing_required_column_fails_before_writing() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let dataset = Dataset::new(["primary_type", "latitude", "longitude"], Vec::new());
        let err = Exporter::default()
            .run(&dataset, dir.path())
            .expect_err("date column is required");
        match err {
            ExportError::MissingColumn { task, column } => {
                assert_eq!(task, ArtifactKind::Metadata);
                assert_eq!(column, "date");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fs::read_dir(dir.path()).expect("list").count(), 0);
    }

    #[test]
    fn date_only_dataset_exports_without_coordinates() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let dataset = Dataset::new(
            ["date"],
            vec![Incident::at(datetime!(2024-06-01 08:00:00))],
        );
        let run = Exporter::new(Capabilities::none(), ExportSettings::default())
            .run(&dataset, dir.path())
            .expect("coordinates are optional");
        assert_eq!(run.artifacts.len(), 5);
        let spatial = run.artifact(ArtifactKind::Spatial).expect("spatial");
        assert_eq!(spatial.payload.get("total_points"), Some(&Value::Int(0)));
        assert_eq!(spatial.payload.get("points"), Some(&Value::Array(Vec::new())));
        for kind in ArtifactKind::ALL {
            assert_eq!(required_columns(kind), &["date"]);
        }
    }

    #[test]
    fn empty_dataset_exports_every_artifact() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let dataset = Dataset::new(["date", "latitude", "longitude"], Vec::new());
        let run = Exporter::new(Capabilities::builtin(), ExportSettings::default())
            .run(&dataset, dir.path())
            .expect("empty dataset is valid input");
        assert_eq!(run.artifacts.len(), 5);
        let metadata = run.artifact(ArtifactKind::Metadata).expect("metadata");
        assert_eq!(metadata.payload.get("total_incidents"), Some(&Value::Int(0)));
    }

    #[test]
    fn repeated_runs_are_byte_identical() {
        let first = tempfile::tempdir().expect("create tempdir");
        let second = tempfile::tempdir().expect("create tempdir");
        let exporter = Exporter::new(Capabilities::builtin(), ExportSettings::default());
        let dataset = three_rows_one_day();
        exporter.run(&dataset, first.path()).expect("first run");
        exporter.run(&dataset, second.path()).expect("second run");

        for kind in ArtifactKind::ALL {
            let a = fs::read_to_string(kind.path_in(first.path())).expect("read first");
            let b = fs::read_to_string(kind.path_in(second.path())).expect("read second");
            assert_eq!(a, b, "{kind} differs");
            assert_eq!(canonical::recanonicalize(&a).expect("parse"), a);
        }
    }
}
