//! Export → validate → reproducibility check, as one call.
//!
//! The shadow export lives in a [`tempfile::TempDir`] owned by [`refresh`];
//! it is removed when the function returns, whichever stage ended the run.

use crate::artifact::{ArtifactSummary, CapabilityWarning, ExportRun};
use crate::dataset::Dataset;
use crate::export::{ExportError, Exporter};
use crate::reproducibility::{verify, ReproducibilityReport};
use crate::validation::{validate_all, ValidationResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::{error, info};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_VALIDATION_FAILED: u8 = 1;
pub const EXIT_REPRODUCIBILITY_FAILED: u8 = 2;
pub const EXIT_FATAL: u8 = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStage {
    Export,
    Validate,
    ShadowExport,
    Verify,
}

impl fmt::Display for RefreshStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RefreshStage::Export => "export",
            RefreshStage::Validate => "validate",
            RefreshStage::ShadowExport => "shadow export",
            RefreshStage::Verify => "verify",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStatus {
    Succeeded,
    ValidationFailed,
    ReproducibilityFailed,
    ExportFailed,
}

impl RefreshStatus {
    pub fn exit_code(self) -> u8 {
        match self {
            RefreshStatus::Succeeded => EXIT_SUCCESS,
            RefreshStatus::ValidationFailed => EXIT_VALIDATION_FAILED,
            RefreshStatus::ReproducibilityFailed => EXIT_REPRODUCIBILITY_FAILED,
            RefreshStatus::ExportFailed => EXIT_FATAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOptions {
    pub output_root: PathBuf,
    pub skip_reproducibility: bool,
    /// Directory under which the shadow run is created; the system temp dir when `None`.
    pub shadow_parent: Option<PathBuf>,
}

impl RefreshOptions {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            skip_reproducibility: false,
            shadow_parent: None,
        }
    }
}

#[derive(Debug)]
pub enum RefreshOutcome {
    Succeeded {
        run: ExportRun,
        validation: Vec<ValidationResult>,
        reproducibility: Option<ReproducibilityReport>,
    },
    ValidationFailed {
        run: ExportRun,
        validation: Vec<ValidationResult>,
    },
    ReproducibilityFailed {
        run: ExportRun,
        validation: Vec<ValidationResult>,
        report: ReproducibilityReport,
    },
    ExportFailed {
        stage: RefreshStage,
        error: ExportError,
    },
}

impl RefreshOutcome {
    pub fn status(&self) -> RefreshStatus {
        match self {
            RefreshOutcome::Succeeded { .. } => RefreshStatus::Succeeded,
            RefreshOutcome::ValidationFailed { .. } => RefreshStatus::ValidationFailed,
            RefreshOutcome::ReproducibilityFailed { .. } => RefreshStatus::ReproducibilityFailed,
            RefreshOutcome::ExportFailed { .. } => RefreshStatus::ExportFailed,
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.status().exit_code()
    }

    pub fn run(&self) -> Option<&ExportRun> {
        match self {
            RefreshOutcome::Succeeded { run, .. }
            | RefreshOutcome::ValidationFailed { run, .. }
            | RefreshOutcome::ReproducibilityFailed { run, .. } => Some(run),
            RefreshOutcome::ExportFailed { .. } => None,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            RefreshOutcome::Succeeded {
                run,
                reproducibility,
                ..
            } => {
                let check = if reproducibility.is_some() {
                    "validated and reproducible"
                } else {
                    "validated (reproducibility check skipped)"
                };
                format!(
                    "refresh succeeded: {} artifacts in {} {check}, {} degraded task(s)",
                    run.artifacts.len(),
                    run.output_root.display(),
                    run.warnings.len()
                )
            }
            RefreshOutcome::ValidationFailed { validation, .. } => {
                let failed = validation.iter().filter(|result| !result.ok).count();
                format!("refresh failed: {failed} artifact(s) did not pass validation")
            }
            RefreshOutcome::ReproducibilityFailed { report, .. } => format!(
                "refresh failed: {} artifact(s) differ between primary and shadow runs",
                report.differing.len()
            ),
            RefreshOutcome::ExportFailed { stage, error } => {
                format!("refresh failed during {stage}: {error}")
            }
        }
    }

    pub fn report(&self) -> RefreshReport {
        let (validation, reproducibility) = match self {
            RefreshOutcome::Succeeded {
                validation,
                reproducibility,
                ..
            } => (validation.clone(), reproducibility.clone()),
            RefreshOutcome::ValidationFailed { validation, .. } => (validation.clone(), None),
            RefreshOutcome::ReproducibilityFailed {
                validation, report, ..
            } => (validation.clone(), Some(report.clone())),
            RefreshOutcome::ExportFailed { .. } => (Vec::new(), None),
        };
        // Artifact paths are only advertised once the run is known good.
        let artifacts = match self {
            RefreshOutcome::Succeeded { run, .. } => run.summaries(),
            _ => Vec::new(),
        };
        let error = match self {
            RefreshOutcome::ExportFailed { error, .. } => Some(error.to_string()),
            _ => None,
        };

        RefreshReport {
            status: self.status(),
            exit_code: self.exit_code(),
            summary: self.summary(),
            output_root: self.run().map(|run| run.output_root.display().to_string()),
            artifacts,
            warnings: self
                .run()
                .map(|run| run.warnings.clone())
                .unwrap_or_default(),
            validation,
            reproducibility,
            error,
        }
    }
}

/// Serializable view of a [`RefreshOutcome`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshReport {
    pub status: RefreshStatus,
    pub exit_code: u8,
    pub summary: String,
    pub output_root: Option<String>,
    pub artifacts: Vec<ArtifactSummary>,
    pub warnings: Vec<CapabilityWarning>,
    pub validation: Vec<ValidationResult>,
    pub reproducibility: Option<ReproducibilityReport>,
    pub error: Option<String>,
}

pub fn refresh(exporter: &Exporter, dataset: &Dataset, options: &RefreshOptions) -> RefreshOutcome {
    info!(output_root = %options.output_root.display(), "primary export");
    let run = match exporter.run(dataset, &options.output_root) {
        Ok(run) => run,
        Err(error) => return export_failed(RefreshStage::Export, error),
    };

    let validation = validate_all(&run);
    if validation.iter().any(|result| !result.ok) {
        error!("validation failed");
        return RefreshOutcome::ValidationFailed { run, validation };
    }

    if options.skip_reproducibility {
        return RefreshOutcome::Succeeded {
            run,
            validation,
            reproducibility: None,
        };
    }

    let builder = {
        let mut builder = tempfile::Builder::new();
        builder.prefix("refresh-shadow-");
        builder
    };
    let shadow_dir = match &options.shadow_parent {
        Some(parent) => std::fs::create_dir_all(parent).and_then(|_| builder.tempdir_in(parent)),
        None => builder.tempdir(),
    };
    let shadow_dir = match shadow_dir {
        Ok(dir) => dir,
        Err(err) => {
            return export_failed(RefreshStage::ShadowExport, ExportError::ShadowDirectory(err))
        }
    };

    info!(shadow_root = %shadow_dir.path().display(), "shadow export");
    let shadow = match exporter.run(dataset, shadow_dir.path()) {
        Ok(shadow) => shadow,
        Err(error) => return export_failed(RefreshStage::ShadowExport, error),
    };

    let report = verify(&run, &shadow);
    if !report.is_reproducible() {
        error!(differing = report.differing.len(), "reproducibility check failed");
        return RefreshOutcome::ReproducibilityFailed {
            run,
            validation,
            report,
        };
    }

    RefreshOutcome::Succeeded {
        run,
        validation,
        reproducibility: Some(report),
    }
}

fn export_failed(stage: RefreshStage, error: ExportError) -> RefreshOutcome {
    error!(stage = %stage, error = %error, "export failed");
    RefreshOutcome::ExportFailed { stage, error }
}
