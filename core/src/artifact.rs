use crate::canonical::{canonicalize, CanonicalError};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Metadata,
    Trends,
    Seasonality,
    Spatial,
    Forecasting,
}

impl ArtifactKind {
    /// Export order. Tasks always run in this sequence.
    pub const ALL: [ArtifactKind; 5] = [
        ArtifactKind::Metadata,
        ArtifactKind::Trends,
        ArtifactKind::Seasonality,
        ArtifactKind::Spatial,
        ArtifactKind::Forecasting,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ArtifactKind::Metadata => "metadata",
            ArtifactKind::Trends => "trends",
            ArtifactKind::Seasonality => "seasonality",
            ArtifactKind::Spatial => "spatial",
            ArtifactKind::Forecasting => "forecasting",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            ArtifactKind::Metadata => "metadata.json",
            ArtifactKind::Trends => "trends.json",
            ArtifactKind::Seasonality => "seasonality.json",
            ArtifactKind::Spatial => "spatial.json",
            ArtifactKind::Forecasting => "forecasting.json",
        }
    }

    pub fn path_in(self, output_root: &Path) -> PathBuf {
        output_root.join(self.file_name())
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub payload: Value,
}

/// Recorded when a task fell back because an optional capability was missing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapabilityWarning {
    pub task: ArtifactKind,
    pub reason: String,
}

impl fmt::Display for CapabilityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "capability unavailable for {}: {}", self.task, self.reason)
    }
}

#[derive(Debug, Clone)]
pub struct ExportRun {
    pub output_root: PathBuf,
    pub artifacts: Vec<Artifact>,
    pub warnings: Vec<CapabilityWarning>,
}

impl ExportRun {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            artifacts: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn artifact(&self, kind: ArtifactKind) -> Option<&Artifact> {
        self.artifacts.iter().find(|artifact| artifact.kind == kind)
    }

    pub fn summaries(&self) -> Vec<ArtifactSummary> {
        self.artifacts
            .iter()
            .map(|artifact| ArtifactSummary {
                kind: artifact.kind,
                path: artifact.path.display().to_string(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactSummary {
    pub kind: ArtifactKind,
    pub path: String,
}

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error(transparent)]
    Canonical(#[from] CanonicalError),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Canonicalizes `payload` and moves it into place with a rename, so readers
/// see either the previous file or the complete new one.
pub fn write_artifact(
    kind: ArtifactKind,
    payload: Value,
    output_root: &Path,
) -> Result<Artifact, WriteError> {
    let path = kind.path_in(output_root);
    let text = canonicalize(&payload)?;

    let io_error = |source: std::io::Error| WriteError::Io {
        path: path.clone(),
        source,
    };

    std::fs::create_dir_all(output_root).map_err(io_error)?;
    let mut staged = NamedTempFile::new_in(output_root).map_err(io_error)?;
    staged.write_all(text.as_bytes()).map_err(io_error)?;
    staged.as_file().sync_all().map_err(io_error)?;
    staged.persist(&path).map_err(|err| io_error(err.error))?;

    debug!(artifact = %kind, path = %path.display(), bytes = text.len(), "artifact written");

    Ok(Artifact {
        kind,
        path,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn writes_canonical_text_to_kind_file() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let payload = Value::object([("b", Value::Int(2)), ("a", Value::Float(0.5))]);
        let artifact =
            write_artifact(ArtifactKind::Metadata, payload.clone(), dir.path()).expect("write");

        assert_eq!(artifact.path, dir.path().join("metadata.json"));
        assert_eq!(artifact.payload, payload);
        let text = fs::read_to_string(&artifact.path).expect("read back");
        assert_eq!(text, "{\"a\":0.5,\"b\":2}");
    }

    #[test]
    fn creates_missing_output_directory() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let nested = dir.path().join("web").join("data");
        write_artifact(ArtifactKind::Trends, Value::object([("x", Value::Null)]), &nested)
            .expect("write");
        assert!(nested.join("trends.json").exists());
    }

    #[test]
    fn non_canonical_payload_leaves_existing_file_untouched() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let target = dir.path().join("forecasting.json");
        fs::write(&target, "{\"previous\":true}").expect("seed file");

        let payload = Value::object([("predicted", Value::array([f64::NAN]))]);
        let err = write_artifact(ArtifactKind::Forecasting, payload, dir.path())
            .expect_err("NaN must be rejected");
        assert!(matches!(err, WriteError::Canonical(_)));

        assert_eq!(
            fs::read_to_string(&target).expect("read"),
            "{\"previous\":true}"
        );
        let leftovers: Vec<_> = fs::read_dir(dir.path()).expect("list").collect();
        assert_eq!(leftovers.len(), 1, "no staging files may remain");
    }

    #[test]
    fn overwrites_previous_artifact() {
        let dir = tempfile::tempdir().expect("create tempdir");
        write_artifact(ArtifactKind::Spatial, Value::object([("v", Value::Int(1))]), dir.path())
            .expect("first write");
        write_artifact(ArtifactKind::Spatial, Value::object([("v", Value::Int(2))]), dir.path())
            .expect("second write");
        let text = fs::read_to_string(dir.path().join("spatial.json")).expect("read");
        assert_eq!(text, "{\"v\":2}");
    }

    #[test]
    fn kinds_map_to_fixed_file_names() {
        let names: Vec<&str> = ArtifactKind::ALL.iter().map(|kind| kind.file_name()).collect();
        assert_eq!(
            names,
            vec![
                "metadata.json",
                "trends.json",
                "seasonality.json",
                "spatial.json",
                "forecasting.json"
            ]
        );
    }
}
