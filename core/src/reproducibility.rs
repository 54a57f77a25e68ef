use crate::artifact::{Artifact, ArtifactKind, ExportRun};
use crate::canonical::{self, canonicalize};
use crate::value::{FieldPath, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Difference {
    pub kind: ArtifactKind,
    /// First structural location where the two artifacts disagree.
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReproducibilityReport {
    pub matched: Vec<ArtifactKind>,
    pub differing: Vec<Difference>,
}

impl ReproducibilityReport {
    pub fn is_reproducible(&self) -> bool {
        self.differing.is_empty()
    }

    pub fn differing_kinds(&self) -> Vec<ArtifactKind> {
        self.differing.iter().map(|difference| difference.kind).collect()
    }
}

impl fmt::Display for ReproducibilityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for kind in &self.matched {
            writeln!(f, "  - [match] {kind}")?;
        }
        for difference in &self.differing {
            writeln!(
                f,
                "  - [drift] {} at {}: {}",
                difference.kind, difference.path, difference.reason
            )?;
        }
        Ok(())
    }
}

/// Compares the canonical form of every artifact produced by either run.
pub fn verify(run_a: &ExportRun, run_b: &ExportRun) -> ReproducibilityReport {
    let kinds: BTreeSet<ArtifactKind> = run_a
        .artifacts
        .iter()
        .chain(&run_b.artifacts)
        .map(|artifact| artifact.kind)
        .collect();

    let mut report = ReproducibilityReport::default();
    for kind in kinds {
        match (run_a.artifact(kind), run_b.artifact(kind)) {
            (Some(a), Some(b)) => match compare(a, b) {
                None => report.matched.push(kind),
                Some(difference) => report.differing.push(difference),
            },
            (Some(_), None) => report.differing.push(Difference {
                kind,
                path: kind.name().to_string(),
                reason: "produced by the primary run only".to_string(),
            }),
            (None, Some(_)) => report.differing.push(Difference {
                kind,
                path: kind.name().to_string(),
                reason: "produced by the shadow run only".to_string(),
            }),
            (None, None) => {}
        }
    }
    report
}

fn compare(a: &Artifact, b: &Artifact) -> Option<Difference> {
    let kind = a.kind;
    let root = FieldPath::new(kind.name());
    let (left, right) = match (load_canonical(&a.path), load_canonical(&b.path)) {
        (Ok(left), Ok(right)) => (left, right),
        (Err(reason), _) | (_, Err(reason)) => {
            return Some(Difference {
                kind,
                path: root.to_string(),
                reason,
            })
        }
    };

    if left.0 == right.0 {
        return None;
    }
    let path = first_difference(&left.1, &right.1, &root).unwrap_or(root);
    Some(Difference {
        kind,
        path: path.to_string(),
        reason: "canonical forms differ".to_string(),
    })
}

fn load_canonical(path: &Path) -> Result<(String, Value), String> {
    let text = std::fs::read_to_string(path)
        .map_err(|err| format!("cannot read {}: {err}", path.display()))?;
    let value = canonical::parse(&text).map_err(|err| err.to_string())?;
    let canonical = canonicalize(&value).map_err(|err| err.to_string())?;
    Ok((canonical, value))
}

/// Walks both trees in canonical order and returns the first path where they diverge.
pub fn first_difference(a: &Value, b: &Value, path: &FieldPath) -> Option<FieldPath> {
    match (a, b) {
        (Value::Object(left), Value::Object(right)) => {
            let keys: BTreeSet<&String> = left.keys().chain(right.keys()).collect();
            keys.into_iter().find_map(|key| match (left.get(key), right.get(key)) {
                (Some(x), Some(y)) => first_difference(x, y, &path.key(key.as_str())),
                _ => Some(path.key(key.as_str())),
            })
        }
        (Value::Array(left), Value::Array(right)) => left
            .iter()
            .zip(right)
            .enumerate()
            .find_map(|(index, (x, y))| first_difference(x, y, &path.index(index)))
            .or_else(|| (left.len() != right.len()).then(|| path.index(left.len().min(right.len())))),
        _ => {
            let same = match (canonicalize(a), canonicalize(b)) {
                (Ok(x), Ok(y)) => x == y,
                _ => false,
            };
            (!same).then(|| path.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capabilities;
    use crate::dataset::{Dataset, Incident};
    use crate::export::{ExportSettings, Exporter};
    use std::fs;
    use time::macros::datetime;

    fn dataset() -> Dataset {
        Dataset::new(
            ["date", "primary_type", "latitude", "longitude"],
            vec![
                Incident {
                    primary_type: Some("THEFT".to_string()),
                    latitude: Some(41.88),
                    longitude: Some(-87.63),
                    ..Incident::at(datetime!(2024-06-01 10:00:00))
                },
                Incident {
                    primary_type: Some("BURGLARY".to_string()),
                    latitude: Some(41.89),
                    longitude: Some(-87.62),
                    ..Incident::at(datetime!(2024-06-03 22:00:00))
                },
            ],
        )
    }

    fn export(capabilities: Capabilities) -> (tempfile::TempDir, ExportRun) {
        let dir = tempfile::tempdir().expect("create tempdir");
        let run = Exporter::new(capabilities, ExportSettings::default())
            .run(&dataset(), dir.path())
            .expect("export succeeds");
        (dir, run)
    }

    #[test]
    fn identical_runs_match_everywhere() {
        let (_a, primary) = export(Capabilities::builtin());
        let (_b, shadow) = export(Capabilities::builtin());
        let report = verify(&primary, &shadow);
        assert!(report.is_reproducible(), "{report}");
        assert_eq!(report.matched, ArtifactKind::ALL.to_vec());
    }

    #[test]
    fn byte_edit_in_shadow_is_reported_for_that_kind_only() {
        let (_a, primary) = export(Capabilities::builtin());
        let (_b, shadow) = export(Capabilities::builtin());

        let path = &shadow.artifact(ArtifactKind::Trends).expect("trends").path;
        let text = fs::read_to_string(path).expect("read");
        let edited = text.replacen("\"total\":2", "\"total\":3", 1);
        assert_ne!(text, edited, "fixture must contain the edited token");
        fs::write(path, edited).expect("write drift");

        let report = verify(&primary, &shadow);
        assert_eq!(report.differing_kinds(), vec![ArtifactKind::Trends]);
        assert_eq!(report.differing[0].path, "trends.summary.total");
        assert_eq!(report.matched.len(), 4);
    }

    #[test]
    fn whitespace_only_edits_are_not_drift() {
        let (_a, primary) = export(Capabilities::builtin());
        let (_b, shadow) = export(Capabilities::builtin());
        let path = &shadow.artifact(ArtifactKind::Metadata).expect("metadata").path;
        let text = fs::read_to_string(path).expect("read");
        fs::write(path, text.replace(',', ",\n  ")).expect("reformat");

        assert!(verify(&primary, &shadow).is_reproducible());
    }

    #[test]
    fn capability_drift_between_runs_is_detected() {
        let (_a, primary) = export(Capabilities::builtin());
        let (_b, shadow) = export(Capabilities::none());
        let report = verify(&primary, &shadow);
        let kinds = report.differing_kinds();
        assert!(kinds.contains(&ArtifactKind::Metadata));
        assert!(kinds.contains(&ArtifactKind::Spatial));
        assert!(kinds.contains(&ArtifactKind::Forecasting));
        assert!(report.matched.contains(&ArtifactKind::Trends));
    }

    #[test]
    fn artifact_missing_from_one_run_is_a_difference() {
        let (_a, primary) = export(Capabilities::builtin());
        let (_b, mut shadow) = export(Capabilities::builtin());
        shadow.artifacts.retain(|artifact| artifact.kind != ArtifactKind::Spatial);

        let report = verify(&primary, &shadow);
        assert_eq!(report.differing_kinds(), vec![ArtifactKind::Spatial]);
        assert_eq!(report.differing[0].path, "spatial");
    }

    #[test]
    fn first_difference_points_into_arrays() {
        let a = Value::object([(
            "model",
            Value::object([("feature_importances", Value::array([1.0, 2.0, 3.0]))]),
        )]);
        let b = Value::object([(
            "model",
            Value::object([("feature_importances", Value::array([1.0, 2.0, 4.0]))]),
        )]);
        let path = first_difference(&a, &b, &FieldPath::new("forecasting")).expect("differs");
        assert_eq!(path.to_string(), "forecasting.model.feature_importances[2]");

        let shorter = Value::array([1.0]);
        let longer = Value::array([1.0, 2.0]);
        let path = first_difference(&shorter, &longer, &FieldPath::root()).expect("differs");
        assert_eq!(path.to_string(), "[1]");

        assert_eq!(
            first_difference(&Value::Float(0.1 + 0.2), &Value::Float(0.3), &FieldPath::root()),
            None
        );
    }
}
