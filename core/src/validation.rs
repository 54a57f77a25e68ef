use crate::artifact::{Artifact, ArtifactKind, ExportRun};
use crate::canonical;
use crate::value::{FieldPath, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    MalformedDocument,
    WrongRootType,
    MissingKey,
    WrongFieldType,
    EmptyRequiredField,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ViolationKind::MalformedDocument => "malformed document",
            ViolationKind::WrongRootType => "wrong root type",
            ViolationKind::MissingKey => "missing key",
            ViolationKind::WrongFieldType => "wrong field type",
            ViolationKind::EmptyRequiredField => "empty required field",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Violation {
    pub kind: ViolationKind,
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationResult {
    pub kind: ArtifactKind,
    pub ok: bool,
    pub violations: Vec<Violation>,
}

impl ValidationResult {
    pub fn has_violation(&self, kind: ViolationKind, path: &str) -> bool {
        self.violations
            .iter()
            .any(|violation| violation.kind == kind && violation.path == path)
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ok {
            return write!(f, "[ok] {}", self.kind);
        }
        for (index, violation) in self.violations.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(
                f,
                "[invalid] {} {}: {} ({})",
                self.kind, violation.path, violation.kind, violation.message
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Object,
    Array,
    String,
    Number,
    Integer,
    Bool,
}

impl FieldType {
    fn matches(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (FieldType::Object, Value::Object(_))
                | (FieldType::Array, Value::Array(_))
                | (FieldType::String, Value::String(_))
                | (FieldType::Number, Value::Int(_) | Value::Float(_))
                | (FieldType::Integer, Value::Int(_))
                | (FieldType::Bool, Value::Bool(_))
        )
    }

    fn name(self) -> &'static str {
        match self {
            FieldType::Object => "object",
            FieldType::Array => "array",
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Bool => "bool",
        }
    }
}

struct FieldDef {
    key: &'static str,
    ty: FieldType,
    non_empty: bool,
    fields: &'static [FieldDef],
}

impl FieldDef {
    const fn required(key: &'static str, ty: FieldType) -> Self {
        Self {
            key,
            ty,
            non_empty: false,
            fields: &[],
        }
    }

    const fn non_empty(key: &'static str, ty: FieldType) -> Self {
        Self {
            key,
            ty,
            non_empty: true,
            fields: &[],
        }
    }

    const fn nested(key: &'static str, fields: &'static [FieldDef]) -> Self {
        Self {
            key,
            ty: FieldType::Object,
            non_empty: false,
            fields,
        }
    }
}

struct ArtifactSchemaDef {
    kind: ArtifactKind,
    root: FieldType,
    fields: &'static [FieldDef],
}

const SERIES: &[FieldDef] = &[
    FieldDef::required("labels", FieldType::Array),
    FieldDef::required("values", FieldType::Array),
];

const FIXED_SERIES: &[FieldDef] = &[
    FieldDef::non_empty("labels", FieldType::Array),
    FieldDef::non_empty("values", FieldType::Array),
];

static BUILTIN_SCHEMAS: [ArtifactSchemaDef; 5] = [
    ArtifactSchemaDef {
        kind: ArtifactKind::Metadata,
        root: FieldType::Object,
        fields: &[
            FieldDef::required("total_incidents", FieldType::Integer),
            FieldDef::required("date_range", FieldType::Array),
            FieldDef::required("days_covered", FieldType::Integer),
            FieldDef::required("crime_types", FieldType::Array),
            FieldDef::required("districts", FieldType::Array),
            FieldDef::non_empty("columns", FieldType::Array),
            FieldDef::nested(
                "capabilities",
                &[
                    FieldDef::required("spatial", FieldType::Bool),
                    FieldDef::required("forecasting", FieldType::Bool),
                    FieldDef::required("importance", FieldType::Bool),
                ],
            ),
            FieldDef::required("arrest_rate", FieldType::Number),
        ],
    },
    ArtifactSchemaDef {
        kind: ArtifactKind::Trends,
        root: FieldType::Object,
        fields: &[
            FieldDef::nested("daily", SERIES),
            FieldDef::nested("monthly", SERIES),
            FieldDef::nested("rolling_7d", SERIES),
            FieldDef::required("by_type", FieldType::Object),
            FieldDef::nested(
                "summary",
                &[
                    FieldDef::required("total", FieldType::Integer),
                    FieldDef::required("mean_daily", FieldType::Number),
                    FieldDef::required("peak_day", FieldType::String),
                ],
            ),
        ],
    },
    ArtifactSchemaDef {
        kind: ArtifactKind::Seasonality,
        root: FieldType::Object,
        fields: &[
            FieldDef::nested("by_hour", FIXED_SERIES),
            FieldDef::nested("by_weekday", FIXED_SERIES),
            FieldDef::nested("by_month", FIXED_SERIES),
            FieldDef::nested(
                "heatmap",
                &[
                    FieldDef::non_empty("weekdays", FieldType::Array),
                    FieldDef::non_empty("hours", FieldType::Array),
                    FieldDef::non_empty("counts", FieldType::Array),
                ],
            ),
        ],
    },
    ArtifactSchemaDef {
        kind: ArtifactKind::Spatial,
        root: FieldType::Object,
        fields: &[
            FieldDef::required("points", FieldType::Array),
            FieldDef::required("total_points", FieldType::Integer),
            FieldDef::required("hotspots", FieldType::Array),
            FieldDef::required("by_district", FieldType::Object),
            FieldDef::required("bounds", FieldType::Array),
            FieldDef::required("method", FieldType::String),
        ],
    },
    ArtifactSchemaDef {
        kind: ArtifactKind::Forecasting,
        root: FieldType::Object,
        fields: &[
            FieldDef::required("horizon_days", FieldType::Integer),
            FieldDef::non_empty("horizon", FieldType::Array),
            FieldDef::required("dates", FieldType::Array),
            FieldDef::non_empty("predicted", FieldType::Array),
            FieldDef::non_empty("lower", FieldType::Array),
            FieldDef::non_empty("upper", FieldType::Array),
            FieldDef::nested("history", SERIES),
            FieldDef::nested(
                "model",
                &[
                    FieldDef::required("name", FieldType::String),
                    FieldDef::required("degraded", FieldType::Bool),
                    FieldDef::non_empty("feature_importances", FieldType::Array),
                ],
            ),
        ],
    },
];

fn lookup_schema(kind: ArtifactKind) -> &'static ArtifactSchemaDef {
    match kind {
        ArtifactKind::Metadata => &BUILTIN_SCHEMAS[0],
        ArtifactKind::Trends => &BUILTIN_SCHEMAS[1],
        ArtifactKind::Seasonality => &BUILTIN_SCHEMAS[2],
        ArtifactKind::Spatial => &BUILTIN_SCHEMAS[3],
        ArtifactKind::Forecasting => &BUILTIN_SCHEMAS[4],
    }
}

/// Required top-level keys for `kind`, in declaration order.
pub fn required_keys(kind: ArtifactKind) -> Vec<&'static str> {
    lookup_schema(kind).fields.iter().map(|field| field.key).collect()
}

struct ValidationContext {
    path: FieldPath,
    violations: Vec<Violation>,
}

impl ValidationContext {
    fn new() -> Self {
        Self {
            path: FieldPath::root(),
            violations: Vec::new(),
        }
    }

    fn push(&mut self, key: &str) {
        self.path.push_key(key);
    }

    fn pop(&mut self) {
        self.path.pop();
    }

    fn report(&mut self, kind: ViolationKind, message: impl Into<String>) {
        self.violations.push(Violation {
            kind,
            path: self.path.to_string(),
            message: message.into(),
        });
    }

    fn finish(self, kind: ArtifactKind) -> ValidationResult {
        ValidationResult {
            kind,
            ok: self.violations.is_empty(),
            violations: self.violations,
        }
    }
}

pub fn validate(artifact: &Artifact) -> ValidationResult {
    validate_file(artifact.kind, &artifact.path)
}

pub fn validate_all(run: &ExportRun) -> Vec<ValidationResult> {
    run.artifacts.iter().map(validate).collect()
}

/// Validates every artifact kind expected under `output_root`.
pub fn validate_dir(output_root: &Path) -> Vec<ValidationResult> {
    ArtifactKind::ALL
        .iter()
        .map(|kind| validate_file(*kind, &kind.path_in(output_root)))
        .collect()
}

pub fn validate_file(kind: ArtifactKind, path: &Path) -> ValidationResult {
    match std::fs::read_to_string(path) {
        Ok(text) => validate_document(kind, &text),
        Err(err) => {
            let mut ctx = ValidationContext::new();
            ctx.report(
                ViolationKind::MalformedDocument,
                format!("cannot read {}: {err}", path.display()),
            );
            ctx.finish(kind)
        }
    }
}

pub fn validate_document(kind: ArtifactKind, text: &str) -> ValidationResult {
    let schema = lookup_schema(kind);
    let mut ctx = ValidationContext::new();
    match canonical::parse(text) {
        Ok(document) => validate_value(schema, &document, &mut ctx),
        Err(err) => ctx.report(ViolationKind::MalformedDocument, err.to_string()),
    }
    ctx.finish(schema.kind)
}

fn validate_value(schema: &ArtifactSchemaDef, document: &Value, ctx: &mut ValidationContext) {
    if !schema.root.matches(document) {
        ctx.report(
            ViolationKind::WrongRootType,
            format!(
                "expected {} at the root, found {}",
                schema.root.name(),
                document.type_name()
            ),
        );
        return;
    }
    check_fields(document, schema.fields, ctx);
}

fn check_fields(object: &Value, fields: &[FieldDef], ctx: &mut ValidationContext) {
    for field in fields {
        ctx.push(field.key);
        match object.get(field.key) {
            None => ctx.report(ViolationKind::MissingKey, "required key is absent"),
            Some(value) if !field.ty.matches(value) => ctx.report(
                ViolationKind::WrongFieldType,
                format!("expected {}, found {}", field.ty.name(), value.type_name()),
            ),
            Some(value) => {
                if field.non_empty && is_empty(value) {
                    ctx.report(ViolationKind::EmptyRequiredField, "must not be empty");
                }
                if !field.fields.is_empty() {
                    check_fields(value, field.fields, ctx);
                }
            }
        }
        ctx.pop();
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}
