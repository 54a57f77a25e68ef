//! Incident dataset handed to the export tasks.
//!
//! The on-disk form is a JSON document with an explicit column header:
//!
//! ```json
//! {"columns": ["date", "primary_type"], "rows": [{"date": "2024-01-01 10:00:00", "primary_type": "THEFT"}]}
//! ```
//!
//! The header decides which columns exist, so a dataset with zero rows still
//! carries its schema.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

pub const DATE: &str = "date";
pub const PRIMARY_TYPE: &str = "primary_type";
pub const DISTRICT: &str = "district";
pub const LATITUDE: &str = "latitude";
pub const LONGITUDE: &str = "longitude";
pub const ARREST: &str = "arrest";

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("failed to read dataset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("dataset is not a valid document: {0}")]
    Parse(String),
    #[error("row {row}, column '{column}': {reason}")]
    InvalidValue {
        row: usize,
        column: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Incident {
    pub timestamp: Option<PrimitiveDateTime>,
    pub primary_type: Option<String>,
    pub district: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub arrest: Option<bool>,
}

impl Incident {
    pub fn at(timestamp: PrimitiveDateTime) -> Self {
        Self {
            timestamp: Some(timestamp),
            ..Self::default()
        }
    }

    pub fn date(&self) -> Option<Date> {
        self.timestamp.map(|timestamp| timestamp.date())
    }

    pub fn location(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon))
                if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) =>
            {
                Some((lat, lon))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: BTreeSet<String>,
    incidents: Vec<Incident>,
}

#[derive(Debug, Deserialize)]
struct DatasetDocument {
    columns: Vec<String>,
    #[serde(default)]
    rows: Vec<BTreeMap<String, serde_json::Value>>,
}

impl Dataset {
    pub fn new<I, S>(columns: I, incidents: Vec<Incident>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            incidents,
        }
    }

    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let content = std::fs::read_to_string(path).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, DatasetError> {
        let document: DatasetDocument =
            serde_json::from_str(content).map_err(|err| DatasetError::Parse(err.to_string()))?;
        let columns: BTreeSet<String> = document.columns.into_iter().collect();

        let mut incidents = Vec::with_capacity(document.rows.len());
        for (index, row) in document.rows.iter().enumerate() {
            incidents.push(parse_row(index, row, &columns)?);
        }

        Ok(Self { columns, incidents })
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains(name)
    }

    pub fn incidents(&self) -> &[Incident] {
        &self.incidents
    }

    pub fn len(&self) -> usize {
        self.incidents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.incidents.is_empty()
    }
}

fn parse_row(
    index: usize,
    row: &BTreeMap<String, serde_json::Value>,
    columns: &BTreeSet<String>,
) -> Result<Incident, DatasetError> {
    let cell = |name: &str| {
        if columns.contains(name) {
            row.get(name).filter(|value| !value.is_null())
        } else {
            None
        }
    };
    let invalid = |column: &str, reason: String| DatasetError::InvalidValue {
        row: index,
        column: column.to_string(),
        reason,
    };

    let timestamp = match cell(DATE) {
        Some(value) => {
            let raw = value
                .as_str()
                .ok_or_else(|| invalid(DATE, format!("expected a timestamp string, found {value}")))?;
            Some(
                parse_timestamp(raw)
                    .ok_or_else(|| invalid(DATE, format!("unrecognised timestamp '{raw}'")))?,
            )
        }
        None => None,
    };

    let primary_type = cell(PRIMARY_TYPE).map(text_value);
    let district = cell(DISTRICT).map(text_value);

    let coordinate = |column: &str| -> Result<Option<f64>, DatasetError> {
        match cell(column) {
            Some(value) => number_value(value)
                .map(Some)
                .ok_or_else(|| invalid(column, format!("expected a finite number, found {value}"))),
            None => Ok(None),
        }
    };
    let latitude = coordinate(LATITUDE)?;
    let longitude = coordinate(LONGITUDE)?;

    let arrest = match cell(ARREST) {
        Some(value) => Some(
            bool_value(value)
                .ok_or_else(|| invalid(ARREST, format!("expected a boolean, found {value}")))?,
        ),
        None => None,
    };

    Ok(Incident {
        timestamp,
        primary_type,
        district,
        latitude,
        longitude,
        arrest,
    })
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` and bare dates.
/// Offsets are dropped; incidents are bucketed by their local wall-clock time.
pub fn parse_timestamp(raw: &str) -> Option<PrimitiveDateTime> {
    let raw = raw.trim();
    if let Ok(parsed) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(PrimitiveDateTime::new(parsed.date(), parsed.time()));
    }
    PrimitiveDateTime::parse(raw, format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        .or_else(|_| {
            PrimitiveDateTime::parse(
                raw,
                format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
            )
        })
        .ok()
        .or_else(|| {
            Date::parse(raw, format_description!("[year]-[month]-[day]"))
                .ok()
                .map(Date::midnight)
        })
}

fn text_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.trim().to_string(),
        other => other.to_string(),
    }
}

fn number_value(value: &serde_json::Value) -> Option<f64> {
    let number = match value {
        serde_json::Value::Number(number) => number.as_f64(),
        serde_json::Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

fn bool_value(value: &serde_json::Value) -> Option<bool> {
    match value {
        serde_json::Value::Bool(flag) => Some(*flag),
        serde_json::Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        serde_json::Value::Number(number) => match number.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        _ => None,
    }
}
