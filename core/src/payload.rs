//! Typed payloads, one struct per artifact kind.
//!
//! Tasks build these and convert them into a [`Value`] tree for the
//! canonicalizer. Floats stay `Value::Float` through the conversion, so a
//! non-finite value is still rejected with its path.

use crate::capability::{CapabilityKind, Hotspot};
use crate::value::Value;
use std::collections::BTreeMap;

/// Parallel `labels` / `values` arrays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series<T> {
    pub labels: Vec<String>,
    pub values: Vec<T>,
}

impl<T> Series<T> {
    pub fn new(labels: Vec<String>, values: Vec<T>) -> Self {
        Self { labels, values }
    }

    pub fn fixed(labels: &[&str], values: Vec<T>) -> Self {
        Self::new(labels.iter().map(|label| (*label).to_string()).collect(), values)
    }
}

impl<T: Into<Value>> From<Series<T>> for Value {
    fn from(series: Series<T>) -> Self {
        Value::object([
            ("labels", Value::from(series.labels)),
            ("values", Value::from(series.values)),
        ])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetadataPayload {
    pub total_incidents: usize,
    /// Empty, or first and last incident date.
    pub date_range: Vec<String>,
    pub days_covered: usize,
    pub crime_types: Vec<String>,
    pub districts: Vec<String>,
    pub columns: Vec<String>,
    pub capabilities: BTreeMap<CapabilityKind, bool>,
    pub arrest_rate: f64,
}

impl From<MetadataPayload> for Value {
    fn from(payload: MetadataPayload) -> Self {
        let capabilities = payload
            .capabilities
            .into_iter()
            .map(|(kind, present)| (kind.name(), Value::Bool(present)));
        Value::object([
            ("total_incidents", Value::from(payload.total_incidents)),
            ("date_range", Value::from(payload.date_range)),
            ("days_covered", Value::from(payload.days_covered)),
            ("crime_types", Value::from(payload.crime_types)),
            ("districts", Value::from(payload.districts)),
            ("columns", Value::from(payload.columns)),
            ("capabilities", Value::object(capabilities)),
            ("arrest_rate", Value::Float(payload.arrest_rate)),
        ])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendSummary {
    pub total: usize,
    pub mean_daily: f64,
    pub peak_day: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendsPayload {
    pub daily: Series<usize>,
    pub monthly: Series<usize>,
    pub rolling_7d: Series<f64>,
    /// Crime type to monthly series over the same months as `monthly`.
    pub by_type: BTreeMap<String, Series<usize>>,
    pub summary: TrendSummary,
}

impl From<TrendsPayload> for Value {
    fn from(payload: TrendsPayload) -> Self {
        Value::object([
            ("daily", Value::from(payload.daily)),
            ("monthly", Value::from(payload.monthly)),
            ("rolling_7d", Value::from(payload.rolling_7d)),
            ("by_type", Value::from(payload.by_type)),
            (
                "summary",
                Value::object([
                    ("total", Value::from(payload.summary.total)),
                    ("mean_daily", Value::Float(payload.summary.mean_daily)),
                    ("peak_day", Value::from(payload.summary.peak_day)),
                ]),
            ),
        ])
    }
}

/// Weekday by hour incident counts.
#[derive(Debug, Clone, PartialEq)]
pub struct Heatmap {
    pub weekdays: Vec<String>,
    pub hours: Vec<String>,
    pub counts: Vec<Vec<usize>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeasonalityPayload {
    pub by_hour: Series<usize>,
    pub by_weekday: Series<usize>,
    pub by_month: Series<usize>,
    pub heatmap: Heatmap,
}

impl From<SeasonalityPayload> for Value {
    fn from(payload: SeasonalityPayload) -> Self {
        Value::object([
            ("by_hour", Value::from(payload.by_hour)),
            ("by_weekday", Value::from(payload.by_weekday)),
            ("by_month", Value::from(payload.by_month)),
            (
                "heatmap",
                Value::object([
                    ("weekdays", Value::from(payload.heatmap.weekdays)),
                    ("hours", Value::from(payload.heatmap.hours)),
                    ("counts", Value::from(payload.heatmap.counts)),
                ]),
            ),
        ])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncidentPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub crime_type: String,
    pub date: Option<String>,
}

impl From<IncidentPoint> for Value {
    fn from(point: IncidentPoint) -> Self {
        Value::object([
            ("lat", Value::Float(point.latitude)),
            ("lon", Value::Float(point.longitude)),
            ("type", Value::from(point.crime_type)),
            ("date", Value::from(point.date)),
        ])
    }
}

impl From<Hotspot> for Value {
    fn from(hotspot: Hotspot) -> Self {
        Value::object([
            ("lat", Value::Float(hotspot.latitude)),
            ("lon", Value::Float(hotspot.longitude)),
            ("count", Value::from(hotspot.count)),
            ("radius_km", Value::Float(hotspot.radius_km)),
        ])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpatialPayload {
    pub points: Vec<IncidentPoint>,
    pub total_points: usize,
    pub hotspots: Vec<Hotspot>,
    pub by_district: BTreeMap<String, usize>,
    /// Empty, or `[min_lat, min_lon, max_lat, max_lon]`.
    pub bounds: Vec<f64>,
    pub method: String,
}

impl From<SpatialPayload> for Value {
    fn from(payload: SpatialPayload) -> Self {
        Value::object([
            ("points", Value::from(payload.points)),
            ("total_points", Value::from(payload.total_points)),
            ("hotspots", Value::from(payload.hotspots)),
            ("by_district", Value::from(payload.by_district)),
            ("bounds", Value::from(payload.bounds)),
            ("method", Value::from(payload.method)),
        ])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

impl From<FeatureImportance> for Value {
    fn from(entry: FeatureImportance) -> Self {
        Value::object([
            ("feature", Value::from(entry.feature)),
            ("importance", Value::Float(entry.importance)),
        ])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastModel {
    pub name: String,
    pub ranker: String,
    pub degraded: bool,
    pub feature_importances: Vec<FeatureImportance>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastingPayload {
    pub horizon_days: usize,
    pub horizon: Vec<usize>,
    pub dates: Vec<String>,
    pub predicted: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub history: Series<usize>,
    pub model: ForecastModel,
}

impl From<ForecastingPayload> for Value {
    fn from(payload: ForecastingPayload) -> Self {
        Value::object([
            ("horizon_days", Value::from(payload.horizon_days)),
            ("horizon", Value::from(payload.horizon)),
            ("dates", Value::from(payload.dates)),
            ("predicted", Value::from(payload.predicted)),
            ("lower", Value::from(payload.lower)),
            ("upper", Value::from(payload.upper)),
            ("history", Value::from(payload.history)),
            (
                "model",
                Value::object([
                    ("name", Value::from(payload.model.name)),
                    ("ranker", Value::from(payload.model.ranker)),
                    ("degraded", Value::Bool(payload.model.degraded)),
                    (
                        "feature_importances",
                        Value::from(payload.model.feature_importances),
                    ),
                ]),
            ),
        ])
    }
}

/// Any of the five payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Metadata(MetadataPayload),
    Trends(TrendsPayload),
    Seasonality(SeasonalityPayload),
    Spatial(SpatialPayload),
    Forecasting(ForecastingPayload),
}

impl From<Payload> for Value {
    fn from(payload: Payload) -> Self {
        match payload {
            Payload::Metadata(payload) => payload.into(),
            Payload::Trends(payload) => payload.into(),
            Payload::Seasonality(payload) => payload.into(),
            Payload::Spatial(payload) => payload.into(),
            Payload::Forecasting(payload) => payload.into(),
        }
    }
}
