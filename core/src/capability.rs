//! Optional analytical capabilities injected into the exporter.
//!
//! A task checks for its provider once; an absent provider selects the
//! task's fallback path and records a warning, it is never an error.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Spatial,
    Forecasting,
    Importance,
}

impl CapabilityKind {
    pub const ALL: [CapabilityKind; 3] = [
        CapabilityKind::Spatial,
        CapabilityKind::Forecasting,
        CapabilityKind::Importance,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CapabilityKind::Spatial => "spatial",
            CapabilityKind::Forecasting => "forecasting",
            CapabilityKind::Importance => "importance",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hotspot {
    pub latitude: f64,
    pub longitude: f64,
    pub count: usize,
    pub radius_km: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    pub predicted: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

/// Named feature columns aligned with a target series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    pub names: Vec<String>,
    pub columns: Vec<Vec<f64>>,
}

pub trait SpatialJoiner {
    fn name(&self) -> &'static str;
    /// Returns at most `limit` hotspots, densest first.
    fn hotspots(&self, points: &[GeoPoint], limit: usize) -> Vec<Hotspot>;
}

pub trait TimeSeriesModeler {
    fn name(&self) -> &'static str;
    fn forecast(&self, history: &[f64], horizon: usize) -> Forecast;
}

pub trait ImportanceRanker {
    fn name(&self) -> &'static str;
    /// Returns `(feature, importance)` pairs, most important first.
    fn rank(&self, features: &FeatureTable, target: &[f64]) -> Vec<(String, f64)>;
}

#[derive(Default)]
pub struct Capabilities {
    pub spatial: Option<Box<dyn SpatialJoiner>>,
    pub modeler: Option<Box<dyn TimeSeriesModeler>>,
    pub ranker: Option<Box<dyn ImportanceRanker>>,
}

impl Capabilities {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        Self {
            spatial: Some(Box::new(GridHotspots::default())),
            modeler: Some(Box::new(HoltLinear::default())),
            ranker: Some(Box::new(CorrelationRanker)),
        }
    }

    pub fn without(mut self, kind: CapabilityKind) -> Self {
        match kind {
            CapabilityKind::Spatial => self.spatial = None,
            CapabilityKind::Forecasting => self.modeler = None,
            CapabilityKind::Importance => self.ranker = None,
        }
        self
    }

    pub fn has(&self, kind: CapabilityKind) -> bool {
        match kind {
            CapabilityKind::Spatial => self.spatial.is_some(),
            CapabilityKind::Forecasting => self.modeler.is_some(),
            CapabilityKind::Importance => self.ranker.is_some(),
        }
    }

    pub fn presence(&self) -> BTreeMap<CapabilityKind, bool> {
        CapabilityKind::ALL
            .iter()
            .map(|kind| (*kind, self.has(*kind)))
            .collect()
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("spatial", &self.spatial.as_ref().map(|provider| provider.name()))
            .field("modeler", &self.modeler.as_ref().map(|provider| provider.name()))
            .field("ranker", &self.ranker.as_ref().map(|provider| provider.name()))
            .finish()
    }
}

/// Bins points into a fixed lat/lon grid and reports the densest cells.
#[derive(Debug, Clone)]
pub struct GridHotspots {
    pub cell_degrees: f64,
    pub min_count: usize,
}

impl Default for GridHotspots {
    fn default() -> Self {
        Self {
            cell_degrees: 0.01,
            min_count: 2,
        }
    }
}

#[derive(Default)]
struct Cell {
    count: usize,
    lat_sum: f64,
    lon_sum: f64,
    members: Vec<GeoPoint>,
}

impl SpatialJoiner for GridHotspots {
    fn name(&self) -> &'static str {
        "grid"
    }

    fn hotspots(&self, points: &[GeoPoint], limit: usize) -> Vec<Hotspot> {
        if self.cell_degrees <= 0.0 {
            return Vec::new();
        }
        let mut cells: BTreeMap<(i64, i64), Cell> = BTreeMap::new();
        for point in points {
            let key = (
                (point.latitude / self.cell_degrees).floor() as i64,
                (point.longitude / self.cell_degrees).floor() as i64,
            );
            let cell = cells.entry(key).or_default();
            cell.count += 1;
            cell.lat_sum += point.latitude;
            cell.lon_sum += point.longitude;
            cell.members.push(*point);
        }

        let mut ranked: Vec<((i64, i64), Cell)> = cells
            .into_iter()
            .filter(|(_, cell)| cell.count >= self.min_count.max(1))
            .collect();
        // Ties fall back to grid order, which keeps the output stable.
        ranked.sort_by(|(key_a, a), (key_b, b)| b.count.cmp(&a.count).then(key_a.cmp(key_b)));

        ranked
            .into_iter()
            .take(limit)
            .map(|(_, cell)| {
                let count = cell.count as f64;
                let center = GeoPoint {
                    latitude: cell.lat_sum / count,
                    longitude: cell.lon_sum / count,
                };
                let radius_km = cell
                    .members
                    .iter()
                    .map(|member| haversine_km(center, *member))
                    .fold(0.0, f64::max);
                Hotspot {
                    latitude: center.latitude,
                    longitude: center.longitude,
                    count: cell.count,
                    radius_km,
                }
            })
            .collect()
    }
}

pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Holt's linear (double exponential) smoothing with residual-based bands.
#[derive(Debug, Clone)]
pub struct HoltLinear {
    pub alpha: f64,
    pub beta: f64,
}

impl Default for HoltLinear {
    fn default() -> Self {
        Self {
            alpha: 0.3,
            beta: 0.1,
        }
    }
}

impl TimeSeriesModeler for HoltLinear {
    fn name(&self) -> &'static str {
        "holt_linear"
    }

    fn forecast(&self, history: &[f64], horizon: usize) -> Forecast {
        let Some((&first, rest)) = history.split_first() else {
            return Forecast {
                predicted: vec![0.0; horizon],
                lower: vec![0.0; horizon],
                upper: vec![0.0; horizon],
            };
        };

        let mut level = first;
        let mut trend = rest.first().map_or(0.0, |second| second - first);
        let mut squared_error = 0.0;
        for &observed in rest {
            let expected = level + trend;
            squared_error += (observed - expected).powi(2);
            let next_level = self.alpha * observed + (1.0 - self.alpha) * expected;
            trend = self.beta * (next_level - level) + (1.0 - self.beta) * trend;
            level = next_level;
        }
        let sigma = if rest.is_empty() {
            0.0
        } else {
            (squared_error / rest.len() as f64).sqrt()
        };

        let mut forecast = Forecast {
            predicted: Vec::with_capacity(horizon),
            lower: Vec::with_capacity(horizon),
            upper: Vec::with_capacity(horizon),
        };
        for step in 1..=horizon {
            let point = (level + step as f64 * trend).max(0.0);
            let band = 1.96 * sigma * (step as f64).sqrt();
            forecast.predicted.push(point);
            forecast.lower.push((point - band).max(0.0));
            forecast.upper.push(point + band);
        }
        forecast
    }
}

/// Ranks features by absolute Pearson correlation with the target, normalised to sum to one.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationRanker;

impl ImportanceRanker for CorrelationRanker {
    fn name(&self) -> &'static str {
        "correlation"
    }

    fn rank(&self, features: &FeatureTable, target: &[f64]) -> Vec<(String, f64)> {
        let scores: Vec<f64> = features
            .columns
            .iter()
            .map(|column| pearson(column, target).abs())
            .collect();
        let total: f64 = scores.iter().sum();
        let count = features.names.len().max(1) as f64;

        let mut ranked: Vec<(String, f64)> = features
            .names
            .iter()
            .zip(scores)
            .map(|(name, score)| {
                let share = if total > 0.0 { score / total } else { 1.0 / count };
                (name.clone(), share)
            })
            .collect();
        ranked.sort_by(|(name_a, a), (name_b, b)| b.total_cmp(a).then_with(|| name_a.cmp(name_b)));
        ranked
    }
}

fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }
    let mean_x = xs[..n].iter().sum::<f64>() / n as f64;
    let mean_y = ys[..n].iter().sum::<f64>() / n as f64;
    let mut covariance = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs[..n].iter().zip(&ys[..n]) {
        covariance += (x - mean_x) * (y - mean_y);
        var_x += (x - mean_x).powi(2);
        var_y += (y - mean_y).powi(2);
    }
    if var_x <= f64::EPSILON || var_y <= f64::EPSILON {
        return 0.0;
    }
    covariance / (var_x.sqrt() * var_y.sqrt())
}
