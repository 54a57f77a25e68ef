use crate::capability::{
    CapabilityKind, FeatureTable, Forecast, GeoPoint, ImportanceRanker, SpatialJoiner,
    TimeSeriesModeler,
};
use crate::dataset::{self, Dataset, Incident};
use crate::export::ExportSettings;
use crate::payload::{
    FeatureImportance, ForecastModel, ForecastingPayload, Heatmap, IncidentPoint,
    MetadataPayload, SeasonalityPayload, Series, SpatialPayload, TrendSummary, TrendsPayload,
};
use std::collections::{BTreeMap, BTreeSet};
use time::Date;

const HOURS: [&str; 24] = [
    "00", "01", "02", "03", "04", "05", "06", "07", "08", "09", "10", "11", "12", "13", "14",
    "15", "16", "17", "18", "19", "20", "21", "22", "23",
];
const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];
const ROLLING_WINDOW: usize = 7;
const UNKNOWN_TYPE: &str = "UNKNOWN";

/// Ranking emitted when no importance ranker is available.
pub const DEFAULT_IMPORTANCES: [(&str, f64); 5] = [
    ("lag_1", 0.3),
    ("lag_7", 0.25),
    ("rolling_7", 0.2),
    ("day_of_week", 0.15),
    ("month", 0.1),
];

/// A task's payload plus the optional capabilities it had to do without.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TaskOutput<P> {
    pub payload: P,
    pub missing: Vec<CapabilityKind>,
}

impl<P> TaskOutput<P> {
    pub fn complete(payload: P) -> Self {
        Self {
            payload,
            missing: Vec::new(),
        }
    }

    pub fn map<Q>(self, wrap: impl FnOnce(P) -> Q) -> TaskOutput<Q> {
        TaskOutput {
            payload: wrap(self.payload),
            missing: self.missing,
        }
    }
}

/// Zero-filled incident counts for every day between the first and last incident.
#[derive(Debug, Clone, Default, PartialEq)]
struct DailyCounts {
    dates: Vec<Date>,
    counts: Vec<usize>,
}

impl DailyCounts {
    fn from_dataset(dataset: &Dataset) -> Self {
        let mut by_day: BTreeMap<Date, usize> = BTreeMap::new();
        for date in dataset.incidents().iter().filter_map(Incident::date) {
            *by_day.entry(date).or_insert(0) += 1;
        }
        let (Some(&first), Some(&last)) = (by_day.keys().next(), by_day.keys().next_back()) else {
            return Self::default();
        };

        let mut daily = Self::default();
        let mut day = first;
        loop {
            daily.dates.push(day);
            daily.counts.push(by_day.get(&day).copied().unwrap_or(0));
            if day >= last {
                break;
            }
            match day.next_day() {
                Some(next) => day = next,
                None => break,
            }
        }
        daily
    }

    fn labels(&self) -> Vec<String> {
        self.dates.iter().copied().map(format_date).collect()
    }

    fn history(&self) -> Vec<f64> {
        self.counts.iter().map(|count| *count as f64).collect()
    }
}

pub(crate) fn format_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

fn month_label(date: Date) -> String {
    format!("{:04}-{:02}", date.year(), u8::from(date.month()))
}

fn labels(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_string()).collect()
}

pub(crate) fn metadata(
    dataset: &Dataset,
    presence: BTreeMap<CapabilityKind, bool>,
) -> MetadataPayload {
    let incidents = dataset.incidents();
    let dates: Vec<Date> = incidents.iter().filter_map(Incident::date).collect();
    let date_range = match (dates.iter().min(), dates.iter().max()) {
        (Some(first), Some(last)) => vec![format_date(*first), format_date(*last)],
        _ => Vec::new(),
    };
    let days_covered = DailyCounts::from_dataset(dataset).dates.len();

    let crime_types: BTreeSet<&str> = incidents
        .iter()
        .filter_map(|incident| incident.primary_type.as_deref())
        .collect();
    let districts: BTreeSet<&str> = incidents
        .iter()
        .filter_map(|incident| incident.district.as_deref())
        .collect();

    let outcomes: Vec<bool> = incidents.iter().filter_map(|incident| incident.arrest).collect();
    let arrest_rate = if outcomes.is_empty() {
        0.0
    } else {
        outcomes.iter().filter(|arrested| **arrested).count() as f64 / outcomes.len() as f64
    };

    MetadataPayload {
        total_incidents: incidents.len(),
        date_range,
        days_covered,
        crime_types: crime_types.into_iter().map(str::to_string).collect(),
        districts: districts.into_iter().map(str::to_string).collect(),
        columns: dataset.columns().map(str::to_string).collect(),
        capabilities: presence,
        arrest_rate,
    }
}

pub(crate) fn trends(dataset: &Dataset) -> TrendsPayload {
    let daily = DailyCounts::from_dataset(dataset);
    let labels = daily.labels();

    let mut monthly: BTreeMap<String, usize> = BTreeMap::new();
    for (date, count) in daily.dates.iter().zip(&daily.counts) {
        *monthly.entry(month_label(*date)).or_insert(0) += count;
    }
    let month_labels: Vec<String> = monthly.keys().cloned().collect();

    let mut by_type: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
    for incident in dataset.incidents() {
        if let Some(date) = incident.date() {
            let kind = incident.primary_type.as_deref().unwrap_or(UNKNOWN_TYPE);
            *by_type
                .entry(kind.to_string())
                .or_default()
                .entry(month_label(date))
                .or_insert(0) += 1;
        }
    }
    let by_type: BTreeMap<String, Series<usize>> = by_type
        .into_iter()
        .map(|(kind, counts)| {
            let values: Vec<usize> = month_labels
                .iter()
                .map(|month| counts.get(month).copied().unwrap_or(0))
                .collect();
            (kind, Series::new(month_labels.clone(), values))
        })
        .collect();

    let rolling: Vec<f64> = (0..daily.counts.len())
        .map(|index| {
            let start = (index + 1).saturating_sub(ROLLING_WINDOW);
            let window = &daily.counts[start..=index];
            window.iter().sum::<usize>() as f64 / window.len() as f64
        })
        .collect();

    let total: usize = daily.counts.iter().sum();
    let mean_daily = if daily.counts.is_empty() {
        0.0
    } else {
        total as f64 / daily.counts.len() as f64
    };
    let mut peak: Option<(usize, usize)> = None;
    for (index, count) in daily.counts.iter().enumerate() {
        if peak.map_or(true, |(_, best)| *count > best) {
            peak = Some((index, *count));
        }
    }
    let peak_day = peak
        .and_then(|(index, _)| labels.get(index).cloned())
        .unwrap_or_default();

    TrendsPayload {
        daily: Series::new(labels.clone(), daily.counts),
        monthly: Series::new(month_labels, monthly.into_values().collect()),
        rolling_7d: Series::new(labels, rolling),
        by_type,
        summary: TrendSummary {
            total,
            mean_daily,
            peak_day,
        },
    }
}

pub(crate) fn seasonality(dataset: &Dataset) -> SeasonalityPayload {
    let mut by_hour = [0usize; 24];
    let mut by_weekday = [0usize; 7];
    let mut by_month = [0usize; 12];
    let mut heatmap = [[0usize; 24]; 7];

    for timestamp in dataset.incidents().iter().filter_map(|incident| incident.timestamp) {
        let hour = usize::from(timestamp.hour());
        let weekday = usize::from(timestamp.weekday().number_days_from_monday());
        let month = usize::from(u8::from(timestamp.month())) - 1;
        by_hour[hour] += 1;
        by_weekday[weekday] += 1;
        by_month[month] += 1;
        heatmap[weekday][hour] += 1;
    }

    SeasonalityPayload {
        by_hour: Series::fixed(&HOURS, by_hour.to_vec()),
        by_weekday: Series::fixed(&WEEKDAYS, by_weekday.to_vec()),
        by_month: Series::fixed(&MONTHS, by_month.to_vec()),
        heatmap: Heatmap {
            weekdays: labels(&WEEKDAYS),
            hours: labels(&HOURS),
            counts: heatmap.iter().map(|row| row.to_vec()).collect(),
        },
    }
}

pub(crate) fn spatial(
    dataset: &Dataset,
    joiner: Option<&dyn SpatialJoiner>,
    settings: &ExportSettings,
) -> TaskOutput<SpatialPayload> {
    // Without coordinate columns nothing is located.
    let candidates: &[Incident] =
        if dataset.has_column(dataset::LATITUDE) && dataset.has_column(dataset::LONGITUDE) {
            dataset.incidents()
        } else {
            &[]
        };
    let mut located: Vec<(&Incident, GeoPoint)> = candidates
        .iter()
        .filter_map(|incident| {
            incident.location().map(|(latitude, longitude)| {
                (
                    incident,
                    GeoPoint {
                        latitude,
                        longitude,
                    },
                )
            })
        })
        .collect();
    located.sort_by_key(|(incident, _)| incident.timestamp);

    let points: Vec<IncidentPoint> = located
        .iter()
        .take(settings.point_limit)
        .map(|(incident, point)| IncidentPoint {
            latitude: point.latitude,
            longitude: point.longitude,
            crime_type: incident
                .primary_type
                .clone()
                .unwrap_or_else(|| UNKNOWN_TYPE.to_string()),
            date: incident.date().map(format_date),
        })
        .collect();

    let mut by_district: BTreeMap<String, usize> = BTreeMap::new();
    for district in dataset
        .incidents()
        .iter()
        .filter_map(|incident| incident.district.as_deref())
    {
        *by_district.entry(district.to_string()).or_insert(0) += 1;
    }

    let geo: Vec<GeoPoint> = located.iter().map(|(_, point)| *point).collect();
    let bounds = match geo.split_first() {
        Some((first, rest)) => {
            let init = [first.latitude, first.longitude, first.latitude, first.longitude];
            let [min_lat, min_lon, max_lat, max_lon] = rest.iter().fold(init, |acc, point| {
                [
                    acc[0].min(point.latitude),
                    acc[1].min(point.longitude),
                    acc[2].max(point.latitude),
                    acc[3].max(point.longitude),
                ]
            });
            vec![min_lat, min_lon, max_lat, max_lon]
        }
        None => Vec::new(),
    };

    let (hotspots, method, missing) = match joiner {
        Some(joiner) => (
            joiner.hotspots(&geo, settings.hotspot_limit),
            joiner.name(),
            Vec::new(),
        ),
        None => (Vec::new(), "none", vec![CapabilityKind::Spatial]),
    };

    TaskOutput {
        payload: SpatialPayload {
            points,
            total_points: geo.len(),
            hotspots,
            by_district,
            bounds,
            method: method.to_string(),
        },
        missing,
    }
}

pub(crate) fn forecasting(
    dataset: &Dataset,
    modeler: Option<&dyn TimeSeriesModeler>,
    ranker: Option<&dyn ImportanceRanker>,
    settings: &ExportSettings,
) -> TaskOutput<ForecastingPayload> {
    let horizon = settings.forecast_horizon.max(1);
    let daily = DailyCounts::from_dataset(dataset);
    let history = daily.history();
    let mut missing = Vec::new();

    let (model_name, forecast) = match modeler {
        Some(modeler) => (modeler.name(), modeler.forecast(&history, horizon)),
        None => {
            missing.push(CapabilityKind::Forecasting);
            ("linear_trend", linear_trend(&history, horizon))
        }
    };

    let ranked = match ranker {
        Some(ranker) => {
            let ranked = ranker.rank(&feature_table(&daily), &history);
            (!ranked.is_empty()).then(|| (ranker.name(), ranked))
        }
        None => {
            missing.push(CapabilityKind::Importance);
            None
        }
    };
    let (ranker_name, importances) = ranked.unwrap_or_else(|| ("default", default_importances()));

    let mut dates = Vec::with_capacity(horizon);
    let mut cursor = daily.dates.last().copied();
    while dates.len() < horizon {
        match cursor.and_then(Date::next_day) {
            Some(next) => {
                dates.push(format_date(next));
                cursor = Some(next);
            }
            None => break,
        }
    }

    let payload = ForecastingPayload {
        horizon_days: horizon,
        horizon: (1..=horizon).collect(),
        dates,
        predicted: forecast.predicted,
        lower: forecast.lower,
        upper: forecast.upper,
        history: Series::new(daily.labels(), daily.counts),
        model: ForecastModel {
            name: model_name.to_string(),
            ranker: ranker_name.to_string(),
            degraded: !missing.is_empty(),
            feature_importances: importances
                .into_iter()
                .map(|(feature, importance)| FeatureImportance {
                    feature,
                    importance,
                })
                .collect(),
        },
    };

    TaskOutput { payload, missing }
}

fn default_importances() -> Vec<(String, f64)> {
    DEFAULT_IMPORTANCES
        .iter()
        .map(|(feature, importance)| ((*feature).to_string(), *importance))
        .collect()
}

/// Least-squares line through the history, extended over the horizon.
fn linear_trend(history: &[f64], horizon: usize) -> Forecast {
    let n = history.len();
    let (intercept, slope) = if n < 2 {
        (history.first().copied().unwrap_or(0.0), 0.0)
    } else {
        let mean_x = (n - 1) as f64 / 2.0;
        let mean_y = history.iter().sum::<f64>() / n as f64;
        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for (index, value) in history.iter().enumerate() {
            let dx = index as f64 - mean_x;
            numerator += dx * (value - mean_y);
            denominator += dx * dx;
        }
        let slope = numerator / denominator;
        (mean_y - slope * mean_x, slope)
    };

    let last_index = n.saturating_sub(1) as f64;
    let predicted: Vec<f64> = (1..=horizon)
        .map(|step| (intercept + slope * (last_index + step as f64)).max(0.0))
        .collect();
    Forecast {
        lower: predicted.clone(),
        upper: predicted.clone(),
        predicted,
    }
}

fn feature_table(daily: &DailyCounts) -> FeatureTable {
    let counts = daily.history();
    let lag = |index: usize, by: usize| index.checked_sub(by).map_or(0.0, |at| counts[at]);

    let mut day_of_week = Vec::with_capacity(counts.len());
    let mut month = Vec::with_capacity(counts.len());
    let mut lag_1 = Vec::with_capacity(counts.len());
    let mut lag_7 = Vec::with_capacity(counts.len());
    let mut rolling_7 = Vec::with_capacity(counts.len());
    for (index, date) in daily.dates.iter().enumerate() {
        day_of_week.push(f64::from(date.weekday().number_days_from_monday()));
        month.push(f64::from(u8::from(date.month())));
        lag_1.push(lag(index, 1));
        lag_7.push(lag(index, 7));
        let start = index.saturating_sub(ROLLING_WINDOW);
        let previous = &counts[start..index];
        rolling_7.push(if previous.is_empty() {
            0.0
        } else {
            previous.iter().sum::<f64>() / previous.len() as f64
        });
    }

    FeatureTable {
        names: vec![
            "day_of_week".to_string(),
            "month".to_string(),
            "lag_1".to_string(),
            "lag_7".to_string(),
            "rolling_7".to_string(),
        ],
        columns: vec![day_of_week, month, lag_1, lag_7, rolling_7],
    }
}
