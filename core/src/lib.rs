pub mod artifact;
pub mod canonical;
pub mod capability;
pub mod dataset;
pub mod export;
pub mod payload;
pub mod refresh;
pub mod reproducibility;
mod tasks;
pub mod validation;
pub mod value;

pub use artifact::{
    write_artifact, Artifact, ArtifactKind, ArtifactSummary, CapabilityWarning, ExportRun,
    WriteError,
};
pub use canonical::{canonicalize, recanonicalize, CanonicalError};
pub use capability::{
    Capabilities, CapabilityKind, CorrelationRanker, FeatureTable, Forecast, GeoPoint,
    GridHotspots, HoltLinear, Hotspot, ImportanceRanker, SpatialJoiner, TimeSeriesModeler,
};
pub use dataset::{Dataset, DatasetError, Incident};
pub use export::{ExportError, ExportSettings, Exporter};
pub use payload::{
    FeatureImportance, ForecastModel, ForecastingPayload, Heatmap, IncidentPoint,
    MetadataPayload, Payload, SeasonalityPayload, Series, SpatialPayload, TrendSummary,
    TrendsPayload,
};
pub use refresh::{
    refresh, RefreshOptions, RefreshOutcome, RefreshReport, RefreshStage, RefreshStatus,
};
pub use reproducibility::{verify, Difference, ReproducibilityReport};
pub use tasks::DEFAULT_IMPORTANCES;
pub use validation::{
    validate, validate_all, validate_dir, validate_document, validate_file, ValidationResult,
    Violation, ViolationKind,
};
pub use value::{FieldPath, Value};
