use anyhow::{anyhow, Context};
use refresh_core::{Capabilities, CapabilityKind, ExportSettings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const OUTPUT_DIR_ENV: &str = "REFRESH_OUTPUT_DIR";
pub const DEFAULT_OUTPUT_DIR: &str = "artifacts";

/// Contents of the optional `--config` YAML file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RefreshConfig {
    pub dataset: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub forecast_horizon: usize,
    pub hotspot_limit: usize,
    pub point_limit: usize,
    pub capabilities: CapabilityToggles,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        let settings = ExportSettings::default();
        Self {
            dataset: None,
            output_dir: None,
            forecast_horizon: settings.forecast_horizon,
            hotspot_limit: settings.hotspot_limit,
            point_limit: settings.point_limit,
            capabilities: CapabilityToggles::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CapabilityToggles {
    pub spatial: bool,
    pub forecasting: bool,
    pub importance: bool,
}

impl Default for CapabilityToggles {
    fn default() -> Self {
        Self {
            spatial: true,
            forecasting: true,
            importance: true,
        }
    }
}

impl CapabilityToggles {
    fn enabled(&self, kind: CapabilityKind) -> bool {
        match kind {
            CapabilityKind::Spatial => self.spatial,
            CapabilityKind::Forecasting => self.forecasting,
            CapabilityKind::Importance => self.importance,
        }
    }
}

impl RefreshConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn settings(&self) -> ExportSettings {
        ExportSettings {
            forecast_horizon: self.forecast_horizon,
            hotspot_limit: self.hotspot_limit,
            point_limit: self.point_limit,
        }
    }

    /// `explicit` already carries the flag or `REFRESH_OUTPUT_DIR` value, as resolved by clap.
    pub fn resolve_output_root(&self, explicit: Option<PathBuf>) -> PathBuf {
        explicit
            .or_else(|| self.output_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
    }

    pub fn resolve_dataset(&self, explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
        explicit.or_else(|| self.dataset.clone()).ok_or_else(|| {
            anyhow!("no dataset given; pass --dataset or set `dataset` in the config file")
        })
    }

    /// Built-in providers, minus anything switched off in the config or via `--disable`.
    pub fn capabilities(&self, disabled: &[CapabilityKind]) -> Capabilities {
        CapabilityKind::ALL
            .iter()
            .filter(|kind| !self.capabilities.enabled(**kind) || disabled.contains(*kind))
            .fold(Capabilities::builtin(), |capabilities, kind| {
                capabilities.without(*kind)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = RefreshConfig::from_yaml_str("").expect("empty config");
        assert_eq!(config, RefreshConfig::default());
        assert_eq!(config.settings(), ExportSettings::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = RefreshConfig::from_yaml_str(
            "forecast_horizon: 7\ncapabilities:\n  spatial: false\n",
        )
        .expect("parse config");
        assert_eq!(config.forecast_horizon, 7);
        assert_eq!(config.hotspot_limit, 20);
        assert!(!config.capabilities.spatial);
        assert!(config.capabilities.forecasting);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = RefreshConfig::from_yaml_str("forecast_days: 7\n").expect_err("unknown key");
        assert!(err.to_string().contains("forecast_days"));
    }

    #[test]
    fn output_root_prefers_explicit_then_config_then_default() {
        let mut config = RefreshConfig::default();
        assert_eq!(
            config.resolve_output_root(None),
            PathBuf::from(DEFAULT_OUTPUT_DIR)
        );

        config.output_dir = Some(PathBuf::from("from-config"));
        assert_eq!(config.resolve_output_root(None), PathBuf::from("from-config"));
        assert_eq!(
            config.resolve_output_root(Some(PathBuf::from("from-flag"))),
            PathBuf::from("from-flag")
        );
    }

    #[test]
    fn missing_dataset_is_an_error() {
        let config = RefreshConfig::default();
        assert!(config.resolve_dataset(None).is_err());
        assert_eq!(
            config
                .resolve_dataset(Some(PathBuf::from("crimes.json")))
                .expect("explicit dataset"),
            PathBuf::from("crimes.json")
        );
    }

    #[test]
    fn disabled_capabilities_are_removed() {
        let config = RefreshConfig::from_yaml_str("capabilities:\n  importance: false\n")
            .expect("parse config");
        let capabilities = config.capabilities(&[CapabilityKind::Spatial]);
        assert!(!capabilities.has(CapabilityKind::Spatial));
        assert!(capabilities.has(CapabilityKind::Forecasting));
        assert!(!capabilities.has(CapabilityKind::Importance));
    }
}
