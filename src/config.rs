//! Surface renderer configuration
//!
//! Read from a TOML file. Every field has a default, so an empty file is a
//! valid configuration. Relative paths resolve against the file's directory.

use crate::color_ramp::MAX_RAMP_ENTRIES;
use crate::error::{ErrorContext, SurfaceError, SurfaceResult};
use crate::shader::{FeatureConfig, ShadowMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Feature toggles as written in the configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureToggles {
    #[serde(default = "default_true")]
    pub illuminate: bool,
    #[serde(default)]
    pub shadows: bool,
    #[serde(default = "default_true")]
    pub contour_lines: bool,
    /// Only takes effect while a DEM is attached
    #[serde(default)]
    pub dem_deviation: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            illuminate: true,
            shadows: false,
            contour_lines: true,
            dem_deviation: false,
        }
    }
}

/// Main surface configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceConfig {
    /// Color ramp file (`.cpt` or comma separated)
    #[serde(default = "default_color_ramp")]
    pub color_ramp: PathBuf,

    /// Length of the ramp lookup table
    #[serde(default = "default_ramp_entries")]
    pub ramp_entries: usize,

    /// Directory overriding the built-in shader templates
    #[serde(default)]
    pub shader_directory: Option<PathBuf>,

    #[serde(default = "default_poll_interval")]
    pub watch_poll_interval_ms: u64,

    /// Elevation distance between contour lines
    #[serde(default = "default_contour_spacing")]
    pub contour_line_spacing: f64,

    /// Elevation difference mapped to full red or blue in DEM deviation mode
    #[serde(default = "default_dem_scale")]
    pub dem_dist_scale: f64,

    /// Edge length of the square shadow map
    #[serde(default = "default_shadow_map_size")]
    pub shadow_map_size: u32,

    #[serde(default = "default_clear_color")]
    pub clear_color: [f32; 4],

    #[serde(default)]
    pub features: FeatureToggles,
}

fn default_true() -> bool {
    true
}

fn default_color_ramp() -> PathBuf {
    PathBuf::from("HeightColorMap.cpt")
}

fn default_ramp_entries() -> usize {
    crate::color_ramp::DEFAULT_RAMP_ENTRIES
}

fn default_poll_interval() -> u64 {
    500
}

fn default_contour_spacing() -> f64 {
    0.75
}

fn default_dem_scale() -> f64 {
    1.0
}

fn default_shadow_map_size() -> u32 {
    1024
}

fn default_clear_color() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            color_ramp: default_color_ramp(),
            ramp_entries: default_ramp_entries(),
            shader_directory: None,
            watch_poll_interval_ms: default_poll_interval(),
            contour_line_spacing: default_contour_spacing(),
            dem_dist_scale: default_dem_scale(),
            shadow_map_size: default_shadow_map_size(),
            clear_color: default_clear_color(),
            features: FeatureToggles::default(),
        }
    }
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> SurfaceError {
    SurfaceError::InvalidConfig {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Check value ranges
pub fn validate(config: &SurfaceConfig) -> SurfaceResult<()> {
    if config.ramp_entries == 0 {
        return Err(invalid("ramp_entries", 0, "must be at least 1"));
    }
    if config.ramp_entries > MAX_RAMP_ENTRIES {
        return Err(invalid(
            "ramp_entries",
            config.ramp_entries,
            "exceeds the 1D texture size every device supports",
        ));
    }
    if !(config.contour_line_spacing.is_finite() && config.contour_line_spacing > 0.0) {
        return Err(invalid(
            "contour_line_spacing",
            config.contour_line_spacing,
            "must be a positive number",
        ));
    }
    if !(config.dem_dist_scale.is_finite() && config.dem_dist_scale > 0.0) {
        return Err(invalid(
            "dem_dist_scale",
            config.dem_dist_scale,
            "must be a positive number",
        ));
    }
    if config.shadow_map_size == 0 {
        return Err(invalid("shadow_map_size", 0, "must be non-zero"));
    }
    if config.watch_poll_interval_ms == 0 {
        return Err(invalid("watch_poll_interval_ms", 0, "must be non-zero"));
    }
    Ok(())
}

/// Parse and validate configuration text
pub fn from_toml_str(text: &str) -> SurfaceResult<SurfaceConfig> {
    let config: SurfaceConfig = toml::from_str(text)?;
    validate(&config)?;
    Ok(config)
}

pub fn to_toml_string(config: &SurfaceConfig) -> SurfaceResult<String> {
    toml::to_string(config).context("Failed to serialize surface config")
}

/// Load a configuration file, resolving relative paths against its directory
pub fn load_config(path: &Path) -> SurfaceResult<SurfaceConfig> {
    let text = std::fs::read_to_string(path).map_err(|e| SurfaceError::io(path, e))?;
    let mut config = from_toml_str(&text).map_err(|e| match e {
        SurfaceError::InvalidConfig {
            field,
            value,
            reason,
        } => SurfaceError::InvalidConfig {
            field,
            value,
            reason: format!("{} (in {})", reason, path.display()),
        },
        other => other,
    })?;

    if let Some(base) = path.parent() {
        if config.color_ramp.is_relative() {
            config.color_ramp = base.join(&config.color_ramp);
        }
        if let Some(directory) = config.shader_directory.as_mut() {
            if directory.is_relative() {
                *directory = base.join(&*directory);
            }
        }
    }

    log::info!(
        "[config::load_config] Loaded {} (ramp {}, {} entries)",
        path.display(),
        config.color_ramp.display(),
        config.ramp_entries
    );
    Ok(config)
}

/// Requested feature set; DEM and shadow availability are resolved per frame
pub fn requested_features(config: &SurfaceConfig) -> FeatureConfig {
    FeatureConfig {
        illuminate: config.features.illuminate,
        shadow: if config.features.shadows {
            ShadowMode::Mapped
        } else {
            ShadowMode::Off
        },
        contour_lines: config.features.contour_lines,
        dem_deviation: config.features.dem_deviation,
    }
}

pub fn poll_interval(config: &SurfaceConfig) -> Duration {
    Duration::from_millis(config.watch_poll_interval_ms)
}
