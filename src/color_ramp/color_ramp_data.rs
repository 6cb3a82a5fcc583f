//! Color Ramp Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in color_ramp_operations.rs

/// Number of entries in the GPU lookup table unless configured otherwise
pub const DEFAULT_RAMP_ENTRIES: usize = 256;

/// Longest table every device holds as a 1D texture
pub const MAX_RAMP_ENTRIES: usize = 8192;

/// RGBA color, channels nominally in [0, 1]
pub type RampColor = [f32; 4];

/// One key/color pair of the piecewise-linear ramp
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampStop {
    /// Elevation key (camera-space height units)
    pub key: f64,
    pub color: RampColor,
}

/// Accepted textual ramp formats, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RampFormat {
    /// `key r g b` per line, channels 0-255 (`.cpt` files)
    Cpt,
    /// `key, r, g, b` per line, channels used as given
    Delimited,
}

/// Elevation color ramp - pure data
///
/// `entries` always mirrors `stops` resampled to `entry_count`. `version`
/// moves once per successful load and never on a failed one.
#[derive(Debug, Clone)]
pub struct ColorRampData {
    /// Stops with strictly increasing keys (empty until the first load)
    pub stops: Vec<RampStop>,

    /// Resampled lookup table uploaded to the GPU
    pub entries: Vec<RampColor>,

    /// Requested lookup table length
    pub entry_count: usize,

    /// Generation counter of the logical ramp
    pub version: u32,

    /// Name of the file (or string source) the stops came from
    pub source_name: String,
}
