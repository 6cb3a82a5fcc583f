//! Color Ramp Operations - Pure DOP Functions
//!
//! Parsing and resampling are pure. `load`/`load_str` are the only functions
//! that mutate a ramp, and they do it all at once or not at all.

use super::color_ramp_data::{ColorRampData, RampColor, RampFormat, RampStop, MAX_RAMP_ENTRIES};
use crate::error::{SurfaceError, SurfaceResult};
use crate::height_mapping::{compute_height_mapping, BasePlane, HeightPlaneMapping};
use std::path::Path;

/// Channel scale for `.cpt` files, which store 8-bit channel values
const CPT_CHANNEL_SCALE: f32 = 1.0 / 255.0;

// ============================================================================
// CONSTRUCTION
// ============================================================================

/// Create an empty ramp; it has no stops and version 0 until the first load
pub fn create_color_ramp(entry_count: usize) -> ColorRampData {
    ColorRampData {
        stops: Vec::new(),
        entries: Vec::new(),
        entry_count,
        version: 0,
        source_name: String::new(),
    }
}

/// Create a ramp and load it from a file
pub fn load_color_ramp(path: &Path, entry_count: usize) -> SurfaceResult<ColorRampData> {
    let mut data = create_color_ramp(entry_count);
    load(&mut data, path)?;
    Ok(data)
}

// ============================================================================
// LOADING
// ============================================================================

/// Pick the ramp format from a file name (`.cpt` is whitespace separated)
pub fn format_for_path(path: &Path) -> RampFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("cpt") => RampFormat::Cpt,
        _ => RampFormat::Delimited,
    }
}

/// Load a ramp file, replacing the stops and bumping the version on success
pub fn load(data: &mut ColorRampData, path: &Path) -> SurfaceResult<()> {
    let text = std::fs::read_to_string(path).map_err(|e| SurfaceError::io(path, e))?;
    let name = path.display().to_string();
    load_str(data, &text, &name, format_for_path(path))
}

/// Load a ramp from in-memory text
///
/// On error the ramp is left exactly as it was.
pub fn load_str(
    data: &mut ColorRampData,
    text: &str,
    source_name: &str,
    format: RampFormat,
) -> SurfaceResult<()> {
    let stops = parse_ramp(text, format, source_name)?;
    let entries = resample(&stops, data.entry_count);

    data.stops = stops;
    data.entries = entries;
    data.source_name = source_name.to_string();
    data.version = data.version.wrapping_add(1);

    log::info!(
        "[color_ramp::load] Loaded {} keys from {} (version {})",
        data.stops.len(),
        source_name,
        data.version
    );

    Ok(())
}

/// Parse ramp text into stops
///
/// Every record must end with a line terminator, carry exactly four numeric
/// fields and a key greater than the previous one. At least two records are
/// required.
pub fn parse_ramp(text: &str, format: RampFormat, source_name: &str) -> SurfaceResult<Vec<RampStop>> {
    let format_error = |line: usize, reason: String| SurfaceError::Format {
        file: source_name.to_string(),
        line,
        reason,
    };

    let lines: Vec<&str> = text.split('\n').collect();
    let last_index = lines.len() - 1;
    let mut stops: Vec<RampStop> = Vec::new();
    let mut last_record_line = 1;

    for (index, raw) in lines.iter().enumerate() {
        let line_number = index + 1;
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if line.trim().is_empty() {
            continue;
        }

        // split() leaves whatever follows the final '\n' as the last piece
        if index == last_index {
            return Err(format_error(
                line_number,
                "missing line terminator".to_string(),
            ));
        }

        last_record_line = line_number;
        let fields: Vec<&str> = match format {
            RampFormat::Cpt => line.split_whitespace().collect(),
            RampFormat::Delimited => line.split(',').map(str::trim).collect(),
        };
        if fields.len() != 4 {
            return Err(format_error(
                line_number,
                format!("expected 4 fields, found {}", fields.len()),
            ));
        }

        let mut values = [0.0f64; 4];
        for (value, field) in values.iter_mut().zip(&fields) {
            *value = field.parse::<f64>().map_err(|_| {
                format_error(line_number, format!("'{}' is not a number", field))
            })?;
            if !value.is_finite() {
                return Err(format_error(
                    line_number,
                    format!("'{}' is not a finite number", field),
                ));
            }
        }

        let key = values[0];
        if let Some(previous) = stops.last() {
            if key <= previous.key {
                return Err(format_error(
                    line_number,
                    format!("key {} does not increase over previous key {}", key, previous.key),
                ));
            }
        }

        let scale = match format {
            RampFormat::Cpt => CPT_CHANNEL_SCALE,
            RampFormat::Delimited => 1.0,
        };
        stops.push(RampStop {
            key,
            color: [
                values[1] as f32 * scale,
                values[2] as f32 * scale,
                values[3] as f32 * scale,
                1.0,
            ],
        });
    }

    if stops.len() < 2 {
        return Err(format_error(
            last_record_line,
            format!("color map needs at least two keys, found {}", stops.len()),
        ));
    }

    Ok(stops)
}

// ============================================================================
// LOOKUP TABLE
// ============================================================================

/// Evaluate the piecewise-linear ramp at `key`, clamping outside the key range
pub fn color_at_key(stops: &[RampStop], key: f64) -> RampColor {
    let (first, last) = match (stops.first(), stops.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return [0.0; 4],
    };
    if key <= first.key {
        return first.color;
    }
    if key >= last.key {
        return last.color;
    }

    // First stop strictly above the key; always in 1..len here
    let upper = stops.partition_point(|s| s.key <= key);
    let lo = &stops[upper - 1];
    let hi = &stops[upper];
    let t = ((key - lo.key) / (hi.key - lo.key)) as f32;

    lerp_color(&lo.color, &hi.color, t)
}

/// Resample the stops into `entry_count` evenly spaced table entries
///
/// Entry `i` sits at `min + i * (max - min) / (entry_count - 1)`; a single
/// entry takes the first stop's color.
pub fn resample(stops: &[RampStop], entry_count: usize) -> Vec<RampColor> {
    let (first, last) = match (stops.first(), stops.last()) {
        (Some(first), Some(last)) => (first.key, last.key),
        _ => return Vec::new(),
    };

    if entry_count == 1 {
        return vec![stops[0].color];
    }

    let step = (last - first) / (entry_count.max(2) - 1) as f64;
    (0..entry_count)
        .map(|i| {
            let key = if i + 1 == entry_count {
                last
            } else {
                first + step * i as f64
            };
            color_at_key(stops, key)
        })
        .collect()
}

/// Change the table length; the table is rebuilt but the version stays put
pub fn set_entry_count(data: &mut ColorRampData, entry_count: usize) -> SurfaceResult<()> {
    if entry_count == 0 {
        return Err(SurfaceError::InvalidConfig {
            field: "ramp_entries".to_string(),
            value: "0".to_string(),
            reason: "lookup table needs at least one entry".to_string(),
        });
    }
    if entry_count > MAX_RAMP_ENTRIES {
        return Err(SurfaceError::InvalidConfig {
            field: "ramp_entries".to_string(),
            value: entry_count.to_string(),
            reason: format!("lookup table holds at most {} entries", MAX_RAMP_ENTRIES),
        });
    }
    if entry_count != data.entry_count {
        data.entry_count = entry_count;
        data.entries = resample(&data.stops, entry_count);
    }
    Ok(())
}

/// 8-bit unorm channels of a table entry as stored in the ramp texture
///
/// Channels outside [0, 1] saturate.
pub fn quantize_color(color: &RampColor) -> [u8; 4] {
    color.map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
}

/// Sample the table like a linearly filtered, edge-clamped 1D texture
///
/// Entries go through the same 8-bit quantization as the uploaded texture.
pub fn sample(entries: &[RampColor], tex_coord: f64) -> RampColor {
    if entries.is_empty() {
        return [0.0; 4];
    }

    let n = entries.len();
    let x = tex_coord * n as f64 - 0.5;
    let base = x.floor();
    let t = (x - base) as f32;
    let texel = |i: f64| {
        let index = i.max(0.0).min((n - 1) as f64) as usize;
        quantize_color(&entries[index]).map(|v| v as f32 / 255.0)
    };

    lerp_color(&texel(base), &texel(base + 1.0), t)
}

fn lerp_color(a: &RampColor, b: &RampColor, t: f32) -> RampColor {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
        a[3] + (b[3] - a[3]) * t,
    ]
}

// ============================================================================
// HEIGHT MAPPING
// ============================================================================

/// Key range of the loaded ramp
pub fn scalar_range(data: &ColorRampData) -> Option<(f64, f64)> {
    match (data.stops.first(), data.stops.last()) {
        (Some(first), Some(last)) => Some((first.key, last.key)),
        _ => None,
    }
}

/// Height-to-texture mapping for this ramp over the given base plane
pub fn compute_mapping(data: &ColorRampData, plane: &BasePlane) -> SurfaceResult<HeightPlaneMapping> {
    let (min_key, max_key) = scalar_range(data).ok_or_else(|| SurfaceError::StateError {
        expected: "loaded color ramp".to_string(),
        actual: "empty color ramp".to_string(),
    })?;
    compute_height_mapping(plane, min_key, max_key, data.entry_count)
}
