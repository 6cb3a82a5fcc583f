//! Color Ramp Module - Data-Oriented Programming (DOP) style
//!
//! - color_ramp_data.rs: key/color stops and the resampled lookup table
//! - color_ramp_operations.rs: parsing, resampling and height mapping

pub mod color_ramp_data;
pub mod color_ramp_operations;

pub use color_ramp_data::{ColorRampData, RampColor, RampFormat, RampStop, DEFAULT_RAMP_ENTRIES,
    MAX_RAMP_ENTRIES,
};

pub use color_ramp_operations::{
    // Construction
    create_color_ramp,
    load_color_ramp,

    // Loading
    format_for_path,
    load,
    load_str,
    parse_ramp,

    // Lookup table
    color_at_key,
    quantize_color,
    resample,
    sample,
    set_entry_count,

    // Height mapping
    compute_mapping,
    scalar_range,
};
