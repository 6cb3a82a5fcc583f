//! WGSL template assets
//!
//! Default template text is compiled into the crate. A template directory, if
//! configured, overrides any file it contains; the rest fall back to the
//! built-in text. Every template is checked for the entry points and helper
//! functions the composer splices around it.

use crate::error::{SurfaceError, SurfaceResult};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

lazy_static! {
    static ref ENTRY_POINT_RE: Regex = Regex::new(r"@(?:vertex|fragment)\s+fn\s+(\w+)")
        .expect("[shader_templates] Failed to compile entry point regex");
    static ref FUNCTION_RE: Regex =
        Regex::new(r"\bfn\s+(\w+)").expect("[shader_templates] Failed to compile function regex");
}

/// Template files, in composition order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TemplateId {
    SurfaceVertex,
    FragmentPreamble,
    Illumination,
    Shadow,
    ContourLines,
    DemDeviation,
    ContourElevation,
    ShadowDepth,
}

impl TemplateId {
    pub const ALL: [TemplateId; 8] = [
        TemplateId::SurfaceVertex,
        TemplateId::FragmentPreamble,
        TemplateId::Illumination,
        TemplateId::Shadow,
        TemplateId::ContourLines,
        TemplateId::DemDeviation,
        TemplateId::ContourElevation,
        TemplateId::ShadowDepth,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            TemplateId::SurfaceVertex => "surface_vertex.wgsl",
            TemplateId::FragmentPreamble => "surface_fragment_preamble.wgsl",
            TemplateId::Illumination => "surface_illumination.wgsl",
            TemplateId::Shadow => "surface_shadow.wgsl",
            TemplateId::ContourLines => "surface_contour_lines.wgsl",
            TemplateId::DemDeviation => "surface_dem_deviation.wgsl",
            TemplateId::ContourElevation => "contour_elevation.wgsl",
            TemplateId::ShadowDepth => "shadow_depth.wgsl",
        }
    }

    fn builtin(self) -> &'static str {
        match self {
            TemplateId::SurfaceVertex => include_str!("../../shaders/surface_vertex.wgsl"),
            TemplateId::FragmentPreamble => {
                include_str!("../../shaders/surface_fragment_preamble.wgsl")
            }
            TemplateId::Illumination => include_str!("../../shaders/surface_illumination.wgsl"),
            TemplateId::Shadow => include_str!("../../shaders/surface_shadow.wgsl"),
            TemplateId::ContourLines => include_str!("../../shaders/surface_contour_lines.wgsl"),
            TemplateId::DemDeviation => include_str!("../../shaders/surface_dem_deviation.wgsl"),
            TemplateId::ContourElevation => include_str!("../../shaders/contour_elevation.wgsl"),
            TemplateId::ShadowDepth => include_str!("../../shaders/shadow_depth.wgsl"),
        }
    }

    fn required_entry_points(self) -> &'static [&'static str] {
        match self {
            TemplateId::SurfaceVertex => &["vs_main"],
            TemplateId::ContourElevation | TemplateId::ShadowDepth => &["fs_main"],
            _ => &[],
        }
    }

    fn required_functions(self) -> &'static [&'static str] {
        match self {
            TemplateId::FragmentPreamble => &["surface_normal", "height_color"],
            TemplateId::Illumination => &["accumulate_point_light", "accumulate_directional_light"],
            TemplateId::Shadow => &["shadow_factor"],
            TemplateId::ContourLines => &["apply_contour_lines"],
            TemplateId::DemDeviation => &["dem_deviation_color"],
            _ => &[],
        }
    }
}

/// Loaded, validated template text
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSet {
    pub sources: BTreeMap<TemplateId, String>,
    /// Templates that came from the override directory
    pub overridden: Vec<TemplateId>,
}

/// Entry point names declared with `@vertex` or `@fragment`
pub fn extract_entry_points(source: &str) -> Vec<String> {
    ENTRY_POINT_RE
        .captures_iter(source)
        .filter_map(|capture| capture.get(1))
        .map(|name| name.as_str().to_string())
        .collect()
}

/// Check a template declares what the composer relies on
pub fn validate_template(id: TemplateId, source: &str) -> SurfaceResult<()> {
    let entry_points: HashSet<String> = extract_entry_points(source).into_iter().collect();
    for required in id.required_entry_points() {
        if !entry_points.contains(*required) {
            return Err(SurfaceError::ShaderBuild {
                program: id.file_name().to_string(),
                diagnostic: format!("missing entry point '{}'", required),
            });
        }
    }

    let functions: HashSet<&str> = FUNCTION_RE
        .captures_iter(source)
        .filter_map(|capture| capture.get(1))
        .map(|name| name.as_str())
        .collect();
    for required in id.required_functions() {
        if !functions.contains(required) {
            return Err(SurfaceError::ShaderBuild {
                program: id.file_name().to_string(),
                diagnostic: format!("missing function '{}'", required),
            });
        }
    }

    Ok(())
}

/// Built-in templates only
pub fn builtin_templates() -> TemplateSet {
    TemplateSet {
        sources: TemplateId::ALL
            .iter()
            .map(|&id| (id, id.builtin().to_string()))
            .collect(),
        overridden: Vec::new(),
    }
}

/// Paths the source watcher should observe for a template directory
pub fn template_paths(directory: &Path) -> Vec<PathBuf> {
    TemplateId::ALL
        .iter()
        .map(|id| directory.join(id.file_name()))
        .collect()
}

/// Load templates, preferring files from `directory` when given
pub fn load_templates(directory: Option<&Path>) -> SurfaceResult<TemplateSet> {
    let mut templates = builtin_templates();

    if let Some(directory) = directory {
        if !directory.is_dir() {
            return Err(SurfaceError::TemplateMissing {
                name: directory.display().to_string(),
            });
        }

        for id in TemplateId::ALL {
            let path = directory.join(id.file_name());
            if !path.is_file() {
                continue;
            }
            let source =
                std::fs::read_to_string(&path).map_err(|e| SurfaceError::io(&path, e))?;
            templates.sources.insert(id, source);
            templates.overridden.push(id);
        }
    }

    for (id, source) in &templates.sources {
        validate_template(*id, source)?;
    }

    log::info!(
        "[shader_templates::load_templates] Loaded {} templates ({} overridden)",
        templates.sources.len(),
        templates.overridden.len()
    );

    Ok(templates)
}

/// Template text; every id is present in a loaded set
pub fn template_source(templates: &TemplateSet, id: TemplateId) -> &str {
    templates
        .sources
        .get(&id)
        .map(String::as_str)
        .unwrap_or_else(|| id.builtin())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_templates_validate() {
        let templates = builtin_templates();
        for (id, source) in &templates.sources {
            validate_template(*id, source).expect("built-in template is valid");
        }
    }

    #[test]
    fn test_extract_entry_points() {
        let source = "@vertex\nfn vs_main() {}\n@fragment fn fs_main() {}\nfn helper() {}";
        assert_eq!(extract_entry_points(source), vec!["vs_main", "fs_main"]);
    }

    #[test]
    fn test_missing_entry_point_is_build_error() {
        let result = validate_template(TemplateId::ShadowDepth, "fn fs_main() {}");
        match result {
            Err(SurfaceError::ShaderBuild { program, diagnostic }) => {
                assert_eq!(program, "shadow_depth.wgsl");
                assert!(diagnostic.contains("fs_main"));
            }
            other => panic!("expected build error, got {:?}", other),
        }
    }

    #[test]
    fn test_directory_overrides_single_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let custom = "// custom\nfn shadow_factor(p: vec4<f32>) -> f32 { return 1.0; }\n";
        std::fs::write(dir.path().join("surface_shadow.wgsl"), custom).expect("write template");

        let templates = load_templates(Some(dir.path())).expect("templates load");
        assert_eq!(templates.overridden, vec![TemplateId::Shadow]);
        assert_eq!(template_source(&templates, TemplateId::Shadow), custom);
        assert_eq!(
            template_source(&templates, TemplateId::SurfaceVertex),
            TemplateId::SurfaceVertex.builtin()
        );
    }

    #[test]
    fn test_invalid_override_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::write(dir.path().join("surface_contour_lines.wgsl"), "fn nothing() {}")
            .expect("write template");
        assert!(matches!(
            load_templates(Some(dir.path())),
            Err(SurfaceError::ShaderBuild { .. })
        ));
    }

    #[test]
    fn test_missing_directory() {
        let result = load_templates(Some(Path::new("/nonexistent/topo-surface/shaders")));
        assert!(matches!(result, Err(SurfaceError::TemplateMissing { .. })));
    }
}
