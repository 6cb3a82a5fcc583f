//! Feature toggles selecting a surface shader variant

/// How the illuminated surface is shadowed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum ShadowMode {
    #[default]
    Off,
    /// Shadow-map lookup against the first light's depth pass
    Mapped,
}

/// Feature toggles of one surface variant
///
/// Pure data. Two configs select the same variant iff their normalized forms
/// are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FeatureConfig {
    pub illuminate: bool,
    pub shadow: ShadowMode,
    pub contour_lines: bool,
    pub dem_deviation: bool,
}

/// Shadowing only exists on an illuminated surface
pub fn normalize_feature_config(config: FeatureConfig) -> FeatureConfig {
    FeatureConfig {
        shadow: if config.illuminate {
            config.shadow
        } else {
            ShadowMode::Off
        },
        ..config
    }
}

/// Every distinct normalized variant, in a stable order
pub fn all_feature_configs() -> Vec<FeatureConfig> {
    let mut configs = Vec::new();
    for illuminate in [false, true] {
        let shadows: &[ShadowMode] = if illuminate {
            &[ShadowMode::Off, ShadowMode::Mapped]
        } else {
            &[ShadowMode::Off]
        };
        for &shadow in shadows {
            for contour_lines in [false, true] {
                for dem_deviation in [false, true] {
                    configs.push(FeatureConfig {
                        illuminate,
                        shadow,
                        contour_lines,
                        dem_deviation,
                    });
                }
            }
        }
    }
    configs
}

/// Short stable tag naming the enabled blocks, used in program labels
pub fn feature_tag(config: FeatureConfig) -> String {
    let config = normalize_feature_config(config);
    let mut parts = Vec::new();
    if config.illuminate {
        parts.push("illuminated");
    }
    if config.shadow == ShadowMode::Mapped {
        parts.push("shadowed");
    }
    if config.contour_lines {
        parts.push("contours");
    }
    if config.dem_deviation {
        parts.push("dem");
    }
    if parts.is_empty() {
        "plain".to_string()
    } else {
        parts.join("+")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_shadow_requires_illumination() {
        let config = FeatureConfig {
            illuminate: false,
            shadow: ShadowMode::Mapped,
            contour_lines: true,
            dem_deviation: false,
        };
        let normalized = normalize_feature_config(config);
        assert_eq!(normalized.shadow, ShadowMode::Off);
        assert!(normalized.contour_lines);

        let lit = FeatureConfig {
            illuminate: true,
            ..config
        };
        assert_eq!(normalize_feature_config(lit), lit);
    }

    #[test]
    fn test_variant_enumeration_is_exhaustive() {
        let configs = all_feature_configs();
        assert_eq!(configs.len(), 12);

        let unique: HashSet<_> = configs.iter().collect();
        assert_eq!(unique.len(), configs.len());
        for config in &configs {
            assert_eq!(normalize_feature_config(*config), *config);
        }
    }

    #[test]
    fn test_feature_tags_are_distinct() {
        let tags: HashSet<String> = all_feature_configs().into_iter().map(feature_tag).collect();
        assert_eq!(tags.len(), 12);
        assert_eq!(feature_tag(FeatureConfig::default()), "plain");
    }
}
