//! # Filter Catalog
//!
//! The closed set of filter identifiers, their display names and categories,
//! and the factory that builds one instance per identifier.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::filter::{Filter, Passthrough};
use crate::gpu::channel_remap::ChannelRemapFilter;
use crate::gpu::GpuContext;
use crate::graph::GraphFilter;
use crate::pool::BufferPoolManager;

pub mod params;
pub mod recipes;

// ============================================================================
// Categories
// ============================================================================

/// Menu grouping. Ordering is the display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FilterCategory {
    Utility,
    Color,
    Adjustment,
    Blur,
    Sharpen,
    Edges,
    Stylize,
    Halftone,
    Distortion,
    Effect,
    Composite,
}

impl FilterCategory {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Utility => "Utility",
            Self::Color => "Color",
            Self::Adjustment => "Adjustment",
            Self::Blur => "Blur",
            Self::Sharpen => "Sharpen",
            Self::Edges => "Edges",
            Self::Stylize => "Stylize",
            Self::Halftone => "Halftone",
            Self::Distortion => "Distortion",
            Self::Effect => "Effect",
            Self::Composite => "Composite",
        }
    }
}

impl fmt::Display for FilterCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Identifiers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FilterId {
    Passthrough,
    // Color
    Invert,
    Grayscale,
    Sepia,
    Monochrome,
    ChannelRemap,
    // Adjustment
    Brightness,
    Contrast,
    Saturation,
    Exposure,
    Gamma,
    Temperature,
    HueRotate,
    // Blur
    BoxBlur,
    GaussianBlur,
    // Sharpen
    Sharpen,
    UnsharpMask,
    // Edges
    SobelEdges,
    Emboss,
    Laplacian,
    // Stylize
    Posterize,
    Threshold,
    Solarize,
    Pixellate,
    // Halftone
    OrderedDither,
    LineScreen,
    // Distortion
    Flip,
    Mirror,
    // Effect
    Vignette,
    FilmGrain,
    // Composite
    Difference,
    Average,
    Lighten,
}

impl FilterId {
    pub const ALL: [FilterId; 33] = [
        Self::Passthrough,
        Self::Invert,
        Self::Grayscale,
        Self::Sepia,
        Self::Monochrome,
        Self::ChannelRemap,
        Self::Brightness,
        Self::Contrast,
        Self::Saturation,
        Self::Exposure,
        Self::Gamma,
        Self::Temperature,
        Self::HueRotate,
        Self::BoxBlur,
        Self::GaussianBlur,
        Self::Sharpen,
        Self::UnsharpMask,
        Self::SobelEdges,
        Self::Emboss,
        Self::Laplacian,
        Self::Posterize,
        Self::Threshold,
        Self::Solarize,
        Self::Pixellate,
        Self::OrderedDither,
        Self::LineScreen,
        Self::Flip,
        Self::Mirror,
        Self::Vignette,
        Self::FilmGrain,
        Self::Difference,
        Self::Average,
        Self::Lighten,
    ];

    /// User-facing name shown in menus.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Passthrough => "Passthrough",
            Self::Invert => "Invert",
            Self::Grayscale => "Grayscale",
            Self::Sepia => "Sepia",
            Self::Monochrome => "Monochrome",
            Self::ChannelRemap => "Channel Remap",
            Self::Brightness => "Brightness",
            Self::Contrast => "Contrast",
            Self::Saturation => "Saturation",
            Self::Exposure => "Exposure",
            Self::Gamma => "Gamma",
            Self::Temperature => "Temperature",
            Self::HueRotate => "Hue Rotate",
            Self::BoxBlur => "Box Blur",
            Self::GaussianBlur => "Gaussian Blur",
            Self::Sharpen => "Sharpen",
            Self::UnsharpMask => "Unsharp Mask",
            Self::SobelEdges => "Sobel Edges",
            Self::Emboss => "Emboss",
            Self::Laplacian => "Laplacian",
            Self::Posterize => "Posterize",
            Self::Threshold => "Threshold",
            Self::Solarize => "Solarize",
            Self::Pixellate => "Pixellate",
            Self::OrderedDither => "Ordered Dither",
            Self::LineScreen => "Line Screen",
            Self::Flip => "Flip",
            Self::Mirror => "Mirror",
            Self::Vignette => "Vignette",
            Self::FilmGrain => "Film Grain",
            Self::Difference => "Difference",
            Self::Average => "Average",
            Self::Lighten => "Lighten",
        }
    }

    /// Prefix of this filter's keys in the settings store.
    pub fn settings_prefix(&self) -> &'static str {
        match self {
            Self::Passthrough => "passthrough",
            Self::Invert => "invert",
            Self::Grayscale => "grayscale",
            Self::Sepia => "sepia",
            Self::Monochrome => "monochrome",
            Self::ChannelRemap => "channel_remap",
            Self::Brightness => "brightness",
            Self::Contrast => "contrast",
            Self::Saturation => "saturation",
            Self::Exposure => "exposure",
            Self::Gamma => "gamma",
            Self::Temperature => "temperature",
            Self::HueRotate => "hue_rotate",
            Self::BoxBlur => "box_blur",
            Self::GaussianBlur => "gaussian_blur",
            Self::Sharpen => "sharpen",
            Self::UnsharpMask => "unsharp_mask",
            Self::SobelEdges => "sobel_edges",
            Self::Emboss => "emboss",
            Self::Laplacian => "laplacian",
            Self::Posterize => "posterize",
            Self::Threshold => "threshold",
            Self::Solarize => "solarize",
            Self::Pixellate => "pixellate",
            Self::OrderedDither => "ordered_dither",
            Self::LineScreen => "line_screen",
            Self::Flip => "flip",
            Self::Mirror => "mirror",
            Self::Vignette => "vignette",
            Self::FilmGrain => "film_grain",
            Self::Difference => "difference",
            Self::Average => "average",
            Self::Lighten => "lighten",
        }
    }

    pub fn category(&self) -> FilterCategory {
        match self {
            Self::Passthrough => FilterCategory::Utility,
            Self::Invert | Self::Grayscale | Self::Sepia | Self::Monochrome | Self::ChannelRemap => {
                FilterCategory::Color
            }
            Self::Brightness
            | Self::Contrast
            | Self::Saturation
            | Self::Exposure
            | Self::Gamma
            | Self::Temperature
            | Self::HueRotate => FilterCategory::Adjustment,
            Self::BoxBlur | Self::GaussianBlur => FilterCategory::Blur,
            Self::Sharpen | Self::UnsharpMask => FilterCategory::Sharpen,
            Self::SobelEdges | Self::Emboss | Self::Laplacian => FilterCategory::Edges,
            Self::Posterize | Self::Threshold | Self::Solarize | Self::Pixellate => {
                FilterCategory::Stylize
            }
            Self::OrderedDither | Self::LineScreen => FilterCategory::Halftone,
            Self::Flip | Self::Mirror => FilterCategory::Distortion,
            Self::Vignette | Self::FilmGrain => FilterCategory::Effect,
            Self::Difference | Self::Average | Self::Lighten => FilterCategory::Composite,
        }
    }

    /// Combines several input frames into one output.
    pub fn is_multi_frame(&self) -> bool {
        matches!(self, Self::Difference | Self::Average | Self::Lighten)
    }

    /// Runs as a compute kernel on the GPU.
    pub fn is_gpu_kernel(&self) -> bool {
        matches!(self, Self::ChannelRemap)
    }

    /// Looks an identifier up by display name or settings prefix,
    /// ignoring case.
    pub fn from_name(name: &str) -> Option<FilterId> {
        static BY_NAME: Lazy<HashMap<String, FilterId>> = Lazy::new(|| {
            let mut map = HashMap::with_capacity(FilterId::ALL.len() * 2);
            for id in FilterId::ALL {
                map.insert(id.name().to_lowercase(), id);
                map.insert(id.settings_prefix().to_string(), id);
            }
            map
        });
        BY_NAME.get(&name.trim().to_lowercase()).copied()
    }
}

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Builds the single instance registered for `id`.
pub(crate) fn instantiate(
    id: FilterId,
    pools: BufferPoolManager,
    gpu: Option<Arc<GpuContext>>,
) -> Box<dyn Filter> {
    match id {
        FilterId::Passthrough => Box::new(Passthrough::new(pools)),
        FilterId::ChannelRemap => Box::new(ChannelRemapFilter::new(pools, gpu)),
        other => Box::new(GraphFilter::new(other, recipes::recipe(other), pools)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_are_unique() {
        let names: HashSet<_> = FilterId::ALL.iter().map(FilterId::name).collect();
        let prefixes: HashSet<_> = FilterId::ALL.iter().map(FilterId::settings_prefix).collect();
        assert_eq!(names.len(), FilterId::ALL.len());
        assert_eq!(prefixes.len(), FilterId::ALL.len());
    }

    #[test]
    fn from_name_accepts_both_spellings() {
        assert_eq!(FilterId::from_name("Gaussian Blur"), Some(FilterId::GaussianBlur));
        assert_eq!(FilterId::from_name("gaussian_blur"), Some(FilterId::GaussianBlur));
        assert_eq!(FilterId::from_name("  SEPIA "), Some(FilterId::Sepia));
        assert_eq!(FilterId::from_name("kaleidoscope"), None);
    }

    #[test]
    fn every_category_is_populated() {
        let used: HashSet<_> = FilterId::ALL.iter().map(FilterId::category).collect();
        assert_eq!(used.len(), 11);
        assert_eq!(FilterId::Passthrough.category(), FilterCategory::Utility);
        assert!(FilterCategory::Utility < FilterCategory::Composite);
    }

    #[test]
    fn instantiate_preserves_id() {
        for id in FilterId::ALL {
            assert_eq!(instantiate(id, BufferPoolManager::default(), None).id(), id);
        }
    }
}
