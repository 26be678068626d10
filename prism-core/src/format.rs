//! # Format Context
//!
//! Geometry, pixel layout and color space of one input stream. Frames carry
//! their format; filters size their pools and GPU resources from it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{FilterError, Result};

// ============================================================================
// Pixel Layouts
// ============================================================================

/// Packed 8-bit pixel layouts understood by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelLayout {
    Rgba8,
    Bgra8,
    Gray8,
}

impl PixelLayout {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::Rgba8 | Self::Bgra8 => 4,
            Self::Gray8 => 1,
        }
    }

    /// Byte offsets of the red, green, blue and alpha channels in one pixel.
    /// `None` for single-channel layouts.
    pub fn channel_offsets(&self) -> Option<[usize; 4]> {
        match self {
            Self::Rgba8 => Some([0, 1, 2, 3]),
            Self::Bgra8 => Some([2, 1, 0, 3]),
            Self::Gray8 => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Rgba8 => "RGBA8",
            Self::Bgra8 => "BGRA8",
            Self::Gray8 => "Gray8",
        }
    }
}

impl fmt::Display for PixelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Color Spaces
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColorSpace {
    #[default]
    Srgb,
    LinearSrgb,
    DisplayP3,
    Bt709,
    Bt2020,
}

impl ColorSpace {
    /// Luma weights (Wr, Wg, Wb) for this space's primaries.
    pub fn luma_coefficients(&self) -> [f32; 3] {
        match self {
            Self::Srgb | Self::LinearSrgb | Self::Bt709 => [0.2126, 0.7152, 0.0722],
            Self::DisplayP3 => [0.2290, 0.6917, 0.0793],
            Self::Bt2020 => [0.2627, 0.6780, 0.0593],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Srgb => "sRGB",
            Self::LinearSrgb => "Linear sRGB",
            Self::DisplayP3 => "Display P3",
            Self::Bt709 => "BT.709",
            Self::Bt2020 => "BT.2020",
        }
    }
}

// ============================================================================
// Format Context
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormatContext {
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    pub color_space: ColorSpace,
}

impl FormatContext {
    pub fn new(width: u32, height: u32, layout: PixelLayout, color_space: ColorSpace) -> Self {
        Self {
            width,
            height,
            layout,
            color_space,
        }
    }

    pub fn rgba(width: u32, height: u32) -> Self {
        Self::new(width, height, PixelLayout::Rgba8, ColorSpace::Srgb)
    }

    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.layout.bytes_per_pixel()
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Total bytes of one tightly packed frame, `None` on overflow.
    pub fn byte_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(self.layout.bytes_per_pixel())
    }

    /// Width, height and layout match. Color space may differ.
    pub fn same_geometry(&self, other: &FormatContext) -> bool {
        self.width == other.width && self.height == other.height && self.layout == other.layout
    }

    /// Checks that buffers of this format can exist and returns their size.
    pub fn validate(&self, max_dimension: u32) -> Result<usize> {
        if self.width == 0 || self.height == 0 {
            return Err(FilterError::InvalidFormat(format!(
                "zero-sized frame {}x{}",
                self.width, self.height
            )));
        }
        if self.width > max_dimension || self.height > max_dimension {
            return Err(FilterError::InvalidFormat(format!(
                "{}x{} exceeds maximum dimension {}",
                self.width, self.height, max_dimension
            )));
        }
        self.byte_len().ok_or_else(|| {
            FilterError::InvalidFormat(format!("{}x{} overflows buffer size", self.width, self.height))
        })
    }
}

impl fmt::Display for FormatContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} {} ({})",
            self.width,
            self.height,
            self.layout,
            self.color_space.label()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_len_follows_layout() {
        assert_eq!(FormatContext::rgba(4, 3).byte_len(), Some(48));
        let gray = FormatContext::new(4, 3, PixelLayout::Gray8, ColorSpace::Srgb);
        assert_eq!(gray.byte_len(), Some(12));
        assert_eq!(gray.row_bytes(), 4);
    }

    #[test]
    fn validate_rejects_degenerate_geometry() {
        assert!(FormatContext::rgba(0, 10).validate(16384).is_err());
        assert!(FormatContext::rgba(20000, 10).validate(16384).is_err());
        assert_eq!(FormatContext::rgba(2, 2).validate(16384).unwrap(), 16);
    }

    #[test]
    fn geometry_ignores_color_space() {
        let a = FormatContext::rgba(8, 8);
        let mut b = a;
        b.color_space = ColorSpace::DisplayP3;
        assert!(a.same_geometry(&b));
        assert_ne!(a, b);
        b.layout = PixelLayout::Bgra8;
        assert!(!a.same_geometry(&b));
    }

    #[test]
    fn bgra_offsets_swap_red_and_blue() {
        assert_eq!(PixelLayout::Bgra8.channel_offsets(), Some([2, 1, 0, 3]));
        assert_eq!(PixelLayout::Gray8.channel_offsets(), None);
    }
}
