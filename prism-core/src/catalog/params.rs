//! Typed parameters for the built-in filters.
//!
//! Each struct's `Default` matches the defaults table the options resolver
//! serves, and `from_options` clamps every value into its working range.

use serde::{Deserialize, Serialize};

use crate::options::{FromOptions, OptionBag, OptionKey, Rgba};

fn float(options: &OptionBag, key: OptionKey, default: f32, min: f32, max: f32) -> f32 {
    options.float(key).unwrap_or(default).clamp(min, max)
}

fn count(options: &OptionBag, key: OptionKey, default: u32, min: u32, max: u32) -> u32 {
    options
        .float(key)
        .map(|v| v.round().clamp(min as f32, max as f32) as u32)
        .unwrap_or(default)
}

/// Tone adjustments. Each adjustment filter reads only its own key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToneParams {
    /// Brightness offset (-1.0 to 1.0, 0.0 = no change)
    pub brightness: f32,
    /// Contrast multiplier (0.0 to 4.0, 1.0 = no change)
    pub contrast: f32,
    /// Saturation multiplier (0.0 to 4.0, 1.0 = no change)
    pub saturation: f32,
    /// Exposure in EV stops (-10 to 10)
    pub exposure: f32,
    /// Gamma (0.1 to 5.0, 1.0 = no change)
    pub gamma: f32,
    /// Color temperature (-1.0 cool to 1.0 warm)
    pub temperature: f32,
    /// Hue rotation in degrees
    pub hue: f32,
}

impl Default for ToneParams {
    fn default() -> Self {
        Self {
            brightness: 0.0,
            contrast: 1.0,
            saturation: 1.0,
            exposure: 0.0,
            gamma: 1.0,
            temperature: 0.0,
            hue: 0.0,
        }
    }
}

impl FromOptions for ToneParams {
    fn from_options(options: &OptionBag) -> Self {
        let d = Self::default();
        Self {
            brightness: float(options, OptionKey::Brightness, d.brightness, -1.0, 1.0),
            contrast: float(options, OptionKey::Contrast, d.contrast, 0.0, 4.0),
            saturation: float(options, OptionKey::Saturation, d.saturation, 0.0, 4.0),
            exposure: float(options, OptionKey::Exposure, d.exposure, -10.0, 10.0),
            gamma: float(options, OptionKey::Gamma, d.gamma, 0.1, 5.0),
            temperature: float(options, OptionKey::Temperature, d.temperature, -1.0, 1.0),
            hue: float(options, OptionKey::Hue, d.hue, -360.0, 360.0),
        }
    }
}

/// Strength of color and edge filters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntensityParams {
    /// 0.0 = no effect
    pub intensity: f32,
}

impl Default for IntensityParams {
    fn default() -> Self {
        Self { intensity: 1.0 }
    }
}

impl FromOptions for IntensityParams {
    fn from_options(options: &OptionBag) -> Self {
        Self {
            intensity: float(options, OptionKey::Intensity, 1.0, 0.0, 4.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonochromeParams {
    pub color: Rgba,
    pub intensity: f32,
}

impl Default for MonochromeParams {
    fn default() -> Self {
        Self {
            color: Rgba::new(0.6, 0.45, 0.3, 1.0),
            intensity: 1.0,
        }
    }
}

impl FromOptions for MonochromeParams {
    fn from_options(options: &OptionBag) -> Self {
        let d = Self::default();
        Self {
            color: options.color(OptionKey::Color).unwrap_or(d.color),
            intensity: float(options, OptionKey::Intensity, d.intensity, 0.0, 1.0),
        }
    }
}

/// Logical channel routing for the channel remap kernel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelRemapParams {
    /// Source channel (0 = R, 1 = G, 2 = B, 3 = A) per output channel
    pub sources: [u32; 4],
    /// Invert each output channel after remapping
    pub invert: [bool; 4],
    /// Gain applied to the color channels
    pub intensity: f32,
}

impl Default for ChannelRemapParams {
    fn default() -> Self {
        Self {
            sources: [0, 1, 2, 3],
            invert: [false; 4],
            intensity: 1.0,
        }
    }
}

impl ChannelRemapParams {
    pub fn gains(&self) -> [f32; 4] {
        [self.intensity, self.intensity, self.intensity, 1.0]
    }
}

impl FromOptions for ChannelRemapParams {
    fn from_options(options: &OptionBag) -> Self {
        let d = Self::default();
        let source = |key, default| count(options, key, default, 0, 3);
        let flag = |key| options.flag(key).unwrap_or(false);
        Self {
            sources: [
                source(OptionKey::RedSource, d.sources[0]),
                source(OptionKey::GreenSource, d.sources[1]),
                source(OptionKey::BlueSource, d.sources[2]),
                source(OptionKey::AlphaSource, d.sources[3]),
            ],
            invert: [
                flag(OptionKey::InvertRed),
                flag(OptionKey::InvertGreen),
                flag(OptionKey::InvertBlue),
                flag(OptionKey::InvertAlpha),
            ],
            intensity: float(options, OptionKey::Intensity, d.intensity, 0.0, 4.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlurParams {
    /// Blur radius in pixels (0 to 64)
    pub radius: f32,
}

impl Default for BlurParams {
    fn default() -> Self {
        Self { radius: 4.0 }
    }
}

impl FromOptions for BlurParams {
    fn from_options(options: &OptionBag) -> Self {
        Self {
            radius: float(options, OptionKey::Radius, 4.0, 0.0, 64.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SharpenParams {
    /// Strength (0.0 to 2.0)
    pub sharpness: f32,
}

impl Default for SharpenParams {
    fn default() -> Self {
        Self { sharpness: 0.4 }
    }
}

impl FromOptions for SharpenParams {
    fn from_options(options: &OptionBag) -> Self {
        Self {
            sharpness: float(options, OptionKey::Sharpness, 0.4, 0.0, 2.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnsharpParams {
    /// Radius of the blurred mask
    pub radius: f32,
    /// How much of the difference is added back
    pub intensity: f32,
}

impl Default for UnsharpParams {
    fn default() -> Self {
        Self {
            radius: 2.5,
            intensity: 0.5,
        }
    }
}

impl FromOptions for UnsharpParams {
    fn from_options(options: &OptionBag) -> Self {
        let d = Self::default();
        Self {
            radius: float(options, OptionKey::Radius, d.radius, 0.0, 32.0),
            intensity: float(options, OptionKey::Intensity, d.intensity, 0.0, 4.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelsParams {
    /// Output values per channel (2 to 256)
    pub levels: u32,
}

impl LevelsParams {
    pub const POSTERIZE: LevelsParams = LevelsParams { levels: 6 };
    pub const DITHER: LevelsParams = LevelsParams { levels: 2 };

    pub fn from_options_or(options: &OptionBag, default: LevelsParams) -> Self {
        Self {
            levels: count(options, OptionKey::Levels, default.levels, 2, 256),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdParams {
    /// Cut point in 0.0..=1.0
    pub threshold: f32,
}

impl Default for ThresholdParams {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}

impl FromOptions for ThresholdParams {
    fn from_options(options: &OptionBag) -> Self {
        Self {
            threshold: float(options, OptionKey::Threshold, 0.5, 0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixellateParams {
    /// Block size in pixels
    pub scale: f32,
}

impl Default for PixellateParams {
    fn default() -> Self {
        Self { scale: 8.0 }
    }
}

impl FromOptions for PixellateParams {
    fn from_options(options: &OptionBag) -> Self {
        Self {
            scale: float(options, OptionKey::Scale, 8.0, 1.0, 256.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineScreenParams {
    /// Line period in pixels
    pub width: f32,
    /// Line angle in degrees
    pub angle: f32,
    /// Edge hardness (0.0 to 1.0)
    pub sharpness: f32,
}

impl Default for LineScreenParams {
    fn default() -> Self {
        Self {
            width: 6.0,
            angle: 0.0,
            sharpness: 0.7,
        }
    }
}

impl FromOptions for LineScreenParams {
    fn from_options(options: &OptionBag) -> Self {
        let d = Self::default();
        Self {
            width: float(options, OptionKey::Width, d.width, 1.0, 256.0),
            angle: float(options, OptionKey::Angle, d.angle, -360.0, 360.0),
            sharpness: float(options, OptionKey::Sharpness, d.sharpness, 0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlipParams {
    pub horizontal: bool,
    pub vertical: bool,
}

impl Default for FlipParams {
    fn default() -> Self {
        Self {
            horizontal: true,
            vertical: false,
        }
    }
}

impl FromOptions for FlipParams {
    fn from_options(options: &OptionBag) -> Self {
        let d = Self::default();
        Self {
            horizontal: options.flag(OptionKey::Horizontal).unwrap_or(d.horizontal),
            vertical: options.flag(OptionKey::Vertical).unwrap_or(d.vertical),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MirrorParams {
    /// Reflect top onto bottom instead of left onto right
    pub vertical: bool,
}

impl FromOptions for MirrorParams {
    fn from_options(options: &OptionBag) -> Self {
        Self {
            vertical: options.flag(OptionKey::Vertical).unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VignetteParams {
    /// Darkening at the edge (0.0 to 1.0)
    pub intensity: f32,
    /// Distance where full darkening is reached, 1.0 = corner
    pub radius: f32,
    /// Width of the falloff as a fraction of the radius
    pub softness: f32,
    /// Center in normalized coordinates
    pub center: [f32; 2],
}

impl Default for VignetteParams {
    fn default() -> Self {
        Self {
            intensity: 0.5,
            radius: 0.8,
            softness: 0.5,
            center: [0.5, 0.5],
        }
    }
}

impl FromOptions for VignetteParams {
    fn from_options(options: &OptionBag) -> Self {
        let d = Self::default();
        Self {
            intensity: float(options, OptionKey::Intensity, d.intensity, 0.0, 1.0),
            radius: float(options, OptionKey::Radius, d.radius, 0.01, 2.0),
            softness: float(options, OptionKey::Softness, d.softness, 0.0, 1.0),
            center: options.point(OptionKey::Center).unwrap_or(d.center),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrainParams {
    /// Noise amplitude (0.0 to 1.0)
    pub intensity: f32,
    /// Noise pattern seed
    pub seed: u64,
    /// Same noise on every channel
    pub monochrome: bool,
}

impl Default for GrainParams {
    fn default() -> Self {
        Self {
            intensity: 0.15,
            seed: 0,
            monochrome: true,
        }
    }
}

impl FromOptions for GrainParams {
    fn from_options(options: &OptionBag) -> Self {
        let d = Self::default();
        Self {
            intensity: float(options, OptionKey::Intensity, d.intensity, 0.0, 1.0),
            seed: options
                .int(OptionKey::Seed)
                .map(|seed| seed.unsigned_abs())
                .unwrap_or(d.seed),
            monochrome: options.flag(OptionKey::Monochrome).unwrap_or(d.monochrome),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OptionValue;

    #[test]
    fn empty_bag_gives_defaults() {
        let empty = OptionBag::new();
        assert_eq!(ToneParams::from_options(&empty), ToneParams::default());
        assert_eq!(VignetteParams::from_options(&empty), VignetteParams::default());
        assert_eq!(GrainParams::from_options(&empty), GrainParams::default());
        assert_eq!(ChannelRemapParams::from_options(&empty), ChannelRemapParams::default());
        assert_eq!(
            LevelsParams::from_options_or(&empty, LevelsParams::DITHER),
            LevelsParams::DITHER
        );
    }

    #[test]
    fn values_are_clamped() {
        let bag = OptionBag::new()
            .with(OptionKey::Radius, OptionValue::Float(1000.0))
            .with(OptionKey::Levels, OptionValue::Int(1));
        assert_eq!(BlurParams::from_options(&bag).radius, 64.0);
        assert_eq!(
            LevelsParams::from_options_or(&bag, LevelsParams::POSTERIZE).levels,
            2
        );
    }

    #[test]
    fn mistyped_values_fall_back() {
        let bag = OptionBag::new()
            .with(OptionKey::Horizontal, OptionValue::Float(1.0))
            .with(OptionKey::Center, OptionValue::Bool(true));
        assert!(FlipParams::from_options(&bag).horizontal);
        assert_eq!(VignetteParams::from_options(&bag).center, [0.5, 0.5]);
    }

    #[test]
    fn channel_sources_read_ints() {
        let bag = OptionBag::new()
            .with(OptionKey::RedSource, OptionValue::Int(2))
            .with(OptionKey::BlueSource, OptionValue::Int(0))
            .with(OptionKey::InvertGreen, OptionValue::Bool(true));
        let params = ChannelRemapParams::from_options(&bag);
        assert_eq!(params.sources, [2, 1, 0, 3]);
        assert_eq!(params.invert, [false, true, false, false]);
    }
}
