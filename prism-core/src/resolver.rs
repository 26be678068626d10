//! # Options Resolver
//!
//! Maps a filter to the option bag it should run with. Every key a filter
//! understands has a settings key (`"<prefix>.<name>"`) and a default; a
//! stored value of the wrong type is ignored in favor of the default.

use std::sync::Arc;
use tracing::warn;

use crate::catalog::FilterId;
use crate::options::{OptionBag, OptionKey, OptionValue, Rgba};
use crate::settings::{NoSettings, SettingsStore};

/// Compile-time default for one option.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptionDefault {
    Bool(bool),
    Int(i64),
    Float(f32),
    Color([f32; 4]),
    Point([f32; 2]),
}

impl OptionDefault {
    fn value(&self) -> OptionValue {
        match *self {
            Self::Bool(v) => OptionValue::Bool(v),
            Self::Int(v) => OptionValue::Int(v),
            Self::Float(v) => OptionValue::Float(v),
            Self::Color([r, g, b, a]) => OptionValue::Color(Rgba::new(r, g, b, a)),
            Self::Point(p) => OptionValue::Point(p),
        }
    }

    /// Converts a stored value to this default's type, if compatible.
    fn coerce(&self, stored: &OptionValue) -> Option<OptionValue> {
        match self {
            Self::Bool(_) => stored.as_bool().map(OptionValue::Bool),
            Self::Int(_) => match stored {
                OptionValue::Int(v) => Some(OptionValue::Int(*v)),
                OptionValue::Float(v) if v.fract() == 0.0 => Some(OptionValue::Int(*v as i64)),
                _ => None,
            },
            Self::Float(_) => stored.as_f32().map(OptionValue::Float),
            Self::Color(_) => stored.as_color().map(OptionValue::Color),
            Self::Point(_) => stored.as_point().map(OptionValue::Point),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptionSpec {
    /// Name under the filter's settings prefix.
    pub name: &'static str,
    pub key: OptionKey,
    pub default: OptionDefault,
}

const fn entry(name: &'static str, key: OptionKey, default: OptionDefault) -> OptionSpec {
    OptionSpec { name, key, default }
}

use OptionDefault::{Bool, Color, Float, Int, Point};
use OptionKey as K;

const NONE: &[OptionSpec] = &[];
const INTENSITY: &[OptionSpec] = &[entry("intensity", K::Intensity, Float(1.0))];
const MONOCHROME: &[OptionSpec] = &[
    entry("color", K::Color, Color([0.6, 0.45, 0.3, 1.0])),
    entry("intensity", K::Intensity, Float(1.0)),
];
const CHANNEL_REMAP: &[OptionSpec] = &[
    entry("red_source", K::RedSource, Int(0)),
    entry("green_source", K::GreenSource, Int(1)),
    entry("blue_source", K::BlueSource, Int(2)),
    entry("alpha_source", K::AlphaSource, Int(3)),
    entry("invert_red", K::InvertRed, Bool(false)),
    entry("invert_green", K::InvertGreen, Bool(false)),
    entry("invert_blue", K::InvertBlue, Bool(false)),
    entry("invert_alpha", K::InvertAlpha, Bool(false)),
    entry("intensity", K::Intensity, Float(1.0)),
];
const BRIGHTNESS: &[OptionSpec] = &[entry("amount", K::Brightness, Float(0.0))];
const CONTRAST: &[OptionSpec] = &[entry("amount", K::Contrast, Float(1.0))];
const SATURATION: &[OptionSpec] = &[entry("amount", K::Saturation, Float(1.0))];
const EXPOSURE: &[OptionSpec] = &[entry("ev", K::Exposure, Float(0.0))];
const GAMMA: &[OptionSpec] = &[entry("gamma", K::Gamma, Float(1.0))];
const TEMPERATURE: &[OptionSpec] = &[entry("warmth", K::Temperature, Float(0.0))];
const HUE_ROTATE: &[OptionSpec] = &[entry("angle", K::Hue, Float(0.0))];
const BLUR: &[OptionSpec] = &[entry("radius", K::Radius, Float(4.0))];
const SHARPEN: &[OptionSpec] = &[entry("sharpness", K::Sharpness, Float(0.4))];
const UNSHARP_MASK: &[OptionSpec] = &[
    entry("radius", K::Radius, Float(2.5)),
    entry("intensity", K::Intensity, Float(0.5)),
];
const POSTERIZE: &[OptionSpec] = &[entry("levels", K::Levels, Int(6))];
const DITHER: &[OptionSpec] = &[entry("levels", K::Levels, Int(2))];
const THRESHOLD: &[OptionSpec] = &[entry("threshold", K::Threshold, Float(0.5))];
const PIXELLATE: &[OptionSpec] = &[entry("scale", K::Scale, Float(8.0))];
const LINE_SCREEN: &[OptionSpec] = &[
    entry("width", K::Width, Float(6.0)),
    entry("angle", K::Angle, Float(0.0)),
    entry("sharpness", K::Sharpness, Float(0.7)),
];
const FLIP: &[OptionSpec] = &[
    entry("horizontal", K::Horizontal, Bool(true)),
    entry("vertical", K::Vertical, Bool(false)),
];
const MIRROR: &[OptionSpec] = &[entry("vertical", K::Vertical, Bool(false))];
const VIGNETTE: &[OptionSpec] = &[
    entry("intensity", K::Intensity, Float(0.5)),
    entry("radius", K::Radius, Float(0.8)),
    entry("softness", K::Softness, Float(0.5)),
    entry("center", K::Center, Point([0.5, 0.5])),
];
const FILM_GRAIN: &[OptionSpec] = &[
    entry("intensity", K::Intensity, Float(0.15)),
    entry("seed", K::Seed, Int(0)),
    entry("monochrome", K::Monochrome, Bool(true)),
];

/// Options `id` understands, with their defaults.
pub fn schema(id: FilterId) -> &'static [OptionSpec] {
    match id {
        FilterId::Passthrough
        | FilterId::Invert
        | FilterId::Grayscale
        | FilterId::Difference
        | FilterId::Average
        | FilterId::Lighten => NONE,
        FilterId::Sepia | FilterId::SobelEdges | FilterId::Emboss | FilterId::Laplacian => INTENSITY,
        FilterId::Monochrome => MONOCHROME,
        FilterId::ChannelRemap => CHANNEL_REMAP,
        FilterId::Brightness => BRIGHTNESS,
        FilterId::Contrast => CONTRAST,
        FilterId::Saturation => SATURATION,
        FilterId::Exposure => EXPOSURE,
        FilterId::Gamma => GAMMA,
        FilterId::Temperature => TEMPERATURE,
        FilterId::HueRotate => HUE_ROTATE,
        FilterId::BoxBlur | FilterId::GaussianBlur => BLUR,
        FilterId::Sharpen => SHARPEN,
        FilterId::UnsharpMask => UNSHARP_MASK,
        FilterId::Posterize => POSTERIZE,
        FilterId::OrderedDither => DITHER,
        FilterId::Threshold | FilterId::Solarize => THRESHOLD,
        FilterId::Pixellate => PIXELLATE,
        FilterId::LineScreen => LINE_SCREEN,
        FilterId::Flip => FLIP,
        FilterId::Mirror => MIRROR,
        FilterId::Vignette => VIGNETTE,
        FilterId::FilmGrain => FILM_GRAIN,
    }
}

/// Reads per-filter options from a settings store.
#[derive(Clone)]
pub struct OptionsResolver {
    settings: Arc<dyn SettingsStore>,
}

impl Default for OptionsResolver {
    fn default() -> Self {
        Self::new(Arc::new(NoSettings))
    }
}

impl OptionsResolver {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self { settings }
    }

    /// Full key in the settings store for one option of `id`.
    pub fn settings_key(id: FilterId, spec: &OptionSpec) -> String {
        format!("{}.{}", id.settings_prefix(), spec.name)
    }

    /// The bag for `id`'s next run. Never fails; filters without options
    /// get an empty bag.
    pub fn options_for(&self, id: FilterId) -> OptionBag {
        let mut bag = OptionBag::new();
        for spec in schema(id) {
            let key = Self::settings_key(id, spec);
            let value = match self.settings.value(&key) {
                Some(stored) => spec.default.coerce(&stored).unwrap_or_else(|| {
                    warn!(
                        "Setting {} holds a {}, using default",
                        key,
                        stored.type_name()
                    );
                    spec.default.value()
                }),
                None => spec.default.value(),
            };
            bag.insert(spec.key, value);
        }
        bag
    }

    /// The bag `id` runs with when nothing is stored.
    pub fn defaults_for(id: FilterId) -> OptionBag {
        let mut bag = OptionBag::new();
        for spec in schema(id) {
            bag.insert(spec.key, spec.default.value());
        }
        bag
    }
}

impl std::fmt::Debug for OptionsResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptionsResolver").finish_non_exhaustive()
    }
}
