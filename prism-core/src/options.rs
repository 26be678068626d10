//! # Filter Options
//!
//! Options reach filters as an [`OptionBag`]: a map from the closed
//! [`OptionKey`] set to tagged [`OptionValue`]s. Filters never look keys up in
//! their hot path; each one converts the bag into its own parameter struct
//! through [`FromOptions`], falling back to its defaults for absent keys.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Option Keys
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKey {
    // Tone
    Brightness,
    Contrast,
    Saturation,
    Exposure,
    Gamma,
    Temperature,
    Hue,
    // Geometry
    Radius,
    Angle,
    Center,
    Scale,
    Width,
    Horizontal,
    Vertical,
    // Strength
    Intensity,
    Sharpness,
    Softness,
    Threshold,
    Levels,
    // Color
    Color,
    Monochrome,
    // Randomness
    Seed,
    // Channel remapping
    RedSource,
    GreenSource,
    BlueSource,
    AlphaSource,
    InvertRed,
    InvertGreen,
    InvertBlue,
    InvertAlpha,
}

impl OptionKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Brightness => "brightness",
            Self::Contrast => "contrast",
            Self::Saturation => "saturation",
            Self::Exposure => "exposure",
            Self::Gamma => "gamma",
            Self::Temperature => "temperature",
            Self::Hue => "hue",
            Self::Radius => "radius",
            Self::Angle => "angle",
            Self::Center => "center",
            Self::Scale => "scale",
            Self::Width => "width",
            Self::Horizontal => "horizontal",
            Self::Vertical => "vertical",
            Self::Intensity => "intensity",
            Self::Sharpness => "sharpness",
            Self::Softness => "softness",
            Self::Threshold => "threshold",
            Self::Levels => "levels",
            Self::Color => "color",
            Self::Monochrome => "monochrome",
            Self::Seed => "seed",
            Self::RedSource => "red_source",
            Self::GreenSource => "green_source",
            Self::BlueSource => "blue_source",
            Self::AlphaSource => "alpha_source",
            Self::InvertRed => "invert_red",
            Self::InvertGreen => "invert_green",
            Self::InvertBlue => "invert_blue",
            Self::InvertAlpha => "invert_alpha",
        }
    }
}

impl fmt::Display for OptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Option Values
// ============================================================================

/// Straight (non-premultiplied) color with components in 0.0..=1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Self::new(1.0, 1.0, 1.0, 1.0)
    }
}

/// Settings files store these untagged: `true`, `3`, `0.5`, `[0.5, 0.5]`,
/// `{"r":1,"g":0,"b":0,"a":1}` or `[..]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f32),
    Color(Rgba),
    Point([f32; 2]),
    Vector(Vec<f32>),
}

impl OptionValue {
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f32),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<Rgba> {
        match self {
            Self::Color(c) => Some(*c),
            Self::Vector(v) if v.len() == 4 => Some(Rgba::new(v[0], v[1], v[2], v[3])),
            Self::Vector(v) if v.len() == 3 => Some(Rgba::new(v[0], v[1], v[2], 1.0)),
            _ => None,
        }
    }

    pub fn as_point(&self) -> Option<[f32; 2]> {
        match self {
            Self::Point(p) => Some(*p),
            Self::Vector(v) if v.len() == 2 => Some([v[0], v[1]]),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Color(_) => "color",
            Self::Point(_) => "point",
            Self::Vector(_) => "vector",
        }
    }
}

// ============================================================================
// Option Bag
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OptionBag {
    values: BTreeMap<OptionKey, OptionValue>,
}

impl OptionBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: OptionKey, value: OptionValue) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: OptionKey, value: OptionValue) {
        self.values.insert(key, value);
    }

    pub fn get(&self, key: OptionKey) -> Option<&OptionValue> {
        self.values.get(&key)
    }

    pub fn contains(&self, key: OptionKey) -> bool {
        self.values.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OptionKey, &OptionValue)> {
        self.values.iter()
    }

    pub fn float(&self, key: OptionKey) -> Option<f32> {
        self.get(key).and_then(OptionValue::as_f32)
    }

    pub fn int(&self, key: OptionKey) -> Option<i64> {
        self.get(key).and_then(OptionValue::as_i64)
    }

    pub fn flag(&self, key: OptionKey) -> Option<bool> {
        self.get(key).and_then(OptionValue::as_bool)
    }

    pub fn color(&self, key: OptionKey) -> Option<Rgba> {
        self.get(key).and_then(OptionValue::as_color)
    }

    pub fn point(&self, key: OptionKey) -> Option<[f32; 2]> {
        self.get(key).and_then(OptionValue::as_point)
    }
}

/// Builds a filter's typed parameters from a bag. Must not fail: absent or
/// mistyped keys fall back to the filter's defaults.
pub trait FromOptions: Sized {
    fn from_options(options: &OptionBag) -> Self;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_values_parse_from_json() {
        let parsed: Vec<OptionValue> =
            serde_json::from_str(r#"[true, 3, 0.5, [0.25, 0.75], [1, 0, 0, 1]]"#).unwrap();
        assert_eq!(parsed[0], OptionValue::Bool(true));
        assert_eq!(parsed[1], OptionValue::Int(3));
        assert_eq!(parsed[2], OptionValue::Float(0.5));
        assert_eq!(parsed[3], OptionValue::Point([0.25, 0.75]));
        assert_eq!(parsed[4].as_color(), Some(Rgba::new(1.0, 0.0, 0.0, 1.0)));
    }

    #[test]
    fn ints_read_as_floats() {
        let bag = OptionBag::new().with(OptionKey::Radius, OptionValue::Int(4));
        assert_eq!(bag.float(OptionKey::Radius), Some(4.0));
        assert_eq!(bag.flag(OptionKey::Radius), None);
        assert_eq!(bag.float(OptionKey::Angle), None);
    }

    #[test]
    fn bag_serializes_with_key_names() {
        let bag = OptionBag::new().with(OptionKey::InvertRed, OptionValue::Bool(true));
        let json = serde_json::to_string(&bag).unwrap();
        assert_eq!(json, r#"{"values":{"invert_red":true}}"#);
    }
}
