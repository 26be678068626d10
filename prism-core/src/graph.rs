//! # Operator Graphs
//!
//! CPU filters are declarative: each one is a recipe that turns its options
//! into a [`Graph`], an ordered chain of built-in [`Operator`]s evaluated over
//! a floating-point [`Canvas`].
//!
//! ```text
//! Frame ─► decode ─► Canvas ─► op 1 ─► op 2 ─► ... ─► encode ─► pooled Frame
//!                                 ▲
//!                     extra inputs (multi-frame blends)
//! ```

use crate::catalog::FilterId;
use crate::error::{FilterError, Result};
use crate::filter::{Filter, FilterState};
use crate::format::{ColorSpace, FormatContext, PixelLayout};
use crate::frame::Frame;
use crate::options::{OptionBag, Rgba};
use crate::pool::{BufferPoolManager, FrameBufferPool};

// ============================================================================
// Canvas
// ============================================================================

/// Straight RGBA working image, components nominally in 0.0..=1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
    width: usize,
    height: usize,
    px: Vec<[f32; 4]>,
}

impl Canvas {
    pub fn new(width: usize, height: usize, fill: [f32; 4]) -> Self {
        Self {
            width,
            height,
            px: vec![fill; width * height],
        }
    }

    pub fn decode(bytes: &[u8], format: &FormatContext) -> Self {
        let px = match format.layout.channel_offsets() {
            Some([r, g, b, a]) => bytes
                .chunks_exact(4)
                .map(|p| {
                    [
                        unorm(p[r]),
                        unorm(p[g]),
                        unorm(p[b]),
                        unorm(p[a]),
                    ]
                })
                .collect(),
            None => bytes
                .iter()
                .map(|&v| {
                    let v = unorm(v);
                    [v, v, v, 1.0]
                })
                .collect(),
        };
        Self {
            width: format.width as usize,
            height: format.height as usize,
            px,
        }
    }

    /// Writes the canvas into `dest` using `layout`. Single-channel layouts
    /// store luma computed with `luma` weights.
    pub fn encode(&self, dest: &mut [u8], layout: PixelLayout, luma: [f32; 3]) {
        match layout.channel_offsets() {
            Some(offsets) => {
                for (out, p) in dest.chunks_exact_mut(4).zip(&self.px) {
                    for (channel, &offset) in offsets.iter().enumerate() {
                        out[offset] = to_u8(p[channel]);
                    }
                }
            }
            None => {
                for (out, p) in dest.iter_mut().zip(&self.px) {
                    *out = to_u8(dot3(p, luma));
                }
            }
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixel(&self, x: usize, y: usize) -> [f32; 4] {
        self.px[y * self.width + x]
    }

    fn clamped(&self, x: isize, y: isize) -> [f32; 4] {
        let x = x.clamp(0, self.width as isize - 1) as usize;
        let y = y.clamp(0, self.height as isize - 1) as usize;
        self.px[y * self.width + x]
    }
}

fn unorm(v: u8) -> f32 {
    v as f32 / 255.0
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn dot3(p: &[f32; 4], w: [f32; 3]) -> f32 {
    p[0] * w[0] + p[1] * w[1] + p[2] * w[2]
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

// ============================================================================
// Color Matrix
// ============================================================================

/// 4x5 matrix: `out[c] = sum(rows[c][i] * in[i]) + rows[c][4]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorMatrix {
    rows: [[f32; 5]; 4],
}

impl ColorMatrix {
    pub const IDENTITY: ColorMatrix = ColorMatrix {
        rows: [
            [1.0, 0.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 1.0, 0.0],
        ],
    };

    pub fn from_rows(rows: [[f32; 5]; 4]) -> Self {
        Self { rows }
    }

    /// Applies `rgb` (3x3) and `bias` to color, leaving alpha alone.
    fn rgb(rgb: [[f32; 3]; 3], bias: [f32; 3]) -> Self {
        let mut rows = Self::IDENTITY.rows;
        for c in 0..3 {
            rows[c] = [rgb[c][0], rgb[c][1], rgb[c][2], 0.0, bias[c]];
        }
        Self { rows }
    }

    pub fn invert() -> Self {
        Self::rgb(
            [[-1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, -1.0]],
            [1.0, 1.0, 1.0],
        )
    }

    pub fn grayscale(luma: [f32; 3]) -> Self {
        Self::rgb([luma, luma, luma], [0.0; 3])
    }

    pub fn sepia() -> Self {
        Self::rgb(
            [
                [0.393, 0.769, 0.189],
                [0.349, 0.686, 0.168],
                [0.272, 0.534, 0.131],
            ],
            [0.0; 3],
        )
    }

    pub fn monochrome(color: Rgba, luma: [f32; 3]) -> Self {
        let tint = [color.r, color.g, color.b];
        let rows = tint.map(|t| [luma[0] * t, luma[1] * t, luma[2] * t]);
        Self::rgb(rows, [0.0; 3])
    }

    pub fn brightness(amount: f32) -> Self {
        Self::rgb(Self::diagonal(1.0), [amount; 3])
    }

    pub fn contrast(amount: f32) -> Self {
        Self::rgb(Self::diagonal(amount), [0.5 * (1.0 - amount); 3])
    }

    pub fn saturation(amount: f32, luma: [f32; 3]) -> Self {
        let mut rgb = [[0.0; 3]; 3];
        for (c, row) in rgb.iter_mut().enumerate() {
            for (i, v) in row.iter_mut().enumerate() {
                let identity = if c == i { 1.0 } else { 0.0 };
                *v = (1.0 - amount) * luma[i] + amount * identity;
            }
        }
        Self::rgb(rgb, [0.0; 3])
    }

    pub fn exposure(ev: f32) -> Self {
        Self::rgb(Self::diagonal(2f32.powf(ev)), [0.0; 3])
    }

    pub fn temperature(warmth: f32) -> Self {
        Self::rgb(Self::diagonal(1.0), [0.1 * warmth, 0.0, -0.1 * warmth])
    }

    pub fn hue_rotate(degrees: f32) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self::rgb(
            [
                [
                    0.213 + cos * 0.787 - sin * 0.213,
                    0.715 - cos * 0.715 - sin * 0.715,
                    0.072 - cos * 0.072 + sin * 0.928,
                ],
                [
                    0.213 - cos * 0.213 + sin * 0.143,
                    0.715 + cos * 0.285 + sin * 0.140,
                    0.072 - cos * 0.072 - sin * 0.283,
                ],
                [
                    0.213 - cos * 0.213 - sin * 0.787,
                    0.715 - cos * 0.715 + sin * 0.715,
                    0.072 + cos * 0.928 + sin * 0.072,
                ],
            ],
            [0.0; 3],
        )
    }

    /// Output channel `c` reads input channel `sources[c]`, scaled by
    /// `gains[c]`, optionally inverted.
    pub fn channel_remap(sources: [usize; 4], invert: [bool; 4], gains: [f32; 4]) -> Self {
        let mut rows = [[0.0; 5]; 4];
        for c in 0..4 {
            let sign = if invert[c] { -1.0 } else { 1.0 };
            rows[c][sources[c].min(3)] = sign * gains[c];
            rows[c][4] = if invert[c] { 1.0 } else { 0.0 };
        }
        Self { rows }
    }

    /// Linear blend toward `self` from identity by `amount`.
    pub fn mix(self, amount: f32) -> Self {
        let mut rows = Self::IDENTITY.rows;
        for (row, target) in rows.iter_mut().zip(self.rows.iter()) {
            for (v, t) in row.iter_mut().zip(target.iter()) {
                *v = *v * (1.0 - amount) + t * amount;
            }
        }
        Self { rows }
    }

    fn diagonal(v: f32) -> [[f32; 3]; 3] {
        [[v, 0.0, 0.0], [0.0, v, 0.0], [0.0, 0.0, v]]
    }

    fn apply(&self, p: [f32; 4]) -> [f32; 4] {
        let mut out = [0.0; 4];
        for (o, row) in out.iter_mut().zip(self.rows.iter()) {
            *o = row[0] * p[0] + row[1] * p[1] + row[2] * p[2] + row[3] * p[3] + row[4];
        }
        out
    }
}

// ============================================================================
// Operators
// ============================================================================

/// Per-channel tone curves. Alpha is never touched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Curve {
    Gamma(f32),
    Posterize(u32),
    /// Luma at or above the level becomes white, the rest black.
    Threshold { level: f32, luma: [f32; 3] },
    Solarize(f32),
}

impl Curve {
    fn apply(&self, p: &mut [f32; 4]) {
        match *self {
            Curve::Gamma(gamma) => {
                let exponent = 1.0 / gamma.max(0.01);
                for v in &mut p[..3] {
                    *v = v.max(0.0).powf(exponent);
                }
            }
            Curve::Posterize(levels) => {
                let steps = levels.max(2) as f32 - 1.0;
                for v in &mut p[..3] {
                    *v = (v.clamp(0.0, 1.0) * steps).round() / steps;
                }
            }
            Curve::Threshold { level, luma } => {
                let y = if dot3(p, luma) >= level { 1.0 } else { 0.0 };
                p[..3].fill(y);
            }
            Curve::Solarize(threshold) => {
                for v in &mut p[..3] {
                    if *v > threshold {
                        *v = 1.0 - *v;
                    }
                }
            }
        }
    }
}

/// 3x3 convolution on color with clamped edges, alpha preserved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kernel3 {
    weights: [f32; 9],
    bias: f32,
}

impl Kernel3 {
    pub fn new(weights: [f32; 9], bias: f32) -> Self {
        Self { weights, bias }
    }

    pub fn sharpen(amount: f32) -> Self {
        let a = amount;
        Self::new([0.0, -a, 0.0, -a, 1.0 + 4.0 * a, -a, 0.0, -a, 0.0], 0.0)
    }

    pub fn emboss(intensity: f32) -> Self {
        let i = intensity;
        Self::new([-2.0 * i, -i, 0.0, -i, 1.0, i, 0.0, i, 2.0 * i], 0.0)
    }

    pub fn laplacian(intensity: f32) -> Self {
        let i = intensity;
        Self::new([0.0, i, 0.0, i, -4.0 * i, i, 0.0, i, 0.0], 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    Difference,
    Average,
    Lighten,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Screen {
    /// 4x4 Bayer ordered dither to `levels` values per channel.
    Dither { levels: u32 },
    /// Sinusoidal line screen of period `width` pixels at `angle` degrees.
    Lines {
        width: f32,
        angle: f32,
        sharpness: f32,
        luma: [f32; 3],
    },
}

const BAYER_4X4: [[f32; 4]; 4] = [
    [0.0, 8.0, 2.0, 10.0],
    [12.0, 4.0, 14.0, 6.0],
    [3.0, 11.0, 1.0, 9.0],
    [15.0, 7.0, 13.0, 5.0],
];

#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    ColorMatrix(ColorMatrix),
    Curve(Curve),
    Convolve(Kernel3),
    Sobel { intensity: f32 },
    BoxBlur { radius: usize, passes: usize },
    Unsharp { radius: usize, amount: f32 },
    Pixellate { size: usize },
    Flip { horizontal: bool, vertical: bool },
    /// Reflects the left half onto the right, or the top half onto the bottom.
    Mirror { vertical: bool },
    Vignette {
        intensity: f32,
        radius: f32,
        softness: f32,
        center: [f32; 2],
    },
    Grain { intensity: f32, seed: u64, monochrome: bool },
    Screen(Screen),
    /// Folds the extra input frames into the primary one.
    Blend(BlendMode),
}

impl Operator {
    fn apply(&self, canvas: &mut Canvas, others: &[Canvas]) {
        match self {
            Operator::ColorMatrix(matrix) => {
                for p in &mut canvas.px {
                    *p = matrix.apply(*p);
                }
            }
            Operator::Curve(curve) => {
                for p in &mut canvas.px {
                    curve.apply(p);
                }
            }
            Operator::Convolve(kernel) => convolve(canvas, kernel),
            Operator::Sobel { intensity } => sobel(canvas, *intensity),
            Operator::BoxBlur { radius, passes } => {
                for _ in 0..*passes {
                    box_blur(canvas, *radius);
                }
            }
            Operator::Unsharp { radius, amount } => {
                let mut blurred = canvas.clone();
                for _ in 0..3 {
                    box_blur(&mut blurred, *radius);
                }
                for (p, b) in canvas.px.iter_mut().zip(&blurred.px) {
                    for c in 0..3 {
                        p[c] += (p[c] - b[c]) * amount;
                    }
                }
            }
            Operator::Pixellate { size } => pixellate(canvas, *size),
            Operator::Flip {
                horizontal,
                vertical,
            } => flip(canvas, *horizontal, *vertical),
            Operator::Mirror { vertical } => mirror(canvas, *vertical),
            Operator::Vignette {
                intensity,
                radius,
                softness,
                center,
            } => vignette(canvas, *intensity, *radius, *softness, *center),
            Operator::Grain {
                intensity,
                seed,
                monochrome,
            } => grain(canvas, *intensity, *seed, *monochrome),
            Operator::Screen(screen) => apply_screen(canvas, screen),
            Operator::Blend(mode) => blend(canvas, others, *mode),
        }
    }
}

fn convolve(canvas: &mut Canvas, kernel: &Kernel3) {
    let src = canvas.clone();
    for y in 0..canvas.height {
        for x in 0..canvas.width {
            let mut acc = [kernel.bias; 3];
            for (k, weight) in kernel.weights.iter().enumerate() {
                if *weight == 0.0 {
                    continue;
                }
                let dx = (k % 3) as isize - 1;
                let dy = (k / 3) as isize - 1;
                let s = src.clamped(x as isize + dx, y as isize + dy);
                for c in 0..3 {
                    acc[c] += s[c] * weight;
                }
            }
            let p = &mut canvas.px[y * canvas.width + x];
            p[..3].copy_from_slice(&acc);
        }
    }
}

fn sobel(canvas: &mut Canvas, intensity: f32) {
    const GX: [f32; 9] = [-1.0, 0.0, 1.0, -2.0, 0.0, 2.0, -1.0, 0.0, 1.0];
    const GY: [f32; 9] = [-1.0, -2.0, -1.0, 0.0, 0.0, 0.0, 1.0, 2.0, 1.0];
    let src = canvas.clone();
    for y in 0..canvas.height {
        for x in 0..canvas.width {
            let mut gx = [0.0f32; 3];
            let mut gy = [0.0f32; 3];
            for k in 0..9 {
                let dx = (k % 3) as isize - 1;
                let dy = (k / 3) as isize - 1;
                let s = src.clamped(x as isize + dx, y as isize + dy);
                for c in 0..3 {
                    gx[c] += s[c] * GX[k];
                    gy[c] += s[c] * GY[k];
                }
            }
            let p = &mut canvas.px[y * canvas.width + x];
            for c in 0..3 {
                p[c] = (gx[c] * gx[c] + gy[c] * gy[c]).sqrt() * intensity;
            }
        }
    }
}

/// One separable box pass (horizontal then vertical) with a running sum.
fn box_blur(canvas: &mut Canvas, radius: usize) {
    if radius == 0 {
        return;
    }
    let (w, h) = (canvas.width, canvas.height);
    let r = radius as isize;
    let norm = 1.0 / (2 * radius + 1) as f32;

    let mut line = vec![[0.0f32; 4]; w.max(h)];
    for y in 0..h {
        let row = &canvas.px[y * w..(y + 1) * w];
        running_box(row, &mut line[..w], r, norm);
        canvas.px[y * w..(y + 1) * w].copy_from_slice(&line[..w]);
    }

    let mut column = vec![[0.0f32; 4]; h];
    for x in 0..w {
        for y in 0..h {
            column[y] = canvas.px[y * w + x];
        }
        running_box(&column, &mut line[..h], r, norm);
        for y in 0..h {
            canvas.px[y * w + x] = line[y];
        }
    }
}

fn running_box(src: &[[f32; 4]], dst: &mut [[f32; 4]], r: isize, norm: f32) {
    let last = src.len() as isize - 1;
    let at = |i: isize| src[i.clamp(0, last) as usize];

    let mut acc = [0.0f32; 4];
    for i in -r..=r {
        let s = at(i);
        for c in 0..4 {
            acc[c] += s[c];
        }
    }
    for (x, out) in dst.iter_mut().enumerate() {
        let x = x as isize;
        for c in 0..4 {
            out[c] = acc[c] * norm;
        }
        let leaving = at(x - r);
        let entering = at(x + r + 1);
        for c in 0..4 {
            acc[c] += entering[c] - leaving[c];
        }
    }
}

fn pixellate(canvas: &mut Canvas, size: usize) {
    if size <= 1 {
        return;
    }
    let (w, h) = (canvas.width, canvas.height);
    for by in (0..h).step_by(size) {
        for bx in (0..w).step_by(size) {
            let (x_end, y_end) = ((bx + size).min(w), (by + size).min(h));
            let mut acc = [0.0f32; 4];
            for y in by..y_end {
                for x in bx..x_end {
                    let p = canvas.px[y * w + x];
                    for c in 0..4 {
                        acc[c] += p[c];
                    }
                }
            }
            let count = ((x_end - bx) * (y_end - by)) as f32;
            let mean = acc.map(|v| v / count);
            for y in by..y_end {
                canvas.px[y * w + bx..y * w + x_end].fill(mean);
            }
        }
    }
}

fn flip(canvas: &mut Canvas, horizontal: bool, vertical: bool) {
    let w = canvas.width;
    if horizontal {
        for row in canvas.px.chunks_exact_mut(w) {
            row.reverse();
        }
    }
    if vertical {
        let rows: Vec<Vec<[f32; 4]>> = canvas.px.chunks_exact(w).rev().map(<[_]>::to_vec).collect();
        canvas.px = rows.concat();
    }
}

fn mirror(canvas: &mut Canvas, vertical: bool) {
    let (w, h) = (canvas.width, canvas.height);
    if vertical {
        for y in h / 2..h {
            let src = h - 1 - y;
            canvas.px.copy_within(src * w..(src + 1) * w, y * w);
        }
    } else {
        for row in canvas.px.chunks_exact_mut(w) {
            for x in w / 2..w {
                row[x] = row[w - 1 - x];
            }
        }
    }
}

fn vignette(canvas: &mut Canvas, intensity: f32, radius: f32, softness: f32, center: [f32; 2]) {
    let (w, h) = (canvas.width as f32, canvas.height as f32);
    let inner = radius * (1.0 - softness.clamp(0.0, 1.0));
    let outer = radius.max(inner + 1e-3);
    for y in 0..canvas.height {
        for x in 0..canvas.width {
            let u = (x as f32 + 0.5) / w - center[0];
            let v = (y as f32 + 0.5) / h - center[1];
            let d = (u * u + v * v).sqrt() / std::f32::consts::FRAC_1_SQRT_2;
            let factor = 1.0 - intensity * smoothstep(inner, outer, d);
            let p = &mut canvas.px[y * canvas.width + x];
            for c in &mut p[..3] {
                *c *= factor;
            }
        }
    }
}

/// Deterministic per-pixel noise in -0.5..0.5.
fn noise(x: usize, y: usize, seed: u64, channel: u64) -> f32 {
    let mut z = (x as u64)
        ^ ((y as u64) << 32)
        ^ seed.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ channel.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    (z >> 40) as f32 / (1u64 << 24) as f32 - 0.5
}

fn grain(canvas: &mut Canvas, intensity: f32, seed: u64, monochrome: bool) {
    for y in 0..canvas.height {
        for x in 0..canvas.width {
            let p = &mut canvas.px[y * canvas.width + x];
            for c in 0..3 {
                let channel = if monochrome { 0 } else { c as u64 };
                p[c] += noise(x, y, seed, channel) * intensity;
            }
        }
    }
}

fn apply_screen(canvas: &mut Canvas, screen: &Screen) {
    match *screen {
        Screen::Dither { levels } => {
            let steps = levels.max(2) as f32 - 1.0;
            for y in 0..canvas.height {
                for x in 0..canvas.width {
                    let bias = (BAYER_4X4[y % 4][x % 4] + 0.5) / 16.0 - 0.5;
                    let p = &mut canvas.px[y * canvas.width + x];
                    for v in &mut p[..3] {
                        *v = (v.clamp(0.0, 1.0) * steps + bias).round().clamp(0.0, steps) / steps;
                    }
                }
            }
        }
        Screen::Lines {
            width,
            angle,
            sharpness,
            luma,
        } => {
            let (sin, cos) = angle.to_radians().sin_cos();
            let period = width.max(1.0);
            let gain = 1.0 + sharpness.clamp(0.0, 1.0) * 20.0;
            for y in 0..canvas.height {
                for x in 0..canvas.width {
                    let along = x as f32 * cos + y as f32 * sin;
                    let pattern = 0.5 + 0.5 * (std::f32::consts::TAU * along / period).sin();
                    let p = &mut canvas.px[y * canvas.width + x];
                    let level = ((dot3(p, luma) - pattern) * gain + 0.5).clamp(0.0, 1.0);
                    p[..3].fill(level);
                }
            }
        }
    }
}

fn blend(canvas: &mut Canvas, others: &[Canvas], mode: BlendMode) {
    if others.is_empty() {
        return;
    }
    match mode {
        BlendMode::Difference => {
            for (p, o) in canvas.px.iter_mut().zip(&others[0].px) {
                for c in 0..3 {
                    p[c] = (p[c] - o[c]).abs();
                }
            }
        }
        BlendMode::Average => {
            let scale = 1.0 / (others.len() + 1) as f32;
            for (i, p) in canvas.px.iter_mut().enumerate() {
                for other in others {
                    let o = other.px[i];
                    for c in 0..4 {
                        p[c] += o[c];
                    }
                }
                for v in p.iter_mut() {
                    *v *= scale;
                }
            }
        }
        BlendMode::Lighten => {
            for other in others {
                for (p, o) in canvas.px.iter_mut().zip(&other.px) {
                    for c in 0..4 {
                        p[c] = p[c].max(o[c]);
                    }
                }
            }
        }
    }
}

// ============================================================================
// Graph
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    ops: Vec<Operator>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, op: Operator) -> Self {
        self.ops.push(op);
        self
    }

    pub fn ops(&self) -> &[Operator] {
        &self.ops
    }

    /// Whether any operator reads the extra input frames.
    pub fn blends(&self) -> bool {
        self.ops.iter().any(|op| matches!(op, Operator::Blend(_)))
    }

    pub fn apply(&self, canvas: &mut Canvas, others: &[Canvas]) {
        for op in &self.ops {
            op.apply(canvas, others);
        }
    }
}

/// Builds a graph from the current options and the stream's color space.
pub type Recipe = fn(&OptionBag, ColorSpace) -> Graph;

// ============================================================================
// Graph Filter
// ============================================================================

/// A CPU filter evaluating one recipe per frame.
pub struct GraphFilter {
    id: FilterId,
    recipe: Recipe,
    pools: BufferPoolManager,
    state: FilterState,
}

impl GraphFilter {
    pub fn new(id: FilterId, recipe: Recipe, pools: BufferPoolManager) -> Self {
        Self {
            id,
            recipe,
            pools,
            state: FilterState::default(),
        }
    }
}

impl Filter for GraphFilter {
    fn id(&self) -> FilterId {
        self.id
    }

    fn state(&self) -> &FilterState {
        &self.state
    }

    fn initialize(&mut self, format: &FormatContext, min_buffers: usize) -> Result<()> {
        self.state.initialize(&self.pools, format, min_buffers)?;
        Ok(())
    }

    fn reset(&mut self) {
        self.state.clear();
    }

    fn run(
        &mut self,
        frames: &[Frame],
        pool: &FrameBufferPool,
        color_space: ColorSpace,
        options: &OptionBag,
    ) -> Result<Frame> {
        if !self.state.is_initialized() {
            return Err(FilterError::NotInitialized(self.id));
        }
        let primary = frames.first().ok_or(FilterError::NoInputFrames)?;

        let graph = (self.recipe)(options, color_space);
        let mut canvas = Canvas::decode(&primary.pixels()?, &primary.format());
        let others = if graph.blends() {
            frames[1..]
                .iter()
                .map(|frame| Ok(Canvas::decode(&frame.pixels()?, &frame.format())))
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };
        graph.apply(&mut canvas, &others);

        let output = pool.acquire()?;
        {
            let mut dest = output.pixels_mut()?;
            canvas.encode(&mut dest, pool.format().layout, color_space.luma_coefficients());
        }
        Ok(output)
    }
}
