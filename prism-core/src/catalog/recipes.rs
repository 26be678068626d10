//! Operator graphs for the CPU filters.

use crate::format::ColorSpace;
use crate::graph::{BlendMode, ColorMatrix, Curve, Graph, Kernel3, Operator, Recipe, Screen};
use crate::options::{FromOptions, OptionBag};

use super::params::*;
use super::FilterId;

/// The graph builder for `id`. Passthrough builds an empty graph; channel
/// remap gets the color-matrix equivalent of its GPU kernel.
pub fn recipe(id: FilterId) -> Recipe {
    match id {
        FilterId::Passthrough => |_, _| Graph::new(),
        FilterId::Invert => |_, _| Graph::new().then(Operator::ColorMatrix(ColorMatrix::invert())),
        FilterId::Grayscale => |_, cs| {
            Graph::new().then(Operator::ColorMatrix(ColorMatrix::grayscale(cs.luma_coefficients())))
        },
        FilterId::Sepia => sepia,
        FilterId::Monochrome => monochrome,
        FilterId::ChannelRemap => channel_remap,
        FilterId::Brightness => |o, _| tone(ColorMatrix::brightness(ToneParams::from_options(o).brightness)),
        FilterId::Contrast => |o, _| tone(ColorMatrix::contrast(ToneParams::from_options(o).contrast)),
        FilterId::Saturation => |o, cs| {
            tone(ColorMatrix::saturation(
                ToneParams::from_options(o).saturation,
                cs.luma_coefficients(),
            ))
        },
        FilterId::Exposure => |o, _| tone(ColorMatrix::exposure(ToneParams::from_options(o).exposure)),
        FilterId::Gamma => {
            |o, _| Graph::new().then(Operator::Curve(Curve::Gamma(ToneParams::from_options(o).gamma)))
        }
        FilterId::Temperature => {
            |o, _| tone(ColorMatrix::temperature(ToneParams::from_options(o).temperature))
        }
        FilterId::HueRotate => |o, _| tone(ColorMatrix::hue_rotate(ToneParams::from_options(o).hue)),
        FilterId::BoxBlur => box_blur,
        FilterId::GaussianBlur => gaussian_blur,
        FilterId::Sharpen => |o, _| {
            let p = SharpenParams::from_options(o);
            Graph::new().then(Operator::Convolve(Kernel3::sharpen(p.sharpness)))
        },
        FilterId::UnsharpMask => unsharp_mask,
        FilterId::SobelEdges => |o, _| {
            let p = IntensityParams::from_options(o);
            Graph::new().then(Operator::Sobel {
                intensity: p.intensity,
            })
        },
        FilterId::Emboss => |o, _| {
            let p = IntensityParams::from_options(o);
            Graph::new().then(Operator::Convolve(Kernel3::emboss(p.intensity)))
        },
        FilterId::Laplacian => |o, _| {
            let p = IntensityParams::from_options(o);
            Graph::new().then(Operator::Convolve(Kernel3::laplacian(p.intensity)))
        },
        FilterId::Posterize => |o, _| {
            let p = LevelsParams::from_options_or(o, LevelsParams::POSTERIZE);
            Graph::new().then(Operator::Curve(Curve::Posterize(p.levels)))
        },
        FilterId::Threshold => |o, cs| {
            let p = ThresholdParams::from_options(o);
            Graph::new().then(Operator::Curve(Curve::Threshold {
                level: p.threshold,
                luma: cs.luma_coefficients(),
            }))
        },
        FilterId::Solarize => |o, _| {
            let p = ThresholdParams::from_options(o);
            Graph::new().then(Operator::Curve(Curve::Solarize(p.threshold)))
        },
        FilterId::Pixellate => |o, _| {
            let p = PixellateParams::from_options(o);
            Graph::new().then(Operator::Pixellate {
                size: p.scale.round() as usize,
            })
        },
        FilterId::OrderedDither => |o, _| {
            let p = LevelsParams::from_options_or(o, LevelsParams::DITHER);
            Graph::new().then(Operator::Screen(Screen::Dither { levels: p.levels }))
        },
        FilterId::LineScreen => line_screen,
        FilterId::Flip => |o, _| {
            let p = FlipParams::from_options(o);
            Graph::new().then(Operator::Flip {
                horizontal: p.horizontal,
                vertical: p.vertical,
            })
        },
        FilterId::Mirror => |o, _| {
            let p = MirrorParams::from_options(o);
            Graph::new().then(Operator::Mirror {
                vertical: p.vertical,
            })
        },
        FilterId::Vignette => vignette,
        FilterId::FilmGrain => film_grain,
        FilterId::Difference => |_, _| Graph::new().then(Operator::Blend(BlendMode::Difference)),
        FilterId::Average => |_, _| Graph::new().then(Operator::Blend(BlendMode::Average)),
        FilterId::Lighten => |_, _| Graph::new().then(Operator::Blend(BlendMode::Lighten)),
    }
}

fn tone(matrix: ColorMatrix) -> Graph {
    Graph::new().then(Operator::ColorMatrix(matrix))
}

fn sepia(options: &OptionBag, _: ColorSpace) -> Graph {
    let p = IntensityParams::from_options(options);
    tone(ColorMatrix::sepia().mix(p.intensity.min(1.0)))
}

fn monochrome(options: &OptionBag, color_space: ColorSpace) -> Graph {
    let p = MonochromeParams::from_options(options);
    tone(ColorMatrix::monochrome(p.color, color_space.luma_coefficients()).mix(p.intensity))
}

fn channel_remap(options: &OptionBag, _: ColorSpace) -> Graph {
    let p = ChannelRemapParams::from_options(options);
    tone(ColorMatrix::channel_remap(
        p.sources.map(|s| s as usize),
        p.invert,
        p.gains(),
    ))
}

fn box_blur(options: &OptionBag, _: ColorSpace) -> Graph {
    let p = BlurParams::from_options(options);
    Graph::new().then(Operator::BoxBlur {
        radius: p.radius.round() as usize,
        passes: 1,
    })
}

/// Three box passes approximating a Gaussian with sigma = radius / 2.
fn gaussian_blur(options: &OptionBag, _: ColorSpace) -> Graph {
    let p = BlurParams::from_options(options);
    Graph::new().then(Operator::BoxBlur {
        radius: box_radius_for_sigma(p.radius / 2.0, 3),
        passes: 3,
    })
}

fn box_radius_for_sigma(sigma: f32, passes: usize) -> usize {
    if sigma <= 0.0 {
        return 0;
    }
    let ideal_width = (12.0 * sigma * sigma / passes as f32 + 1.0).sqrt();
    ((ideal_width - 1.0) / 2.0).round().max(1.0) as usize
}

fn unsharp_mask(options: &OptionBag, _: ColorSpace) -> Graph {
    let p = UnsharpParams::from_options(options);
    Graph::new().then(Operator::Unsharp {
        radius: box_radius_for_sigma(p.radius, 3),
        amount: p.intensity,
    })
}

fn line_screen(options: &OptionBag, color_space: ColorSpace) -> Graph {
    let p = LineScreenParams::from_options(options);
    Graph::new().then(Operator::Screen(Screen::Lines {
        width: p.width,
        angle: p.angle,
        sharpness: p.sharpness,
        luma: color_space.luma_coefficients(),
    }))
}

fn vignette(options: &OptionBag, _: ColorSpace) -> Graph {
    let p = VignetteParams::from_options(options);
    Graph::new().then(Operator::Vignette {
        intensity: p.intensity,
        radius: p.radius,
        softness: p.softness,
        center: p.center,
    })
}

fn film_grain(options: &OptionBag, _: ColorSpace) -> Graph {
    let p = GrainParams::from_options(options);
    Graph::new().then(Operator::Grain {
        intensity: p.intensity,
        seed: p.seed,
        monochrome: p.monochrome,
    })
}
