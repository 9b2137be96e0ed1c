use std::fmt::Display;

use crate::{engine::ViewState, storage::entities::Mode, utils::percentage::Percentage};

pub const COUNT_MODE_COLOR: Rgb = Rgb(0x66, 0x66, 0x66);
pub const OVER_LIMIT_COLOR: Rgb = Rgb(0xcc, 0x00, 0x00);

const NUDGE_SATURATION: f64 = 1.;
const NUDGE_LIGHTNESS: f64 = 0.35;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CounterColor {
    /// Hue in degrees, saturation and lightness in `0..=1`.
    Hsl {
        hue: f64,
        saturation: f64,
        lightness: f64,
    },
    Fixed(Rgb),
}

impl CounterColor {
    pub fn to_rgb(&self) -> Rgb {
        match *self {
            CounterColor::Fixed(rgb) => rgb,
            CounterColor::Hsl {
                hue,
                saturation,
                lightness,
            } => hsl_to_rgb(hue, saturation, lightness),
        }
    }
}

impl Display for CounterColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CounterColor::Hsl {
                hue,
                saturation,
                lightness,
            } => write!(
                f,
                "hsl({}, {}%, {}%)",
                hue.round(),
                (saturation * 100.).round(),
                (lightness * 100.).round()
            ),
            CounterColor::Fixed(rgb) => rgb.fmt(f),
        }
    }
}

/// How the counter is presented next to the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterAnnotation {
    pub color: CounterColor,
    pub label: String,
}

/// In nudge mode the color slides from green to red as the count approaches the threshold and
/// turns solid red past it.
pub fn annotate(view: &ViewState) -> CounterAnnotation {
    match view.mode {
        Mode::Count => CounterAnnotation {
            color: CounterColor::Fixed(COUNT_MODE_COLOR),
            label: format!("Post #{}", view.viewed_posts_today),
        },
        Mode::Nudge => {
            let progress = Percentage::of(view.viewed_posts_today, view.threshold.get().into());
            if progress.fraction() > 1. {
                let over = Percentage::new_opt(*progress - 100.).unwrap_or(progress);
                CounterAnnotation {
                    color: CounterColor::Fixed(OVER_LIMIT_COLOR),
                    label: format!("{over} over limit!"),
                }
            } else {
                CounterAnnotation {
                    color: CounterColor::Hsl {
                        hue: 120. - 120. * progress.fraction(),
                        saturation: NUDGE_SATURATION,
                        lightness: NUDGE_LIGHTNESS,
                    },
                    label: format!("{progress} of limit"),
                }
            }
        }
    }
}

fn hsl_to_rgb(hue: f64, saturation: f64, lightness: f64) -> Rgb {
    let chroma = (1. - (2. * lightness - 1.).abs()) * saturation;
    let sector = hue.rem_euclid(360.) / 60.;
    let second = chroma * (1. - (sector % 2. - 1.).abs());
    let (r, g, b) = match sector as u32 {
        0 => (chroma, second, 0.),
        1 => (second, chroma, 0.),
        2 => (0., chroma, second),
        3 => (0., second, chroma),
        4 => (second, 0., chroma),
        _ => (chroma, 0., second),
    };
    let offset = lightness - chroma / 2.;
    let channel = |v: f64| ((v + offset) * 255.).round().clamp(0., 255.) as u8;
    Rgb(channel(r), channel(g), channel(b))
}
