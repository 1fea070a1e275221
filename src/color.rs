//! Color spaces and approximations of RGB on multi-emitter fixtures.
use number::UnipolarFloat;
use serde::{Deserialize, Serialize};

/// Convert an arbitrary float into a unipolar level; NaN becomes zero.
pub(crate) fn unipolar(v: f64) -> UnipolarFloat {
    if v.is_nan() {
        UnipolarFloat::ZERO
    } else {
        UnipolarFloat::new(v.clamp(0., 1.))
    }
}

/// A color with unit-scaled red, green and blue components.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    pub const WHITE: Self = Self::new(1., 1., 1.);
    pub const BLACK: Self = Self::new(0., 0., 0.);

    pub const fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    /// Clamp every component into the unit range; NaN becomes 0.
    pub fn clamped(&self) -> Self {
        Self::new(
            unipolar(self.r).val(),
            unipolar(self.g).val(),
            unipolar(self.b).val(),
        )
    }

    pub fn to_hsv(&self) -> Hsv {
        let Self { r, g, b } = self.clamped();
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;
        let hue = if delta == 0. {
            0.
        } else if max == r {
            60. * ((g - b) / delta).rem_euclid(6.)
        } else if max == g {
            60. * ((b - r) / delta + 2.)
        } else {
            60. * ((r - g) / delta + 4.)
        };
        Hsv {
            hue: if hue >= 360. { 0. } else { hue },
            sat: if max == 0. {
                UnipolarFloat::ZERO
            } else {
                unipolar(delta / max)
            },
            val: unipolar(max),
        }
    }
}

/// A color in the HSV color space.
///
/// Hue is in degrees in [0, 360); saturation and value are unit-scaled.
#[derive(Debug, Clone, Copy)]
pub struct Hsv {
    pub hue: f64,
    pub sat: UnipolarFloat,
    pub val: UnipolarFloat,
}

impl Hsv {
    /// Hue quantized into 256 buckets.
    pub fn hue_byte(&self) -> u8 {
        ((self.hue / 360. * 256.).floor() as i64).clamp(0, 255) as u8
    }

    /// Chroma and hexagon position of this color.
    fn decompose(&self) -> Hexagon {
        let sector = self.hue / 60.;
        Hexagon {
            chroma: (self.val * self.sat).val(),
            achromatic: (self.sat.invert() * self.val).val(),
            sextant: (sector.floor() as usize).min(5),
            frac: self.hue.rem_euclid(60.) / 60.,
        }
    }
}

struct Hexagon {
    chroma: f64,
    achromatic: f64,
    sextant: usize,
    frac: f64,
}

impl Hexagon {
    /// Standard hexagon decomposition into chroma-scaled RGB.
    fn rgb(&self) -> (f64, f64, f64) {
        let c = self.chroma;
        let p = self.frac;
        match self.sextant {
            0 => (c, c * p, 0.),
            1 => (c * (1. - p), c, 0.),
            2 => (0., c, c * p),
            3 => (0., c * (1. - p), c),
            4 => (c * p, 0., c),
            _ => (c, 0., c * (1. - p)),
        }
    }
}

/// Red/green coordinates of the amber emitter, normalized to its red output.
pub const AMBER_PRIMARY: (f64, f64) = (1.0, 0.7647);

/// Hue of the amber emitter in degrees.
fn amber_hue() -> f64 {
    60. * AMBER_PRIMARY.1 / AMBER_PRIMARY.0
}

/// 32-bit RGBW color.
/// Used by LED fixtures with a white diode in addition to RGB.
pub type ColorRgbw = [u8; 4];

/// 40-bit RGBWA color, in red, green, blue, white, amber order.
pub type ColorRgbwa = [u8; 5];

/// Approximate a color on an RGBW fixture.
///
/// The achromatic part of the color goes to the white diode, the chromatic
/// part to the two neighboring primaries.
pub fn rgb_to_rgbw(color: Rgb) -> ColorRgbw {
    let hex = color.to_hsv().decompose();
    let (r, g, b) = hex.rgb();
    [
        unit_to_u8(r),
        unit_to_u8(g),
        unit_to_u8(b),
        unit_to_u8(hex.achromatic),
    ]
}

/// Approximate a color on an RGBWA fixture.
///
/// Hues between red and green are rendered through the amber emitter: red
/// blends into amber up to the amber hue, then amber blends into green.
pub fn rgb_to_rgbwa(color: Rgb) -> ColorRgbwa {
    let hsv = color.to_hsv();
    let hex = hsv.decompose();
    let c = hex.chroma;
    let (r, g, b, a) = if hex.sextant <= 1 {
        let amber = amber_hue();
        if hsv.hue <= amber {
            let t = hsv.hue / amber;
            (c * (1. - t), 0., 0., c * t)
        } else {
            let t = (hsv.hue - amber) / (120. - amber);
            (0., c * t, 0., c * (1. - t))
        }
    } else {
        let (r, g, b) = hex.rgb();
        (r, g, b, 0.)
    };
    [
        unit_to_u8(r),
        unit_to_u8(g),
        unit_to_u8(b),
        unit_to_u8(hex.achromatic),
        unit_to_u8(a),
    ]
}

/// Scale a unit value to a byte, rounding down.
pub fn unit_to_u8(v: f64) -> u8 {
    (255. * v).floor().clamp(0., 255.) as u8
}

#[cfg(test)]
mod test {
    use super::*;

    fn assert_close(expected: f64, actual: f64) {
        assert!(
            (expected - actual).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_unipolar() {
        assert_eq!(0., unipolar(f64::NAN).val());
        assert_eq!(0., unipolar(-1.).val());
        assert_eq!(1., unipolar(f64::INFINITY).val());
        assert_eq!(0.25, unipolar(0.25).val());
    }

    #[test]
    fn test_to_hsv() {
        let hsv = Rgb::new(1., 0., 0.).to_hsv();
        assert_eq!((0., 1., 1.), (hsv.hue, hsv.sat.val(), hsv.val.val()));
        let hsv = Rgb::new(0., 0.5, 0.).to_hsv();
        assert_eq!((120., 1., 0.5), (hsv.hue, hsv.sat.val(), hsv.val.val()));
        let hsv = Rgb::new(1., 0., 1.).to_hsv();
        assert_close(300., hsv.hue);
        let hsv = Rgb::new(0.5, 0.5, 0.5).to_hsv();
        assert_eq!((0., 0., 0.5), (hsv.hue, hsv.sat.val(), hsv.val.val()));
        assert_eq!(0., Rgb::BLACK.to_hsv().val.val());
    }

    #[test]
    fn test_hue_byte() {
        assert_eq!(0, Rgb::new(1., 0., 0.).to_hsv().hue_byte());
        assert_eq!(85, Rgb::new(0., 1., 0.).to_hsv().hue_byte());
        assert_eq!(170, Rgb::new(0., 0., 1.).to_hsv().hue_byte());
    }

    #[test]
    fn test_rgbw_primaries() {
        assert_eq!([255, 0, 0, 0], rgb_to_rgbw(Rgb::new(1., 0., 0.)));
        assert_eq!([0, 255, 0, 0], rgb_to_rgbw(Rgb::new(0., 1., 0.)));
        assert_eq!([0, 0, 255, 0], rgb_to_rgbw(Rgb::new(0., 0., 1.)));
        assert_eq!([0, 0, 0, 255], rgb_to_rgbw(Rgb::WHITE));
        assert_eq!([0, 0, 0, 0], rgb_to_rgbw(Rgb::BLACK));
    }

    #[test]
    fn test_rgbw_pastel() {
        // Pink: half chroma, half white.
        assert_eq!([127, 0, 0, 127], rgb_to_rgbw(Rgb::new(1., 0.5, 0.5)));
    }

    #[test]
    fn test_rgbw_out_of_range_input() {
        assert_eq!([255, 0, 0, 0], rgb_to_rgbw(Rgb::new(2., -1., f64::NAN)));
    }

    #[test]
    fn test_rgbwa() {
        assert_eq!([255, 0, 0, 0, 0], rgb_to_rgbwa(Rgb::new(1., 0., 0.)));
        assert_eq!([0, 255, 0, 0, 0], rgb_to_rgbwa(Rgb::new(0., 1., 0.)));
        assert_eq!([0, 0, 255, 0, 0], rgb_to_rgbwa(Rgb::new(0., 0., 1.)));
        assert_eq!([0, 0, 0, 255, 0], rgb_to_rgbwa(Rgb::WHITE));
        // The amber primary itself lights only the amber emitter.
        assert_eq!(
            [0, 0, 0, 0, 255],
            rgb_to_rgbwa(Rgb::new(AMBER_PRIMARY.0, AMBER_PRIMARY.1, 0.))
        );
    }

    #[test]
    fn test_rgbwa_yellow_uses_amber_and_green() {
        let [r, g, b, w, a] = rgb_to_rgbwa(Rgb::new(1., 1., 0.));
        assert_eq!((0, 0, 0), (r, b, w));
        assert!(a > g && g > 0, "amber {a}, green {g}");
    }

    #[test]
    fn test_rgbwa_matches_rgbw_outside_warm_hues() {
        for color in [Rgb::new(0., 1., 1.), Rgb::new(0.2, 0.4, 1.), Rgb::new(1., 0., 0.6)] {
            let [r, g, b, w] = rgb_to_rgbw(color);
            assert_eq!([r, g, b, w, 0], rgb_to_rgbwa(color));
        }
    }
}
