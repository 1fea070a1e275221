//! Quantize arbitrary colors onto the discrete slots of a color wheel.
use itertools::Itertools;
use log::warn;
use ordered_float::OrderedFloat;

use crate::color::Hsv;
use crate::profile::ColorMap;

/// Below this saturation a color is treated as white.
pub const ACHROMATIC_SATURATION: f64 = 0.1;

/// Number of hue buckets in the lookup table.
const HUE_BUCKETS: usize = 256;

/// Hue to slot lookup for a calibrated color wheel.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorWheel {
    /// Slot value for every hue bucket; None if no chromatic slot is calibrated.
    lut: Option<[u8; HUE_BUCKETS]>,
    /// Slot value of the open (white) position, if calibrated.
    white: Option<u8>,
}

impl ColorWheel {
    /// Build the lookup from a profile's color calibration.
    ///
    /// Calibration points with negligible saturation are treated as the
    /// white slot; the first one wins.
    pub fn from_color_map(map: &ColorMap) -> Self {
        let mut white = None;
        let mut points = Vec::with_capacity(map.colors.len());
        for cal in &map.colors {
            let hsv = cal.rgb().to_hsv();
            if hsv.sat.val() < ACHROMATIC_SATURATION {
                if white.is_none() {
                    white = Some(cal.value);
                } else {
                    warn!("Ignoring extra achromatic color wheel slot {}.", cal.value);
                }
                continue;
            }
            points.push((hsv.hue / 360. * HUE_BUCKETS as f64, cal.value));
        }
        Self::from_points(&points, white)
    }

    /// Build the lookup from (hue bucket, slot value) calibration points.
    ///
    /// Each bucket takes the slot of the nearest calibrated hue, wrapping
    /// around the hue circle. A bucket exactly halfway between two calibrated
    /// hues takes the slot with the higher hue. Of several points sharing a
    /// hue only the first is used.
    pub fn from_points(points: &[(f64, u8)], white: Option<u8>) -> Self {
        let finite = points.iter().filter(|(hue, _)| hue.is_finite()).count();
        let sorted = points
            .iter()
            .copied()
            .filter(|(hue, _)| hue.is_finite())
            .map(|(hue, value)| (hue.rem_euclid(HUE_BUCKETS as f64), value))
            .sorted_by_key(|(hue, _)| OrderedFloat(*hue))
            .dedup_by(|(a, _), (b, _)| a == b)
            .collect_vec();
        if sorted.len() < finite {
            warn!(
                "Ignoring {} color wheel slots with a duplicate hue.",
                finite - sorted.len()
            );
        }
        if sorted.is_empty() {
            return Self { lut: None, white };
        }
        let mut lut = [0u8; HUE_BUCKETS];
        for ((hue, value), (next_hue, next_value)) in
            sorted.iter().copied().circular_tuple_windows()
        {
            let end = if next_hue > hue {
                next_hue
            } else {
                next_hue + HUE_BUCKETS as f64
            };
            let midpoint = (hue + end) / 2.;
            let mut bucket = hue.ceil();
            while bucket < end {
                lut[bucket as usize % HUE_BUCKETS] = if bucket < midpoint {
                    value
                } else {
                    next_value
                };
                bucket += 1.;
            }
        }
        Self {
            lut: Some(lut),
            white,
        }
    }

    pub fn white(&self) -> Option<u8> {
        self.white
    }

    /// Slot value for a hue bucket.
    pub fn slot_for_hue(&self, hue: u8) -> Option<u8> {
        self.lut.as_ref().map(|lut| lut[hue as usize])
    }

    /// Slot value that best approximates a color.
    ///
    /// Nearly unsaturated colors use the white slot if there is one.
    pub fn slot_for(&self, hsv: &Hsv) -> Option<u8> {
        if hsv.sat.val() < ACHROMATIC_SATURATION {
            if let Some(white) = self.white {
                return Some(white);
            }
        }
        self.slot_for_hue(hsv.hue_byte()).or(self.white)
    }
}
