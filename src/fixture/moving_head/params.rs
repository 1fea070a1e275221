use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::color::Rgb;

/// Persisted state of a moving head.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovingHeadParams {
    pub pan: f64,
    pub tilt: f64,
    pub dimmer: f64,
    pub dimmer_mul: f64,
    pub color: Rgb,
    pub speed: f64,
    pub zoom: f64,
    pub strobe: f64,
    pub uv: f64,
    pub is_pan_flipped: bool,
    pub is_tilt_flipped: bool,
    pub start_address: usize,
    pub fixture_name: String,
    pub look_at: Point,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gobo: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gobo_shake: Option<f64>,
}

/// A point in scene coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<DVec3> for Point {
    fn from(v: DVec3) -> Self {
        Self {
            x: v.x,
            y: v.y,
            z: v.z,
        }
    }
}

impl From<Point> for DVec3 {
    fn from(p: Point) -> Self {
        DVec3::new(p.x, p.y, p.z)
    }
}
