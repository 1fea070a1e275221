//! Aim solving: from a target point to spherical angles to pan and tilt.
//!
//! Fixture-local frame: the beam leaves along FRONT when the head is at rest,
//! and the pan axis is UP. Both are rotated into the world by the fixture's
//! mounting orientation.
use std::f64::consts::TAU;

use glam::{DQuat, DVec3};

pub const FRONT: DVec3 = DVec3::Z;
pub const UP: DVec3 = DVec3::Y;
pub const WORLD_UP: DVec3 = DVec3::Y;

const EPSILON: f64 = 1e-9;

/// Direction of the beam in the fixture's local frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Spherical {
    /// Polar angle from local up, radians in [0, PI].
    pub theta: f64,
    /// Azimuth around local up, radians in [0, TAU).
    pub phi: f64,
}

impl Spherical {
    /// Convert a local-frame direction; None if it has no direction.
    pub fn from_local(direction: DVec3) -> Option<Self> {
        let v = direction.try_normalize()?;
        let theta = v.dot(UP).clamp(-1., 1.).acos();
        let phi = v.x.atan2(v.z).rem_euclid(TAU);
        let s = Self { theta, phi };
        (s.theta.is_finite() && s.phi.is_finite()).then_some(s)
    }
}

/// Find the world rotation that points the beam along direction.
///
/// The minimal rotation aligning the mounted front axis with the direction
/// is followed by a roll about the beam that brings the fixture's up axis
/// as close to world up as possible. Return None if the direction is
/// degenerate or the rotation is not finite.
pub fn solve_gaze(mounting: DQuat, direction: DVec3) -> Option<DQuat> {
    let dir = direction.try_normalize()?;
    let front = (mounting * FRONT).try_normalize()?;
    let align = DQuat::from_rotation_arc(front, dir);
    let up = align * (mounting * UP);
    let desired = WORLD_UP - dir * WORLD_UP.dot(dir);
    let roll = if desired.length_squared() > EPSILON {
        let desired = desired.normalize();
        let angle = up.cross(desired).dot(dir).atan2(up.dot(desired));
        DQuat::from_axis_angle(dir, angle)
    } else {
        // Looking straight up or down; any roll is as good as another.
        DQuat::IDENTITY
    };
    let gaze = (roll * align).normalize();
    gaze.is_finite().then_some(gaze)
}

/// Express a world gaze relative to the mounting and return the beam angles.
pub fn gaze_to_spherical(mounting: DQuat, gaze: DQuat) -> Option<Spherical> {
    let relative = mounting.inverse() * gaze * mounting;
    Spherical::from_local(relative * FRONT)
}

/// Physical travel of a moving head and its mounting corrections.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanTiltRanges {
    /// Degrees of pan travel.
    pub pan: f64,
    /// Degrees of tilt travel.
    pub tilt: f64,
    /// Extra tilt correction in degrees from the profile.
    pub tilt_offset: f64,
}

impl Default for PanTiltRanges {
    fn default() -> Self {
        Self {
            pan: 540.,
            tilt: 270.,
            tilt_offset: 0.,
        }
    }
}

impl PanTiltRanges {
    /// Pan travel beyond one full turn, split evenly on both sides.
    pub fn pan_center_offset(&self) -> f64 {
        (self.pan - 360.) / 2.
    }

    /// Tilt travel beyond a half turn, split evenly on both sides.
    pub fn tilt_center_offset(&self) -> f64 {
        (self.tilt - 180.) / 2.
    }

    /// Physical pan and tilt of the logical center (180, 90).
    pub fn center(&self) -> (f64, f64) {
        (
            180. + self.pan_center_offset(),
            90. + self.tilt_center_offset(),
        )
    }
}

/// Result of converting beam angles into pan and tilt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanTilt {
    pub pan: f64,
    pub tilt: f64,
    /// True if the angles before wrapping were inside the physical travel.
    /// Informational only; the wrapped values are used either way.
    pub in_range: bool,
}

/// Convert beam angles into physical pan and tilt in degrees.
///
/// Pan past one turn beyond the center offset wraps back by the travel left
/// after the offset. Tilt gets the same treatment past a half turn; this only
/// partially folds tilt back and can still leave it outside the travel.
pub fn polar_to_pan_tilt(angles: Spherical, ranges: &PanTiltRanges) -> PanTilt {
    let pan_offset = ranges.pan_center_offset();
    let tilt_offset = ranges.tilt_center_offset();
    let mut tilt = angles.theta.to_degrees() + 90. + tilt_offset + ranges.tilt_offset;
    let mut pan = angles.phi.to_degrees() + 180. + pan_offset;
    let in_range = (0.0..=ranges.pan).contains(&pan) && (0.0..=ranges.tilt).contains(&tilt);
    if pan > pan_offset + 360. {
        pan -= ranges.pan - pan_offset;
    }
    if tilt > tilt_offset + 180. {
        tilt -= ranges.tilt - tilt_offset;
    }
    PanTilt {
        pan,
        tilt,
        in_range,
    }
}

/// Heading and elevation of a world direction, in degrees.
pub fn yaw_pitch(direction: DVec3) -> Option<(f64, f64)> {
    let v = direction.try_normalize()?;
    Some((
        v.x.atan2(v.z).to_degrees(),
        v.y.clamp(-1., 1.).asin().to_degrees(),
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

    fn assert_close(expected: f64, actual: f64) {
        assert!(
            (expected - actual).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    fn assert_vec_close(expected: DVec3, actual: DVec3) {
        assert!(
            expected.abs_diff_eq(actual, 1e-6),
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_spherical() {
        let s = Spherical::from_local(UP).unwrap();
        assert_close(0., s.theta);
        let s = Spherical::from_local(FRONT).unwrap();
        assert_close(FRAC_PI_2, s.theta);
        assert_close(0., s.phi);
        let s = Spherical::from_local(DVec3::X).unwrap();
        assert_close(FRAC_PI_2, s.phi);
        let s = Spherical::from_local(DVec3::NEG_X).unwrap();
        assert_close(3. * FRAC_PI_2, s.phi);
        let s = Spherical::from_local(DVec3::NEG_Y).unwrap();
        assert_close(PI, s.theta);
        assert!(Spherical::from_local(DVec3::ZERO).is_none());
        assert!(Spherical::from_local(DVec3::NAN).is_none());
    }

    #[test]
    fn test_gaze_points_beam() {
        let mounting = DQuat::from_rotation_x(PI);
        for dir in [
            DVec3::new(1., -1., 0.),
            DVec3::new(0.3, -0.2, -1.),
            DVec3::NEG_Y,
            DVec3::Y,
            DVec3::NEG_Z,
        ] {
            let gaze = solve_gaze(mounting, dir).unwrap();
            assert_vec_close(dir.normalize(), gaze * (mounting * FRONT));
        }
    }

    #[test]
    fn test_gaze_keeps_up_near_world_up() {
        let mounting = DQuat::IDENTITY;
        let dir = DVec3::new(1., 0.2, 0.);
        let gaze = solve_gaze(mounting, dir).unwrap();
        let up = gaze * UP;
        // No roll: the fixture's up axis stays in the vertical plane of the beam.
        assert_close(0., up.dot(dir.normalize().cross(WORLD_UP).normalize()));
        assert!(up.y > 0.);
    }

    #[test]
    fn test_degenerate_direction() {
        assert!(solve_gaze(DQuat::IDENTITY, DVec3::ZERO).is_none());
        assert!(solve_gaze(DQuat::IDENTITY, DVec3::new(f64::NAN, 0., 1.)).is_none());
        // Anti-parallel to front still has a well-defined beam direction.
        let gaze = solve_gaze(DQuat::IDENTITY, DVec3::NEG_Z).unwrap();
        assert_vec_close(DVec3::NEG_Z, gaze * FRONT);
    }

    #[test]
    fn test_gaze_to_spherical() {
        let mounting = DQuat::from_rotation_y(FRAC_PI_2);
        let dir = mounting * DVec3::X;
        let gaze = solve_gaze(mounting, dir).unwrap();
        let s = gaze_to_spherical(mounting, gaze).unwrap();
        assert_close(FRAC_PI_2, s.theta);
        assert_close(FRAC_PI_2, s.phi);
    }

    #[test]
    fn test_center_offsets() {
        let r = PanTiltRanges::default();
        assert_eq!(90., r.pan_center_offset());
        assert_eq!(45., r.tilt_center_offset());
        assert_eq!((270., 135.), r.center());
    }

    #[test]
    fn test_polar_to_pan_tilt() {
        let r = PanTiltRanges {
            pan: 540.,
            tilt: 270.,
            tilt_offset: 0.,
        };
        let pt = polar_to_pan_tilt(Spherical { theta: 0., phi: 0. }, &r);
        assert_close(270., pt.pan);
        assert_close(135., pt.tilt);
        assert!(pt.in_range);

        // Pan past the top of its travel wraps back.
        let pt = polar_to_pan_tilt(Spherical { theta: 0., phi: 300f64.to_radians() }, &r);
        assert_close(120., pt.pan);
        assert!(!pt.in_range);

        // Tilt only partially wraps.
        let pt = polar_to_pan_tilt(Spherical { theta: PI, phi: 0. }, &r);
        assert_close(90., pt.tilt);
        assert!(!pt.in_range);
    }

    #[test]
    fn test_full_turn_pan() {
        let r = PanTiltRanges {
            pan: 360.,
            tilt: 180.,
            tilt_offset: 0.,
        };
        let pt = polar_to_pan_tilt(Spherical { theta: FRAC_PI_4, phi: 270f64.to_radians() }, &r);
        assert_close(90., pt.pan);
        assert_close(135., pt.tilt);
        assert!(!pt.in_range);
    }

    #[test]
    fn test_yaw_pitch() {
        let (yaw, pitch) = yaw_pitch(DVec3::new(1., 0., 0.)).unwrap();
        assert_close(90., yaw);
        assert_close(0., pitch);
        let (_, pitch) = yaw_pitch(DVec3::new(0., -1., 1.)).unwrap();
        assert_close(-45., pitch);
        assert!(yaw_pitch(DVec3::ZERO).is_none());
    }
}
