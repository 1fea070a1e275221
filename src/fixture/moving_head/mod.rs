//! Control model for a moving head: aim, beam, color and effects.
//!
//! Callers express intent (a point to look at, a color, a level) and the
//! model turns it into channel values for the bound profile. Capabilities
//! come from which channels the profile maps.
use std::sync::Arc;

use glam::{DQuat, DVec3};
use log::debug;
use number::UnipolarFloat;

use super::publish::{NoPublish, Publish};
use super::{FixtureBinding, unipolar};
use crate::color::{Rgb, rgb_to_rgbw, rgb_to_rgbwa, unit_to_u8};
use crate::dmx::DmxAddr;
use crate::link::DmxLink;
use crate::profile::FixtureProfile;

pub mod color_wheel;
pub mod kinematics;
mod params;

use color_wheel::ColorWheel;
use kinematics::{PanTiltRanges, Spherical};
pub use params::{MovingHeadParams, Point};

/// Symbolic channel names understood by the moving head.
pub mod channel {
    pub const PAN: &str = "pan";
    pub const PAN_FINE: &str = "panFine";
    pub const TILT: &str = "tilt";
    pub const TILT_FINE: &str = "tiltFine";
    pub const SPEED: &str = "speed";
    pub const DIMMER: &str = "dimmer";
    pub const ZOOM: &str = "zoom";
    pub const STROBE: &str = "strobe";
    pub const COLOR: &str = "color";
    pub const RED: &str = "red";
    pub const GREEN: &str = "green";
    pub const BLUE: &str = "blue";
    pub const WHITE: &str = "white";
    pub const AMBER: &str = "amber";
    pub const UV: &str = "uv";
    pub const GOBO: &str = "gobo";
    pub const GOBO_SHAKE: &str = "goboShake";
}

/// Default beam angle in degrees when the profile gives none.
const DEFAULT_BEAM_ANGLE: f64 = 15.;

/// Features of a fixture, derived from its channel map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub has_zoom: bool,
    pub has_uv: bool,
    pub has_amber: bool,
    pub has_white: bool,
    pub has_color_wheel: bool,
    pub has_strobe: bool,
    pub has_gobo: bool,
    pub has_fine_adjust: bool,
}

impl Capabilities {
    pub fn of(profile: &FixtureProfile) -> Self {
        let has = |name| profile.has_channel(name);
        Self {
            has_zoom: has(channel::ZOOM),
            has_uv: has(channel::UV),
            has_amber: has(channel::AMBER),
            has_white: has(channel::WHITE),
            has_color_wheel: has(channel::COLOR) && profile.color_map.is_some(),
            has_strobe: has(channel::STROBE),
            has_gobo: has(channel::GOBO),
            has_fine_adjust: has(channel::PAN_FINE) && has(channel::TILT_FINE),
        }
    }
}

/// Color and level saved while a fixture is highlighted.
#[derive(Debug, Clone, Copy)]
struct Snapshot {
    color: Rgb,
    dimmer: UnipolarFloat,
}

pub struct MovingHead {
    binding: FixtureBinding,
    caps: Capabilities,
    ranges: PanTiltRanges,
    /// Narrowest and widest beam angle in degrees.
    beam_angles: (f64, f64),
    /// Strobe channel value at full strobe rate.
    strobe_speed: f64,
    gobo_count: usize,
    wheel: Option<ColorWheel>,

    position: DVec3,
    mounting: DQuat,
    gaze: DQuat,
    angles: Spherical,
    yaw_pitch: (f64, f64),
    look_target: DVec3,
    looking: bool,

    pan: f64,
    tilt: f64,
    pan_flipped: bool,
    tilt_flipped: bool,
    dimmer: UnipolarFloat,
    dimmer_multiplier: UnipolarFloat,
    speed: UnipolarFloat,
    zoom: UnipolarFloat,
    beam_angle: f64,
    uv: UnipolarFloat,
    strobe: UnipolarFloat,
    gobo: usize,
    gobo_shake: UnipolarFloat,
    color: Rgb,
    snapshot: Option<Snapshot>,

    publisher: Arc<dyn Publish>,
}

impl MovingHead {
    pub fn new(profile: Arc<FixtureProfile>, link: Arc<DmxLink>, start: DmxAddr) -> Self {
        let caps = Capabilities::of(&profile);
        let defaults = PanTiltRanges::default();
        let ranges = PanTiltRanges {
            pan: profile.pan_range.unwrap_or(defaults.pan),
            tilt: profile.tilt_range.unwrap_or(defaults.tilt),
            tilt_offset: profile.tilt_offset.unwrap_or_default(),
        };
        let beam = profile.beam_angle.unwrap_or(DEFAULT_BEAM_ANGLE);
        let beam_angles = (
            profile.beam_angle_min.unwrap_or(beam),
            profile.beam_angle_max.unwrap_or(beam),
        );
        let wheel = if caps.has_color_wheel {
            profile.color_map.as_ref().map(ColorWheel::from_color_map)
        } else {
            None
        };
        let strobe_speed = profile.strobe_speed.unwrap_or(255.);
        let gobo_count = profile.gobo_map.as_ref().map(|g| g.amount).unwrap_or(1).max(1);
        let (pan, tilt) = ranges.center();
        let mounting = DQuat::IDENTITY;
        Self {
            binding: FixtureBinding::new(profile, link, start),
            caps,
            ranges,
            beam_angles,
            strobe_speed,
            gobo_count,
            wheel,
            position: DVec3::ZERO,
            mounting,
            gaze: DQuat::IDENTITY,
            angles: kinematics::gaze_to_spherical(mounting, DQuat::IDENTITY).unwrap_or_default(),
            yaw_pitch: (0., 0.),
            look_target: kinematics::FRONT,
            looking: false,
            pan,
            tilt,
            pan_flipped: false,
            tilt_flipped: false,
            dimmer: UnipolarFloat::ZERO,
            dimmer_multiplier: UnipolarFloat::ONE,
            speed: UnipolarFloat::ZERO,
            zoom: UnipolarFloat::ZERO,
            beam_angle: beam_angles.0,
            uv: UnipolarFloat::ZERO,
            strobe: UnipolarFloat::ZERO,
            gobo: 0,
            gobo_shake: UnipolarFloat::ZERO,
            color: Rgb::WHITE,
            snapshot: None,
            publisher: Arc::new(NoPublish),
        }
    }

    /// Place the fixture in the scene.
    ///
    /// The mounting rotates the fixture-local frame into the world.
    pub fn with_placement(mut self, position: DVec3, mounting: DQuat) -> Self {
        self.position = position;
        self.mounting = if mounting.is_finite() && mounting.length_squared() > 0. {
            mounting.normalize()
        } else {
            DQuat::IDENTITY
        };
        self.gaze = DQuat::IDENTITY;
        self.angles = kinematics::gaze_to_spherical(self.mounting, self.gaze).unwrap_or_default();
        self.look_target = position + self.mounting * kinematics::FRONT;
        self
    }

    /// Notify this publisher whenever the fixture state changes.
    pub fn with_publisher(mut self, publisher: Arc<dyn Publish>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn binding(&self) -> &FixtureBinding {
        &self.binding
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    pub fn ranges(&self) -> &PanTiltRanges {
        &self.ranges
    }

    pub fn pan(&self) -> f64 {
        self.pan
    }

    pub fn tilt(&self) -> f64 {
        self.tilt
    }

    pub fn dimmer(&self) -> UnipolarFloat {
        self.dimmer
    }

    pub fn dimmer_multiplier(&self) -> UnipolarFloat {
        self.dimmer_multiplier
    }

    pub fn color(&self) -> Rgb {
        self.color
    }

    pub fn zoom(&self) -> UnipolarFloat {
        self.zoom
    }

    /// Current beam angle in degrees, for visualization.
    pub fn beam_angle(&self) -> f64 {
        self.beam_angle
    }

    /// World rotation of the beam relative to the mounting's rest pose.
    pub fn gaze(&self) -> DQuat {
        self.gaze
    }

    pub fn angles(&self) -> Spherical {
        self.angles
    }

    /// Heading and elevation of the last aim, in degrees.
    pub fn yaw_pitch(&self) -> (f64, f64) {
        self.yaw_pitch
    }

    pub fn is_looking(&self) -> bool {
        self.looking
    }

    pub fn is_highlighted(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Aim the beam at a point in the scene.
    ///
    /// If the target gives no usable direction (for example the fixture's own
    /// position) the previous aim is kept and no channel is written.
    pub fn look_at(&mut self, target: DVec3) {
        self.looking = true;
        self.look_target = target;
        let direction = target - self.position;
        let Some(gaze) = kinematics::solve_gaze(self.mounting, direction) else {
            debug!("Degenerate aim at {target}, keeping previous gaze.");
            return;
        };
        let Some(angles) = kinematics::gaze_to_spherical(self.mounting, gaze) else {
            debug!("Unable to resolve beam angles for {target}, keeping previous gaze.");
            return;
        };
        self.gaze = gaze;
        self.angles = angles;
        if let Some(yaw_pitch) = kinematics::yaw_pitch(direction) {
            self.yaw_pitch = yaw_pitch;
        }
        self.polar_to_pan_tilt();
        self.publish();
    }

    /// Commit pan and tilt for the current beam angles.
    ///
    /// The values are written even when they fall outside the physical
    /// travel; the return value only reports whether they were inside it.
    pub fn polar_to_pan_tilt(&mut self) -> bool {
        let solved = kinematics::polar_to_pan_tilt(self.angles, &self.ranges);
        if !solved.in_range {
            debug!(
                "Aim for {} is outside its travel (pan {:.1}, tilt {:.1}).",
                self.binding.profile().name,
                solved.pan,
                solved.tilt
            );
        }
        self.write_pan(solved.pan);
        self.write_tilt(solved.tilt);
        solved.in_range
    }

    pub fn set_pan(&mut self, pan: f64) {
        self.looking = false;
        self.write_pan(pan);
        self.publish();
    }

    pub fn set_tilt(&mut self, tilt: f64) {
        self.looking = false;
        self.write_tilt(tilt);
        self.publish();
    }

    pub fn set_pan_tilt(&mut self, pan: f64, tilt: f64) {
        self.looking = false;
        self.write_pan(pan);
        self.write_tilt(tilt);
        self.publish();
    }

    pub fn set_pan_flipped(&mut self, flipped: bool) {
        self.pan_flipped = flipped;
        self.write_pan(self.pan);
        self.publish();
    }

    pub fn set_tilt_flipped(&mut self, flipped: bool) {
        self.tilt_flipped = flipped;
        self.write_tilt(self.tilt);
        self.publish();
    }

    fn write_pan(&mut self, pan: f64) {
        let Some(pan) = fold_into_range(pan, self.ranges.pan) else {
            return;
        };
        self.pan = pan;
        let unit = pan / self.ranges.pan;
        let unit = if self.pan_flipped { 1. - unit } else { unit };
        self.write_coarse_fine(channel::PAN, channel::PAN_FINE, unit);
    }

    fn write_tilt(&mut self, tilt: f64) {
        let Some(tilt) = fold_into_range(tilt, self.ranges.tilt) else {
            return;
        };
        self.tilt = tilt;
        let unit = tilt / self.ranges.tilt;
        let unit = if self.tilt_flipped { 1. - unit } else { unit };
        self.write_coarse_fine(channel::TILT, channel::TILT_FINE, unit);
    }

    /// Write a unit value across a coarse channel and, if present, its fine
    /// channel. The two writes are independent; a frame may go out between them.
    fn write_coarse_fine(&self, coarse: &str, fine: &str, unit: f64) {
        let scaled = unit.clamp(0., 1.) * 255.;
        self.binding.set_value(coarse, scaled.floor());
        if self.caps.has_fine_adjust {
            self.binding.set_value(fine, (scaled.fract() * 256.).floor());
        }
    }

    /// Set the pan/tilt movement speed channel.
    pub fn set_speed(&mut self, speed: f64) {
        self.speed = unipolar(speed);
        self.binding.set_value(channel::SPEED, self.speed.val() * 255.);
        self.publish();
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.write_zoom(zoom);
        self.publish();
    }

    fn write_zoom(&mut self, zoom: f64) {
        if !self.caps.has_zoom {
            return;
        }
        self.zoom = unipolar(zoom);
        let (min, max) = self.beam_angles;
        self.beam_angle = min + self.zoom.val() * (max - min);
        self.binding.set_value(channel::ZOOM, self.zoom.val() * 255.);
    }

    pub fn set_dimmer(&mut self, dimmer: f64) {
        self.write_dimmer(unipolar(dimmer));
        self.publish();
    }

    fn write_dimmer(&mut self, dimmer: UnipolarFloat) {
        self.dimmer = dimmer;
        let level = self.dimmer.val() * self.dimmer_multiplier.val();
        self.binding.set_value(channel::DIMMER, level * 255.);
    }

    pub fn set_color(&mut self, color: Rgb) {
        self.write_color(color);
        self.publish();
    }

    fn write_color(&mut self, color: Rgb) {
        self.color = color.clamped();
        if let Some(wheel) = &self.wheel {
            // A wheel cannot desaturate; fold value into the dimmer instead.
            let hsv = self.color.to_hsv();
            if let Some(slot) = wheel.slot_for(&hsv) {
                self.binding.set_value(channel::COLOR, slot as f64);
            }
            self.dimmer_multiplier = hsv.val;
            self.write_dimmer(self.dimmer);
            return;
        }
        if self.caps.has_amber {
            let [r, g, b, w, a] = rgb_to_rgbwa(self.color);
            self.write_rgbw(r, g, b, w);
            self.binding.set_value(channel::AMBER, a as f64);
        } else if self.caps.has_white {
            let [r, g, b, w] = rgb_to_rgbw(self.color);
            self.write_rgbw(r, g, b, w);
        } else {
            let Rgb { r, g, b } = self.color;
            self.write_rgbw(unit_to_u8(r), unit_to_u8(g), unit_to_u8(b), 0);
        }
    }

    fn write_rgbw(&self, r: u8, g: u8, b: u8, w: u8) {
        self.binding.set_value(channel::RED, r as f64);
        self.binding.set_value(channel::GREEN, g as f64);
        self.binding.set_value(channel::BLUE, b as f64);
        if self.caps.has_white {
            self.binding.set_value(channel::WHITE, w as f64);
        }
    }

    pub fn set_uv(&mut self, uv: f64) {
        if !self.caps.has_uv {
            return;
        }
        self.uv = unipolar(uv);
        self.binding.set_value(channel::UV, self.uv.val() * 255.);
        self.publish();
    }

    /// Set the strobe rate; zero turns strobing off.
    pub fn set_strobe(&mut self, strobe: f64) {
        if !self.caps.has_strobe {
            return;
        }
        self.strobe = unipolar(strobe);
        self.binding.set_value(channel::STROBE, self.strobe.val() * self.strobe_speed);
        self.publish();
    }

    /// Select a gobo by index; out-of-range indices select the last gobo.
    pub fn set_gobo(&mut self, index: usize) {
        if !self.caps.has_gobo {
            return;
        }
        self.gobo = index.min(self.gobo_count - 1);
        let value = (self.gobo * 256 / self.gobo_count) as f64;
        self.binding.set_value(channel::GOBO, value);
        self.publish();
    }

    pub fn set_gobo_shake(&mut self, shake: f64) {
        self.gobo_shake = unipolar(shake);
        if self
            .binding
            .set_value(channel::GOBO_SHAKE, self.gobo_shake.val() * 255.)
        {
            self.publish();
        }
    }

    /// Force full white at full level until release is called.
    ///
    /// Only the state before the first highlight is kept.
    pub fn highlight(&mut self) {
        if self.snapshot.is_none() {
            self.snapshot = Some(Snapshot {
                color: self.color,
                dimmer: self.dimmer,
            });
        }
        self.write_color(Rgb::WHITE);
        self.write_dimmer(UnipolarFloat::ONE);
        self.publish();
    }

    /// Restore the color and level saved by highlight.
    pub fn release(&mut self) {
        let Some(snapshot) = self.snapshot.take() else {
            return;
        };
        self.write_color(snapshot.color);
        self.write_dimmer(snapshot.dimmer);
        self.publish();
    }

    /// Black out and park the head at the center of its travel.
    pub fn home(&mut self) {
        self.looking = false;
        self.write_dimmer(UnipolarFloat::ZERO);
        let (pan, tilt) = self.ranges.center();
        self.write_pan(pan);
        self.write_tilt(tilt);
        self.write_zoom(0.);
        self.publish();
    }

    /// Current state in its persisted form.
    pub fn params(&self) -> MovingHeadParams {
        MovingHeadParams {
            pan: self.pan,
            tilt: self.tilt,
            dimmer: self.dimmer.val(),
            dimmer_mul: self.dimmer_multiplier.val(),
            color: self.color,
            speed: self.speed.val(),
            zoom: self.zoom.val(),
            strobe: self.strobe.val(),
            uv: self.uv.val(),
            is_pan_flipped: self.pan_flipped,
            is_tilt_flipped: self.tilt_flipped,
            start_address: self.binding.start().0,
            fixture_name: self.binding.profile().name.clone(),
            look_at: self.look_target.into(),
            gobo: self.caps.has_gobo.then_some(self.gobo),
            gobo_shake: self
                .binding
                .has_channel(channel::GOBO_SHAKE)
                .then_some(self.gobo_shake.val()),
        }
    }

    /// Restore persisted state and write it out.
    ///
    /// The start address and fixture name are informational and not applied.
    pub fn apply_params(&mut self, params: &MovingHeadParams) {
        self.pan_flipped = params.is_pan_flipped;
        self.tilt_flipped = params.is_tilt_flipped;
        self.look_target = params.look_at.into();
        self.looking = false;
        self.write_color(params.color);
        self.dimmer_multiplier = unipolar(params.dimmer_mul);
        self.write_dimmer(unipolar(params.dimmer));
        self.write_pan(params.pan);
        self.write_tilt(params.tilt);
        self.write_zoom(params.zoom);
        self.speed = unipolar(params.speed);
        self.binding.set_value(channel::SPEED, self.speed.val() * 255.);
        if self.caps.has_uv {
            self.uv = unipolar(params.uv);
            self.binding.set_value(channel::UV, self.uv.val() * 255.);
        }
        if self.caps.has_strobe {
            self.strobe = unipolar(params.strobe);
            self.binding.set_value(channel::STROBE, self.strobe.val() * self.strobe_speed);
        }
        if let (true, Some(gobo)) = (self.caps.has_gobo, params.gobo) {
            self.gobo = gobo.min(self.gobo_count - 1);
            self.binding.set_value(
                channel::GOBO,
                (self.gobo * 256 / self.gobo_count) as f64,
            );
        }
        if let Some(shake) = params.gobo_shake {
            self.gobo_shake = unipolar(shake);
            self.binding.set_value(channel::GOBO_SHAKE, self.gobo_shake.val() * 255.);
        }
        self.publish();
    }

    fn publish(&self) {
        self.publisher.publish(&self.params());
    }
}

/// Bring an angle into 0..=range.
///
/// Angles outside the travel are first taken modulo a full turn, then
/// clamped. Return None for NaN or infinite input.
fn fold_into_range(angle: f64, range: f64) -> Option<f64> {
    if !angle.is_finite() {
        return None;
    }
    if (0.0..=range).contains(&angle) {
        return Some(angle);
    }
    Some(angle.rem_euclid(360.).clamp(0., range))
}
