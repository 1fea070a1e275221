//! Fixture profiles: the channel layout and physical parameters of a model.
//!
//! Profiles are authored elsewhere and loaded here from YAML or JSON.
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::color::Rgb;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureProfile {
    pub name: String,
    /// Total channel count of the fixture.
    pub channel: usize,
    /// Symbolic channel name to 1-based offset.
    pub mapping: HashMap<String, usize>,
    #[serde(default)]
    pub pan_range: Option<f64>,
    #[serde(default)]
    pub tilt_range: Option<f64>,
    #[serde(default)]
    pub tilt_offset: Option<f64>,
    #[serde(default)]
    pub beam_angle: Option<f64>,
    #[serde(default)]
    pub beam_angle_min: Option<f64>,
    #[serde(default)]
    pub beam_angle_max: Option<f64>,
    #[serde(default)]
    pub strobe_speed: Option<f64>,
    #[serde(default)]
    pub color_map: Option<ColorMap>,
    #[serde(default)]
    pub gobo_map: Option<GoboMap>,
}

/// Calibration of a color wheel: the color produced at each slot value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorMap {
    pub colors: Vec<ColorCalibration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorCalibration {
    #[serde(rename = "R")]
    pub r: f64,
    #[serde(rename = "G")]
    pub g: f64,
    #[serde(rename = "B")]
    pub b: f64,
    /// Channel value that selects this slot.
    pub value: u8,
}

impl ColorCalibration {
    /// The calibrated color in unit RGB; components are given in 0..=255.
    pub fn rgb(&self) -> Rgb {
        Rgb::new(self.r / 255., self.g / 255., self.b / 255.)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GoboMap {
    /// Number of gobo slots on the wheel.
    pub amount: usize,
}

impl FixtureProfile {
    /// Load a profile from a YAML or JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("unable to read profile file \"{}\"", path.display()))?;
        let profile: Self = serde_yaml::from_reader(file)
            .with_context(|| format!("unable to parse profile file \"{}\"", path.display()))?;
        profile
            .validate()
            .with_context(|| format!("invalid profile \"{}\"", profile.name))?;
        Ok(profile)
    }

    /// Parse a profile from a YAML or JSON string.
    pub fn parse(text: &str) -> Result<Self> {
        let profile: Self = serde_yaml::from_str(text)?;
        profile.validate()?;
        Ok(profile)
    }

    /// 1-based offset of a named channel.
    pub fn offset(&self, name: &str) -> Option<usize> {
        self.mapping.get(name).copied()
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.mapping.contains_key(name)
    }

    /// Largest mapped offset, or 0 for an empty mapping.
    pub fn max_offset(&self) -> usize {
        self.mapping.values().copied().max().unwrap_or_default()
    }

    /// Check the profile is self-consistent.
    pub fn validate(&self) -> Result<()> {
        for (name, offset) in &self.mapping {
            ensure!(
                (1..=self.channel).contains(offset),
                "channel \"{name}\" is mapped to offset {offset}, outside 1..={}",
                self.channel
            );
        }
        for (name, range) in [("panRange", self.pan_range), ("tiltRange", self.tilt_range)] {
            if let Some(range) = range {
                ensure!(
                    range.is_finite() && range > 0.,
                    "{name} must be positive, got {range}"
                );
            }
        }
        if let (Some(min), Some(max)) = (self.beam_angle_min, self.beam_angle_max) {
            ensure!(
                min <= max,
                "beamAngleMin {min} is larger than beamAngleMax {max}"
            );
        }
        if let Some(gobos) = &self.gobo_map {
            ensure!(gobos.amount > 0, "goboMap amount must be at least 1");
        }
        Ok(())
    }
}
