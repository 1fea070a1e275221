//! Show configuration: the DMX link plus the fixtures patched on it.
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glam::{DQuat, DVec3, EulerRot};
use serde::Deserialize;
use strum_macros::Display;

use crate::dmx::DmxAddr;
use crate::link::LinkConfig;

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShowConfig {
    pub link: LinkConfig,
    #[serde(default)]
    pub fixtures: Vec<FixtureConfig>,
}

impl ShowConfig {
    /// Load a show file.
    ///
    /// Relative profile paths are resolved against the show file's directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("unable to open show file {}", path.display()))?;
        let mut cfg: Self = serde_yaml::from_reader(file)
            .with_context(|| format!("failed to parse show file {}", path.display()))?;
        if let Some(dir) = path.parent() {
            for fixture in &mut cfg.fixtures {
                if fixture.profile.is_relative() {
                    fixture.profile = dir.join(&fixture.profile);
                }
            }
        }
        Ok(cfg)
    }

    pub fn parse(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("failed to parse show config")
    }
}

/// The control model used for a patched fixture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Display)]
pub enum FixtureKind {
    MovingHead,
    Dimmer,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixtureConfig {
    /// Unique name of this fixture in the show.
    pub name: String,
    /// Path to the fixture's profile, YAML or JSON.
    pub profile: PathBuf,
    pub kind: FixtureKind,
    /// Start address of the fixture.
    pub addr: DmxAddr,
    /// Position in scene coordinates.
    #[serde(default)]
    pub position: [f64; 3],
    /// Mounting orientation as XYZ Euler angles in degrees.
    #[serde(default)]
    pub rotation: [f64; 3],
    #[serde(default)]
    pub pan_flipped: bool,
    #[serde(default)]
    pub tilt_flipped: bool,
}

impl FixtureConfig {
    pub fn position(&self) -> DVec3 {
        DVec3::from_array(self.position)
    }

    pub fn mounting(&self) -> DQuat {
        let [x, y, z] = self.rotation.map(f64::to_radians);
        DQuat::from_euler(EulerRot::XYZ, x, y, z)
    }
}
