use std::collections::HashMap;
use std::sync::Arc;

use log::warn;

use crate::dmx::{DmxAddr, UNIVERSE_SIZE};
use crate::link::DmxLink;
use crate::profile::FixtureProfile;

/// A fixture profile bound to a start address on a link.
///
/// Resolves symbolic channel names to link channels and clamps values into
/// each channel's bounds before writing them.
pub struct FixtureBinding {
    profile: Arc<FixtureProfile>,
    link: Arc<DmxLink>,
    start: DmxAddr,
    bounds: HashMap<String, (u8, u8)>,
}

impl FixtureBinding {
    pub fn new(profile: Arc<FixtureProfile>, link: Arc<DmxLink>, start: DmxAddr) -> Self {
        let last = start.0 + profile.max_offset().saturating_sub(1);
        if last > UNIVERSE_SIZE {
            warn!(
                "{} at {start} runs to DMX address {last}, past the end of the universe.",
                profile.name
            );
        }
        Self {
            profile,
            link,
            start,
            bounds: HashMap::new(),
        }
    }

    pub fn profile(&self) -> &FixtureProfile {
        &self.profile
    }

    pub fn link(&self) -> &DmxLink {
        &self.link
    }

    pub fn start(&self) -> DmxAddr {
        self.start
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.profile.has_channel(name)
    }

    /// Restrict the values written to a channel.
    pub fn set_bounds(&mut self, name: &str, min: u8, max: u8) {
        self.bounds
            .insert(name.to_string(), (min.min(max), max.max(min)));
    }

    pub fn bounds(&self, name: &str) -> (u8, u8) {
        self.bounds.get(name).copied().unwrap_or((0, 255))
    }

    /// Link channel of a named fixture channel.
    pub fn address(&self, name: &str) -> Option<usize> {
        let offset = self.profile.offset(name)?;
        Some((self.start.0 + offset).saturating_sub(1))
    }

    /// Write a value to a named channel.
    ///
    /// Return false if the profile does not map this channel.
    pub fn set_value(&self, name: &str, value: f64) -> bool {
        let Some(channel) = self.address(name) else {
            return false;
        };
        let (min, max) = self.bounds(name);
        let value = if value.is_nan() { min as f64 } else { value };
        self.link
            .set_value(channel, value.clamp(min as f64, max as f64) as i32);
        true
    }

    /// Read back the value queued for output on a named channel.
    pub fn output_value(&self, name: &str) -> Option<u8> {
        self.address(name).map(|c| self.link.output_value(c))
    }
}
