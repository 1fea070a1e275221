//! Control profile for a single-channel dimmer.
use std::sync::Arc;

use number::UnipolarFloat;

use super::{FixtureBinding, unipolar};
use crate::dmx::DmxAddr;
use crate::link::DmxLink;
use crate::profile::FixtureProfile;

pub const DIMMER: &str = "dimmer";

pub struct DimmerFixture {
    binding: FixtureBinding,
    level: UnipolarFloat,
}

impl DimmerFixture {
    pub fn new(profile: Arc<FixtureProfile>, link: Arc<DmxLink>, start: DmxAddr) -> Self {
        Self {
            binding: FixtureBinding::new(profile, link, start),
            level: UnipolarFloat::ZERO,
        }
    }

    pub fn binding(&self) -> &FixtureBinding {
        &self.binding
    }

    pub fn level(&self) -> UnipolarFloat {
        self.level
    }

    /// Set the dimmer level; values outside the unit range are clamped.
    pub fn set_dimmer(&mut self, level: f64) {
        self.level = unipolar(level);
        self.binding.set_value(DIMMER, self.level.val() * 255.);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::link::mock::idle_link;
    use anyhow::Result;

    fn dimmer(start: usize) -> Result<DimmerFixture> {
        let profile = FixtureProfile::parse("{name: Dimmer, channel: 1, mapping: {dimmer: 1}}")?;
        Ok(DimmerFixture::new(
            Arc::new(profile),
            Arc::new(idle_link()),
            DmxAddr(start),
        ))
    }

    #[test]
    fn test_levels() -> Result<()> {
        let mut d = dimmer(42)?;
        d.set_dimmer(1.0);
        assert_eq!(255, d.binding().link().output_value(42));
        d.set_dimmer(0.5);
        assert_eq!(127, d.binding().link().output_value(42));
        d.set_dimmer(-3.);
        assert_eq!(0, d.binding().link().output_value(42));
        d.set_dimmer(7.);
        assert_eq!(255, d.binding().link().output_value(42));
        assert_eq!(0, d.binding().link().output_value(41));
        assert_eq!(0, d.binding().link().output_value(43));
        Ok(())
    }

    #[test]
    fn test_unmapped_dimmer_is_silent() -> Result<()> {
        let profile = FixtureProfile::parse("{name: Fog, channel: 1, mapping: {fog: 1}}")?;
        let mut d = DimmerFixture::new(Arc::new(profile), Arc::new(idle_link()), DmxAddr(1));
        d.set_dimmer(1.);
        assert_eq!(0, d.binding().link().output_value(1));
        Ok(())
    }
}
