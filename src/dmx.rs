use std::{fmt::Display, ops::Add};

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

/// Number of data channels in one DMX universe.
pub const UNIVERSE_SIZE: usize = 512;

/// A DMX address, indexed from 1.
///
/// We don't check that the value is valid at parse time, as this makes
/// deserializing into a config fail with an obscure message.
/// This needs to be validated downstream.
#[derive(Serialize, Deserialize, PartialEq, Eq, Hash, Copy, Clone, Debug, PartialOrd, Ord)]
pub struct DmxAddr(pub usize);

impl DmxAddr {
    /// Get the DMX buffer index of this address (indexed from 0).
    pub fn dmx_index(&self) -> usize {
        self.0 - 1
    }

    /// Ensure this address is in range.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            (1..=UNIVERSE_SIZE).contains(&self.0),
            "invalid DMX address {}",
            self.0
        );
        Ok(())
    }

    /// Ensure a block of channel_count channels starting here fits in the universe.
    pub fn validate_block(&self, channel_count: usize) -> Result<()> {
        self.validate()?;
        ensure!(
            self.0 + channel_count <= UNIVERSE_SIZE + 1,
            "impossible to patch a fixture with {channel_count} channels at start address {}",
            self.0
        );
        Ok(())
    }
}

impl Display for DmxAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<usize> for DmxAddr {
    type Output = DmxAddr;
    fn add(self, rhs: usize) -> Self::Output {
        Self(self.0 + rhs)
    }
}

/// A data buffer for one DMX universe.
pub type DmxBuffer = [u8; UNIVERSE_SIZE];
