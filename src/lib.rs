//! Control of DMX moving heads and dimmers over a USB serial interface.
pub mod color;
pub mod config;
pub mod dmx;
pub mod fixture;
pub mod link;
pub mod patch;
pub mod profile;
