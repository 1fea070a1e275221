//! Fixture models that turn high-level intent into channel values.
mod binding;
pub mod dimmer;
pub mod moving_head;
pub mod publish;

pub use binding::FixtureBinding;
pub use dimmer::DimmerFixture;
pub use moving_head::{Capabilities, MovingHead, MovingHeadParams};
pub use publish::{LogPublish, NoPublish, Publish};

pub(crate) use crate::color::unipolar;
