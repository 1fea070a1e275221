//! Change notification for fixture state.
use log::debug;

use super::moving_head::MovingHeadParams;

/// Receive the current parameters of a fixture whenever they change.
pub trait Publish: Send + Sync {
    fn publish(&self, params: &MovingHeadParams);
}

impl<F> Publish for F
where
    F: Fn(&MovingHeadParams) + Send + Sync,
{
    fn publish(&self, params: &MovingHeadParams) {
        self(params)
    }
}

/// Discard all notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPublish;

impl Publish for NoPublish {
    fn publish(&self, _params: &MovingHeadParams) {}
}

/// Log every notification at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPublish;

impl Publish for LogPublish {
    fn publish(&self, params: &MovingHeadParams) {
        debug!(
            "{} at {}: pan {:.1} tilt {:.1} dimmer {:.2}",
            params.fixture_name, params.start_address, params.pan, params.tilt, params.dimmer
        );
    }
}
