use tracing::debug;

use crate::models::{Axis, LastKnownPosition, OdometerTotals};

/// Turns absolute position samples into travelled distance. Callers only feed
/// samples for axes that are currently homed.
#[derive(Debug, Default)]
pub struct DistanceAccumulator {
    totals: OdometerTotals,
    last_position: LastKnownPosition,
}

impl DistanceAccumulator {
    pub fn new(seed: OdometerTotals) -> Self {
        Self {
            totals: seed,
            last_position: LastKnownPosition::default(),
        }
    }

    pub fn apply_motion_sample(&mut self, axis: Axis, position: f64) {
        if let Some(last) = self.last_position[axis] {
            self.totals[axis] += (position - last).abs();
        }
        self.last_position[axis] = Some(position);
    }

    pub fn forget_position(&mut self, axis: Axis) {
        if self.last_position[axis].take().is_some() {
            debug!("Forgot last position of axis {}", axis);
        }
    }

    pub fn totals(&self) -> OdometerTotals {
        self.totals
    }

    pub fn last_position(&self) -> LastKnownPosition {
        self.last_position
    }
}
