use tracing::{info, warn};

use crate::{controller_service::ControllerStatus, models::HomedAxes};

#[derive(Debug, Default)]
pub struct HomingTracker {
    homed: HomedAxes,
}

impl HomingTracker {
    pub fn new(homed: HomedAxes) -> Self {
        Self { homed }
    }

    pub async fn initialize(status: &dyn ControllerStatus) -> Self {
        match status.homed_axes().await {
            Ok(letters) => {
                let homed = HomedAxes::from_letters(&letters);
                info!("Initial homed axes: {}", homed);
                Self::new(homed)
            }
            Err(e) => {
                warn!("Failed to query homed axes, assuming none: {}", e);
                Self::default()
            }
        }
    }

    pub fn homed(&self) -> HomedAxes {
        self.homed
    }

    /// Replaces the homed set when the toolhead update carries `homed_axes`; a
    /// missing field keeps the previous set. Returns the axes that lost homing.
    pub fn apply_toolhead_update(&mut self, homed_axes: Option<&str>) -> HomedAxes {
        let Some(letters) = homed_axes else {
            return HomedAxes::empty();
        };

        let homed = HomedAxes::from_letters(letters);
        let lost = self.homed.difference(homed);

        if homed != self.homed {
            info!("Homed axes changed: {} -> {}", self.homed, homed);
        }
        self.homed = homed;

        lost
    }
}
