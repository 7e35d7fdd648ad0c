use moonraker::{Frame, LivePosition};
use tracing::warn;

pub trait FrameSink {
    fn on_live_position(&mut self, position: &LivePosition);

    fn on_toolhead(&mut self, homed_axes: Option<&str>);

    fn on_controller_inactive(&mut self);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RouteSummary {
    pub sections: usize,
    pub motion_reports: usize,
    pub skipped: usize,
}

/// Dispatches each parameter section of `frame` independently and in order. A
/// malformed sub-section is logged and skipped without affecting its siblings.
pub fn route_frame(frame: &Frame, sink: &mut impl FrameSink) -> RouteSummary {
    let mut summary = RouteSummary::default();

    for section in frame.sections() {
        summary.sections += 1;

        match section.motion_report() {
            Some(Ok(report)) => {
                if let Some(position) = report.live_position {
                    sink.on_live_position(&position);
                    summary.motion_reports += 1;
                }
            }
            Some(Err(e)) => {
                warn!("Skipping motion report: {}", e);
                summary.skipped += 1;
            }
            None => {}
        }

        match section.toolhead() {
            Some(Ok(toolhead)) => sink.on_toolhead(toolhead.homed_axes.as_deref()),
            Some(Err(e)) => {
                warn!("Skipping toolhead update: {}", e);
                summary.skipped += 1;
            }
            None => {}
        }

        match section.klipper() {
            Some(Ok(state)) if state.is_inactive() => sink.on_controller_inactive(),
            Some(Ok(_)) | None => {}
            Some(Err(e)) => {
                warn!("Skipping controller state: {}", e);
                summary.skipped += 1;
            }
        }
    }

    summary
}
