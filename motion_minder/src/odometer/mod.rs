use moonraker::{Frame, LivePosition};
use tracing::debug;
use utilities::command_executor::{CommandExecutor, DeviceHandler};

use crate::{
    accumulator::DistanceAccumulator,
    homing::HomingTracker,
    models::{ConnectionState, HomedAxes, OdometerTotals},
    odometer::{command_sender::OdometerCommandSender, commands::OdometerCommand},
    persistence::{PersistenceHandle, PersistenceScheduler},
    router::{FrameSink, RouteSummary, route_frame},
    subscription::{SubscribeTicket, SubscriptionStateMachine},
};

pub mod command_sender;
pub mod commands;

/// Sole owner of all mutable odometer state. Both the readiness poll and the
/// telemetry stream reach it only through [`OdometerCommandSender`].
pub struct OdometerHandler {
    homing: HomingTracker,
    accumulator: DistanceAccumulator,
    subscription: SubscriptionStateMachine,
    scheduler: PersistenceScheduler,
    persistence: PersistenceHandle,
    reset_position_on_unhome: bool,
}

impl OdometerHandler {
    pub fn new(
        homing: HomingTracker,
        accumulator: DistanceAccumulator,
        scheduler: PersistenceScheduler,
        persistence: PersistenceHandle,
    ) -> Self {
        Self {
            homing,
            accumulator,
            subscription: SubscriptionStateMachine::default(),
            scheduler,
            persistence,
            reset_position_on_unhome: false,
        }
    }

    pub fn with_reset_position_on_unhome(mut self, reset: bool) -> Self {
        self.reset_position_on_unhome = reset;
        self
    }

    pub fn apply_frame(&mut self, frame: &Frame) -> RouteSummary {
        route_frame(frame, self)
    }

    pub fn begin_subscribe(&self) -> Option<SubscribeTicket> {
        self.subscription.begin_subscribe()
    }

    pub fn confirm_subscribed(&mut self, ticket: SubscribeTicket) -> bool {
        self.subscription.confirm_subscribed(ticket)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.subscription.state()
    }

    pub fn homed_axes(&self) -> HomedAxes {
        self.homing.homed()
    }

    pub fn totals(&self) -> OdometerTotals {
        self.accumulator.totals()
    }

    pub fn messages_processed(&self) -> u64 {
        self.scheduler.counter()
    }

    pub fn flush(&self) -> OdometerTotals {
        let totals = self.accumulator.totals();
        self.persistence.persist(totals);
        totals
    }

    pub fn spawn(
        self,
    ) -> (
        OdometerCommandSender,
        tokio::task::JoinHandle<OdometerHandler>,
    ) {
        let executor = CommandExecutor::new(self);
        let sender = OdometerCommandSender::new(executor.sender());
        (sender, executor.spawn())
    }
}

impl FrameSink for OdometerHandler {
    fn on_live_position(&mut self, position: &LivePosition) {
        let homed = self.homing.homed();

        for axis in homed.axes() {
            if let Some(value) = position.component(axis.index()) {
                self.accumulator.apply_motion_sample(axis, value);
            }
        }

        if self.scheduler.on_motion_processed() {
            let totals = self.flush();
            debug!(
                "Flushing after {} motion reports: x={:.3} y={:.3} z={:.3}",
                self.scheduler.counter(),
                totals.x,
                totals.y,
                totals.z
            );
        }
    }

    fn on_toolhead(&mut self, homed_axes: Option<&str>) {
        let lost = self.homing.apply_toolhead_update(homed_axes);

        if self.reset_position_on_unhome {
            for axis in lost.axes() {
                self.accumulator.forget_position(axis);
            }
        }
    }

    fn on_controller_inactive(&mut self) {
        self.subscription.on_inactive();
    }
}

impl DeviceHandler for OdometerHandler {
    type Command = OdometerCommand;
}
