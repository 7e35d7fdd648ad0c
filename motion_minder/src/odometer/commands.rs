use moonraker::Frame;
use utilities::command_executor::Command;

use crate::{
    models::{ConnectionState, HomedAxes, OdometerTotals},
    odometer::OdometerHandler,
    router::RouteSummary,
    subscription::SubscribeTicket,
};

pub enum OdometerCommand {
    ApplyFrame(Frame),
    BeginSubscribe,
    ConfirmSubscribed(SubscribeTicket),
    Flush,
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OdometerStatus {
    pub totals: OdometerTotals,
    pub homed: HomedAxes,
    pub connection: ConnectionState,
    pub messages_processed: u64,
}

#[derive(Debug)]
pub enum OdometerResponse {
    Routed(RouteSummary),
    Ticket(Option<SubscribeTicket>),
    Confirmed(bool),
    Flushed(OdometerTotals),
    Status(OdometerStatus),
}

impl Command for OdometerCommand {
    type Response = OdometerResponse;
    type Handler = OdometerHandler;

    fn execute(self, handler: &mut OdometerHandler) -> OdometerResponse {
        match self {
            OdometerCommand::ApplyFrame(frame) => {
                OdometerResponse::Routed(handler.apply_frame(&frame))
            }
            OdometerCommand::BeginSubscribe => OdometerResponse::Ticket(handler.begin_subscribe()),
            OdometerCommand::ConfirmSubscribed(ticket) => {
                OdometerResponse::Confirmed(handler.confirm_subscribed(ticket))
            }
            OdometerCommand::Flush => OdometerResponse::Flushed(handler.flush()),
            OdometerCommand::Status => OdometerResponse::Status(OdometerStatus {
                totals: handler.totals(),
                homed: handler.homed_axes(),
                connection: handler.connection_state(),
                messages_processed: handler.messages_processed(),
            }),
        }
    }
}
