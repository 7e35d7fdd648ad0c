use moonraker::Frame;
use utilities::command_executor::{CommandSender, ExecutorError};

use crate::{
    models::OdometerTotals,
    odometer::commands::{OdometerCommand, OdometerResponse, OdometerStatus},
    router::RouteSummary,
    subscription::SubscribeTicket,
};

#[derive(Debug, thiserror::Error)]
pub enum OdometerError {
    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error("Unexpected response to {command}: {response:?}")]
    UnexpectedResponse {
        command: &'static str,
        response: OdometerResponse,
    },
}

#[derive(Clone)]
pub struct OdometerCommandSender {
    sender: CommandSender<OdometerCommand>,
}

impl OdometerCommandSender {
    pub fn new(sender: CommandSender<OdometerCommand>) -> Self {
        Self { sender }
    }

    pub async fn apply_frame(&self, frame: Frame) -> Result<RouteSummary, OdometerError> {
        match self
            .sender
            .send_command(OdometerCommand::ApplyFrame(frame))
            .await?
        {
            OdometerResponse::Routed(summary) => Ok(summary),
            response => Err(unexpected("apply_frame", response)),
        }
    }

    pub async fn begin_subscribe(&self) -> Result<Option<SubscribeTicket>, OdometerError> {
        match self
            .sender
            .send_command(OdometerCommand::BeginSubscribe)
            .await?
        {
            OdometerResponse::Ticket(ticket) => Ok(ticket),
            response => Err(unexpected("begin_subscribe", response)),
        }
    }

    pub async fn confirm_subscribed(&self, ticket: SubscribeTicket) -> Result<bool, OdometerError> {
        match self
            .sender
            .send_command(OdometerCommand::ConfirmSubscribed(ticket))
            .await?
        {
            OdometerResponse::Confirmed(confirmed) => Ok(confirmed),
            response => Err(unexpected("confirm_subscribed", response)),
        }
    }

    pub async fn flush(&self) -> Result<OdometerTotals, OdometerError> {
        match self.sender.send_command(OdometerCommand::Flush).await? {
            OdometerResponse::Flushed(totals) => Ok(totals),
            response => Err(unexpected("flush", response)),
        }
    }

    pub async fn status(&self) -> Result<OdometerStatus, OdometerError> {
        match self.sender.send_command(OdometerCommand::Status).await? {
            OdometerResponse::Status(status) => Ok(status),
            response => Err(unexpected("status", response)),
        }
    }
}

fn unexpected(command: &'static str, response: OdometerResponse) -> OdometerError {
    OdometerError::UnexpectedResponse { command, response }
}
