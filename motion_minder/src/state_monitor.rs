use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::{
    communication::SubscriptionLink,
    controller_service::ControllerStatus,
    odometer::command_sender::{OdometerCommandSender, OdometerError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    AlreadySubscribed,
    Unavailable,
    NotReady,
    LinkDown,
    Superseded,
    Subscribed,
}

pub async fn poll_readiness(
    status: &impl ControllerStatus,
    link: &impl SubscriptionLink,
    odometer: &OdometerCommandSender,
) -> Result<PollOutcome, OdometerError> {
    let Some(ticket) = odometer.begin_subscribe().await? else {
        return Ok(PollOutcome::AlreadySubscribed);
    };

    match status.klippy_ready().await {
        Ok(true) => {}
        Ok(false) => {
            debug!("Controller not ready yet");
            return Ok(PollOutcome::NotReady);
        }
        Err(e) if e.is_transient() => {
            debug!("Controller unreachable: {}", e);
            return Ok(PollOutcome::Unavailable);
        }
        Err(e) => {
            warn!("Unexpected server info response: {}", e);
            return Ok(PollOutcome::Unavailable);
        }
    }

    if let Err(e) = link.send_subscribe().await {
        warn!("Controller is ready but subscribe could not be sent: {}", e);
        return Ok(PollOutcome::LinkDown);
    }

    if odometer.confirm_subscribed(ticket).await? {
        Ok(PollOutcome::Subscribed)
    } else {
        info!("Controller went inactive while subscribing, will retry");
        Ok(PollOutcome::Superseded)
    }
}

pub async fn run_readiness_monitor(
    status: impl ControllerStatus,
    link: impl SubscriptionLink,
    odometer: OdometerCommandSender,
    poll_interval: Duration,
) -> Result<(), OdometerError> {
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        poll_readiness(&status, &link, &odometer).await?;
    }
}
