use tracing::info;

use crate::models::ConnectionState;

/// Identifies one `AwaitingReady` period. Every demotion starts a new one, so a
/// subscribe attempt begun before an inactive notification cannot be confirmed
/// after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeTicket(u64);

#[derive(Debug, Default)]
pub struct SubscriptionStateMachine {
    state: ConnectionState,
    demotions: u64,
}

impl SubscriptionStateMachine {
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn begin_subscribe(&self) -> Option<SubscribeTicket> {
        match self.state {
            ConnectionState::AwaitingReady => Some(SubscribeTicket(self.demotions)),
            ConnectionState::Subscribed => None,
        }
    }

    pub fn confirm_subscribed(&mut self, ticket: SubscribeTicket) -> bool {
        if self.state != ConnectionState::AwaitingReady || ticket.0 != self.demotions {
            return false;
        }

        self.state = ConnectionState::Subscribed;
        info!("Subscribed to motion telemetry");
        true
    }

    pub fn on_inactive(&mut self) {
        if self.state == ConnectionState::Subscribed {
            info!("Controller went inactive, awaiting readiness");
        }
        self.state = ConnectionState::AwaitingReady;
        self.demotions += 1;
    }
}
