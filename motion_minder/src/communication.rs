use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use moonraker::{Frame, MoonrakerError, SubscribeRequest};
use rand::Rng;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{Mutex, mpsc},
};
use tokio_tungstenite::{WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use utilities::retry::RetryPolicy;

use crate::odometer::command_sender::{OdometerCommandSender, OdometerError};

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Telemetry stream is not connected")]
    NotConnected,

    #[error("Failed to encode subscribe request: {0}")]
    Encode(#[from] MoonrakerError),
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Odometer(#[from] OdometerError),
}

#[async_trait::async_trait]
pub trait SubscriptionLink: Send + Sync {
    async fn send_subscribe(&self) -> Result<(), LinkError>;
}

#[derive(Clone)]
pub struct TelemetryLink {
    outbound: Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>,
    request: SubscribeRequest,
}

impl TelemetryLink {
    pub fn new(request_id: u32) -> Self {
        Self {
            outbound: Arc::new(Mutex::new(None)),
            request: SubscribeRequest::odometer(request_id),
        }
    }

    pub fn with_random_id() -> Self {
        Self::new(rand::thread_rng().gen_range(0..10_000))
    }

    pub fn request_id(&self) -> u32 {
        self.request.id()
    }

    pub async fn attach(&self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.outbound.lock().await = Some(tx);
        rx
    }

    pub async fn detach(&self) {
        self.outbound.lock().await.take();
    }
}

#[async_trait::async_trait]
impl SubscriptionLink for TelemetryLink {
    async fn send_subscribe(&self) -> Result<(), LinkError> {
        let payload = self.request.to_json()?;
        let outbound = self.outbound.lock().await;

        let tx = outbound.as_ref().ok_or(LinkError::NotConnected)?;
        tx.send(payload).map_err(|_| LinkError::NotConnected)?;

        debug!("Queued subscribe request {}", self.request.id());
        Ok(())
    }
}

/// Keeps a websocket open to `url` for as long as the process lives, reconnecting
/// after `reconnect.delay` whenever it drops. Returns only when the odometer actor
/// is gone or the reconnect policy gives up.
pub async fn run_telemetry_stream(
    url: String,
    link: TelemetryLink,
    odometer: OdometerCommandSender,
    reconnect: RetryPolicy,
) -> Result<(), OdometerError> {
    let mut attempt = 0;

    loop {
        match connect_async(url.as_str()).await {
            Ok((ws, _response)) => {
                info!("Connected to {}", url);
                attempt = 0;

                let result = serve_connection(ws, &link, &odometer).await;
                link.detach().await;

                match result {
                    Ok(()) => info!("Telemetry stream closed by {}", url),
                    Err(StreamError::Odometer(e)) => return Err(e),
                    Err(e) => warn!("Telemetry stream dropped: {}", e),
                }
            }
            Err(e) => warn!("Failed to connect to {}: {}", url, e),
        }

        if !reconnect.should_retry(attempt) {
            error!("Giving up on {} after {} attempts", url, attempt + 1);
            return Ok(());
        }
        attempt += 1;
        reconnect.wait().await;
    }
}

pub async fn serve_connection<S>(
    ws: WebSocketStream<S>,
    link: &TelemetryLink,
    odometer: &OdometerCommandSender,
) -> Result<(), StreamError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = ws.split();
    let mut outbound = link.attach().await;

    link.send_subscribe().await?;

    loop {
        tokio::select! {
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => handle_text(&text, odometer).await?,
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
            Some(payload) = outbound.recv() => sink.send(Message::Text(payload)).await?,
        }
    }
}

async fn handle_text(text: &str, odometer: &OdometerCommandSender) -> Result<(), OdometerError> {
    let frame = match Frame::parse(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Skipping malformed frame: {}", e);
            return Ok(());
        }
    };

    if frame.params.is_empty() {
        debug!("Ignoring frame without params");
        return Ok(());
    }

    let summary = odometer.apply_frame(frame).await?;
    debug!(
        "Routed {} sections, {} motion reports, {} skipped",
        summary.sections, summary.motion_reports, summary.skipped
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        accumulator::DistanceAccumulator,
        controller_service::ControllerStatus,
        homing::HomingTracker,
        models::{ConnectionState, HomedAxes, OdometerTotals},
        odometer::OdometerHandler,
        persistence::{PersistenceHandle, PersistenceScheduler},
        state_monitor::{PollOutcome, poll_readiness},
    };
    use serde_json::Value;
    use std::{num::NonZeroU64, time::Duration};
    use tokio::net::TcpListener;
    use tokio_tungstenite::{accept_async, tungstenite::protocol::Role};

    fn spawn_odometer() -> OdometerCommandSender {
        let (tx, _rx) = mpsc::unbounded_channel();
        let handler = OdometerHandler::new(
            HomingTracker::new(HomedAxes::empty()),
            DistanceAccumulator::default(),
            PersistenceScheduler::new(NonZeroU64::new(20).unwrap()),
            PersistenceHandle::new(tx),
        );
        handler.spawn().0
    }

    struct AlwaysReady;

    #[async_trait::async_trait]
    impl ControllerStatus for AlwaysReady {
        async fn klippy_ready(&self) -> Result<bool, MoonrakerError> {
            Ok(true)
        }

        async fn homed_axes(&self) -> Result<String, MoonrakerError> {
            Ok(String::new())
        }
    }

    fn assert_subscribe(message: Message, id: u32) {
        let Message::Text(text) = message else {
            panic!("expected text message, got {:?}", message);
        };
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["method"], "printer.objects.subscribe");
        assert_eq!(value["id"], id);
    }

    #[tokio::test]
    async fn subscribe_fails_without_connection() {
        let link = TelemetryLink::new(7);

        assert!(matches!(
            link.send_subscribe().await,
            Err(LinkError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn subscribes_on_open_and_routes_frames() {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        let mut server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        let link = TelemetryLink::new(42);
        let odometer = spawn_odometer();

        let connection = {
            let link = link.clone();
            let odometer = odometer.clone();
            tokio::spawn(async move { serve_connection(client, &link, &odometer).await })
        };

        assert_subscribe(server.next().await.unwrap().unwrap(), 42);

        for text in [
            r#"{"method": "notify_status_update", "params": [{"toolhead": {"homed_axes": "x"}}, 1.0]}"#,
            "not json at all",
            r#"{"method": "notify_status_update", "params": [{"motion_report": {"live_position": [10.0, 5.0, 0.0, 0.0]}}, 1.1]}"#,
            r#"{"jsonrpc": "2.0", "result": {"status": {}}, "id": 42}"#,
            r#"{"method": "notify_status_update", "params": [{"motion_report": {"live_position": [12.5, 9.0, 0.0, 0.0]}}, 1.2]}"#,
        ] {
            server.send(Message::Text(text.to_string())).await.unwrap();
        }
        server.close(None).await.unwrap();

        connection.await.unwrap().unwrap();

        let status = odometer.status().await.unwrap();
        assert_eq!(status.totals, OdometerTotals::new(2.5, 0.0, 0.0));
        assert_eq!(status.messages_processed, 2);
    }

    #[tokio::test]
    async fn queued_subscribe_is_written_to_socket() {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        let mut server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        let link = TelemetryLink::new(5);
        let odometer = spawn_odometer();

        let connection = {
            let link = link.clone();
            tokio::spawn(async move { serve_connection(client, &link, &odometer).await })
        };

        assert_subscribe(server.next().await.unwrap().unwrap(), 5);
        link.send_subscribe().await.unwrap();
        assert_subscribe(server.next().await.unwrap().unwrap(), 5);

        server.close(None).await.unwrap();
        connection.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn resubscribes_after_reconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/websocket", listener.local_addr().unwrap());
        let link = TelemetryLink::new(99);
        let odometer = spawn_odometer();

        let stream = tokio::spawn(run_telemetry_stream(
            url,
            link.clone(),
            odometer,
            RetryPolicy::fixed(Duration::from_millis(10)),
        ));

        for _ in 0..2 {
            let (socket, _) = listener.accept().await.unwrap();
            let mut server = accept_async(socket).await.unwrap();
            assert_subscribe(server.next().await.unwrap().unwrap(), 99);
            server.close(None).await.unwrap();
            // Drain until the client acknowledges the close.
            while let Some(Ok(_)) = server.next().await {}
        }

        stream.abort();
    }

    #[tokio::test]
    async fn reconnect_resubscribes_while_already_subscribed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/websocket", listener.local_addr().unwrap());
        let link = TelemetryLink::new(17);
        let odometer = spawn_odometer();

        let stream = tokio::spawn(run_telemetry_stream(
            url,
            link.clone(),
            odometer.clone(),
            RetryPolicy::fixed(Duration::from_millis(10)),
        ));

        let (socket, _) = listener.accept().await.unwrap();
        let mut server = accept_async(socket).await.unwrap();
        assert_subscribe(server.next().await.unwrap().unwrap(), 17);

        let outcome = poll_readiness(&AlwaysReady, &link, &odometer).await.unwrap();
        assert_eq!(outcome, PollOutcome::Subscribed);
        assert_subscribe(server.next().await.unwrap().unwrap(), 17);

        server.close(None).await.unwrap();
        while let Some(Ok(_)) = server.next().await {}

        let (socket, _) = listener.accept().await.unwrap();
        let mut server = accept_async(socket).await.unwrap();
        assert_subscribe(server.next().await.unwrap().unwrap(), 17);
        assert_eq!(
            odometer.status().await.unwrap().connection,
            ConnectionState::Subscribed
        );

        stream.abort();
    }

    #[tokio::test]
    async fn gives_up_when_policy_is_exhausted() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/websocket", listener.local_addr().unwrap());
        drop(listener);

        let result = run_telemetry_stream(
            url,
            TelemetryLink::new(1),
            spawn_odometer(),
            RetryPolicy::fixed(Duration::from_millis(1)).with_max_retries(2),
        )
        .await;

        assert!(result.is_ok());
    }
}
