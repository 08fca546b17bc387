use crate::error::{HeatzyError, Result};
use crate::protocol::Request;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::instrument::WithSubscriber;
use tracing::Instrument;

const NOT_CONNECTED: &str = "Not connected to a Heatzy WebSocket";

/// Read half of the websocket
pub(crate) type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

#[derive(Debug, Default)]
struct LinkStatus {
    /// Transport is gone or being torn down
    closed: AtomicBool,
    /// Close was requested by this side
    closing: AtomicBool,
    close_requested: Notify,
}

/// Write side of an open websocket
///
/// Outgoing frames go through an unbounded channel drained by a writer task.
#[derive(Debug, Clone)]
pub(crate) struct Link {
    tx: mpsc::UnboundedSender<Message>,
    status: Arc<LinkStatus>,
}

impl Link {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            tx,
            status: Arc::new(LinkStatus::default()),
        }
    }

    /// Open the websocket and spawn its writer task
    pub(crate) async fn open(url: &str) -> Result<(Self, WsReader, JoinHandle<()>)> {
        tracing::info!("Connecting to {}", url);

        let (ws_stream, _) = connect_async(url).await.map_err(|e| {
            HeatzyError::ConnectionFailed(format!(
                "Error occurred while communicating to websocket at {url}: {e}"
            ))
        })?;
        let (mut write, read) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        let writer = spawn_traced(async move {
            while let Some(msg) = rx.recv().await {
                let close = matches!(msg, Message::Close(_));
                if let Err(e) = write.send(msg).await {
                    tracing::error!("Failed to send message: {}", e);
                    break;
                }
                if close {
                    break;
                }
            }
        });

        Ok((Self::new(tx), read, writer))
    }

    pub(crate) fn send(&self, request: &Request) -> Result<()> {
        if self.is_closed() {
            return Err(HeatzyError::Websocket(NOT_CONNECTED.to_string()));
        }

        let json = serde_json::to_string(request)?;
        tracing::debug!("WEBSOCKET >>> {}", json);

        self.tx
            .send(Message::Text(json))
            .map_err(|_| HeatzyError::Websocket(NOT_CONNECTED.to_string()))
    }

    /// Start a local close: the receive loop will end without error
    pub(crate) fn close(&self) {
        self.status.closing.store(true, Ordering::SeqCst);
        self.status.closed.store(true, Ordering::SeqCst);
        let _ = self.tx.send(Message::Close(None));
        self.status.close_requested.notify_one();
    }

    /// Resolves once `close` has been called
    pub(crate) async fn close_requested(&self) {
        self.status.close_requested.notified().await;
    }

    pub(crate) fn mark_closed(&self) {
        self.status.closed.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.status.closed.load(Ordering::SeqCst) || self.tx.is_closed()
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.status.closing.load(Ordering::SeqCst)
    }
}

/// Send a `ping` frame every `interval` until the link closes
pub(crate) async fn heartbeat(link: Link, interval: Duration) {
    while !link.is_closed() {
        if let Err(e) = link.send(&Request::Ping) {
            tracing::debug!("Heartbeat send failed: {}", e);
            break;
        }
        tokio::time::sleep(interval).await;
    }
    tracing::debug!("Heartbeat stopped");
}

/// Spawn a task carrying the caller's tracing dispatcher and span
pub(crate) fn spawn_traced<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let dispatch = tracing::dispatcher::get_default(|d| d.clone());
    tokio::spawn(future.in_current_span().with_subscriber(dispatch))
}
