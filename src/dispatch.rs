use crate::auth::{Auth, Bindings, BINDINGS_RESOURCE};
use crate::config::WS_CLOSE_TIMEOUT;
use crate::connection::Link;
use crate::device::{all_warm, Device};
use crate::error::{HeatzyError, Result};
use crate::listener::{ConnectOptions, Notification};
use crate::protocol::{BindingChange, Command, Frame, SubscribeResult};
use crate::state::SharedState;
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, Message};

/// Receive loop: routes inbound frames to the registry
pub(crate) struct Dispatcher {
    state: SharedState,
    auth: Arc<dyn Auth>,
    options: ConnectOptions,
    close_timeout: Duration,
}

impl Dispatcher {
    pub(crate) fn new(state: SharedState, auth: Arc<dyn Auth>, options: ConnectOptions) -> Self {
        Self {
            state,
            auth,
            options,
            close_timeout: WS_CLOSE_TIMEOUT,
        }
    }

    /// Bound the wait for the peer's close frame after a local close
    pub(crate) fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Run until the transport closes, then stop the writer task
    pub(crate) async fn run<S>(self, mut reader: S, link: Link, writer: JoinHandle<()>) -> Result<()>
    where
        S: Stream<Item = std::result::Result<Message, tungstenite::Error>> + Unpin,
    {
        let result = self.listen(&mut reader, &link).await;

        link.mark_closed();
        writer.abort();

        match &result {
            Ok(()) => tracing::info!("WebSocket connection closed"),
            Err(e) => tracing::error!("Receive loop stopped: {}", e),
        }
        result
    }

    async fn listen<S>(&self, reader: &mut S, link: &Link) -> Result<()>
    where
        S: Stream<Item = std::result::Result<Message, tungstenite::Error>> + Unpin,
    {
        let mut deadline = None;

        loop {
            let next = if link.is_closing() {
                let deadline = *deadline.get_or_insert_with(|| Instant::now() + self.close_timeout);
                match tokio::time::timeout_at(deadline, reader.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        tracing::debug!("No close reply after {:?}, dropping the connection", self.close_timeout);
                        return Ok(());
                    }
                }
            } else {
                tokio::select! {
                    next = reader.next() => next,
                    () = link.close_requested() => continue,
                }
            };
            let Some(msg_result) = next else {
                break;
            };

            if let Some(signal) = &self.options.signal {
                signal.notify_one();
            }

            match msg_result {
                Ok(Message::Text(text)) => self.handle_text(&text).await?,
                Ok(Message::Close(_)) => return Self::closed(link),
                Err(e) if link.is_closing() => {
                    tracing::debug!("Transport error while closing: {}", e);
                    return Ok(());
                }
                Err(e) => return Err(HeatzyError::ConnectionFailed(e.to_string())),
                // Binary, ping/pong and raw frames carry nothing for us
                Ok(_) => {}
            }
        }

        Self::closed(link)
    }

    fn closed(link: &Link) -> Result<()> {
        if link.is_closing() {
            Ok(())
        } else {
            Err(HeatzyError::Websocket(
                "Connection to the WebSocket has been closed".to_string(),
            ))
        }
    }

    /// Handle one text frame; only protocol-fatal conditions return an error
    pub(crate) async fn handle_text(&self, text: &str) -> Result<()> {
        let message: Value = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::error!("Invalid JSON format for the received message: {}", e);
                return Ok(());
            }
        };
        tracing::debug!("WEBSOCKET <<< {}", message);

        match Frame::classify(message) {
            Frame::Command { cmd, data } => {
                self.state.lock().last_invalid_msg = None;
                match Command::decode(&cmd, data) {
                    Ok(Some(command)) => self.handle_command(command).await,
                    Ok(None) => {
                        tracing::debug!("Ignoring unhandled command {}", cmd);
                        Ok(())
                    }
                    Err(e) => {
                        tracing::warn!("Malformed {} frame: {}", cmd, e);
                        Ok(())
                    }
                }
            }
            Frame::Pong => {
                tracing::trace!("pong");
                Ok(())
            }
            Frame::Unrecognized => {
                tracing::warn!("Received invalid message: {}", text);
                Ok(())
            }
        }
    }

    async fn handle_command(&self, command: Command) -> Result<()> {
        match command {
            Command::LoginRes(data) => self.handle_login(data),
            Command::SubscribeRes(result) => {
                self.handle_subscription(result);
                Ok(())
            }
            Command::InvalidMsg(data) => {
                tracing::warn!("Received invalid message: {}", data);
                self.state.lock().last_invalid_msg = Some(data);
                Ok(())
            }
            Command::Notification(data) => {
                self.handle_notification(&data);
                Ok(())
            }
            Command::BindingChanged(change) => self.handle_binding_change(change).await,
            Command::OnlineStatus(data) => {
                self.handle_status_change(&data);
                Ok(())
            }
        }
    }

    fn handle_login(&self, data: Value) -> Result<()> {
        if data.get("success") == Some(&Value::Bool(false)) {
            return Err(HeatzyError::AuthenticationFailed(data.to_string()));
        }
        self.state.lock().logged_in = true;
        tracing::info!("Logged in to the Heatzy WebSocket");
        Ok(())
    }

    fn handle_subscription(&self, result: SubscribeResult) {
        let mut state = self.state.lock();
        for device in result.success {
            if !state.subscribed.contains(&device.did) {
                state.subscribed.push(device.did);
            }
        }
        for failed in result.failed {
            tracing::warn!("Subscription refused: {}", failed);
        }
    }

    fn handle_notification(&self, data: &Value) {
        let Some(did) = data.get("did").and_then(Value::as_str) else {
            return;
        };

        let mut state = self.state.lock();
        let devices = &mut state.devices;
        match devices.get_mut(did) {
            Some(device) => device.apply_update(data),
            None => {
                tracing::debug!("Notification for unknown device {}", did);
                return;
            }
        }

        let Some(callback) = self.options.callback.clone() else {
            return;
        };
        let notification = if self.options.all_devices {
            // A device that never reports keeps the aggregate callback silent
            if !all_warm(devices) {
                return;
            }
            Notification::All(devices.clone())
        } else {
            match devices.get(did) {
                Some(device) => Notification::Device(device.clone()),
                None => return,
            }
        };
        drop(state);

        callback(notification);
    }

    async fn handle_binding_change(&self, change: BindingChange) -> Result<()> {
        let Some(did) = change.did.filter(|did| !did.is_empty()) else {
            return Ok(());
        };

        if change.bind == Some(false) {
            self.state.lock().devices.remove(&did);
            tracing::info!("Device {} unbound", did);
            return Ok(());
        }

        let bindings = Bindings::from_value(self.auth.request(BINDINGS_RESOURCE).await?)?;
        match bindings.devices.into_iter().find(|b| b.did == did) {
            Some(binding) => {
                tracing::info!("Device {} bound", did);
                self.state
                    .lock()
                    .devices
                    .insert(did, Device::from_binding(binding));
            }
            None => tracing::warn!("Bound device {} missing from the binding list", did),
        }
        Ok(())
    }

    fn handle_status_change(&self, data: &Value) {
        let did = data.get("did").and_then(Value::as_str).unwrap_or_default();
        if let Some(device) = self.state.lock().devices.get_mut(did) {
            device.apply_update(data);
        }
    }
}
