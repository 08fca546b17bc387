use crate::device::{Device, Devices};
use crate::error::{HeatzyError, Result};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Payload handed to the notification callback
#[derive(Debug, Clone)]
pub enum Notification {
    /// The device that was just updated
    Device(Device),
    /// Every registered device, once all of them have reported
    All(Devices),
}

/// Notification callback, invoked from the receive loop
///
/// Runs inline with frame processing: it must return quickly.
pub type Callback = Arc<dyn Fn(Notification) + Send + Sync>;

/// Options for [`Session::connect`](crate::Session::connect)
#[derive(Clone)]
pub struct ConnectOptions {
    /// Let the service subscribe us to every bound device
    pub auto_subscribe: bool,
    /// Hand the whole registry to the callback instead of the updated device
    pub all_devices: bool,
    pub callback: Option<Callback>,
    /// Notified on every inbound frame, whatever its content
    pub signal: Option<Arc<Notify>>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            auto_subscribe: true,
            all_devices: false,
            callback: None,
            signal: None,
        }
    }
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("auto_subscribe", &self.auto_subscribe)
            .field("all_devices", &self.all_devices)
            .field("callback", &self.callback.is_some())
            .field("signal", &self.signal.is_some())
            .finish()
    }
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auto_subscribe(mut self, enabled: bool) -> Self {
        self.auto_subscribe = enabled;
        self
    }

    pub fn all_devices(mut self, enabled: bool) -> Self {
        self.all_devices = enabled;
        self
    }

    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(Notification) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    pub fn signal(mut self, signal: Arc<Notify>) -> Self {
        self.signal = Some(signal);
        self
    }
}

/// Handle on the background receive loop
///
/// Resolves when the loop ends: `Ok(())` after a local disconnect, or the
/// fatal error that stopped it (connection lost, login rejected, ...).
pub struct Listener {
    handle: JoinHandle<Result<()>>,
}

impl Listener {
    pub(crate) fn new(handle: JoinHandle<Result<()>>) -> Self {
        Self { handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the receive loop without closing the transport
    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl Future for Listener {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|joined| match joined {
            Ok(result) => result,
            Err(e) => Err(HeatzyError::Websocket(format!("receive loop stopped: {e}"))),
        })
    }
}
