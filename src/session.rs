use crate::auth::{Auth, Bindings, BINDINGS_RESOURCE};
use crate::config::SessionConfig;
use crate::connection::{heartbeat, spawn_traced, Link};
use crate::device::{Action, Device, Devices};
use crate::dispatch::Dispatcher;
use crate::error::{HeatzyError, Result};
use crate::listener::{ConnectOptions, Listener};
use crate::protocol::{ControlPayload, LoginData, Request, P0_TYPE};
use crate::state::SharedState;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::instrument::{WithDispatch, WithSubscriber};
use tracing::{Dispatch, Instrument, Span};

/// Websocket session with the Heatzy cloud
///
/// The session owns the connection, the device registry and the protocol
/// state. Once connected, inbound frames are processed by a background
/// receive loop; use [`Session::listener`] to observe how it ends.
///
/// # Example
///
/// ```no_run
/// use heatzy_ws::{Auth, ConnectOptions, Notification, Session, SessionConfig};
/// use std::sync::Arc;
///
/// # async fn run(auth: Arc<dyn Auth>) -> heatzy_ws::Result<()> {
/// let mut session = Session::new(auth, SessionConfig::default());
/// session
///     .connect(ConnectOptions::new().callback(|n| {
///         if let Notification::Device(device) = n {
///             println!("{} is now {:?}", device.did(), device.mode());
///         }
///     }))
///     .await?;
///
/// let listener = session.listener().expect("connected");
/// listener.await?;
/// # Ok(())
/// # }
/// ```
pub struct Session {
    auth: Arc<dyn Auth>,
    config: SessionConfig,
    state: SharedState,
    link: Option<Link>,
    listener: Option<Listener>,
    dispatch: Dispatch,
    span: Span,
}

impl Session {
    /// Create a session logging through the dispatcher current at this point
    pub fn new(auth: Arc<dyn Auth>, config: SessionConfig) -> Self {
        let dispatch = tracing::dispatcher::get_default(|d| d.clone());
        let span = session_span(&dispatch, &config);

        Self {
            auth,
            config,
            state: SharedState::default(),
            link: None,
            listener: None,
            dispatch,
            span,
        }
    }

    /// Route this session's logs, and those of its tasks, to `dispatch`
    pub fn with_dispatch(mut self, dispatch: impl Into<Dispatch>) -> Self {
        self.dispatch = dispatch.into();
        self.span = session_span(&self.dispatch, &self.config);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Whether the websocket is open
    pub fn is_connected(&self) -> bool {
        self.link.as_ref().is_some_and(|link| !link.is_closed())
    }

    /// Whether the service accepted our login
    pub fn is_logged_in(&self) -> bool {
        self.state.lock().logged_in
    }

    /// Device ids acknowledged by the service
    pub fn subscribed_devices(&self) -> Vec<String> {
        self.state.lock().subscribed.clone()
    }

    /// Last payload rejected by the service, if the next frame has not cleared it yet
    pub fn last_invalid_msg(&self) -> Option<Value> {
        self.state.lock().last_invalid_msg.clone()
    }

    /// Snapshot of the registry, without asking the service for fresh data
    pub fn devices(&self) -> Devices {
        self.state.lock().devices.clone()
    }

    /// Snapshot of one device, without asking the service for fresh data
    pub fn device(&self, did: &str) -> Option<Device> {
        self.state.lock().devices.get(did).cloned()
    }

    /// Take the handle on the receive loop started by the last `connect`
    pub fn listener(&mut self) -> Option<Listener> {
        self.listener.take()
    }

    /// Connect, log in and start the receive loop
    ///
    /// Does nothing when already connected. The device registry is fetched
    /// first when empty.
    pub async fn connect(&mut self, options: ConnectOptions) -> Result<()> {
        let span = self.span.clone();
        let dispatch = self.dispatch.clone();
        self.connect_inner(options)
            .instrument(span)
            .with_subscriber(dispatch)
            .await
    }

    async fn connect_inner(&mut self, options: ConnectOptions) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        if self.state.lock().devices.is_empty() {
            self.load_bindings().await?;
        }

        let url = self.config.url();
        let (link, reader, writer) = Link::open(&url).await?;
        tracing::debug!("WEBSOCKET Connected to {}", url);

        self.state.lock().logged_in = false;
        let dispatcher = Dispatcher::new(self.state.clone(), self.auth.clone(), options.clone())
            .with_close_timeout(self.config.close_timeout);
        let handle = spawn_traced(dispatcher.run(reader, link.clone(), writer));
        self.listener = Some(Listener::new(handle));
        self.link = Some(link.clone());

        let result = self.login_and_read(&options).await;
        if let Err(e) = &result {
            // A failed connect leaves no open link behind
            tracing::warn!("Connect aborted: {}", e);
            link.close();
        }
        result
    }

    async fn login_and_read(&self, options: &ConnectOptions) -> Result<()> {
        self.login_inner(options.auto_subscribe)
            .await
            .map_err(|e| HeatzyError::AuthenticationFailed(e.to_string()))?;

        if options.all_devices {
            self.read_all_on_connect()?;
        }
        Ok(())
    }

    /// Read failures at connect are reported as authentication failures
    fn read_all_on_connect(&self) -> Result<()> {
        self.read_all()
            .map_err(|e| HeatzyError::AuthenticationFailed(e.to_string()))
    }

    /// Close the websocket
    ///
    /// The receive loop then ends with `Ok(())`; the heartbeat stops on its
    /// next tick.
    pub async fn disconnect(&self) -> Result<()> {
        let Some(link) = self.link.as_ref().filter(|link| !link.is_closed()) else {
            return Ok(());
        };
        self.traced(async {
            tracing::info!("Disconnecting");
            link.close();
        })
        .await;
        Ok(())
    }

    /// Send `login_req` and start the heartbeat
    ///
    /// Login confirmation arrives later through the receive loop.
    pub async fn login(&self, auto_subscribe: bool) -> Result<()> {
        self.traced(self.login_inner(auto_subscribe)).await
    }

    async fn login_inner(&self, auto_subscribe: bool) -> Result<()> {
        let token = self.auth.get_token().await?;

        self.send(&Request::Login(LoginData {
            appid: self.config.app_id.clone(),
            uid: token.uid,
            token: token.token,
            p0_type: P0_TYPE.to_string(),
            heartbeat_interval: self.config.heartbeat_secs(),
            auto_subscribe,
        }))?;

        let link = self.link()?.clone();
        spawn_traced(heartbeat(link, self.config.heartbeat_interval));
        Ok(())
    }

    /// Fetch the binding list and insert or overwrite one record per device
    pub async fn fetch_binding_devices(&self) -> Result<()> {
        self.traced(self.load_bindings()).await
    }

    async fn load_bindings(&self) -> Result<()> {
        let bindings = Bindings::from_value(self.auth.request(BINDINGS_RESOURCE).await?)?;
        tracing::debug!("Fetched {} binding(s)", bindings.devices.len());

        let mut state = self.state.lock();
        for binding in bindings.devices {
            state
                .devices
                .insert(binding.did.clone(), Device::from_binding(binding));
        }
        Ok(())
    }

    /// Ask the service for a device's state
    ///
    /// Returns the record as currently known; the answer updates it later.
    pub async fn get_device(&self, did: &str) -> Result<Option<Device>> {
        self.traced(async { self.send(&Request::read(did)) }).await?;
        Ok(self.device(did))
    }

    /// Ask the service for every device's state
    ///
    /// Returns the registry as currently known; answers update it later.
    pub async fn get_devices(&self) -> Result<Devices> {
        self.traced(async { self.read_all() }).await?;
        Ok(self.devices())
    }

    fn read_all(&self) -> Result<()> {
        let dids: Vec<String> = self.state.lock().devices.keys().cloned().collect();
        for did in dids {
            self.send(&Request::read(did))?;
        }
        Ok(())
    }

    /// Send a control instruction (`c2s_raw` or `c2s_write`)
    pub async fn control_device(&self, did: &str, payload: ControlPayload) -> Result<()> {
        self.traced(async { self.send(&Request::control(did, payload)) })
            .await
    }

    /// Encode `action` for the device's model and send it
    pub async fn send_action(&self, did: &str, action: Action) -> Result<()> {
        let device = self
            .device(did)
            .ok_or_else(|| HeatzyError::UnknownDevice(did.to_string()))?;
        let payload = device.payload_for(&action)?;
        self.control_device(did, payload).await
    }

    /// Subscribe to devices, for sessions connected without `auto_subscribe`
    pub async fn subscribe<I, S>(&self, dids: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let request = Request::subscribe(dids);
        self.traced(async { self.send(&request) }).await
    }

    /// Send an application-level `ping`
    pub async fn ping(&self) -> Result<()> {
        self.traced(async { self.send(&Request::Ping) }).await
    }

    fn link(&self) -> Result<&Link> {
        self.link
            .as_ref()
            .ok_or_else(|| HeatzyError::Websocket("Not connected to a Heatzy WebSocket".to_string()))
    }

    fn send(&self, request: &Request) -> Result<()> {
        self.link()?.send(request)
    }

    fn traced<F: Future>(&self, future: F) -> WithDispatch<tracing::instrument::Instrumented<F>> {
        future
            .instrument(self.span.clone())
            .with_subscriber(self.dispatch.clone())
    }

    #[cfg(test)]
    pub(crate) fn attach(&mut self, link: Link) {
        self.link = Some(link);
    }
}

fn session_span(dispatch: &Dispatch, config: &SessionConfig) -> Span {
    tracing::dispatcher::with_default(dispatch, || {
        tracing::info_span!("heatzy", host = %config.host)
    })
}
