use std::time::Duration;

/// Gizwits application id used by the Heatzy mobile app
pub const APPLICATION_ID: &str = "c70a66ff039d41b4a220e198b0fcc8b3";

/// Default websocket host
pub const WS_HOST: &str = "euapi.gizwits.com";

/// Plain websocket port
pub const WS_PORT: u16 = 8080;

/// TLS websocket port
pub const WSS_PORT: u16 = 8880;

/// Path of the application websocket endpoint
pub const WS_PATH: &str = "/ws/app/v1";

/// Interval between two `ping` frames
pub const WS_PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long a local close waits for the peer's close frame
pub const WS_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Session configuration
///
/// Defaults target the public Heatzy endpoint over TLS.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub use_tls: bool,
    /// Overrides the scheme's default port
    pub port: Option<u16>,
    pub app_id: String,
    pub heartbeat_interval: Duration,
    pub close_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: WS_HOST.to_string(),
            use_tls: true,
            port: None,
            app_id: APPLICATION_ID.to_string(),
            heartbeat_interval: WS_PING_INTERVAL,
            close_timeout: WS_CLOSE_TIMEOUT,
        }
    }
}

impl SessionConfig {
    /// Set the websocket host
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Enable or disable TLS (`wss://` vs `ws://`)
    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// Connect to a specific port instead of the scheme default
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the application id sent at login
    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = app_id.into();
        self
    }

    /// Set the heartbeat interval
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Bound the wait for the peer's close frame after `disconnect`
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Heartbeat interval advertised at login, rounded up to whole seconds
    pub fn heartbeat_secs(&self) -> u64 {
        let interval = self.heartbeat_interval;
        interval.as_secs() + u64::from(interval.subsec_nanos() > 0)
    }

    pub fn scheme(&self) -> &'static str {
        if self.use_tls {
            "wss"
        } else {
            "ws"
        }
    }

    pub fn port(&self) -> u16 {
        self.port
            .unwrap_or(if self.use_tls { WSS_PORT } else { WS_PORT })
    }

    /// Full endpoint URL
    pub fn url(&self) -> String {
        format!("{}://{}:{}{}", self.scheme(), self.host, self.port(), WS_PATH)
    }
}
