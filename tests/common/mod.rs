#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use heatzy_ws::{Auth, HeatzyError, Result, SessionConfig, Token};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};

pub const PILOTE2_KEY: &str = "51d16c22a5f74280bc3cfe9ebcdc6402";
pub const TIMEOUT: Duration = Duration::from_secs(5);

pub struct FakeAuth {
    devices: Vec<(String, String)>,
    fail_token: bool,
}

impl FakeAuth {
    pub fn new(devices: &[(&str, &str)]) -> Self {
        Self {
            devices: devices
                .iter()
                .map(|(did, key)| (did.to_string(), key.to_string()))
                .collect(),
            fail_token: false,
        }
    }

    pub fn failing_token(mut self) -> Self {
        self.fail_token = true;
        self
    }
}

#[async_trait]
impl Auth for FakeAuth {
    async fn get_token(&self) -> Result<Token> {
        if self.fail_token {
            return Err(HeatzyError::Request("token endpoint unavailable".into()));
        }
        Ok(Token {
            uid: "user-1".into(),
            token: "secret".into(),
        })
    }

    async fn request(&self, resource: &str) -> Result<Value> {
        assert_eq!(resource, "bindings");
        let devices: Vec<Value> = self
            .devices
            .iter()
            .map(|(did, key)| {
                json!({
                    "did": did,
                    "dev_alias": format!("Heater {did}"),
                    "product_key": key,
                    "product_name": "Heatzy",
                    "is_online": true
                })
            })
            .collect();
        Ok(json!({ "devices": devices }))
    }
}

/// Websocket server accepting a single client
pub struct Server {
    pub port: u16,
    inbound: mpsc::UnboundedReceiver<Value>,
    outbound: mpsc::UnboundedSender<Message>,
}

impl Server {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (in_tx, inbound) = mpsc::unbounded_channel();
        let (outbound, mut out_rx) = mpsc::unbounded_channel::<Message>();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = accept_async(stream).await.unwrap();
            let (mut write, mut read) = ws.split();

            loop {
                tokio::select! {
                    msg = read.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            let _ = in_tx.send(serde_json::from_str(&text).unwrap());
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    },
                    out = out_rx.recv() => match out {
                        Some(msg) => {
                            if write.send(msg).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
        });

        Self {
            port,
            inbound,
            outbound,
        }
    }

    pub fn config(&self) -> SessionConfig {
        SessionConfig::default()
            .with_host("127.0.0.1")
            .with_tls(false)
            .with_port(self.port)
            .with_heartbeat_interval(Duration::from_millis(50))
    }

    pub fn push(&self, frame: Value) {
        self.outbound.send(Message::Text(frame.to_string())).unwrap();
    }

    pub fn push_close(&self) {
        self.outbound.send(Message::Close(None)).unwrap();
    }

    /// Next frame received from the client, pings included
    pub async fn recv(&mut self) -> Value {
        tokio::time::timeout(TIMEOUT, self.inbound.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("server stopped")
    }

    /// Next frame with the given `cmd`, skipping the others
    pub async fn recv_cmd(&mut self, cmd: &str) -> Value {
        loop {
            let frame = self.recv().await;
            if frame["cmd"] == cmd {
                return frame;
            }
        }
    }
}

/// Poll `check` until it holds
pub async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(TIMEOUT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never became true");
}
