//! Print device notifications from a Heatzy account
//!
//! The token and binding list come from a previous login against the HTTP API:
//!
//! ```text
//! HEATZY_UID=... HEATZY_TOKEN=... HEATZY_BINDINGS=bindings.json \
//!     RUST_LOG=heatzy_ws=debug cargo run --example monitor
//! ```

use async_trait::async_trait;
use heatzy_ws::{
    Auth, ConnectOptions, Device, HeatzyError, Notification, Result, Session, SessionConfig,
    Token, BINDINGS_RESOURCE,
};
use serde_json::Value;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

struct StaticAuth {
    token: Token,
    bindings: Value,
}

impl StaticAuth {
    fn from_env() -> Result<Self> {
        let var = |name: &str| {
            std::env::var(name).map_err(|_| HeatzyError::Request(format!("{name} is not set")))
        };
        let path = var("HEATZY_BINDINGS")?;
        let text = std::fs::read_to_string(&path)
            .map_err(|e| HeatzyError::Request(format!("Cannot read {path}: {e}")))?;

        Ok(Self {
            token: Token {
                uid: var("HEATZY_UID")?,
                token: var("HEATZY_TOKEN")?,
            },
            bindings: serde_json::from_str(&text)?,
        })
    }
}

#[async_trait]
impl Auth for StaticAuth {
    async fn get_token(&self) -> Result<Token> {
        Ok(self.token.clone())
    }

    async fn request(&self, resource: &str) -> Result<Value> {
        if resource == BINDINGS_RESOURCE {
            Ok(self.bindings.clone())
        } else {
            Err(HeatzyError::Request(format!("{resource} is not available offline")))
        }
    }
}

fn print_device(device: &Device) {
    println!(
        "{:<24} {:<14} mode={:<10} lock={} boost={}",
        device.name().unwrap_or(device.did()),
        format!("{:?}", device.model()),
        device.mode().map(|m| m.to_string()).unwrap_or_else(|| "-".into()),
        device.is_locked(),
        device.is_boost(),
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let all_devices = std::env::args().any(|arg| arg == "--all");
    let auth = Arc::new(StaticAuth::from_env()?);
    let mut session = Session::new(auth, SessionConfig::default());

    session
        .connect(
            ConnectOptions::new()
                .all_devices(all_devices)
                .callback(|notification| match notification {
                    Notification::Device(device) => print_device(&device),
                    Notification::All(devices) => {
                        println!("--- {} device(s)", devices.len());
                        devices.values().for_each(print_device);
                    }
                }),
        )
        .await?;

    let Some(listener) = session.listener() else {
        return Ok(());
    };

    tokio::select! {
        result = listener => result,
        _ = tokio::signal::ctrl_c() => session.disconnect().await,
    }
}
