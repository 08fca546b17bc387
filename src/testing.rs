use crate::auth::{Auth, Token};
use crate::error::{HeatzyError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Mutex;

pub(crate) const PILOTE2_KEY: &str = "51d16c22a5f74280bc3cfe9ebcdc6402";
pub(crate) const PILOTE_V1_KEY: &str = "9420ae048da545c88fc6274d204dd25f";

/// In-memory auth collaborator
pub(crate) struct FakeAuth {
    bindings: Mutex<Value>,
    pub fail_token: bool,
}

impl FakeAuth {
    pub(crate) fn new(devices: &[(&str, &str)]) -> Self {
        let auth = Self {
            bindings: Mutex::new(Value::Null),
            fail_token: false,
        };
        auth.set_devices(devices);
        auth
    }

    pub(crate) fn bindings(&self) -> Value {
        self.bindings.lock().unwrap().clone()
    }

    pub(crate) fn set_devices(&self, devices: &[(&str, &str)]) {
        let devices: Vec<Value> = devices
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
        *self.bindings.lock().unwrap() = json!({ "devices": devices });
    }
}

#[async_trait]
impl Auth for FakeAuth {
    async fn get_token(&self) -> Result<Token> {
        if self.fail_token {
            return Err(HeatzyError::Request("token refresh failed".into()));
        }
        Ok(Token {
            uid: "uid".into(),
            token: "token".into(),
        })
    }

    async fn request(&self, resource: &str) -> Result<Value> {
        match resource {
            "bindings" => Ok(self.bindings()),
            other => Err(HeatzyError::Request(format!("unknown resource {other}"))),
        }
    }
}
