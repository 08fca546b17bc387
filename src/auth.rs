use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Resource name of the binding list
pub const BINDINGS_RESOURCE: &str = "bindings";

/// Credentials used to log in on the websocket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub uid: String,
    pub token: String,
}

/// Authentication collaborator
///
/// Owns token acquisition and refresh, and the REST calls the session needs
/// (only the binding list). Implementations may perform network I/O.
#[async_trait]
pub trait Auth: Send + Sync {
    /// Return the current, valid credentials
    async fn get_token(&self) -> Result<Token>;

    /// Fetch a REST resource, e.g. `"bindings"`
    async fn request(&self, resource: &str) -> Result<Value>;
}

/// One device bound to the account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Binding {
    pub did: String,
    #[serde(default)]
    pub dev_alias: Option<String>,
    #[serde(default)]
    pub product_key: String,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub is_online: bool,
    /// Fields this crate has no accessor for
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response of the `bindings` resource
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Bindings {
    #[serde(default)]
    pub devices: Vec<Binding>,
}

impl Bindings {
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Find the binding for a device id
    pub fn find(&self, did: &str) -> Option<&Binding> {
        self.devices.iter().find(|b| b.did == did)
    }
}
