use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Login `p0_type`: attributes are exchanged as named JSON fields
pub const P0_TYPE: &str = "attrs_v4";

/// Outbound frame, serialized as `{"cmd": <tag>, "data": <object>}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "data")]
pub enum Request {
    #[serde(rename = "login_req")]
    Login(LoginData),
    #[serde(rename = "subscribe_req")]
    Subscribe(Vec<DidRef>),
    #[serde(rename = "c2s_read")]
    Read(DidRef),
    #[serde(rename = "c2s_write")]
    Write(ControlData),
    #[serde(rename = "c2s_raw")]
    Raw(ControlData),
    /// Serialized without data: `{"cmd": "ping"}`
    #[serde(rename = "ping")]
    Ping,
}

/// Login request data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginData {
    pub appid: String,
    pub uid: String,
    pub token: String,
    pub p0_type: String,
    /// Seconds
    pub heartbeat_interval: u64,
    pub auto_subscribe: bool,
}

/// A bare device reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DidRef {
    pub did: String,
}

impl DidRef {
    pub fn new(did: impl Into<String>) -> Self {
        Self { did: did.into() }
    }
}

/// Control instruction sent to a device
///
/// Serialized as `{"raw": [...]}` or `{"attrs": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlPayload {
    /// Low-level byte instruction, required by the legacy Pilote v1
    Raw(Vec<u8>),
    /// Named attribute instruction
    Attrs(Map<String, Value>),
}

impl ControlPayload {
    pub fn is_raw(&self) -> bool {
        matches!(self, Self::Raw(_))
    }
}

/// Data of a `c2s_write` / `c2s_raw` frame: `{did, raw|attrs}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlData {
    pub did: String,
    #[serde(flatten)]
    pub payload: ControlPayload,
}

impl Request {
    pub fn read(did: impl Into<String>) -> Self {
        Self::Read(DidRef::new(did))
    }

    pub fn subscribe<I, S>(dids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Subscribe(dids.into_iter().map(DidRef::new).collect())
    }

    /// `c2s_raw` for raw payloads, `c2s_write` otherwise
    pub fn control(did: impl Into<String>, payload: ControlPayload) -> Self {
        let raw = payload.is_raw();
        let data = ControlData {
            did: did.into(),
            payload,
        };
        if raw {
            Self::Raw(data)
        } else {
            Self::Write(data)
        }
    }

    /// Tag carried in the `cmd` field
    pub fn cmd(&self) -> &'static str {
        match self {
            Self::Login(_) => "login_req",
            Self::Subscribe(_) => "subscribe_req",
            Self::Read(_) => "c2s_read",
            Self::Write(_) => "c2s_write",
            Self::Raw(_) => "c2s_raw",
            Self::Ping => "ping",
        }
    }
}

/// Shape of an inbound text frame
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Frame {
    /// Frame carrying both a `cmd` and a non-empty `data`
    Command { cmd: String, data: Value },
    Pong,
    Unrecognized,
}

impl Frame {
    pub(crate) fn classify(message: Value) -> Self {
        let Value::Object(mut message) = message else {
            return Self::Unrecognized;
        };
        let cmd = message
            .get("cmd")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default();
        let data = message.remove("data").unwrap_or(Value::Null);

        if !cmd.is_empty() && is_present(&data) {
            Self::Command { cmd, data }
        } else if cmd == "pong" {
            Self::Pong
        } else {
            Self::Unrecognized
        }
    }
}

/// `null`, `false`, `0`, empty strings and empty containers count as absent
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Inbound commands the session knows how to handle
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Command {
    LoginRes(Value),
    SubscribeRes(SubscribeResult),
    InvalidMsg(Value),
    Notification(Value),
    BindingChanged(BindingChange),
    OnlineStatus(Value),
}

impl Command {
    /// Decode a command frame; `None` for tags this session does not handle
    pub(crate) fn decode(cmd: &str, data: Value) -> Result<Option<Self>> {
        let command = match cmd {
            "login_res" => Self::LoginRes(data),
            "subscribe_res" => Self::SubscribeRes(serde_json::from_value(data)?),
            "s2c_invalid_msg" => Self::InvalidMsg(data),
            "s2c_noti" => Self::Notification(data),
            "s2c_binding_changed" => Self::BindingChanged(serde_json::from_value(data)?),
            "s2c_online_status" => Self::OnlineStatus(data),
            _ => return Ok(None),
        };
        Ok(Some(command))
    }
}

/// `subscribe_res` data
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub(crate) struct SubscribeResult {
    #[serde(default)]
    pub success: Vec<DidRef>,
    #[serde(default)]
    pub failed: Vec<Value>,
}

/// `s2c_binding_changed` data
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub(crate) struct BindingChange {
    #[serde(default)]
    pub did: Option<String>,
    #[serde(default)]
    pub bind: Option<bool>,
}
