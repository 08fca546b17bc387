use crate::auth::Binding;
use crate::error::{HeatzyError, Result};
use crate::protocol::ControlPayload;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Device identifier
pub type DeviceId = String;

/// Registry of devices, keyed by device id
pub type Devices = HashMap<DeviceId, Device>;

/// Raw instruction turning a Pilote v1 on (comfort)
pub const V1_TURN_ON: [u8; 11] = [0, 0, 0, 3, 6, 0, 0, 144, 1, 1, 0];

/// Raw instruction turning a Pilote v1 off
pub const V1_TURN_OFF: [u8; 11] = [0, 0, 0, 3, 6, 0, 0, 144, 1, 1, 3];

/// Heatzy product, resolved from the binding's product key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Model {
    PiloteV1,
    Pilote2,
    PiloteSoc,
    Pilote2ElecPro,
    ElecProSoc,
    ElecProBle,
    GlowSimple,
    Onyx,
    Bloom,
    PiloteSocC3,
    Flam,
    Glow,
    GlowBlu,
    Inea,
    Rocket,
    ShineBlu,
    Socket,
    Vulcane,
    Unknown,
}

const MODELS: &[(Model, &str)] = &[
    (Model::PiloteV1, "9420ae048da545c88fc6274d204dd25f"),
    (Model::Pilote2, "51d16c22a5f74280bc3cfe9ebcdc6402"),
    (Model::PiloteSoc, "b9a67b6ce24b437d9794103fd317e627"),
    (Model::Pilote2ElecPro, "4fc968a21e7243b390e9ede6f1c6465d"),
    (Model::ElecProSoc, "b8c6657b66c34148b4dee64d615cefc7"),
    (Model::ElecProBle, "9dacde7ef459421eaf8dc4bea9385634"),
    (Model::GlowSimple, "2fd622e45283470f9e27e8e6167d7533"),
    (Model::Onyx, "bb10d064f8de409db633b750faa22a52"),
    (Model::Bloom, "480253852d574f11b2d7fbf4460d7a41"),
    (Model::PiloteSocC3, "46409c7f29d4411c85a3a46e5ee3703e"),
    (Model::Flam, "f71ee820660f4f358db8b8a474689726"),
    (Model::Glow, "51c35c204f854cebbc780bf9785db409"),
    (Model::GlowBlu, "cffa0df68a52449085c5d1e72c2f6bb0"),
    (Model::Inea, "fc89066ee74c4149a9beb37d4ea93604"),
    (Model::Rocket, "d60c58d724b845068bf4652a10883c92"),
    (Model::ShineBlu, "2884feb88e0b4f30b75ea5572276a102"),
    (Model::Socket, "0a000341206048a0be23e2cbf9d8f29a"),
    (Model::Vulcane, "e5d5766484db4b4d9b9fa7c08cd65481"),
];

/// Hardware generation a model belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// Legacy pilot wire, driven by raw instructions, no lock
    V1,
    V2,
    Glow,
    Other,
}

impl Model {
    /// Look a product key up in the model table
    pub fn from_product_key(product_key: &str) -> Self {
        MODELS
            .iter()
            .find(|(_, key)| *key == product_key)
            .map(|(model, _)| *model)
            .unwrap_or(Model::Unknown)
    }

    pub fn product_key(&self) -> Option<&'static str> {
        MODELS
            .iter()
            .find(|(model, _)| model == self)
            .map(|(_, key)| *key)
    }

    pub fn family(&self) -> Family {
        match self {
            Model::PiloteV1 => Family::V1,
            Model::Pilote2 | Model::PiloteSoc | Model::ElecProSoc | Model::ElecProBle => {
                Family::V2
            }
            Model::GlowSimple | Model::Onyx => Family::Glow,
            _ => Family::Other,
        }
    }

    pub fn is_legacy(&self) -> bool {
        self.family() == Family::V1
    }
}

/// Heater operating mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Comfort,
    Eco,
    FrostProtection,
    Stop,
    /// Comfort minus one degree
    Comfort1,
    /// Comfort minus two degrees
    Comfort2,
    Other(String),
}

impl Mode {
    pub fn as_str(&self) -> &str {
        match self {
            Mode::Comfort => "cft",
            Mode::Eco => "eco",
            Mode::FrostProtection => "fro",
            Mode::Stop => "stop",
            Mode::Comfort1 => "cft1",
            Mode::Comfort2 => "cft2",
            Mode::Other(s) => s,
        }
    }
}

impl From<&str> for Mode {
    fn from(s: &str) -> Self {
        match s {
            "cft" => Mode::Comfort,
            "eco" => Mode::Eco,
            "fro" => Mode::FrostProtection,
            "stop" => Mode::Stop,
            "cft1" => Mode::Comfort1,
            "cft2" => Mode::Comfort2,
            other => Mode::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// High-level control action, encoded per model by [`Device::payload_for`]
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    TurnOn,
    TurnOff,
    SetMode(Mode),
    /// Back to the programmed schedule
    Auto,
    Lock,
    Unlock,
    Boost(bool),
    /// Temporary override for `duration` (service units)
    Derogation { enabled: bool, duration: u32 },
    Attrs(Map<String, Value>),
    Raw(Vec<u8>),
}

/// In-memory mirror of one bound device
#[derive(Debug, Clone)]
pub struct Device {
    did: DeviceId,
    alias: Option<String>,
    product_key: String,
    product_name: String,
    model: Model,
    online: bool,
    attrs: Map<String, Value>,
    extra: Map<String, Value>,
}

impl Device {
    /// Create a record from a binding entry
    pub fn from_binding(binding: Binding) -> Self {
        Self {
            model: Model::from_product_key(&binding.product_key),
            did: binding.did,
            alias: binding.dev_alias,
            product_key: binding.product_key,
            product_name: binding.product_name,
            online: binding.is_online,
            attrs: Map::new(),
            extra: binding.extra,
        }
    }

    pub fn did(&self) -> &str {
        &self.did
    }

    /// Human-readable alias
    pub fn name(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn product_key(&self) -> &str {
        &self.product_key
    }

    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn model(&self) -> Model {
        self.model
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Whether the model has a lock (every model but the Pilote v1)
    pub fn has_lock(&self) -> bool {
        !self.model.is_legacy()
    }

    pub fn is_locked(&self) -> bool {
        self.switch("lock_switch")
    }

    pub fn is_boost(&self) -> bool {
        self.switch("boost_switch")
    }

    pub fn is_timer(&self) -> bool {
        self.switch("timer_switch")
    }

    pub fn mode(&self) -> Option<Mode> {
        self.attrs.get("mode").and_then(Value::as_str).map(Mode::from)
    }

    /// Whether at least one attribute update has been received
    pub fn is_warm(&self) -> bool {
        !self.attrs.is_empty()
    }

    /// Raw attribute map as last reported by the device
    pub fn raw_attrs(&self) -> &Map<String, Value> {
        &self.attrs
    }

    /// Binding fields without a dedicated accessor
    pub fn raw_binding(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Replace the attribute map with `payload.attrs`
    ///
    /// The map is replaced wholesale, never merged. An `online` flag in the
    /// payload updates the online status.
    pub fn apply_update(&mut self, payload: &Value) {
        self.attrs = payload
            .get("attrs")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        if let Some(online) = payload.get("online").and_then(Value::as_bool) {
            self.online = online;
        }
    }

    /// Encode an action for this device's model
    pub fn payload_for(&self, action: &Action) -> Result<ControlPayload> {
        if self.model.is_legacy() {
            return match action {
                Action::TurnOn => Ok(ControlPayload::Raw(V1_TURN_ON.to_vec())),
                Action::TurnOff => Ok(ControlPayload::Raw(V1_TURN_OFF.to_vec())),
                Action::Raw(bytes) => Ok(ControlPayload::Raw(bytes.clone())),
                other => Err(HeatzyError::NotSupported(format!(
                    "{other:?} on {:?} ({})",
                    self.model, self.did
                ))),
            };
        }

        let attrs = match action {
            Action::TurnOn => json!({"mode": Mode::Comfort.as_str()}),
            Action::TurnOff => json!({"mode": Mode::Stop.as_str()}),
            Action::SetMode(mode) => json!({"mode": mode.as_str()}),
            Action::Auto => json!({"timer_switch": 1, "derog_mode": 0, "derog_time": 0}),
            Action::Lock => json!({"lock_switch": 1}),
            Action::Unlock => json!({"lock_switch": 0}),
            Action::Boost(on) => json!({"boost_switch": u8::from(*on)}),
            Action::Derogation { enabled, duration } => json!({
                "timer_switch": 0,
                "derog_mode": u8::from(*enabled),
                "derog_time": duration,
            }),
            Action::Attrs(attrs) => return Ok(ControlPayload::Attrs(attrs.clone())),
            Action::Raw(bytes) => return Ok(ControlPayload::Raw(bytes.clone())),
        };

        match attrs {
            Value::Object(map) => Ok(ControlPayload::Attrs(map)),
            _ => Ok(ControlPayload::Attrs(Map::new())),
        }
    }

    fn switch(&self, key: &str) -> bool {
        match self.attrs.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_u64() == Some(1),
            _ => false,
        }
    }
}

/// True when every registered device has reported its attributes
pub fn all_warm(devices: &Devices) -> bool {
    devices.values().all(Device::is_warm)
}
