use crate::device::Devices;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Protocol state shared between the caller and the receive loop
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub devices: Devices,
    pub logged_in: bool,
    /// Ids acknowledged by `subscribe_res`, without duplicates
    pub subscribed: Vec<String>,
    /// Last payload the service rejected
    pub last_invalid_msg: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SharedState(Arc<Mutex<SessionState>>);

impl SharedState {
    /// Never held across an await point
    pub(crate) fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
