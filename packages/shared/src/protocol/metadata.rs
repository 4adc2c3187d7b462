//! Ordered key/value metadata describing a business object.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use super::error::ProtocolError;

const KEY_TYPE: &str = "type";
const KEY_EVENT: &str = "event";
const KEY_SIZE: &str = "size";
const KEY_CHANNEL: &str = "channel";
const KEY_USER: &str = "user";
const KEY_NAME: &str = "name";

/// Event classification carried in the `event` key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    Error,
    ServiceStateChanged,
    ClientRegister,
    /// Any event name this crate does not interpret
    Other(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::Error => "error",
            EventType::ServiceStateChanged => "service/state-changed",
            EventType::ClientRegister => "client/register",
            EventType::Other(name) => name,
        }
    }
}

impl From<&str> for EventType {
    fn from(name: &str) -> Self {
        match name {
            "error" => EventType::Error,
            "service/state-changed" => EventType::ServiceStateChanged,
            "client/register" => EventType::ClientRegister,
            other => EventType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata block of a business object.
///
/// Keys keep their insertion order, so a decoded block serializes back to the
/// same key sequence. Only `type`, `event` and `size` have a meaning to this
/// crate; every other key is carried verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Metadata(Map<String, Value>);

impl Metadata {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Parse a metadata block (without its terminator).
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, ProtocolError> {
        match serde_json::from_slice::<Value>(bytes)? {
            Value::Object(map) => Ok(Self(map)),
            Value::Array(_) => Err(ProtocolError::NotAnObject("array")),
            Value::String(_) => Err(ProtocolError::NotAnObject("string")),
            Value::Number(_) => Err(ProtocolError::NotAnObject("number")),
            Value::Bool(_) => Err(ProtocolError::NotAnObject("boolean")),
            Value::Null => Err(ProtocolError::NotAnObject("null")),
        }
    }

    pub fn to_json_vec(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Content classification, usually a mime type.
    pub fn object_type(&self) -> Option<&str> {
        self.get_str(KEY_TYPE)
    }

    pub fn set_type(&mut self, object_type: impl Into<String>) {
        self.insert(KEY_TYPE, object_type.into());
    }

    pub fn event(&self) -> Option<EventType> {
        self.get_str(KEY_EVENT).map(EventType::from)
    }

    pub fn set_event(&mut self, event: EventType) {
        self.insert(KEY_EVENT, event.as_str());
    }

    /// Declared payload size. A missing key means no payload.
    pub fn size(&self) -> Result<Option<usize>, ProtocolError> {
        let Some(value) = self.get(KEY_SIZE) else {
            return Ok(None);
        };
        value
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| ProtocolError::InvalidSize(value.to_string()))
    }

    pub fn set_size(&mut self, size: usize) {
        self.insert(KEY_SIZE, size);
    }

    pub fn channel(&self) -> Option<&str> {
        self.get_str(KEY_CHANNEL)
    }

    pub fn user(&self) -> Option<&str> {
        self.get_str(KEY_USER)
    }

    pub fn name(&self) -> Option<&str> {
        self.get_str(KEY_NAME)
    }
}

impl From<Map<String, Value>> for Metadata {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.0.clone()))
    }
}
