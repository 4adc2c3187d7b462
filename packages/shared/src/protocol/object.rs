//! The business object: metadata plus a raw payload.

use std::fmt;

use bytes::Bytes;

use super::{
    codec::serialize,
    error::ProtocolError,
    metadata::{EventType, Metadata},
};

/// Mime type of UTF-8 text payloads.
pub const PLAIN_TEXT: &str = "text/plain";

const KEY_RECEIVE: &str = "receive";

/// What a client asks to receive when it registers. Advisory only: the
/// server relays everything to everyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveMode {
    All,
    None,
}

impl ReceiveMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiveMode::All => "all",
            ReceiveMode::None => "none",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "all" => Some(ReceiveMode::All),
            "none" => Some(ReceiveMode::None),
            _ => None,
        }
    }
}

/// Unit of exchange between clients.
///
/// The payload length always matches the `size` recorded in the metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct BusinessObject {
    metadata: Metadata,
    payload: Vec<u8>,
}

impl BusinessObject {
    /// Create an object, recording the payload length as its `size`.
    pub fn new(mut metadata: Metadata, payload: Vec<u8>) -> Self {
        metadata.set_size(payload.len());
        Self { metadata, payload }
    }

    /// Create an object of the given type.
    pub fn with_type(object_type: impl Into<String>, payload: Vec<u8>) -> Self {
        let mut metadata = Metadata::new();
        metadata.set_type(object_type);
        Self::new(metadata, payload)
    }

    pub fn plain_text(text: impl Into<String>) -> Self {
        Self::with_type(PLAIN_TEXT, text.into().into_bytes())
    }

    pub fn error(text: impl Into<String>) -> Self {
        let mut object = Self::plain_text(text);
        object.metadata.set_event(EventType::Error);
        object
    }

    /// Conventional first object a client sends to announce itself.
    pub fn registration(name: impl Into<String>, receive: ReceiveMode) -> Self {
        let mut metadata = Metadata::new();
        metadata.set_event(EventType::ClientRegister);
        metadata.insert("name", name.into());
        metadata.insert(KEY_RECEIVE, receive.as_str());
        Self::new(metadata, Vec::new())
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Mutable access to the free-form fields. `size` is rewritten on
    /// serialization, so it cannot drift from the payload.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn set_payload(&mut self, payload: Vec<u8>) {
        self.metadata.set_size(payload.len());
        self.payload = payload;
    }

    pub fn into_parts(self) -> (Metadata, Vec<u8>) {
        (self.metadata, self.payload)
    }

    pub fn is_error(&self) -> bool {
        self.metadata.event() == Some(EventType::Error)
    }

    pub fn receive_mode(&self) -> Option<ReceiveMode> {
        self.metadata.get_str(KEY_RECEIVE).and_then(ReceiveMode::parse)
    }

    /// Payload as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// Wire bytes of this object.
    pub fn to_bytes(&self) -> Result<Bytes, ProtocolError> {
        serialize(&self.metadata, &self.payload).map(Bytes::from)
    }
}

impl From<(Metadata, Vec<u8>)> for BusinessObject {
    fn from((metadata, payload): (Metadata, Vec<u8>)) -> Self {
        Self::new(metadata, payload)
    }
}

impl fmt::Display for BusinessObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let object_type = self.metadata.object_type();
        if self.is_error() {
            return write!(f, "ERROR ({}: {})", object_type.unwrap_or("-"), self.text());
        }
        match (object_type, self.metadata.event()) {
            (Some(t), _) if t.starts_with("text/") || t == "text" => {
                write!(f, "{}: {}", t, self.text())
            }
            (Some(t), _) => write!(f, "{} ({} bytes)", t, self.payload.len()),
            (None, Some(event)) => write!(f, "<{}> {}", event, self.metadata),
            (None, None) => write!(f, "{} ({} bytes)", self.metadata, self.payload.len()),
        }
    }
}
