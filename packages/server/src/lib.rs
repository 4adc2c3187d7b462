//! Broadcast business-object exchange server.
//!
//! Every client connects over TCP and sends framed business objects (JSON
//! metadata, a NUL byte, then the payload). Each object received from any
//! client is relayed to every connected client, the sender included.

pub mod config;
pub mod connection;
pub mod error;
pub mod lifecycle;
pub mod reader;
pub mod registry;
pub mod sender;
pub mod server;
pub mod signal;

pub use config::ServerConfig;
pub use connection::{ClientConnection, ConnectionId, ObjectHandler};
pub use error::{ConfigError, SenderError, ServerError};
pub use registry::ConnectionRegistry;
pub use server::{BroadcastServer, FanOut};
