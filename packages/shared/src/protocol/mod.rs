//! Business objects and their wire framing.
//!
//! A frame is a UTF-8 JSON metadata object, a single `0x00` terminator, and
//! exactly `size` payload bytes:
//!
//! ```text
//! {"type":"text/plain","size":5}\0hello
//! ```

mod codec;
mod error;
mod metadata;
mod object;

pub use codec::{MAX_METADATA_LEN, METADATA_TERMINATOR, read_packet, serialize};
pub use error::{ProtocolError, ReadError};
pub use metadata::{EventType, Metadata};
pub use object::{BusinessObject, PLAIN_TEXT, ReceiveMode};
