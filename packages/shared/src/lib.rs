//! Shared building blocks for the business object exchange.
//!
//! - [`protocol`]: the business object model and its wire codec
//! - [`logger`]: tracing subscriber setup for binaries
//! - [`time`]: human-readable timestamps for logs

pub mod logger;
pub mod protocol;
pub mod time;
