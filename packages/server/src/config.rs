//! Server configuration and listening port resolution.

use std::fmt;

use crate::error::ConfigError;

/// First port of the range host-derived ports are drawn from (IANA dynamic range)
pub const DERIVED_PORT_BASE: u16 = 49152;

/// Number of ports in the derived range (`49152..=65535`)
const DERIVED_PORT_SPAN: u32 = 16384;

const DEFAULT_HOST: &str = "0.0.0.0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Build a config from an optional explicit port, falling back to a port
    /// derived from this machine's host name.
    pub fn resolve(host: Option<String>, port: Option<u16>) -> Result<Self, ConfigError> {
        let port = resolve_port(port, local_hostname().as_deref())?;
        Ok(Self::new(host.unwrap_or_else(|| DEFAULT_HOST.to_string()), port))
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.bind_addr())
    }
}

/// Pick the listening port: an explicit one wins, otherwise it is derived
/// from the host name. Fails when neither is available.
pub fn resolve_port(explicit: Option<u16>, hostname: Option<&str>) -> Result<u16, ConfigError> {
    if let Some(port) = explicit {
        return Ok(port);
    }
    hostname
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(port_for_hostname)
        .ok_or(ConfigError::NoPort)
}

/// Deterministic port for a host name, so every process on the same machine
/// agrees on it without configuration.
pub fn port_for_hostname(hostname: &str) -> u16 {
    let hash = fnv1a(hostname.to_ascii_lowercase().as_bytes());
    // span is 2^14, so the sum never exceeds u16::MAX
    DERIVED_PORT_BASE + (hash % DERIVED_PORT_SPAN) as u16
}

fn fnv1a(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0x811c_9dc5_u32, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(0x0100_0193)
    })
}

/// Host name from `HOSTNAME`, falling back to `/etc/hostname`.
pub fn local_hostname() -> Option<String> {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}
