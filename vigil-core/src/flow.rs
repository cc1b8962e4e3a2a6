//! Host and connection identities, and flow-record parsing
//!
//! A flow record is one observed flow summary: a source host talked to a
//! destination host. Sensors report these as `"ip:port-ip:port"` strings;
//! parsing them into structured records is the explicit boundary between
//! wire data and routing logic.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

/// Errors from parsing a flow record
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlowParseError {
    /// The record does not have the `ip:port-ip:port` shape.
    #[error("flow record {0:?} does not match ip:port-ip:port")]
    Shape(String),

    /// A port field is numeric but outside the 16-bit range.
    #[error("port {0:?} out of range")]
    Port(String),
}

// Strict IPv4 octets; a looser pattern would accept addresses like
// 999.1.1.1 and push the failure into routing.
static FLOW_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    const IPV4: &str = r"(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)";
    Regex::new(&format!(r"^({IPV4}):([0-9]{{1,5}})-({IPV4}):([0-9]{{1,5}})$")).unwrap()
});

/// One observed host: IPv4 address and port
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostId {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl HostId {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    /// The persistence key: `"<ip>:<port>"`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// One ordered host pair: source talked to destination
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId {
    pub source: HostId,
    pub destination: HostId,
}

impl ConnectionId {
    pub fn new(source: HostId, destination: HostId) -> Self {
        Self {
            source,
            destination,
        }
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.source, self.destination)
    }
}

/// One decoded flow summary from a sensor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub source: HostId,
    pub destination: HostId,
}

impl FlowRecord {
    /// The connection identity this flow is evidence for.
    pub fn connection(&self) -> ConnectionId {
        ConnectionId::new(self.source.clone(), self.destination.clone())
    }
}

impl FromStr for FlowRecord {
    type Err = FlowParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = FLOW_REGEX
            .captures(s)
            .ok_or_else(|| FlowParseError::Shape(s.to_string()))?;

        // The regex guarantees valid octets, so the addresses parse.
        let src_ip: Ipv4Addr = caps[1].parse().unwrap();
        let dst_ip: Ipv4Addr = caps[3].parse().unwrap();
        let src_port: u16 = caps[2]
            .parse()
            .map_err(|_| FlowParseError::Port(caps[2].to_string()))?;
        let dst_port: u16 = caps[4]
            .parse()
            .map_err(|_| FlowParseError::Port(caps[4].to_string()))?;

        Ok(Self {
            source: HostId::new(src_ip, src_port),
            destination: HostId::new(dst_ip, dst_port),
        })
    }
}
