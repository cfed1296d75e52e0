use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// One address/port pair submitted for probing.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Target {
    pub ip: IpAddr,
    pub port: u16,
}

impl Target {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

/// How a single probe ended.
///
/// Only `MethodsDisclosed` containing `"password"` counts as a finding; every
/// other variant collapses to a negative result at the reporting boundary.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeStatus {
    /// Refused, unreachable, or the connect timed out.
    Unreachable,
    /// The SSH transport could not be negotiated in time.
    HandshakeFailed,
    /// The `none` auth attempt failed without disclosing a method list.
    AuthAnomaly,
    /// The server let an unknown user in with no credentials.
    NoAuthRequired,
    MethodsDisclosed { methods: BTreeSet<String> },
}

impl ProbeStatus {
    pub fn password_auth_allowed(&self) -> bool {
        matches!(self, ProbeStatus::MethodsDisclosed { methods } if methods.contains("password"))
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeStatus::Unreachable => write!(f, "unreachable"),
            ProbeStatus::HandshakeFailed => write!(f, "handshake failed"),
            ProbeStatus::AuthAnomaly => write!(f, "auth anomaly"),
            ProbeStatus::NoAuthRequired => write!(f, "no auth required"),
            ProbeStatus::MethodsDisclosed { methods } => {
                let list: Vec<&str> = methods.iter().map(String::as_str).collect();
                write!(f, "methods: {}", list.join(","))
            }
        }
    }
}

/// The result of probing one target. Created once by its probe, never mutated.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub target: Target,
    pub status: ProbeStatus,
}

impl ProbeOutcome {
    pub fn password_auth_allowed(&self) -> bool {
        self.status.password_auth_allowed()
    }
}

/// Aggregate results and progress counters for one scan run.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ScanResults {
    pub scanned_total: u64,
    pub scanned_done: u64,
    pub outcomes: Vec<ProbeOutcome>,
}

impl ScanResults {
    /// Outcomes whose server advertised password authentication.
    pub fn findings(&self) -> impl Iterator<Item = &ProbeOutcome> {
        self.outcomes.iter().filter(|o| o.password_auth_allowed())
    }
}
