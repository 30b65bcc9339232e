/// This module implements `Address` which is used for parsing VISA resource
/// strings of the form "TCPIP0::192.168.1.20::hislip0::INSTR"
use anyhow::anyhow;
use std::fmt;
use std::fmt::{Display, Formatter};

use crate::Error;

/// Represents a parsed address string.
/// Raw SCPI sockets are served by the built-in TCP transport, everything
/// else is handed verbatim to the VISA library.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum Address {
    Socket { host: String, port: u16 },
    Visa { resource: String },
}

fn invalid(addr: &str) -> Error {
    Error::argument(anyhow!("Invalid address: `{}`", addr))
}

impl Address {
    /// Create a new `Address` by parsing the given address string.
    /// Addresses not describing a raw socket are treated as VISA resources.
    pub fn parse(addr: &str) -> crate::Result<Self> {
        let addr = addr.trim();
        let splits: Vec<_> = addr.split("::").collect();
        if splits.len() < 2 || splits.iter().any(|x| x.is_empty()) {
            return Err(invalid(addr));
        }

        let kind = splits[0].to_uppercase();
        if kind == "TCP" {
            // tcp::192.168.0.1:5025
            if splits.len() != 2 {
                return Err(invalid(addr));
            }
            let (host, port) = splits[1].rsplit_once(':').ok_or_else(|| invalid(addr))?;
            let port: u16 = port.parse().map_err(|_| invalid(addr))?;
            if host.is_empty() {
                return Err(invalid(addr));
            }
            Ok(Address::Socket {
                host: host.to_string(),
                port,
            })
        } else if kind.starts_with("TCPIP") && splits[splits.len() - 1].to_uppercase() == "SOCKET" {
            // TCPIP0::192.168.0.1::5025::SOCKET
            if splits.len() != 4 {
                return Err(invalid(addr));
            }
            let port: u16 = splits[2].parse().map_err(|_| invalid(addr))?;
            Ok(Address::Socket {
                host: splits[1].to_string(),
                port,
            })
        } else {
            Ok(Address::Visa {
                resource: addr.to_string(),
            })
        }
    }

    pub fn is_visa(&self) -> bool {
        matches!(self, Address::Visa { .. })
    }
}

impl From<Address> for String {
    fn from(addr: Address) -> Self {
        match addr {
            Address::Socket { host, port } => format!("tcp::{}:{}", host, port),
            Address::Visa { resource } => resource,
        }
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let x: String = self.clone().into();
        f.write_str(&x)
    }
}
