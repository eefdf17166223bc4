use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Result, TransportError};

/// Default TCP port used by home gateways.
pub const DEFAULT_GATEWAY_PORT: u16 = 8080;

/// Address family of a gateway endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    /// Filesystem-path Unix domain socket.
    Unix,
    /// IPv4/IPv6 TCP host and port.
    Tcp,
}

impl FromStr for AddressFamily {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unix" | "uds" | "local" => Ok(AddressFamily::Unix),
            "tcp" | "inet" | "ip" => Ok(AddressFamily::Tcp),
            other => Err(format!("unknown address family '{other}'")),
        }
    }
}

/// Where the gateway can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Unix domain socket at a filesystem path.
    Unix(PathBuf),
    /// TCP host (name or literal address) and port.
    Tcp { host: String, port: u16 },
}

impl Endpoint {
    /// Build an endpoint from an address-family selector, an address string
    /// and an optional port.
    ///
    /// The port is ignored for Unix endpoints and required for TCP ones.
    pub fn new(family: AddressFamily, addr: &str, port: Option<u16>) -> Result<Self> {
        match family {
            AddressFamily::Unix => Ok(Endpoint::Unix(PathBuf::from(addr))),
            AddressFamily::Tcp => {
                let port = port.ok_or_else(|| TransportError::MissingPort {
                    host: addr.to_string(),
                })?;
                Ok(Endpoint::Tcp {
                    host: addr.to_string(),
                    port,
                })
            }
        }
    }

    /// The address family of this endpoint.
    pub fn family(&self) -> AddressFamily {
        match self {
            Endpoint::Unix(_) => AddressFamily::Unix,
            Endpoint::Tcp { .. } => AddressFamily::Tcp,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
            Endpoint::Tcp { host, port } if host.contains(':') => write!(f, "tcp:[{host}]:{port}"),
            Endpoint::Tcp { host, port } => write!(f, "tcp:{host}:{port}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tcp_requires_port() {
        let err = Endpoint::new(AddressFamily::Tcp, "127.0.0.1", None).unwrap_err();
        assert!(matches!(err, TransportError::MissingPort { .. }));
    }

    #[test]
    fn unix_ignores_port() {
        let endpoint = Endpoint::new(AddressFamily::Unix, "/tmp/gw.sock", Some(1)).unwrap();
        assert_eq!(endpoint, Endpoint::Unix(PathBuf::from("/tmp/gw.sock")));
        assert_eq!(endpoint.family(), AddressFamily::Unix);
    }

    #[test]
    fn display_forms() {
        let tcp = Endpoint::new(AddressFamily::Tcp, "gw.local", Some(8080)).unwrap();
        assert_eq!(tcp.to_string(), "tcp:gw.local:8080");

        let v6 = Endpoint::new(AddressFamily::Tcp, "::1", Some(9)).unwrap();
        assert_eq!(v6.to_string(), "tcp:[::1]:9");

        let unix = Endpoint::Unix(PathBuf::from("/run/gw.sock"));
        assert_eq!(unix.to_string(), "unix:/run/gw.sock");
    }

    #[test]
    fn parses_family_names() {
        assert_eq!("UDS".parse::<AddressFamily>(), Ok(AddressFamily::Unix));
        assert_eq!("tcp".parse::<AddressFamily>(), Ok(AddressFamily::Tcp));
        assert!("bluetooth".parse::<AddressFamily>().is_err());
    }
}
