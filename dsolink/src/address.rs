/// This module implements `Address` which is used for parsing resource strings such as
/// "TCPIP0::192.168.1.10::inst0::INSTR", "VICP::192.168.1.10" or "VXI11:192.168.1.10".
use std::fmt;
use std::fmt::{Display, Formatter};

use anyhow::anyhow;

use crate::{Error, TransportKind};

pub const VICP_PORT: u16 = 1861;
pub const DEFAULT_VXI_DEVICE: &str = "inst0";

/// Represents a parsed resource string.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Address {
    Vicp { host: String, port: u16 },
    Vxi11 { host: String, device: String },
    Usbtmc { resource: String },
    Gpib { board: u8, primary: u8 },
    /// A resource reached through the vendor ActiveDSO control, `inner` is the
    /// connection string handed to the control.
    ActiveDso { inner: String },
}

fn invalid(addr: &str) -> Error {
    Error::argument(anyhow!("Invalid resource string: `{}`", addr))
}

fn parse_host(host: &str, addr: &str) -> crate::Result<String> {
    let host = host.trim();
    if host.is_empty() || host.contains(char::is_whitespace) {
        return Err(invalid(addr));
    }
    Ok(host.to_string())
}

impl Address {
    /// Parse a VISA style resource string, i.e. one using `::` as separator.
    fn parse_visa(addr: &str) -> crate::Result<Self> {
        let mut splits: Vec<&str> = addr.split("::").collect();
        let prefix = splits[0].to_lowercase();
        if prefix == "activedso" {
            let inner = splits[1..].join("::");
            if inner.is_empty() {
                return Err(invalid(addr));
            }
            return Ok(Address::ActiveDso { inner });
        }
        if splits.len() > 2 && splits[splits.len() - 1].eq_ignore_ascii_case("instr") {
            splits.pop();
        }
        if prefix.starts_with("tcpip") {
            // TCPIP0::192.168.0.1::inst0::INSTR
            if splits.len() > 3 {
                return Err(invalid(addr));
            }
            let host = parse_host(splits[1], addr)?;
            let device = splits.get(2).map(|x| x.to_lowercase());
            let device = device.unwrap_or_else(|| DEFAULT_VXI_DEVICE.to_string());
            if !device.starts_with("inst") {
                return Err(Error::argument(anyhow!(
                    "Unsupported TCPIP resource (only VXI-11 `instN` devices): `{}`",
                    addr
                )));
            }
            Ok(Address::Vxi11 { host, device })
        } else if prefix == "vicp" {
            // VICP::192.168.0.1 or VICP::192.168.0.1::1861
            if splits.len() > 3 {
                return Err(invalid(addr));
            }
            let host = parse_host(splits[1], addr)?;
            let port = match splits.get(2) {
                Some(port) => port.parse().map_err(|_| invalid(addr))?,
                None => VICP_PORT,
            };
            Ok(Address::Vicp { host, port })
        } else if prefix.starts_with("usb") {
            Ok(Address::Usbtmc {
                resource: addr.to_string(),
            })
        } else if prefix.starts_with("gpib") {
            // GPIB0::5::INSTR
            if splits.len() != 2 {
                return Err(invalid(addr));
            }
            let board = &prefix["gpib".len()..];
            let board = if board.is_empty() {
                0
            } else {
                board.parse().map_err(|_| invalid(addr))?
            };
            let primary = splits[1].parse().map_err(|_| invalid(addr))?;
            Ok(Address::Gpib { board, primary })
        } else {
            Err(invalid(addr))
        }
    }

    /// Parse an ActiveDSO style connection string, i.e. `<kind>:<address>`.
    fn parse_prefixed(prefix: &str, rest: &str, addr: &str) -> crate::Result<Self> {
        match prefix.to_lowercase().as_str() {
            "vxi11" => Ok(Address::Vxi11 {
                host: parse_host(rest, addr)?,
                device: DEFAULT_VXI_DEVICE.to_string(),
            }),
            "ip" | "vicp" => Ok(Address::Vicp {
                host: parse_host(rest, addr)?,
                port: VICP_PORT,
            }),
            "usbtmc" | "usb" => Ok(Address::Usbtmc {
                resource: parse_host(rest, addr)?,
            }),
            "gpib" => Ok(Address::Gpib {
                board: 0,
                primary: rest.trim().parse().map_err(|_| invalid(addr))?,
            }),
            _ => Err(invalid(addr)),
        }
    }

    /// Create a new `Address` by parsing the given resource string.
    /// A bare host name or IP address is treated as a VICP instrument.
    pub fn parse(addr: &str) -> crate::Result<Self> {
        let addr = addr.trim();
        if addr.is_empty() {
            return Err(invalid(addr));
        }
        if addr.contains("::") {
            Self::parse_visa(addr)
        } else if let Some((prefix, rest)) = addr.split_once(':') {
            Self::parse_prefixed(prefix, rest, addr)
        } else {
            Ok(Address::Vicp {
                host: parse_host(addr, addr)?,
                port: VICP_PORT,
            })
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Address::Vicp { .. } => TransportKind::Vicp,
            Address::Vxi11 { .. } => TransportKind::Vxi11,
            Address::Usbtmc { .. } => TransportKind::Usbtmc,
            Address::Gpib { .. } => TransportKind::Gpib,
            Address::ActiveDso { .. } => TransportKind::ActiveDso,
        }
    }
}

impl From<Address> for String {
    fn from(addr: Address) -> Self {
        match addr {
            Address::Vicp { host, port } => {
                if port == VICP_PORT {
                    format!("VICP::{}", host)
                } else {
                    format!("VICP::{}::{}", host, port)
                }
            }
            Address::Vxi11 { host, device } => format!("TCPIP0::{}::{}::INSTR", host, device),
            Address::Usbtmc { resource } => resource,
            Address::Gpib { board, primary } => format!("GPIB{}::{}::INSTR", board, primary),
            Address::ActiveDso { inner } => format!("ACTIVEDSO::{}", inner),
        }
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let x: String = self.clone().into();
        f.write_str(&x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_vxi() {
        let addr = Address::parse("TCPIP0::127.0.0.1::inst0::INSTR").unwrap();
        match &addr {
            Address::Vxi11 { host, device } => {
                assert_eq!(host, "127.0.0.1");
                assert_eq!(device, "inst0");
            }
            _ => panic!(),
        }
        assert_eq!(addr.kind(), TransportKind::Vxi11);
        assert_eq!(addr.to_string(), "TCPIP0::127.0.0.1::inst0::INSTR");

        let addr = Address::parse("VXI11:192.168.1.1").unwrap();
        assert_eq!(
            addr,
            Address::Vxi11 {
                host: "192.168.1.1".to_string(),
                device: "inst0".to_string()
            }
        );

        assert!(Address::parse("TCPIP0::127.0.0.1::5025::SOCKET").is_err());
    }

    #[test]
    fn parse_vicp() {
        let addr = Address::parse("VICP::192.168.1.1").unwrap();
        match addr {
            Address::Vicp { host, port } => {
                assert_eq!(host, "192.168.1.1");
                assert_eq!(port, VICP_PORT);
            }
            _ => panic!(),
        }
        let addr = Address::parse("VICP::scope.local::1862").unwrap();
        assert_eq!(addr.to_string(), "VICP::scope.local::1862");

        let addr = Address::parse("IP:10.0.0.2").unwrap();
        assert_eq!(addr.kind(), TransportKind::Vicp);

        let addr = Address::parse("127.0.0.1").unwrap();
        match addr {
            Address::Vicp { host, .. } => assert_eq!(host, "127.0.0.1"),
            _ => panic!(),
        }
    }

    #[test]
    fn parse_usb_and_gpib() {
        let addr = Address::parse("USB0::0x05FF::0x1023::LCRY0401N22234::INSTR").unwrap();
        match addr {
            Address::Usbtmc { resource } => {
                assert_eq!(resource, "USB0::0x05FF::0x1023::LCRY0401N22234::INSTR")
            }
            _ => panic!(),
        }

        let addr = Address::parse("GPIB1::5::INSTR").unwrap();
        assert_eq!(addr, Address::Gpib { board: 1, primary: 5 });
        assert_eq!(addr.to_string(), "GPIB1::5::INSTR");

        let addr = Address::parse("GPIB:12").unwrap();
        assert_eq!(addr, Address::Gpib { board: 0, primary: 12 });

        assert!(Address::parse("GPIB0::abc::INSTR").is_err());
    }

    #[test]
    fn parse_activedso() {
        let addr = Address::parse("ACTIVEDSO::VXI11:127.0.0.1").unwrap();
        match &addr {
            Address::ActiveDso { inner } => assert_eq!(inner, "VXI11:127.0.0.1"),
            _ => panic!(),
        }
        assert_eq!(addr.kind(), TransportKind::ActiveDso);
    }

    #[test]
    fn parse_invalid() {
        assert!(matches!(Address::parse(""), Err(Error::Argument(_))));
        assert!(matches!(Address::parse("FOO::bar"), Err(Error::Argument(_))));
        assert!(matches!(Address::parse("serial:/dev/ttyUSB0"), Err(Error::Argument(_))));
        assert!(matches!(Address::parse("VICP::"), Err(Error::Argument(_))));
    }
}
