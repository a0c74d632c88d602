//! Switch port identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::mac::MacAddress;

/// Identifier for a switch port, carried as the MAC-shaped string the switch supplies for the
/// port. Opaque to the core: the authenticator never interprets it beyond equality and use as a
/// map key, and as the destination address on outbound EAPOL frames for that port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortId(MacAddress);

impl PortId {
    /// Wraps a MAC address as a port identifier.
    #[must_use]
    pub const fn new(mac: MacAddress) -> Self {
        Self(mac)
    }

    /// The port's MAC address, used as the source address on outbound EAPOL frames.
    #[must_use]
    pub const fn mac(&self) -> MacAddress {
        self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PortId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<MacAddress>().map(Self)
    }
}

impl From<MacAddress> for PortId {
    fn from(mac: MacAddress) -> Self {
        Self(mac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_as_mac_string() {
        let port: PortId = "00:00:00:00:00:10".parse().unwrap();
        assert_eq!(port.to_string(), "00:00:00:00:00:10");
    }
}
