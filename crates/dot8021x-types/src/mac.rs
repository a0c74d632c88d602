//! MAC address representation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// PAE group address reserved for EAPOL (`01:80:C2:00:00:03`).
pub const PAE_GROUP_ADDRESS: MacAddress = MacAddress([0x01, 0x80, 0xc2, 0x00, 0x00, 0x03]);

/// A 6-byte hardware address.
///
/// Equality and the string form (`xx:xx:xx:xx:xx:xx`, lower-case) are the only operations the
/// core cares about; the authenticator never interprets a MAC address beyond opaque comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Builds a MAC address from raw octets.
    #[must_use]
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// The broadcast address `ff:ff:ff:ff:ff:ff`.
    #[must_use]
    pub const fn broadcast() -> Self {
        Self([0xff; 6])
    }

    /// The PAE group address `01:80:c2:00:00:03`.
    #[must_use]
    pub const fn pae_group() -> Self {
        PAE_GROUP_ADDRESS
    }

    /// Returns the underlying octets.
    #[must_use]
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// True if the low bit of the first octet is set (multicast/group address).
    #[must_use]
    pub const fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// Lower-case `xx:xx:xx:xx:xx:xx` form.
    #[must_use]
    pub fn to_colon_string(&self) -> String {
        self.to_string()
    }

    /// Lower-case `xx-xx-xx-xx-xx-xx` form, used in RADIUS Calling/Called-Station-Id values.
    #[must_use]
    pub fn to_dash_string(&self) -> String {
        let [a, b, c, d, e, f] = self.0;
        format!("{a:02x}-{b:02x}-{c:02x}-{d:02x}-{e:02x}-{f:02x}")
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split([':', '-']).collect();
        if parts.len() != 6 {
            return Err(Error::parse(format!("invalid MAC address: {s}")));
        }
        let mut octets = [0u8; 6];
        for (octet, part) in octets.iter_mut().zip(parts.iter()) {
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| Error::parse(format!("invalid hex octet in MAC address: {part}")))?;
        }
        Ok(Self(octets))
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(octets: [u8; 6]) -> Self {
        Self(octets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_lowercase_colon_form() {
        let mac = MacAddress::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x01]);
        assert_eq!(mac.to_string(), "aa:bb:cc:dd:ee:01");
    }

    #[test]
    fn dash_form_matches_calling_station_id_convention() {
        let mac = MacAddress::new([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x01]);
        assert_eq!(mac.to_dash_string(), "aa-bb-cc-dd-ee-01");
    }

    #[test]
    fn round_trips_through_from_str() {
        let mac: MacAddress = "aa:bb:cc:dd:ee:01".parse().unwrap();
        assert_eq!(mac.to_string(), "aa:bb:cc:dd:ee:01");
        let mac2: MacAddress = "AA-BB-CC-DD-EE-01".parse().unwrap();
        assert_eq!(mac, mac2);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!("not-a-mac".parse::<MacAddress>().is_err());
        assert!("aa:bb:cc:dd:ee".parse::<MacAddress>().is_err());
    }

    #[test]
    fn pae_group_address_is_multicast() {
        assert!(MacAddress::pae_group().is_multicast());
        assert_eq!(MacAddress::pae_group().to_string(), "01:80:c2:00:00:03");
    }
}
