//! EAPOL (EAP over LAN, ethertype 0x888E) framing.

use serde::{Deserialize, Serialize};

/// EAPOL packet type octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EapolType {
    /// Carries an EAP packet in `body`.
    EapPacket = 0,
    /// Supplicant-initiated; `body` is empty.
    Start = 1,
    /// Supplicant-initiated logoff; `body` is empty.
    Logoff = 2,
}

impl EapolType {
    /// Parses a raw EAPOL packet-type octet.
    #[must_use]
    pub const fn from_u8(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::EapPacket),
            1 => Some(Self::Start),
            2 => Some(Self::Logoff),
            _ => None,
        }
    }
}

/// An EAPOL frame body, after stripping the Ethernet header.
///
/// `version` is fixed at 1 on transmit; inbound frames with version 1..3 are accepted per the
/// 802.1X-2010 backward-compatibility rule (a higher version number never invalidates a frame
/// this implementation otherwise understands).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EapolFrame {
    /// Protocol version, 1..3 on receive, always 1 on send.
    pub version: u8,
    /// Packet type.
    pub packet_type: EapolType,
    /// For `EapPacket`, the encoded EAP frame bytes; empty for Start/Logoff.
    pub body: Vec<u8>,
}

impl EapolFrame {
    /// Fixed version emitted on transmit.
    pub const TX_VERSION: u8 = 1;

    /// Wraps an encoded EAP frame in an EAPOL header.
    #[must_use]
    pub fn eap_packet(body: Vec<u8>) -> Self {
        Self {
            version: Self::TX_VERSION,
            packet_type: EapolType::EapPacket,
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eap_packet_uses_fixed_tx_version() {
        let frame = EapolFrame::eap_packet(vec![1, 2, 3]);
        assert_eq!(frame.version, 1);
        assert_eq!(frame.packet_type, EapolType::EapPacket);
    }

    #[test]
    fn packet_type_roundtrips_through_u8() {
        assert_eq!(EapolType::from_u8(0), Some(EapolType::EapPacket));
        assert_eq!(EapolType::from_u8(1), Some(EapolType::Start));
        assert_eq!(EapolType::from_u8(2), Some(EapolType::Logoff));
        assert_eq!(EapolType::from_u8(99), None);
    }
}
