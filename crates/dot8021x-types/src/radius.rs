//! RADIUS (RFC 2865 + RFC 2869) packet and attribute structures.

use serde::{Deserialize, Serialize};

/// RADIUS packet code (the subset this authenticator ever sends or receives).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum RadiusCode {
    /// Access-Request, sent to the server.
    AccessRequest = 1,
    /// Access-Accept, terminal success.
    AccessAccept = 2,
    /// Access-Reject, terminal failure.
    AccessReject = 3,
    /// Access-Challenge, carries an EAP-Message to relay to the supplicant.
    AccessChallenge = 11,
}

impl RadiusCode {
    /// Parses a raw RADIUS code octet.
    #[must_use]
    pub const fn from_u8(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::AccessRequest),
            2 => Some(Self::AccessAccept),
            3 => Some(Self::AccessReject),
            11 => Some(Self::AccessChallenge),
            _ => None,
        }
    }

    /// The raw wire octet.
    #[must_use]
    pub const fn to_u8(self) -> u8 {
        self as u8
    }
}

/// RADIUS attribute type octets this authenticator produces or consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum RadiusAttributeType {
    /// User-Name (1).
    UserName = 1,
    /// NAS-IP-Address (4).
    NasIpAddress = 4,
    /// NAS-Port (5).
    NasPort = 5,
    /// State (24), an opaque echo token.
    State = 24,
    /// Session-Timeout (27), seconds until reauthentication.
    SessionTimeout = 27,
    /// Called-Station-Id (30).
    CalledStationId = 30,
    /// Calling-Station-Id (31).
    CallingStationId = 31,
    /// EAP-Message (79), repeatable, each instance <= 253 bytes.
    EapMessage = 79,
    /// Message-Authenticator (80), HMAC-MD5 over the whole packet.
    MessageAuthenticator = 80,
}

impl RadiusAttributeType {
    /// The raw wire octet.
    #[must_use]
    pub const fn to_u8(self) -> u8 {
        self as u8
    }
}

/// A single decoded RADIUS attribute.
///
/// Attribute types outside the set this authenticator understands are preserved as `Unknown` so
/// that an authorization callback can still see RADIUS-server-supplied attributes as opaque
/// key/value pairs (per the non-goal of not interpreting dynamic VLAN attributes itself).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadiusAttribute {
    /// User-Name.
    UserName(String),
    /// NAS-IP-Address.
    NasIpAddress(std::net::Ipv4Addr),
    /// NAS-Port.
    NasPort(u32),
    /// State, opaque bytes echoed back verbatim on the next request.
    State(Vec<u8>),
    /// Session-Timeout, seconds.
    SessionTimeout(u32),
    /// Called-Station-Id.
    CalledStationId(String),
    /// Calling-Station-Id.
    CallingStationId(String),
    /// One fragment of a (possibly multi-attribute) EAP-Message.
    EapMessage(Vec<u8>),
    /// Message-Authenticator, 16 bytes.
    MessageAuthenticator([u8; 16]),
    /// Any attribute type not listed above, preserved opaquely.
    Unknown {
        /// Raw attribute type octet.
        attr_type: u8,
        /// Raw attribute value bytes.
        value: Vec<u8>,
    },
}

impl RadiusAttribute {
    /// The wire type octet for this attribute.
    #[must_use]
    pub fn attr_type(&self) -> u8 {
        match self {
            Self::UserName(_) => RadiusAttributeType::UserName.to_u8(),
            Self::NasIpAddress(_) => RadiusAttributeType::NasIpAddress.to_u8(),
            Self::NasPort(_) => RadiusAttributeType::NasPort.to_u8(),
            Self::State(_) => RadiusAttributeType::State.to_u8(),
            Self::SessionTimeout(_) => RadiusAttributeType::SessionTimeout.to_u8(),
            Self::CalledStationId(_) => RadiusAttributeType::CalledStationId.to_u8(),
            Self::CallingStationId(_) => RadiusAttributeType::CallingStationId.to_u8(),
            Self::EapMessage(_) => RadiusAttributeType::EapMessage.to_u8(),
            Self::MessageAuthenticator(_) => RadiusAttributeType::MessageAuthenticator.to_u8(),
            Self::Unknown { attr_type, .. } => *attr_type,
        }
    }
}

/// A RADIUS packet: {code, identifier, authenticator, attributes}.
///
/// `length` is intentionally not stored here: it is a function of the attribute list and is
/// always recomputed when the packet is encoded, never trusted from a prior decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadiusPacket {
    /// Packet code.
    pub code: RadiusCode,
    /// 1-byte identifier correlating requests to responses.
    pub identifier: u8,
    /// Request authenticator (on a request) or response authenticator (on a reply).
    pub authenticator: [u8; 16],
    /// Attribute list, in wire order.
    pub attributes: Vec<RadiusAttribute>,
}

impl RadiusPacket {
    /// Returns the first attribute of the given wire type, if present.
    #[must_use]
    pub fn find(&self, attr_type: u8) -> Option<&RadiusAttribute> {
        self.attributes.iter().find(|a| a.attr_type() == attr_type)
    }

    /// Concatenates every EAP-Message fragment, in order, into one EAP frame's bytes.
    #[must_use]
    pub fn reassembled_eap_message(&self) -> Option<Vec<u8>> {
        let mut out = Vec::new();
        let mut seen = false;
        for attr in &self.attributes {
            if let RadiusAttribute::EapMessage(chunk) = attr {
                seen = true;
                out.extend_from_slice(chunk);
            }
        }
        seen.then_some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_locates_attribute_by_wire_type() {
        let pkt = RadiusPacket {
            code: RadiusCode::AccessRequest,
            identifier: 1,
            authenticator: [0; 16],
            attributes: vec![RadiusAttribute::UserName("alice".into())],
        };
        assert!(pkt.find(RadiusAttributeType::UserName.to_u8()).is_some());
        assert!(pkt.find(RadiusAttributeType::State.to_u8()).is_none());
    }

    #[test]
    fn reassembles_fragmented_eap_message_in_order() {
        let pkt = RadiusPacket {
            code: RadiusCode::AccessChallenge,
            identifier: 1,
            authenticator: [0; 16],
            attributes: vec![
                RadiusAttribute::EapMessage(vec![1, 2, 3]),
                RadiusAttribute::EapMessage(vec![4, 5]),
            ],
        };
        assert_eq!(pkt.reassembled_eap_message(), Some(vec![1, 2, 3, 4, 5]));
    }

    #[test]
    fn reassembly_is_none_when_no_eap_message_present() {
        let pkt = RadiusPacket {
            code: RadiusCode::AccessAccept,
            identifier: 1,
            authenticator: [0; 16],
            attributes: vec![],
        };
        assert_eq!(pkt.reassembled_eap_message(), None);
    }
}
