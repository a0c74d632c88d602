//! EAP (RFC 3748) frame structures.
//!
//! Only framing is modeled here; inner EAP method payloads (MD5-Challenge, TLS, PEAP, ...) are
//! carried opaquely as `payload` bytes and never interpreted by the authenticator.

use serde::{Deserialize, Serialize};

/// EAP code, the first octet of every EAP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EapCode {
    /// Request from authenticator to supplicant.
    Request = 1,
    /// Response from supplicant to authenticator.
    Response = 2,
    /// Terminal success.
    Success = 3,
    /// Terminal failure.
    Failure = 4,
}

impl EapCode {
    /// Parses a raw EAP code octet.
    #[must_use]
    pub const fn from_u8(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Request),
            2 => Some(Self::Response),
            3 => Some(Self::Success),
            4 => Some(Self::Failure),
            _ => None,
        }
    }

    /// True if this code carries a `type` octet and type-data (Request/Response only).
    #[must_use]
    pub const fn has_type(self) -> bool {
        matches!(self, Self::Request | Self::Response)
    }
}

/// EAP type octet, present only on Request/Response frames.
///
/// Only Identity is interpreted by the authenticator (to extract User-Name); all other types
/// are conveyed opaquely between the supplicant and the RADIUS server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EapType {
    /// Identity (RFC 3748 §5.1).
    Identity,
    /// Notification (RFC 3748 §5.2).
    Notification,
    /// Nak, sent by a supplicant rejecting a proposed method (RFC 3748 §5.3).
    Nak,
    /// MD5-Challenge or any other method type, conveyed opaquely by its raw octet.
    Other(u8),
}

impl EapType {
    /// The raw wire octet for this type.
    #[must_use]
    pub const fn to_u8(self) -> u8 {
        match self {
            Self::Identity => 1,
            Self::Notification => 2,
            Self::Nak => 3,
            Self::Other(b) => b,
        }
    }

    /// Parses a raw EAP type octet.
    #[must_use]
    pub const fn from_u8(b: u8) -> Self {
        match b {
            1 => Self::Identity,
            2 => Self::Notification,
            3 => Self::Nak,
            other => Self::Other(other),
        }
    }
}

/// A single EAP packet: {code, identifier, type (Request/Response only), payload}.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EapFrame {
    /// EAP code.
    pub code: EapCode,
    /// 1-byte EAP identifier, matched between a Request and its Response.
    pub identifier: u8,
    /// EAP type, present for Request/Response.
    pub eap_type: Option<EapType>,
    /// Type-data: for an Identity frame this is the ASCII identity string's bytes.
    pub payload: Vec<u8>,
}

impl EapFrame {
    /// Builds an Identity Request, empty identity string on the initial challenge.
    #[must_use]
    pub fn identity_request(identifier: u8, identity: &str) -> Self {
        Self {
            code: EapCode::Request,
            identifier,
            eap_type: Some(EapType::Identity),
            payload: identity.as_bytes().to_vec(),
        }
    }

    /// Builds a terminal EAP-Success.
    #[must_use]
    pub const fn success(identifier: u8) -> Self {
        Self {
            code: EapCode::Success,
            identifier,
            eap_type: None,
            payload: Vec::new(),
        }
    }

    /// Builds a terminal EAP-Failure.
    #[must_use]
    pub const fn failure(identifier: u8) -> Self {
        Self {
            code: EapCode::Failure,
            identifier,
            eap_type: None,
            payload: Vec::new(),
        }
    }

    /// If this is an Identity Response, the ASCII identity it carries.
    #[must_use]
    pub fn identity(&self) -> Option<String> {
        if self.code == EapCode::Response && self.eap_type == Some(EapType::Identity) {
            Some(String::from_utf8_lossy(&self.payload).into_owned())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_request_has_empty_payload_by_default() {
        let f = EapFrame::identity_request(7, "");
        assert_eq!(f.code, EapCode::Request);
        assert_eq!(f.eap_type, Some(EapType::Identity));
        assert!(f.payload.is_empty());
    }

    #[test]
    fn identity_extracts_username_from_response() {
        let f = EapFrame {
            code: EapCode::Response,
            identifier: 7,
            eap_type: Some(EapType::Identity),
            payload: b"alice".to_vec(),
        };
        assert_eq!(f.identity().as_deref(), Some("alice"));
    }

    #[test]
    fn identity_is_none_for_non_identity_frames() {
        let f = EapFrame::success(7);
        assert_eq!(f.identity(), None);
    }
}
