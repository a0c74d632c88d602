//! EAP (RFC 3748) packet encoding and decoding.

use dot8021x_types::{EapCode, EapFrame, EapType, Error, Result};

/// Minimum length of an EAP packet: code(1) + identifier(1) + length(2).
const EAP_HEADER_LEN: usize = 4;

/// Encodes an [`EapFrame`] to its wire bytes.
#[must_use]
pub fn pack(frame: &EapFrame) -> Vec<u8> {
    let has_type = frame.code.has_type();
    let body_len = usize::from(has_type) + frame.payload.len();
    let total_len = EAP_HEADER_LEN + body_len;

    let mut out = Vec::with_capacity(total_len);
    out.push(frame.code as u8);
    out.push(frame.identifier);
    out.extend_from_slice(&(total_len as u16).to_be_bytes());
    if has_type {
        let eap_type = frame.eap_type.unwrap_or(EapType::Other(0));
        out.push(eap_type.to_u8());
        out.extend_from_slice(&frame.payload);
    }
    out
}

/// Parses an EAP packet from wire bytes.
///
/// # Errors
/// Returns [`Error::MessageParseError`] if the packet is shorter than the EAP header, the
/// encoded length field does not match the bytes given, or the code octet is unrecognized.
pub fn parse(bytes: &[u8]) -> Result<EapFrame> {
    if bytes.len() < EAP_HEADER_LEN {
        return Err(Error::parse(format!(
            "EAP packet shorter than header: {} bytes",
            bytes.len()
        )));
    }
    let code = EapCode::from_u8(bytes[0])
        .ok_or_else(|| Error::parse(format!("unknown EAP code: {}", bytes[0])))?;
    let identifier = bytes[1];
    let length = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
    if length > bytes.len() {
        return Err(Error::parse(format!(
            "EAP length field {length} exceeds available {} bytes",
            bytes.len()
        )));
    }

    let (eap_type, payload) = if code.has_type() {
        if length < EAP_HEADER_LEN + 1 {
            return Err(Error::parse("EAP Request/Response missing type octet"));
        }
        let eap_type = EapType::from_u8(bytes[4]);
        (Some(eap_type), bytes[5..length].to_vec())
    } else {
        (None, Vec::new())
    };

    Ok(EapFrame {
        code,
        identifier,
        eap_type,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_request_round_trips() {
        let frame = EapFrame::identity_request(42, "");
        let bytes = pack(&frame);
        assert_eq!(parse(&bytes).unwrap(), frame);
    }

    #[test]
    fn identity_response_round_trips_with_payload() {
        let frame = EapFrame {
            code: EapCode::Response,
            identifier: 255,
            eap_type: Some(EapType::Identity),
            payload: b"alice".to_vec(),
        };
        let bytes = pack(&frame);
        assert_eq!(parse(&bytes).unwrap(), frame);
    }

    #[test]
    fn success_and_failure_have_no_type_octet() {
        for frame in [EapFrame::success(9), EapFrame::failure(9)] {
            let bytes = pack(&frame);
            assert_eq!(bytes.len(), EAP_HEADER_LEN);
            assert_eq!(parse(&bytes).unwrap(), frame);
        }
    }

    #[test]
    fn identifiers_span_full_range() {
        for id in 0..=255u8 {
            let frame = EapFrame::identity_request(id, "x");
            assert_eq!(parse(&pack(&frame)).unwrap().identifier, id);
        }
    }

    #[test]
    fn large_payload_round_trips() {
        let payload = vec![0xAB; 1400];
        let frame = EapFrame {
            code: EapCode::Response,
            identifier: 1,
            eap_type: Some(EapType::Other(4)),
            payload,
        };
        let bytes = pack(&frame);
        assert_eq!(parse(&bytes).unwrap(), frame);
    }

    #[test]
    fn rejects_short_packet() {
        assert!(parse(&[1, 2]).is_err());
    }

    #[test]
    fn rejects_unknown_code() {
        assert!(parse(&[0xFF, 0, 0, 4]).is_err());
    }
}
