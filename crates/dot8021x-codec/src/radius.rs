//! RADIUS (RFC 2865 + RFC 2869) packet encoding, decoding, and authenticator crypto.

use dot8021x_types::{
    Error, RadiusAttribute, RadiusAttributeType, RadiusCode, RadiusPacket, Result,
};
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};

type HmacMd5 = Hmac<Md5>;

const RADIUS_HEADER_LEN: usize = 20;

/// Maximum bytes a single EAP-Message attribute value may carry (RFC 3579 §3.1).
pub const MAX_EAP_MESSAGE_CHUNK: usize = 253;

fn encode_attribute(attr: &RadiusAttribute) -> Vec<u8> {
    let mut value = Vec::new();
    match attr {
        RadiusAttribute::UserName(s) | RadiusAttribute::CalledStationId(s) | RadiusAttribute::CallingStationId(s) => {
            value.extend_from_slice(s.as_bytes());
        }
        RadiusAttribute::NasIpAddress(ip) => value.extend_from_slice(&ip.octets()),
        RadiusAttribute::NasPort(p) | RadiusAttribute::SessionTimeout(p) => {
            value.extend_from_slice(&p.to_be_bytes());
        }
        RadiusAttribute::State(bytes) | RadiusAttribute::EapMessage(bytes) => {
            value.extend_from_slice(bytes);
        }
        RadiusAttribute::MessageAuthenticator(bytes) => value.extend_from_slice(bytes),
        RadiusAttribute::Unknown { value: v, .. } => value.extend_from_slice(v),
    }
    let mut out = Vec::with_capacity(2 + value.len());
    out.push(attr.attr_type());
    out.push((value.len() + 2) as u8);
    out.extend_from_slice(&value);
    out
}

fn decode_attribute(attr_type: u8, value: &[u8]) -> Result<RadiusAttribute> {
    Ok(match attr_type {
        t if t == RadiusAttributeType::UserName.to_u8() => {
            RadiusAttribute::UserName(String::from_utf8_lossy(value).into_owned())
        }
        t if t == RadiusAttributeType::CalledStationId.to_u8() => {
            RadiusAttribute::CalledStationId(String::from_utf8_lossy(value).into_owned())
        }
        t if t == RadiusAttributeType::CallingStationId.to_u8() => {
            RadiusAttribute::CallingStationId(String::from_utf8_lossy(value).into_owned())
        }
        t if t == RadiusAttributeType::NasIpAddress.to_u8() => {
            if value.len() != 4 {
                return Err(Error::parse("NAS-IP-Address must be 4 bytes"));
            }
            RadiusAttribute::NasIpAddress(std::net::Ipv4Addr::new(
                value[0], value[1], value[2], value[3],
            ))
        }
        t if t == RadiusAttributeType::NasPort.to_u8() => {
            RadiusAttribute::NasPort(u32_from_be(value)?)
        }
        t if t == RadiusAttributeType::SessionTimeout.to_u8() => {
            RadiusAttribute::SessionTimeout(u32_from_be(value)?)
        }
        t if t == RadiusAttributeType::State.to_u8() => RadiusAttribute::State(value.to_vec()),
        t if t == RadiusAttributeType::EapMessage.to_u8() => {
            RadiusAttribute::EapMessage(value.to_vec())
        }
        t if t == RadiusAttributeType::MessageAuthenticator.to_u8() => {
            if value.len() != 16 {
                return Err(Error::parse("Message-Authenticator must be 16 bytes"));
            }
            let mut buf = [0u8; 16];
            buf.copy_from_slice(value);
            RadiusAttribute::MessageAuthenticator(buf)
        }
        other => RadiusAttribute::Unknown {
            attr_type: other,
            value: value.to_vec(),
        },
    })
}

fn u32_from_be(value: &[u8]) -> Result<u32> {
    let arr: [u8; 4] = value
        .try_into()
        .map_err(|_| Error::parse("expected a 4-byte integer attribute"))?;
    Ok(u32::from_be_bytes(arr))
}

/// Splits an EAP frame's bytes into one or more EAP-Message attributes, each at most
/// [`MAX_EAP_MESSAGE_CHUNK`] bytes, preserving order.
#[must_use]
pub fn fragment_eap_message(eap_bytes: &[u8]) -> Vec<RadiusAttribute> {
    if eap_bytes.is_empty() {
        return Vec::new();
    }
    eap_bytes
        .chunks(MAX_EAP_MESSAGE_CHUNK)
        .map(|chunk| RadiusAttribute::EapMessage(chunk.to_vec()))
        .collect()
}

fn encode_header_and_attrs(
    code: RadiusCode,
    identifier: u8,
    authenticator: &[u8; 16],
    attrs: &[RadiusAttribute],
) -> Vec<u8> {
    let encoded_attrs: Vec<u8> = attrs.iter().flat_map(encode_attribute).collect();
    let total_len = RADIUS_HEADER_LEN + encoded_attrs.len();
    let mut out = Vec::with_capacity(total_len);
    out.push(code.to_u8());
    out.push(identifier);
    out.extend_from_slice(&(total_len as u16).to_be_bytes());
    out.extend_from_slice(authenticator);
    out.extend_from_slice(&encoded_attrs);
    out
}

fn hmac_md5(secret: &[u8], data: &[u8]) -> [u8; 16] {
    let mut mac = HmacMd5::new_from_slice(secret).expect("HMAC accepts a key of any length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Encodes a RADIUS request (typically Access-Request), appending a correctly-signed
/// Message-Authenticator attribute. `authenticator` is the caller-supplied 16 random request
/// authenticator bytes.
#[must_use]
pub fn pack_request(
    code: RadiusCode,
    identifier: u8,
    authenticator: &[u8; 16],
    attrs: &[RadiusAttribute],
    secret: &[u8],
) -> Vec<u8> {
    let mut attrs_with_zeroed_ma = attrs.to_vec();
    attrs_with_zeroed_ma.push(RadiusAttribute::MessageAuthenticator([0u8; 16]));
    let mut bytes = encode_header_and_attrs(code, identifier, authenticator, &attrs_with_zeroed_ma);

    let mac = hmac_md5(secret, &bytes);
    let ma_offset = bytes.len() - 16;
    bytes[ma_offset..].copy_from_slice(&mac);
    bytes
}

/// Parses a raw RADIUS packet without validating any authenticator. Used internally and by
/// callers that need to inspect a packet before deciding how to validate it (e.g. MAB replies
/// reuse the same validation as EAP replies).
///
/// # Errors
/// Returns [`Error::MessageParseError`] if the header or any attribute TLV is malformed.
pub fn parse(bytes: &[u8]) -> Result<RadiusPacket> {
    if bytes.len() < RADIUS_HEADER_LEN {
        return Err(Error::parse(format!(
            "RADIUS packet shorter than header: {} bytes",
            bytes.len()
        )));
    }
    let code = RadiusCode::from_u8(bytes[0])
        .ok_or_else(|| Error::parse(format!("unknown RADIUS code: {}", bytes[0])))?;
    let identifier = bytes[1];
    let length = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
    if length > bytes.len() || length < RADIUS_HEADER_LEN {
        return Err(Error::parse(format!(
            "RADIUS length field {length} inconsistent with {} available bytes",
            bytes.len()
        )));
    }
    let mut authenticator = [0u8; 16];
    authenticator.copy_from_slice(&bytes[4..20]);

    let mut attributes = Vec::new();
    let mut cursor = RADIUS_HEADER_LEN;
    while cursor < length {
        if cursor + 2 > length {
            return Err(Error::parse("truncated RADIUS attribute header"));
        }
        let attr_type = bytes[cursor];
        let attr_len = bytes[cursor + 1] as usize;
        if attr_len < 2 || cursor + attr_len > length {
            return Err(Error::parse("invalid RADIUS attribute length"));
        }
        let value = &bytes[cursor + 2..cursor + attr_len];
        attributes.push(decode_attribute(attr_type, value)?);
        cursor += attr_len;
    }

    Ok(RadiusPacket {
        code,
        identifier,
        authenticator,
        attributes,
    })
}

/// Parses and fully validates a RADIUS reply (Access-Accept/Reject/Challenge).
///
/// Validates, in order: the response authenticator (`MD5(code|id|length|request_authenticator
/// |attributes|secret)`), then the Message-Authenticator attribute (HMAC-MD5 over the packet
/// with the Message-Authenticator field zeroed and the *request* authenticator substituted in,
/// per RFC 3579 §3.2). Either mismatch is a [`Error::RadiusAuthError`] and the packet MUST be
/// discarded by the caller without acting on its contents.
///
/// # Errors
/// Returns [`Error::MessageParseError`] for malformed bytes, [`Error::RadiusAuthError`] if
/// either authenticator fails to validate.
pub fn parse_and_verify_reply(
    bytes: &[u8],
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> Result<RadiusPacket> {
    let packet = parse(bytes)?;

    let mut response_check = bytes.to_vec();
    response_check[4..20].copy_from_slice(request_authenticator);
    let expected_response = md5_digest(&[&response_check, secret].concat());
    if expected_response != packet.authenticator {
        return Err(Error::radius_auth("response authenticator mismatch"));
    }

    let received_ma = packet
        .attributes
        .iter()
        .find_map(|a| match a {
            RadiusAttribute::MessageAuthenticator(ma) => Some(*ma),
            _ => None,
        })
        .ok_or_else(|| Error::radius_auth("missing Message-Authenticator"))?;

    let mut zeroed = bytes.to_vec();
    zeroed[4..20].copy_from_slice(request_authenticator);
    zero_message_authenticator_in_place(&mut zeroed)?;
    let expected_ma = hmac_md5(secret, &zeroed);
    if expected_ma != received_ma {
        return Err(Error::radius_auth("Message-Authenticator mismatch"));
    }

    Ok(packet)
}

fn zero_message_authenticator_in_place(bytes: &mut [u8]) -> Result<()> {
    let length = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
    let mut cursor = RADIUS_HEADER_LEN;
    while cursor < length {
        let attr_type = bytes[cursor];
        let attr_len = bytes[cursor + 1] as usize;
        if attr_type == RadiusAttributeType::MessageAuthenticator.to_u8() {
            for b in &mut bytes[cursor + 2..cursor + attr_len] {
                *b = 0;
            }
            return Ok(());
        }
        cursor += attr_len;
    }
    Err(Error::radius_auth("missing Message-Authenticator"))
}

fn md5_digest(data: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Encodes a RADIUS reply (Access-Accept/Reject/Challenge) so that it passes
/// [`parse_and_verify_reply`] against `request_authenticator` and `secret`. Exists for test
/// harnesses standing in for a RADIUS server; a real server's wire encoder does the same
/// computation.
#[must_use]
pub fn pack_reply(
    code: RadiusCode,
    identifier: u8,
    request_authenticator: &[u8; 16],
    attrs: &[RadiusAttribute],
    secret: &[u8],
) -> Vec<u8> {
    let mut attrs = attrs.to_vec();
    attrs.push(RadiusAttribute::MessageAuthenticator([0u8; 16]));
    let mut bytes = encode_header_and_attrs(code, identifier, &[0u8; 16], &attrs);

    let mut for_ma = bytes.clone();
    for_ma[4..20].copy_from_slice(request_authenticator);
    let ma = hmac_md5(secret, &for_ma);
    let ma_offset = bytes.len() - 16;
    bytes[ma_offset..].copy_from_slice(&ma);

    let mut for_resp = bytes.clone();
    for_resp[4..20].copy_from_slice(request_authenticator);
    let resp = md5_digest(&[for_resp.as_slice(), secret].concat());
    bytes[4..20].copy_from_slice(&resp);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use dot8021x_types::RadiusAttribute as A;

    fn secret() -> Vec<u8> {
        vec![b's'; 32]
    }

    fn build_reply(
        code: RadiusCode,
        identifier: u8,
        request_authenticator: &[u8; 16],
        attrs: Vec<A>,
        secret: &[u8],
    ) -> Vec<u8> {
        pack_reply(code, identifier, request_authenticator, &attrs, secret)
    }

    #[test]
    fn request_carries_valid_message_authenticator() {
        let authenticator = [7u8; 16];
        let secret = secret();
        let bytes = pack_request(
            RadiusCode::AccessRequest,
            1,
            &authenticator,
            &[A::UserName("alice".into())],
            &secret,
        );
        let parsed = parse(&bytes).unwrap();
        assert!(matches!(parsed.code, RadiusCode::AccessRequest));
        assert!(parsed
            .attributes
            .iter()
            .any(|a| matches!(a, A::MessageAuthenticator(_))));
    }

    #[test]
    fn verify_accepts_correctly_signed_reply() {
        let request_authenticator = [3u8; 16];
        let secret = secret();
        let bytes = build_reply(
            RadiusCode::AccessAccept,
            5,
            &request_authenticator,
            vec![A::SessionTimeout(60)],
            &secret,
        );
        let parsed = parse_and_verify_reply(&bytes, &request_authenticator, &secret).unwrap();
        assert!(matches!(parsed.code, RadiusCode::AccessAccept));
    }

    #[test]
    fn flipped_response_authenticator_bit_fails_verification() {
        let request_authenticator = [3u8; 16];
        let secret = secret();
        let mut bytes = build_reply(
            RadiusCode::AccessAccept,
            5,
            &request_authenticator,
            vec![],
            &secret,
        );
        bytes[4] ^= 0x01;
        assert!(parse_and_verify_reply(&bytes, &request_authenticator, &secret).is_err());
    }

    #[test]
    fn flipped_message_authenticator_bit_fails_verification() {
        let request_authenticator = [3u8; 16];
        let secret = secret();
        let mut bytes = build_reply(
            RadiusCode::AccessAccept,
            5,
            &request_authenticator,
            vec![],
            &secret,
        );
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(parse_and_verify_reply(&bytes, &request_authenticator, &secret).is_err());
    }

    #[test]
    fn eap_message_boundary_sizes_round_trip_through_encode_decode() {
        for size in [1usize, 253, 254, 506, 507] {
            let payload = vec![0x42u8; size];
            let fragments = fragment_eap_message(&payload);
            let packet = RadiusPacket {
                code: RadiusCode::AccessChallenge,
                identifier: 9,
                authenticator: [0; 16],
                attributes: fragments,
            };
            let bytes = encode_header_and_attrs(
                packet.code,
                packet.identifier,
                &packet.authenticator,
                &packet.attributes,
            );
            let parsed = parse(&bytes).unwrap();
            assert_eq!(parsed.reassembled_eap_message(), Some(payload));
        }
    }
}
