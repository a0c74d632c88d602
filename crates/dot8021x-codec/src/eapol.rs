//! EAPOL (ethertype 0x888E) framing over Ethernet II, and the EAPOL header itself.

use dot8021x_types::{EapolFrame, EapolType, Error, MacAddress, Result};

/// Ethertype reserved for EAPOL.
pub const EAPOL_ETHERTYPE: u16 = 0x888e;

const ETH_HEADER_LEN: usize = 14;
const EAPOL_HEADER_LEN: usize = 4;

/// Encodes `body` (an already-packed EAPOL payload) into an EAPOL header.
#[must_use]
pub fn pack_eapol(frame: &EapolFrame) -> Vec<u8> {
    let mut out = Vec::with_capacity(EAPOL_HEADER_LEN + frame.body.len());
    out.push(frame.version);
    out.push(frame.packet_type as u8);
    out.extend_from_slice(&(frame.body.len() as u16).to_be_bytes());
    out.extend_from_slice(&frame.body);
    out
}

/// Parses an EAPOL header and body from wire bytes (Ethernet header already stripped).
///
/// # Errors
/// Returns [`Error::MessageParseError`] if the bytes are shorter than the EAPOL header, the
/// version is outside the accepted inbound range `1..=3`, or the type octet is unrecognized.
pub fn parse_eapol(bytes: &[u8]) -> Result<EapolFrame> {
    if bytes.len() < EAPOL_HEADER_LEN {
        return Err(Error::parse(format!(
            "EAPOL frame shorter than header: {} bytes",
            bytes.len()
        )));
    }
    let version = bytes[0];
    if !(1..=3).contains(&version) {
        return Err(Error::parse(format!("unsupported EAPOL version: {version}")));
    }
    let packet_type = EapolType::from_u8(bytes[1])
        .ok_or_else(|| Error::parse(format!("unknown EAPOL type: {}", bytes[1])))?;
    let length = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
    let available = bytes.len() - EAPOL_HEADER_LEN;
    if length > available {
        return Err(Error::parse(format!(
            "EAPOL length field {length} exceeds available {available} bytes"
        )));
    }
    let body = bytes[EAPOL_HEADER_LEN..EAPOL_HEADER_LEN + length].to_vec();
    Ok(EapolFrame {
        version,
        packet_type,
        body,
    })
}

/// Wraps a packed EAPOL frame in an Ethernet II header addressed `src -> dst`, ethertype
/// 0x888E, ready to hand to the raw EAPOL socket.
#[must_use]
pub fn pack_ethernet(frame: &EapolFrame, dst: MacAddress, src: MacAddress) -> Vec<u8> {
    let eapol = pack_eapol(frame);
    let mut out = Vec::with_capacity(ETH_HEADER_LEN + eapol.len());
    out.extend_from_slice(&dst.octets());
    out.extend_from_slice(&src.octets());
    out.extend_from_slice(&EAPOL_ETHERTYPE.to_be_bytes());
    out.extend_from_slice(&eapol);
    out
}

/// Strips the Ethernet header off an inbound frame, checks the ethertype is EAPOL, and
/// returns (src mac, dst mac, parsed EAPOL frame).
///
/// # Errors
/// Returns [`Error::MessageParseError`] if the frame is shorter than an Ethernet header, the
/// ethertype is not 0x888E, or the EAPOL payload fails to parse.
pub fn parse_ethernet(bytes: &[u8]) -> Result<(MacAddress, MacAddress, EapolFrame)> {
    if bytes.len() < ETH_HEADER_LEN {
        return Err(Error::parse(format!(
            "ethernet frame shorter than header: {} bytes",
            bytes.len()
        )));
    }
    let dst = MacAddress::new(bytes[0..6].try_into().unwrap());
    let src = MacAddress::new(bytes[6..12].try_into().unwrap());
    let ethertype = u16::from_be_bytes([bytes[12], bytes[13]]);
    if ethertype != EAPOL_ETHERTYPE {
        return Err(Error::parse(format!(
            "unexpected ethertype 0x{ethertype:04x}, expected EAPOL"
        )));
    }
    let eapol = parse_eapol(&bytes[ETH_HEADER_LEN..])?;
    Ok((src, dst, eapol))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eapol_header_round_trips() {
        let frame = EapolFrame::eap_packet(vec![1, 2, 3, 4]);
        let bytes = pack_eapol(&frame);
        assert_eq!(parse_eapol(&bytes).unwrap(), frame);
    }

    #[test]
    fn start_and_logoff_have_empty_body() {
        let frame = EapolFrame {
            version: 1,
            packet_type: EapolType::Start,
            body: Vec::new(),
        };
        let bytes = pack_eapol(&frame);
        assert_eq!(bytes.len(), 4);
        assert_eq!(parse_eapol(&bytes).unwrap(), frame);
    }

    #[test]
    fn ethernet_wrap_round_trips_addresses() {
        let dst = MacAddress::pae_group();
        let src: MacAddress = "00:00:00:00:00:10".parse().unwrap();
        let frame = EapolFrame::eap_packet(vec![1, 2, 3]);
        let bytes = pack_ethernet(&frame, dst, src);

        let (parsed_src, parsed_dst, parsed_frame) = parse_ethernet(&bytes).unwrap();
        assert_eq!(parsed_src, src);
        assert_eq!(parsed_dst, dst);
        assert_eq!(parsed_frame, frame);
    }

    #[test]
    fn rejects_non_eapol_ethertype() {
        let mut bytes = vec![0u8; 18];
        bytes[12] = 0x08;
        bytes[13] = 0x00;
        assert!(parse_ethernet(&bytes).is_err());
    }

    #[test]
    fn rejects_inbound_version_zero() {
        let bytes = [0u8, 0, 0, 0];
        assert!(parse_eapol(&bytes).is_err());
    }

    #[test]
    fn accepts_inbound_version_up_to_three() {
        let mut bytes = vec![3u8, 0, 0, 0];
        bytes.extend_from_slice(&[]);
        assert!(parse_eapol(&bytes).is_ok());
    }
}
