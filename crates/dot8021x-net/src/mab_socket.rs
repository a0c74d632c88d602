//! The MAB L2 socket: receive-only, ethertype `0x0800` (IPv4), filtering for DHCP discover
//! traffic (UDP src port 68, dst port 67) to recover a supplicant's MAC address for
//! MAC-Authentication-Bypass (§4.3, §4.6).

use dot8021x_types::{Error, MacAddress, Result};

use crate::raw::RawL2Socket;

/// IPv4 ethertype.
pub const IPV4_ETHERTYPE: u16 = 0x0800;

const IP_PROTO_UDP: u8 = 0x11;
const DHCP_CLIENT_PORT: u16 = 68;
const DHCP_SERVER_PORT: u16 = 67;

// Offsets into a raw Ethernet + IPv4 + UDP frame (14-byte Ethernet header preceding the IP
// header at offset 14; a 20-byte minimal IPv4 header with no options).
const IP_PROTOCOL_OFFSET: usize = 14 + 9;
const UDP_SRC_PORT_OFFSET: usize = 14 + 20;
const UDP_DST_PORT_OFFSET: usize = 14 + 22;

/// A receive-only socket for DHCP discover frames, used to trigger MAB.
pub struct MabSocket {
    inner: RawL2Socket,
}

impl MabSocket {
    /// Opens the MAB socket on `interface`, joining the broadcast address in promiscuous mode.
    ///
    /// # Errors
    /// Returns [`Error::SocketError`] if the underlying raw socket cannot be opened or
    /// configured.
    pub fn open(interface: &str) -> Result<Self> {
        let inner = RawL2Socket::open(interface, IPV4_ETHERTYPE, MacAddress::broadcast())?;
        Ok(Self { inner })
    }

    /// Blocks until a DHCP discover frame (UDP 68 -> 67) arrives, then returns the source MAC
    /// address extracted from the Ethernet header. Frames that don't match are discarded
    /// silently; a truncated frame is a [`Error::MessageParseError`] the caller can log and
    /// continue past.
    ///
    /// # Errors
    /// Returns [`Error::SocketError`] if the socket fails, or [`Error::MessageParseError`] if a
    /// matching-looking frame is too short to contain the fields it claims to have.
    pub async fn recv_dhcp_discover(&self) -> Result<MacAddress> {
        let mut buf = [0u8; 1514];
        loop {
            let n = self.inner.recv(&mut buf).await?;
            let frame = &buf[..n];

            if frame.len() <= UDP_DST_PORT_OFFSET + 1 {
                continue;
            }
            if frame[IP_PROTOCOL_OFFSET] != IP_PROTO_UDP {
                continue;
            }

            let src_port = u16::from_be_bytes([
                frame[UDP_SRC_PORT_OFFSET],
                frame[UDP_SRC_PORT_OFFSET + 1],
            ]);
            let dst_port = u16::from_be_bytes([
                frame[UDP_DST_PORT_OFFSET],
                frame[UDP_DST_PORT_OFFSET + 1],
            ]);
            if src_port != DHCP_CLIENT_PORT || dst_port != DHCP_SERVER_PORT {
                continue;
            }

            if frame.len() < 12 {
                return Err(Error::parse("truncated Ethernet header"));
            }
            let mut octets = [0u8; 6];
            octets.copy_from_slice(&frame[6..12]);
            return Ok(MacAddress::new(octets));
        }
    }

    /// Closes the socket.
    pub fn close(self) {
        self.inner.close();
    }
}
