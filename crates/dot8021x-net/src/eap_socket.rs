//! The EAPOL L2 socket: receives and sends frames on ethertype `0x888e`, joined to the PAE
//! group address in promiscuous mode (§4.3).

use dot8021x_types::{MacAddress, Result};

use crate::raw::RawL2Socket;

/// EAPOL ethertype, network byte order when placed on the wire.
pub const EAPOL_ETHERTYPE: u16 = 0x888e;

/// A socket dedicated to sending and receiving EAPOL frames on one interface.
pub struct EapSocket {
    inner: RawL2Socket,
}

impl EapSocket {
    /// Opens the EAPOL socket on `interface`, joining the PAE group address.
    ///
    /// # Errors
    /// Returns [`dot8021x_types::Error::SocketError`] if the underlying raw socket cannot be
    /// opened or configured.
    pub fn open(interface: &str) -> Result<Self> {
        let inner = RawL2Socket::open(interface, EAPOL_ETHERTYPE, MacAddress::pae_group())?;
        Ok(Self { inner })
    }

    /// Sends a full Ethernet frame (destination + source + ethertype + EAPOL body).
    ///
    /// # Errors
    /// Returns [`dot8021x_types::Error::SocketError`] on a write failure.
    pub async fn send(&self, frame: &[u8]) -> Result<()> {
        self.inner.send(frame).await
    }

    /// Receives one Ethernet frame into `buf`, returning the number of bytes written.
    ///
    /// # Errors
    /// Returns [`dot8021x_types::Error::SocketError`] on a read failure.
    pub async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        self.inner.recv(buf).await
    }

    /// Closes the socket. Subsequent sends/receives on other handles to the same descriptor
    /// fail rather than block.
    pub fn close(self) {
        self.inner.close();
    }
}
