//! The RADIUS UDP socket (§4.3, §4.4): a single ephemeral-port socket connected to the
//! configured RADIUS server, shared by every session's `RadiusLifecycle`.

use std::net::SocketAddr;

use dot8021x_types::{Error, Result};
use tokio::net::UdpSocket;

/// Maximum RADIUS packet size (RFC 2865 §3).
pub const MAX_RADIUS_PACKET: usize = 4096;

/// A UDP socket connected to a single RADIUS server.
pub struct RadiusSocket {
    socket: UdpSocket,
}

impl RadiusSocket {
    /// Binds an ephemeral UDP socket and connects it to `server`, so every `send`/`recv`
    /// implicitly targets that peer.
    ///
    /// # Errors
    /// Returns [`Error::SocketError`] if the bind or connect fails.
    pub async fn connect(server: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| Error::socket(format!("UDP bind failed: {e}")))?;
        socket
            .connect(server)
            .await
            .map_err(|e| Error::socket(format!("UDP connect to {server} failed: {e}")))?;
        Ok(Self { socket })
    }

    /// Sends one encoded RADIUS packet to the connected server.
    ///
    /// # Errors
    /// Returns [`Error::SocketError`] on a send failure.
    pub async fn send(&self, packet: &[u8]) -> Result<()> {
        self.socket
            .send(packet)
            .await
            .map_err(|e| Error::socket(format!("UDP send failed: {e}")))?;
        Ok(())
    }

    /// Receives one datagram into `buf`, returning the number of bytes written.
    ///
    /// # Errors
    /// Returns [`Error::SocketError`] on a receive failure.
    pub async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        self.socket
            .recv(buf)
            .await
            .map_err(|e| Error::socket(format!("UDP recv failed: {e}")))
    }

    /// The socket's locally bound ephemeral address.
    ///
    /// # Errors
    /// Returns [`Error::SocketError`] if the kernel cannot report the local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .map_err(|e| Error::socket(format!("local_addr failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_and_round_trip_a_datagram() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let client = RadiusSocket::connect(server_addr).await.unwrap();
        client.send(b"hello").await.unwrap();

        let mut buf = [0u8; 16];
        let (n, peer) = server.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello");

        server.send_to(b"world", peer).await.unwrap();
        let mut reply = [0u8; 16];
        let n = client.recv(&mut reply).await.unwrap();
        assert_eq!(&reply[..n], b"world");
    }
}
