//! # dot8021x-net
//!
//! Raw L2 sockets for EAPOL and MAB traffic, and the UDP socket used to talk to the RADIUS
//! server (§4.3). Socket setup (ioctl, promiscuous membership) is synchronous; I/O afterward is
//! async via `tokio::io::unix::AsyncFd`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

mod eap_socket;
mod mab_socket;
mod radius_socket;
mod raw;

pub use eap_socket::{EapSocket, EAPOL_ETHERTYPE};
pub use mab_socket::{MabSocket, IPV4_ETHERTYPE};
pub use radius_socket::{RadiusSocket, MAX_RADIUS_PACKET};
pub use raw::RawL2Socket;
