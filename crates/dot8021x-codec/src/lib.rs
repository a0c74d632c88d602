//! # dot8021x-codec
//!
//! Wire encoding and decoding for the three protocols the authenticator speaks: EAPOL/EAP
//! framing over Ethernet, and RADIUS packets with their Message-Authenticator/
//! response-authenticator crypto and EAP-Message fragmentation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod eap;
pub mod eapol;
pub mod radius;

pub use dot8021x_types::{Error, Result};
