//! # dot8021x-types
//!
//! Shared wire-adjacent data model for the 802.1X authenticator: MAC addresses, port
//! identifiers, EAP/EAPOL frame structures, RADIUS packet structures, and the crate-wide
//! error taxonomy every other crate builds on.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod eap;
pub mod eapol;
pub mod error;
pub mod mac;
pub mod port;
pub mod radius;

pub use eap::{EapCode, EapFrame, EapType};
pub use eapol::{EapolFrame, EapolType};
pub use error::{Error, Result};
pub use mac::MacAddress;
pub use port::PortId;
pub use radius::{RadiusAttribute, RadiusAttributeType, RadiusCode, RadiusPacket};
