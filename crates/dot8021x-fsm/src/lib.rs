//! # dot8021x-fsm
//!
//! The RADIUS identifier/correlation lifecycle and the two per-session state machines (full
//! EAP authenticator, MAC-Authentication-Bypass) that the dispatcher drives (§4.4, §4.5, §4.6).
//! Both state machines are pure: `event()` takes no socket or scheduler handle and returns the
//! commands the dispatcher must carry out, which keeps the transition tables testable without a
//! runtime.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod eap_fsm;
pub mod mab_fsm;
pub mod radius_lifecycle;

pub use eap_fsm::{Event as EapEvent, FullEapStateMachine};
pub use mab_fsm::{Event as MabEvent, MacAuthenticationBypassStateMachine};
pub use radius_lifecycle::{RadiusLifecycle, RadiusReplyEvent};
