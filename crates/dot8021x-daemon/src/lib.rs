//! # dot8021x-daemon
//!
//! The long-running authenticator process: loads [`config::DaemonConfig`], opens the three
//! sockets, and drives a [`dispatcher::DispatcherRunner`] until stopped (§5, §6, §10.1).
//!
//! # Features
//!
//! - **Single-dispatcher ordering**: every session-table mutation happens on one task (§5).
//! - **Bounded backpressure**: outbound queues drop the oldest frame under flood rather than
//!   stalling a live session (§5).
//! - **Cross-platform service wrapper**: PID file, daemonization, and service-unit install for
//!   Linux, macOS, and Windows (§10.1).

#![warn(missing_docs)]

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod platform;
pub mod queue;

pub use config::DaemonConfig;
pub use dispatcher::{Callbacks, Dispatcher, DispatcherCore, DispatcherRunner, Effect};
pub use error::{DaemonError, Result};
