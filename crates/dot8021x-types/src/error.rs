//! Crate-wide error taxonomy (§7 of the design).
//!
//! Every fallible operation in the codec, socket, scheduler, and FSM crates returns one of
//! these kinds. The dispatcher is the only place that decides whether a given kind is
//! fatal (propagate, shut the authenticator down) or absorbed (log and continue) — see the
//! doc comment on each variant for the intended disposition.

use thiserror::Error as ThisError;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// The authenticator's error taxonomy.
#[derive(Debug, ThisError)]
pub enum Error {
    /// A malformed EAPOL, EAP, or RADIUS frame. Logged at warning; the frame is dropped and the
    /// owning session, if any, is unaffected.
    #[error("malformed frame: {reason}")]
    MessageParseError {
        /// Human-readable cause.
        reason: String,
    },

    /// A RADIUS response/request authenticator or Message-Authenticator failed to validate
    /// against the shared secret. Logged at warning; the packet is dropped. The session is
    /// unaffected beyond eventually timing out if no valid reply ever arrives.
    #[error("RADIUS authenticator validation failed: {reason}")]
    RadiusAuthError {
        /// Human-readable cause.
        reason: String,
    },

    /// All 256 RADIUS identifiers are currently in flight. Transient; the caller retries after
    /// a bounded backoff.
    #[error("RADIUS identifier space exhausted")]
    RadiusIdExhausted,

    /// A socket-level failure. Fatal for the owning socket's task; propagates to shut the
    /// authenticator down.
    #[error("socket error: {reason}")]
    SocketError {
        /// Human-readable cause.
        reason: String,
    },

    /// A session timed out waiting for a reply. Drives the owning FSM into its timeout-failure
    /// state; user-visible via the failure callback.
    #[error("timed out: {context}")]
    TimeoutError {
        /// What the authenticator was waiting for.
        context: String,
    },

    /// Underlying I/O failure, wrapped at the boundary.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Builds a [`Error::MessageParseError`] from any displayable cause.
    #[must_use]
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::MessageParseError {
            reason: reason.into(),
        }
    }

    /// Builds a [`Error::RadiusAuthError`] from any displayable cause.
    #[must_use]
    pub fn radius_auth(reason: impl Into<String>) -> Self {
        Self::RadiusAuthError {
            reason: reason.into(),
        }
    }

    /// Builds a [`Error::SocketError`] from any displayable cause.
    #[must_use]
    pub fn socket(reason: impl Into<String>) -> Self {
        Self::SocketError {
            reason: reason.into(),
        }
    }

    /// Builds a [`Error::TimeoutError`] describing what timed out.
    #[must_use]
    pub fn timeout(context: impl Into<String>) -> Self {
        Self::TimeoutError {
            context: context.into(),
        }
    }

    /// True for errors that are fatal to the owning socket/task and must propagate.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::SocketError { .. } | Self::Io(_))
    }

    /// True for errors that should be retried after a backoff rather than surfaced.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::RadiusIdExhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_errors_are_fatal() {
        assert!(Error::socket("nic unplugged").is_fatal());
        assert!(!Error::parse("short frame").is_fatal());
    }

    #[test]
    fn id_exhaustion_is_transient_not_fatal() {
        assert!(Error::RadiusIdExhausted.is_transient());
        assert!(!Error::RadiusIdExhausted.is_fatal());
    }
}
