//! RADIUS request/reply correlation for one authenticator instance (§4.4).
//!
//! One `RadiusLifecycle` is shared by every session: it owns the 256-entry identifier space,
//! builds outbound Access-Requests, and turns inbound bytes into an event addressed to the
//! session that is waiting for it.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::Instant;

use dot8021x_codec::radius as radius_codec;
use dot8021x_types::{
    Error, MacAddress, PortId, RadiusAttribute, RadiusCode, RadiusPacket, Result,
};
use rand::RngCore;

/// Default Session-Timeout (seconds) when the server's Access-Accept omits it.
pub const DEFAULT_SESSION_TIMEOUT_SECS: u32 = 3600;

/// One outstanding Access-Request, keyed by its RADIUS identifier.
#[derive(Debug, Clone)]
struct PendingRequest {
    session_key: PortId,
    request_authenticator: [u8; 16],
    /// The EAP identifier the client's response carried, so the reply can be correlated back
    /// to the right `currentId` on the EAP FSM side. `None` for MAB requests.
    pending_eap_id: Option<u8>,
    sent_at: Instant,
}

/// A RADIUS reply, parsed, authenticated, and correlated to the session that requested it.
#[derive(Debug, Clone)]
pub struct RadiusReplyEvent {
    /// The session this reply belongs to.
    pub session_key: PortId,
    /// The EAP identifier the original request answered, if this was an EAP exchange.
    pub pending_eap_id: Option<u8>,
    /// The validated, parsed packet.
    pub packet: RadiusPacket,
}

/// Owns the 256-slot RADIUS identifier space and the shared secret, and translates between
/// session-level requests and RADIUS wire packets.
pub struct RadiusLifecycle {
    secret: Vec<u8>,
    nas_identifier: String,
    next_id: u16,
    in_flight: HashMap<u8, PendingRequest>,
}

impl RadiusLifecycle {
    /// Creates a lifecycle for one authenticator instance, identified to the RADIUS server as
    /// `nas_identifier` (the configured chewie-id).
    #[must_use]
    pub fn new(secret: Vec<u8>, nas_identifier: String) -> Self {
        Self {
            secret,
            nas_identifier,
            next_id: 0,
            in_flight: HashMap::new(),
        }
    }

    /// Number of identifiers currently in flight, for diagnostics.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    fn allocate_id(&mut self) -> Result<u8> {
        for _ in 0..=u8::MAX {
            let candidate = self.next_id as u8;
            self.next_id = (self.next_id + 1) % 256;
            if !self.in_flight.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
        Err(Error::RadiusIdExhausted)
    }

    fn nas_port(port: PortId) -> u32 {
        // NAS-Port has no real meaning here beyond being a stable, opaque per-port number; a
        // hash of the port identifier is as good as any switch-supplied ifindex.
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        port.hash(&mut hasher);
        hasher.finish() as u32
    }

    fn called_station_id(&self, port: PortId) -> String {
        format!("{}:{}", self.nas_identifier, port)
    }

    /// Builds an Access-Request carrying an EAP-Message, forwarding the supplicant's response.
    ///
    /// `identity` is `Some` only on the first request of a session (the Identity Response);
    /// subsequent requests omit User-Name and rely on the echoed `radius_state`.
    ///
    /// # Errors
    /// Returns [`Error::RadiusIdExhausted`] if all 256 identifiers are currently in flight.
    pub fn build_access_request(
        &mut self,
        session_key: PortId,
        client_mac: MacAddress,
        identity: Option<&str>,
        eap_bytes: &[u8],
        pending_eap_id: u8,
        radius_state: Option<Vec<u8>>,
    ) -> Result<(u8, Vec<u8>)> {
        let id = self.allocate_id()?;
        let mut authenticator = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut authenticator);

        let mut attrs = Vec::new();
        if let Some(identity) = identity {
            attrs.push(RadiusAttribute::UserName(identity.to_string()));
        }
        attrs.push(RadiusAttribute::CallingStationId(client_mac.to_dash_string()));
        attrs.push(RadiusAttribute::CalledStationId(
            self.called_station_id(session_key),
        ));
        attrs.push(RadiusAttribute::NasPort(Self::nas_port(session_key)));
        if let Some(state) = radius_state {
            attrs.push(RadiusAttribute::State(state));
        }
        attrs.extend(radius_codec::fragment_eap_message(eap_bytes));

        let bytes = radius_codec::pack_request(
            RadiusCode::AccessRequest,
            id,
            &authenticator,
            &attrs,
            &self.secret,
        );

        self.in_flight.insert(
            id,
            PendingRequest {
                session_key,
                request_authenticator: authenticator,
                pending_eap_id: Some(pending_eap_id),
                sent_at: Instant::now(),
            },
        );

        Ok((id, bytes))
    }

    /// Builds an Access-Request for MAC-Authentication-Bypass: User-Name is the client's MAC
    /// address, no EAP-Message is attached.
    ///
    /// # Errors
    /// Returns [`Error::RadiusIdExhausted`] if all 256 identifiers are currently in flight.
    pub fn build_mab_access_request(
        &mut self,
        session_key: PortId,
        client_mac: MacAddress,
    ) -> Result<(u8, Vec<u8>)> {
        let id = self.allocate_id()?;
        let mut authenticator = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut authenticator);

        let attrs = vec![
            RadiusAttribute::UserName(client_mac.to_dash_string()),
            RadiusAttribute::CallingStationId(client_mac.to_dash_string()),
            RadiusAttribute::CalledStationId(self.called_station_id(session_key)),
            RadiusAttribute::NasPort(Self::nas_port(session_key)),
        ];

        let bytes = radius_codec::pack_request(
            RadiusCode::AccessRequest,
            id,
            &authenticator,
            &attrs,
            &self.secret,
        );

        self.in_flight.insert(
            id,
            PendingRequest {
                session_key,
                request_authenticator: authenticator,
                pending_eap_id: None,
                sent_at: Instant::now(),
            },
        );

        Ok((id, bytes))
    }

    /// Parses and authenticates an inbound RADIUS reply, correlating it to the session that
    /// sent the matching request. Unknown identifiers are logged and dropped rather than
    /// returned as an error, since a late or duplicate reply is expected, not exceptional.
    ///
    /// # Errors
    /// Returns [`Error::MessageParseError`] for malformed bytes, [`Error::RadiusAuthError`] if
    /// authentication fails, or an internal sentinel if the identifier is unknown (the caller
    /// should treat this the same as a successful no-op).
    pub fn process_inbound(&mut self, bytes: &[u8]) -> Result<Option<RadiusReplyEvent>> {
        // Peek the identifier before full parsing so an unknown id can be dropped without
        // spending a MAC computation on it.
        if bytes.len() < 2 {
            return Err(Error::parse("RADIUS reply shorter than header"));
        }
        let identifier = bytes[1];

        let Some(pending) = self.in_flight.get(&identifier) else {
            tracing::warn!(identifier, "RADIUS reply for unknown identifier, dropping");
            return Ok(None);
        };

        let packet = radius_codec::parse_and_verify_reply(
            bytes,
            &pending.request_authenticator,
            &self.secret,
        )?;

        let pending = self
            .in_flight
            .remove(&identifier)
            .expect("checked present above");

        Ok(Some(RadiusReplyEvent {
            session_key: pending.session_key,
            pending_eap_id: pending.pending_eap_id,
            packet,
        }))
    }

    /// Drops any in-flight request belonging to `session_key`, e.g. when its port goes down.
    pub fn forget_session(&mut self, session_key: PortId) {
        self.in_flight.retain(|_, p| p.session_key != session_key);
    }

    /// Age of the oldest in-flight request, for liveness diagnostics.
    #[must_use]
    pub fn oldest_in_flight_age(&self) -> Option<std::time::Duration> {
        self.in_flight
            .values()
            .map(|p| p.sent_at.elapsed())
            .max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lifecycle() -> RadiusLifecycle {
        RadiusLifecycle::new(vec![b's'; 16], "test-chewie".to_string())
    }

    fn port() -> PortId {
        "00:00:00:00:00:01".parse().unwrap()
    }

    fn mac() -> MacAddress {
        "aa:bb:cc:dd:ee:ff".parse().unwrap()
    }

    #[test]
    fn builds_a_well_formed_access_request() {
        let mut lc = lifecycle();
        let (id, bytes) = lc
            .build_access_request(port(), mac(), Some("alice"), &[1, 2, 3], 7, None)
            .unwrap();
        let parsed = dot8021x_codec::radius::parse(&bytes).unwrap();
        assert_eq!(parsed.identifier, id);
        assert!(matches!(parsed.code, RadiusCode::AccessRequest));
        assert_eq!(lc.in_flight_count(), 1);
    }

    #[test]
    fn mab_request_carries_mac_as_username_and_no_eap_message() {
        let mut lc = lifecycle();
        let (_, bytes) = lc.build_mab_access_request(port(), mac()).unwrap();
        let parsed = dot8021x_codec::radius::parse(&bytes).unwrap();
        assert!(parsed.reassembled_eap_message().is_none());
        assert!(matches!(
            parsed.find(1),
            Some(RadiusAttribute::UserName(u)) if u == &mac().to_dash_string()
        ));
    }

    #[test]
    fn exhausting_all_256_identifiers_returns_exhausted_error() {
        let mut lc = lifecycle();
        for _ in 0..256 {
            lc.build_mab_access_request(port(), mac()).unwrap();
        }
        let result = lc.build_mab_access_request(port(), mac());
        assert!(matches!(result, Err(Error::RadiusIdExhausted)));
    }

    #[test]
    fn unknown_identifier_reply_is_dropped_not_errored() {
        let mut lc = lifecycle();
        let bytes = dot8021x_codec::radius::pack_request(
            RadiusCode::AccessAccept,
            42,
            &[0u8; 16],
            &[],
            &lc.secret.clone(),
        );
        assert!(lc.process_inbound(&bytes).unwrap().is_none());
    }

    #[test]
    fn forgetting_a_session_drops_its_in_flight_requests() {
        let mut lc = lifecycle();
        lc.build_mab_access_request(port(), mac()).unwrap();
        assert_eq!(lc.in_flight_count(), 1);
        lc.forget_session(port());
        assert_eq!(lc.in_flight_count(), 0);
    }
}
