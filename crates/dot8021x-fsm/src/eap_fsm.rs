//! Full EAP Authenticator PAE state machine (802.1X-2010 §8.2, §4.5).
//!
//! The machine is pure: `event()` never touches a socket or the scheduler directly. It returns
//! the [`Command`]s the dispatcher must carry out (send a frame, (re)start a timer, report a
//! terminal outcome). That keeps the state/transition logic testable without a runtime.

use dot8021x_codec::eap as eap_codec;
use dot8021x_types::{EapCode, EapFrame, EapType, EapolFrame, EapolType, MacAddress, PortId};

use crate::radius_lifecycle::{RadiusReplyEvent, DEFAULT_SESSION_TIMEOUT_SECS};

/// Default retransmission timeout for an outstanding EAP Request (802.1X-2010 Table 8-1).
pub const RETRANS_WHILE_SECS: u64 = 30;
/// Default wait for an outstanding AAA round trip before treating it as a timeout.
pub const AAA_WHILE_SECS: u64 = 30;
/// Maximum number of retransmissions before the session fails.
pub const MAX_RETRANS: u32 = 5;

/// States a session's EAP authenticator can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EapState {
    /// Port is administratively or link-down; the session holds no state.
    Disabled,
    /// Entered on `portEnabled` transition edge; resets all session variables.
    Initialize,
    /// Waiting for `portEnabled` before issuing the first Identity Request.
    Restart,
    /// Waiting for a response to the outstanding Identity/Request.
    Idle,
    /// A frame has arrived and is being classified.
    Received,
    /// A validly-id'd Response is being forwarded to AAA.
    Response,
    /// About to emit a new Request to the client.
    Request,
    /// (Reserved for a future EAP method negotiation; unused by this authenticator, which never
    /// interprets method-specific Nak/propose semantics beyond passthrough.)
    Proposed,
    /// A frame was classified and is being dropped (bad id, wrong phase).
    Discard,
    /// About to send an Access-Request.
    AaaRequest,
    /// Waiting for a RADIUS reply.
    AaaIdle,
    /// A RADIUS reply has arrived and is being classified.
    AaaResponse,
    /// Terminal: RADIUS accepted. `auth_success` has fired exactly once.
    Success,
    /// Terminal: RADIUS rejected. `auth_failure` has fired.
    Failure,
    /// Terminal: retransmissions exhausted. `auth_failure` has fired.
    TimeoutFailure,
    /// Terminal: the supplicant sent EAPOL-Logoff. `auth_logoff` has fired.
    Logoff,
}

/// What triggered a call to [`FullEapStateMachine::event`].
#[derive(Debug, Clone)]
pub enum Event {
    /// The port's link/admin state changed.
    PortStatusChange {
        /// True if the port is now enabled.
        enabled: bool,
    },
    /// An EAPOL frame arrived from the client.
    EapolFrameReceived(EapolFrame),
    /// A response arrived correlated to a preemptive Identity Request this session was never
    /// told about (it didn't exist yet): the dispatcher broadcast that request before any client
    /// traffic was seen on the port. Adopts `preemptive_id` as `current_id` directly and forwards
    /// straight to AAA, instead of restarting and issuing a Request of its own.
    PreemptiveResponseReceived {
        /// The id the dispatcher's preemptive broadcast carried.
        preemptive_id: u8,
        /// The client's EAPOL-wrapped EAP Response.
        frame: EapolFrame,
    },
    /// A RADIUS reply arrived, already authenticated and correlated to this session.
    RadiusReply(RadiusReplyEvent),
    /// The retransmission timer fired.
    RetransTimerExpired,
    /// The AAA round-trip timer fired.
    AaaTimerExpired,
    /// The session-timeout (reauthentication) timer fired.
    SessionTimerExpired,
}

/// Identifies which of a session's timers a `Command::ScheduleTimer`/`CancelTimer` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Retransmission of the outstanding EAP Request.
    Retrans,
    /// Wait for the AAA server's reply.
    Aaa,
    /// Reauthentication at Session-Timeout.
    Session,
}

/// A side effect the dispatcher must carry out on the FSM's behalf.
#[derive(Debug, Clone)]
pub enum Command {
    /// Send this EAPOL frame to the client on this session's port.
    SendEapolToClient(EapolFrame),
    /// Forward this EAP response to the RADIUS server, wrapped as an Access-Request. The
    /// dispatcher owns the shared `RadiusLifecycle` (identifier space, secret) and turns this
    /// into wire bytes.
    ForwardToRadius {
        /// The encoded EAP frame to wrap in an EAP-Message attribute.
        eap_bytes: Vec<u8>,
        /// The EAP identifier this request is answering, for reply correlation.
        pending_eap_id: u8,
        /// User-Name, present only on the session's first request.
        identity: Option<String>,
        /// The State attribute last echoed by the server, if any.
        radius_state: Option<Vec<u8>>,
    },
    /// (Re)start a timer, cancelling any previous instance of the same kind.
    ScheduleTimer {
        /// Which timer.
        kind: TimerKind,
        /// How long from now.
        delay: std::time::Duration,
    },
    /// Cancel a previously scheduled timer, if still pending.
    CancelTimer(TimerKind),
    /// The session succeeded; invoke the configured success callback exactly once.
    AuthSuccess {
        /// Client's MAC address.
        mac: MacAddress,
        /// The port the client authenticated on.
        port: PortId,
        /// Session-Timeout to reauthenticate after, seconds.
        session_timeout: u32,
    },
    /// The session failed; invoke the configured failure callback.
    AuthFailure {
        /// Client's MAC address.
        mac: MacAddress,
        /// The port the client was on.
        port: PortId,
    },
    /// The client logged off; invoke the configured logoff callback.
    AuthLogoff {
        /// Client's MAC address.
        mac: MacAddress,
        /// The port the client was on.
        port: PortId,
    },
}

/// One client session's full EAP authenticator state.
pub struct FullEapStateMachine {
    port: PortId,
    port_enabled: bool,
    state: EapState,
    current_id: u8,
    req_count: u32,
    client_mac: Option<MacAddress>,
    identity: Option<String>,
    identity_sent: bool,
    radius_state: Option<Vec<u8>>,
    last_request_eapol: Option<EapolFrame>,
}

impl FullEapStateMachine {
    /// Creates a new session bound to `port`, initially disabled.
    #[must_use]
    pub fn new(port: PortId) -> Self {
        Self {
            port,
            port_enabled: false,
            state: EapState::Disabled,
            current_id: 0,
            req_count: 0,
            client_mac: None,
            identity: None,
            identity_sent: false,
            radius_state: None,
            last_request_eapol: None,
        }
    }

    /// The session's current state, for dispatcher bookkeeping and logging.
    #[must_use]
    pub const fn state(&self) -> EapState {
        self.state
    }

    /// True once the session has reached a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            EapState::Success | EapState::Failure | EapState::TimeoutFailure | EapState::Logoff
        )
    }

    /// The client MAC address this session is bound to, once observed.
    #[must_use]
    pub const fn client_mac(&self) -> Option<MacAddress> {
        self.client_mac
    }

    /// The EAP identifier of the outstanding Request/Identity exchange, used by the dispatcher
    /// to pick a preemptive identity id that cannot collide with an in-progress exchange.
    #[must_use]
    pub const fn current_id(&self) -> u8 {
        self.current_id
    }

    /// Feeds one event to the machine and returns the commands it produced. Runs to quiescence
    /// internally; a caller never needs to call `event` again for the same input.
    pub fn event(&mut self, event: Event) -> Vec<Command> {
        let mut commands = Vec::new();
        match event {
            Event::PortStatusChange { enabled } => {
                self.port_enabled = enabled;
                if !enabled {
                    self.enter_initialize(&mut commands);
                } else if self.state == EapState::Disabled || self.state == EapState::Initialize {
                    self.enter_restart(&mut commands);
                }
            }
            Event::EapolFrameReceived(frame) => self.handle_eapol(frame, &mut commands),
            Event::PreemptiveResponseReceived { preemptive_id, frame } => {
                self.handle_preemptive_response(preemptive_id, frame, &mut commands);
            }
            Event::RadiusReply(reply) => self.handle_radius_reply(reply, &mut commands),
            Event::RetransTimerExpired => self.handle_retrans_timeout(&mut commands),
            Event::AaaTimerExpired => self.handle_aaa_timeout(&mut commands),
            Event::SessionTimerExpired => {
                // Reauthentication: behave exactly like a fresh restart.
                self.enter_restart(&mut commands);
            }
        }
        commands
    }

    fn enter_initialize(&mut self, commands: &mut Vec<Command>) {
        self.state = EapState::Initialize;
        commands.push(Command::CancelTimer(TimerKind::Retrans));
        commands.push(Command::CancelTimer(TimerKind::Aaa));
        self.client_mac = None;
        self.identity = None;
        self.identity_sent = false;
        self.radius_state = None;
        self.req_count = 0;
    }

    fn enter_restart(&mut self, commands: &mut Vec<Command>) {
        if !self.port_enabled {
            self.enter_initialize(commands);
            return;
        }
        self.state = EapState::Restart;
        self.req_count = 0;
        self.current_id = self.current_id.wrapping_add(1);
        let request = EapFrame::identity_request(self.current_id, "");
        self.issue_request(request, commands);
    }

    fn issue_request(&mut self, request: EapFrame, commands: &mut Vec<Command>) {
        let eapol = EapolFrame::eap_packet(eap_codec::pack(&request));
        self.last_request_eapol = Some(eapol.clone());
        commands.push(Command::SendEapolToClient(eapol));
        commands.push(Command::ScheduleTimer {
            kind: TimerKind::Retrans,
            delay: std::time::Duration::from_secs(RETRANS_WHILE_SECS),
        });
        self.state = EapState::Idle;
    }

    fn handle_eapol(&mut self, frame: EapolFrame, commands: &mut Vec<Command>) {
        if !self.port_enabled {
            return;
        }
        match frame.packet_type {
            EapolType::Logoff => {
                self.state = EapState::Logoff;
                commands.push(Command::CancelTimer(TimerKind::Retrans));
                commands.push(Command::CancelTimer(TimerKind::Aaa));
                commands.push(Command::CancelTimer(TimerKind::Session));
                if let Some(mac) = self.client_mac {
                    commands.push(Command::AuthLogoff {
                        mac,
                        port: self.port,
                    });
                }
            }
            EapolType::Start => {
                self.enter_restart(commands);
            }
            EapolType::EapPacket => {
                let Ok(eap) = eap_codec::parse(&frame.body) else {
                    self.state = EapState::Discard;
                    return;
                };
                self.classify_response(eap, commands);
            }
        }
    }

    /// Adopts a preemptively-broadcast id as this (just-created) session's own, and classifies
    /// the response against it directly, without going through `enter_restart` first. The
    /// session never issued a Request of its own, so there is nothing to cancel and nothing to
    /// re-send: the outstanding broadcast already reached the client.
    fn handle_preemptive_response(&mut self, preemptive_id: u8, frame: EapolFrame, commands: &mut Vec<Command>) {
        self.port_enabled = true;
        if frame.packet_type != EapolType::EapPacket {
            self.state = EapState::Discard;
            return;
        }
        let Ok(eap) = eap_codec::parse(&frame.body) else {
            self.state = EapState::Discard;
            return;
        };
        self.current_id = preemptive_id;
        self.classify_response(eap, commands);
    }

    fn classify_response(&mut self, eap: EapFrame, commands: &mut Vec<Command>) {
        if eap.code != EapCode::Response {
            self.state = EapState::Discard;
            return;
        }
        if eap.identifier != self.current_id {
            self.state = EapState::Discard;
            return;
        }

        self.state = EapState::Received;
        commands.push(Command::CancelTimer(TimerKind::Retrans));

        if eap.eap_type == Some(EapType::Identity) {
            self.identity = eap.identity();
        }

        self.state = EapState::Response;
        self.forward_to_aaa(eap, commands);
    }

    fn forward_to_aaa(&mut self, eap: EapFrame, commands: &mut Vec<Command>) {
        self.state = EapState::AaaRequest;
        let identity = (!self.identity_sent).then(|| self.identity.clone()).flatten();
        self.identity_sent = self.identity_sent || identity.is_some();
        commands.push(Command::ForwardToRadius {
            eap_bytes: eap_codec::pack(&eap),
            pending_eap_id: eap.identifier,
            identity,
            radius_state: self.radius_state.clone(),
        });
        self.state = EapState::AaaIdle;
        commands.push(Command::ScheduleTimer {
            kind: TimerKind::Aaa,
            delay: std::time::Duration::from_secs(AAA_WHILE_SECS),
        });
    }

    fn handle_radius_reply(&mut self, reply: RadiusReplyEvent, commands: &mut Vec<Command>) {
        if self.state != EapState::AaaIdle {
            return;
        }
        self.state = EapState::AaaResponse;
        commands.push(Command::CancelTimer(TimerKind::Aaa));
        self.radius_state = reply
            .packet
            .find(dot8021x_types::RadiusAttributeType::State.to_u8())
            .and_then(|a| match a {
                dot8021x_types::RadiusAttribute::State(s) => Some(s.clone()),
                _ => None,
            });

        match reply.packet.code {
            dot8021x_types::RadiusCode::AccessChallenge => {
                if let Some(eap_bytes) = reply.packet.reassembled_eap_message() {
                    if let Ok(eap) = eap_codec::parse(&eap_bytes) {
                        self.current_id = eap.identifier;
                        self.issue_request(eap, commands);
                        return;
                    }
                }
                self.state = EapState::Discard;
            }
            dot8021x_types::RadiusCode::AccessAccept => {
                self.state = EapState::Success;
                let session_timeout = reply
                    .packet
                    .find(dot8021x_types::RadiusAttributeType::SessionTimeout.to_u8())
                    .and_then(|a| match a {
                        dot8021x_types::RadiusAttribute::SessionTimeout(s) => Some(*s),
                        _ => None,
                    })
                    .unwrap_or(DEFAULT_SESSION_TIMEOUT_SECS);

                let success = EapFrame::success(self.current_id);
                commands.push(Command::SendEapolToClient(EapolFrame::eap_packet(
                    eap_codec::pack(&success),
                )));
                if let Some(mac) = self.client_mac.or_else(|| self.identity_as_mac()) {
                    commands.push(Command::AuthSuccess {
                        mac,
                        port: self.port,
                        session_timeout,
                    });
                }
                commands.push(Command::ScheduleTimer {
                    kind: TimerKind::Session,
                    delay: std::time::Duration::from_secs(u64::from(session_timeout)),
                });
            }
            dot8021x_types::RadiusCode::AccessReject => {
                self.state = EapState::Failure;
                let failure = EapFrame::failure(self.current_id);
                commands.push(Command::SendEapolToClient(EapolFrame::eap_packet(
                    eap_codec::pack(&failure),
                )));
                if let Some(mac) = self.client_mac.or_else(|| self.identity_as_mac()) {
                    commands.push(Command::AuthFailure {
                        mac,
                        port: self.port,
                    });
                }
            }
            dot8021x_types::RadiusCode::AccessRequest => {
                self.state = EapState::Discard;
            }
        }
    }

    fn identity_as_mac(&self) -> Option<MacAddress> {
        self.identity.as_deref().and_then(|s| s.parse().ok())
    }

    fn handle_retrans_timeout(&mut self, commands: &mut Vec<Command>) {
        if self.state != EapState::Idle {
            return;
        }
        self.req_count += 1;
        if self.req_count > MAX_RETRANS {
            self.state = EapState::TimeoutFailure;
            if let Some(mac) = self.client_mac.or_else(|| self.identity_as_mac()) {
                commands.push(Command::AuthFailure {
                    mac,
                    port: self.port,
                });
            }
            return;
        }
        if let Some(eapol) = self.last_request_eapol.clone() {
            commands.push(Command::SendEapolToClient(eapol));
            commands.push(Command::ScheduleTimer {
                kind: TimerKind::Retrans,
                delay: std::time::Duration::from_secs(RETRANS_WHILE_SECS),
            });
        }
    }

    fn handle_aaa_timeout(&mut self, commands: &mut Vec<Command>) {
        if self.state != EapState::AaaIdle {
            return;
        }
        self.state = EapState::TimeoutFailure;
        if let Some(mac) = self.client_mac.or_else(|| self.identity_as_mac()) {
            commands.push(Command::AuthFailure {
                mac,
                port: self.port,
            });
        }
    }

    /// Records the client's MAC address once it is known (from the Ethernet source of the
    /// first EAPOL frame). Called by the dispatcher before the first `event()`.
    pub fn set_client_mac(&mut self, mac: MacAddress) {
        self.client_mac = Some(mac);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dot8021x_types::{RadiusAttribute, RadiusCode, RadiusPacket};

    fn port() -> PortId {
        "00:00:00:00:00:01".parse().unwrap()
    }

    fn mac() -> MacAddress {
        "aa:bb:cc:dd:ee:ff".parse().unwrap()
    }

    fn radius_reply(fsm: &FullEapStateMachine, code: RadiusCode, eap: Option<EapFrame>) -> RadiusReplyEvent {
        let mut attrs = Vec::new();
        if let Some(eap) = eap {
            attrs.push(RadiusAttribute::EapMessage(eap_codec::pack(&eap)));
        }
        RadiusReplyEvent {
            session_key: fsm.port,
            pending_eap_id: Some(fsm.current_id),
            packet: RadiusPacket {
                code,
                identifier: 1,
                authenticator: [0; 16],
                attributes: attrs,
            },
        }
    }

    #[test]
    fn port_enable_issues_an_identity_request() {
        let mut fsm = FullEapStateMachine::new(port());
        let cmds = fsm.event(Event::PortStatusChange { enabled: true });
        assert!(matches!(fsm.state(), EapState::Idle));
        assert!(cmds
            .iter()
            .any(|c| matches!(c, Command::SendEapolToClient(_))));
        assert!(cmds
            .iter()
            .any(|c| matches!(c, Command::ScheduleTimer { kind: TimerKind::Retrans, .. })));
    }

    #[test]
    fn port_disable_resets_to_initialize() {
        let mut fsm = FullEapStateMachine::new(port());
        fsm.event(Event::PortStatusChange { enabled: true });
        fsm.event(Event::PortStatusChange { enabled: false });
        assert_eq!(fsm.state(), EapState::Initialize);
    }

    #[test]
    fn mismatched_identifier_is_discarded() {
        let mut fsm = FullEapStateMachine::new(port());
        fsm.event(Event::PortStatusChange { enabled: true });
        let wrong_id_response = EapFrame {
            code: EapCode::Response,
            identifier: 200,
            eap_type: Some(EapType::Identity),
            payload: b"alice".to_vec(),
        };
        let eapol = EapolFrame::eap_packet(eap_codec::pack(&wrong_id_response));
        fsm.event(Event::EapolFrameReceived(eapol));
        assert_eq!(fsm.state(), EapState::Discard);
    }

    #[test]
    fn identity_response_advances_to_aaa_idle() {
        let mut fsm = FullEapStateMachine::new(port());
        fsm.set_client_mac(mac());
        fsm.event(Event::PortStatusChange { enabled: true });
        let current = fsm.current_id;
        let response = EapFrame {
            code: EapCode::Response,
            identifier: current,
            eap_type: Some(EapType::Identity),
            payload: b"alice".to_vec(),
        };
        let eapol = EapolFrame::eap_packet(eap_codec::pack(&response));
        fsm.event(Event::EapolFrameReceived(eapol));
        assert_eq!(fsm.state(), EapState::AaaIdle);
    }

    #[test]
    fn access_accept_fires_auth_success_exactly_once() {
        let mut fsm = FullEapStateMachine::new(port());
        fsm.set_client_mac(mac());
        fsm.event(Event::PortStatusChange { enabled: true });
        let current = fsm.current_id;
        let response = EapFrame {
            code: EapCode::Response,
            identifier: current,
            eap_type: Some(EapType::Identity),
            payload: b"alice".to_vec(),
        };
        fsm.event(Event::EapolFrameReceived(EapolFrame::eap_packet(
            eap_codec::pack(&response),
        )));

        let reply = radius_reply(&fsm, RadiusCode::AccessAccept, None);
        let cmds = fsm.event(Event::RadiusReply(reply));

        let success_count = cmds
            .iter()
            .filter(|c| matches!(c, Command::AuthSuccess { .. }))
            .count();
        assert_eq!(success_count, 1);
        assert_eq!(fsm.state(), EapState::Success);
    }

    #[test]
    fn access_reject_fires_auth_failure() {
        let mut fsm = FullEapStateMachine::new(port());
        fsm.set_client_mac(mac());
        fsm.event(Event::PortStatusChange { enabled: true });
        let current = fsm.current_id;
        let response = EapFrame {
            code: EapCode::Response,
            identifier: current,
            eap_type: Some(EapType::Identity),
            payload: b"alice".to_vec(),
        };
        fsm.event(Event::EapolFrameReceived(EapolFrame::eap_packet(
            eap_codec::pack(&response),
        )));
        let reply = radius_reply(&fsm, RadiusCode::AccessReject, None);
        let cmds = fsm.event(Event::RadiusReply(reply));
        assert!(cmds.iter().any(|c| matches!(c, Command::AuthFailure { .. })));
        assert_eq!(fsm.state(), EapState::Failure);
    }

    #[test]
    fn retransmission_stops_after_max_retrans_with_failure() {
        let mut fsm = FullEapStateMachine::new(port());
        fsm.set_client_mac(mac());
        fsm.event(Event::PortStatusChange { enabled: true });
        for _ in 0..MAX_RETRANS {
            let cmds = fsm.event(Event::RetransTimerExpired);
            assert!(!cmds.iter().any(|c| matches!(c, Command::AuthFailure { .. })));
        }
        let cmds = fsm.event(Event::RetransTimerExpired);
        assert!(cmds.iter().any(|c| matches!(c, Command::AuthFailure { .. })));
        assert_eq!(fsm.state(), EapState::TimeoutFailure);
    }

    #[test]
    fn eapol_logoff_fires_auth_logoff() {
        let mut fsm = FullEapStateMachine::new(port());
        fsm.set_client_mac(mac());
        fsm.event(Event::PortStatusChange { enabled: true });
        let logoff = EapolFrame {
            version: 1,
            packet_type: EapolType::Logoff,
            body: Vec::new(),
        };
        let cmds = fsm.event(Event::EapolFrameReceived(logoff));
        assert!(cmds.iter().any(|c| matches!(c, Command::AuthLogoff { .. })));
        assert_eq!(fsm.state(), EapState::Logoff);
    }
}
