//! MAC-Authentication-Bypass state machine (§4.6): authenticates a client by its MAC address
//! alone, for devices incapable of EAP, triggered by observing a DHCP discover from an unknown
//! source.

use dot8021x_types::{MacAddress, PortId};

use crate::radius_lifecycle::{RadiusReplyEvent, DEFAULT_SESSION_TIMEOUT_SECS};

/// Wait for the AAA server's reply before timing the session out.
pub const AAA_WHILE_SECS: u64 = 30;

/// States a MAB session can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MabState {
    /// No client has been observed on this port yet.
    Disabled,
    /// A DHCP frame was seen; the client's MAC is known and about to be sent to AAA.
    EthReceived,
    /// About to send an Access-Request.
    AaaRequest,
    /// Waiting for a RADIUS reply.
    AaaIdle,
    /// A RADIUS reply has arrived and is being classified.
    AaaResponse,
    /// Terminal: accepted.
    Success,
    /// Terminal: rejected or timed out.
    Failure,
}

/// What triggered a call to [`MacAuthenticationBypassStateMachine::event`].
#[derive(Debug, Clone)]
pub enum Event {
    /// The port's link/admin state changed.
    PortStatusChange {
        /// True if the port is now enabled.
        enabled: bool,
    },
    /// A DHCP discover frame was observed from this MAC address.
    DhcpFrameReceived(MacAddress),
    /// A RADIUS reply arrived, already authenticated and correlated to this session.
    RadiusReply(RadiusReplyEvent),
    /// The AAA round-trip timer fired.
    AaaTimerExpired,
    /// The session-timeout (reauthentication) timer fired.
    SessionTimerExpired,
}

/// A side effect the dispatcher must carry out on the MAB session's behalf.
#[derive(Debug, Clone)]
pub enum Command {
    /// Send a MAB Access-Request for this client MAC.
    ForwardToRadius {
        /// The client's MAC address, used as User-Name.
        mac: MacAddress,
    },
    /// (Re)start the AAA wait timer.
    ScheduleAaaTimer,
    /// Cancel the AAA wait timer.
    CancelAaaTimer,
    /// Schedule reauthentication at Session-Timeout.
    ScheduleSessionTimer {
        /// Delay before reauthentication.
        delay: std::time::Duration,
    },
    /// The session succeeded.
    AuthSuccess {
        /// Client's MAC address.
        mac: MacAddress,
        /// The port the client authenticated on.
        port: PortId,
        /// Session-Timeout to reauthenticate after, seconds.
        session_timeout: u32,
    },
    /// The session failed.
    AuthFailure {
        /// Client's MAC address.
        mac: MacAddress,
        /// The port the client was on.
        port: PortId,
    },
}

/// One client session's MAC-Authentication-Bypass state.
pub struct MacAuthenticationBypassStateMachine {
    port: PortId,
    port_enabled: bool,
    state: MabState,
    client_mac: Option<MacAddress>,
}

impl MacAuthenticationBypassStateMachine {
    /// Creates a new MAB session bound to `port`, initially disabled.
    #[must_use]
    pub const fn new(port: PortId) -> Self {
        Self {
            port,
            port_enabled: false,
            state: MabState::Disabled,
            client_mac: None,
        }
    }

    /// The session's current state.
    #[must_use]
    pub const fn state(&self) -> MabState {
        self.state
    }

    /// True once the session has reached a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self.state, MabState::Success | MabState::Failure)
    }

    /// The client MAC address this session is bound to, once observed.
    #[must_use]
    pub const fn client_mac(&self) -> Option<MacAddress> {
        self.client_mac
    }

    /// Feeds one event to the machine and returns the commands it produced.
    pub fn event(&mut self, event: Event) -> Vec<Command> {
        let mut commands = Vec::new();
        match event {
            Event::PortStatusChange { enabled } => {
                self.port_enabled = enabled;
                if !enabled {
                    self.state = MabState::Disabled;
                    self.client_mac = None;
                    commands.push(Command::CancelAaaTimer);
                }
            }
            Event::DhcpFrameReceived(mac) => self.handle_dhcp(mac, &mut commands),
            Event::RadiusReply(reply) => self.handle_radius_reply(reply, &mut commands),
            Event::AaaTimerExpired => self.handle_aaa_timeout(&mut commands),
            Event::SessionTimerExpired => {
                self.state = MabState::Disabled;
                self.client_mac = None;
            }
        }
        commands
    }

    fn handle_dhcp(&mut self, mac: MacAddress, commands: &mut Vec<Command>) {
        if !self.port_enabled || self.state != MabState::Disabled {
            return;
        }
        self.state = MabState::EthReceived;
        self.client_mac = Some(mac);
        self.state = MabState::AaaRequest;
        commands.push(Command::ForwardToRadius { mac });
        self.state = MabState::AaaIdle;
        commands.push(Command::ScheduleAaaTimer);
    }

    fn handle_radius_reply(&mut self, reply: RadiusReplyEvent, commands: &mut Vec<Command>) {
        if self.state != MabState::AaaIdle {
            return;
        }
        self.state = MabState::AaaResponse;
        commands.push(Command::CancelAaaTimer);

        let Some(mac) = self.client_mac else {
            self.state = MabState::Failure;
            return;
        };

        match reply.packet.code {
            dot8021x_types::RadiusCode::AccessAccept => {
                self.state = MabState::Success;
                let session_timeout = reply
                    .packet
                    .find(dot8021x_types::RadiusAttributeType::SessionTimeout.to_u8())
                    .and_then(|a| match a {
                        dot8021x_types::RadiusAttribute::SessionTimeout(s) => Some(*s),
                        _ => None,
                    })
                    .unwrap_or(DEFAULT_SESSION_TIMEOUT_SECS);
                commands.push(Command::AuthSuccess {
                    mac,
                    port: self.port,
                    session_timeout,
                });
                commands.push(Command::ScheduleSessionTimer {
                    delay: std::time::Duration::from_secs(u64::from(session_timeout)),
                });
            }
            _ => {
                self.state = MabState::Failure;
                commands.push(Command::AuthFailure {
                    mac,
                    port: self.port,
                });
            }
        }
    }

    fn handle_aaa_timeout(&mut self, commands: &mut Vec<Command>) {
        if self.state != MabState::AaaIdle {
            return;
        }
        self.state = MabState::Failure;
        if let Some(mac) = self.client_mac {
            commands.push(Command::AuthFailure {
                mac,
                port: self.port,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dot8021x_types::{RadiusCode, RadiusPacket};

    fn port() -> PortId {
        "00:00:00:00:00:02".parse().unwrap()
    }

    fn mac() -> MacAddress {
        "11:22:33:44:55:66".parse().unwrap()
    }

    fn reply(fsm: &MacAuthenticationBypassStateMachine, code: RadiusCode) -> RadiusReplyEvent {
        RadiusReplyEvent {
            session_key: fsm.port,
            pending_eap_id: None,
            packet: RadiusPacket {
                code,
                identifier: 1,
                authenticator: [0; 16],
                attributes: Vec::new(),
            },
        }
    }

    #[test]
    fn dhcp_frame_triggers_radius_forward() {
        let mut fsm = MacAuthenticationBypassStateMachine::new(port());
        fsm.event(Event::PortStatusChange { enabled: true });
        let cmds = fsm.event(Event::DhcpFrameReceived(mac()));
        assert!(cmds
            .iter()
            .any(|c| matches!(c, Command::ForwardToRadius { mac: m } if *m == mac())));
        assert_eq!(fsm.state(), MabState::AaaIdle);
    }

    #[test]
    fn access_accept_fires_success() {
        let mut fsm = MacAuthenticationBypassStateMachine::new(port());
        fsm.event(Event::PortStatusChange { enabled: true });
        fsm.event(Event::DhcpFrameReceived(mac()));
        let cmds = fsm.event(Event::RadiusReply(reply(&fsm, RadiusCode::AccessAccept)));
        assert!(cmds.iter().any(|c| matches!(c, Command::AuthSuccess { .. })));
        assert_eq!(fsm.state(), MabState::Success);
    }

    #[test]
    fn access_reject_fires_failure() {
        let mut fsm = MacAuthenticationBypassStateMachine::new(port());
        fsm.event(Event::PortStatusChange { enabled: true });
        fsm.event(Event::DhcpFrameReceived(mac()));
        let cmds = fsm.event(Event::RadiusReply(reply(&fsm, RadiusCode::AccessReject)));
        assert!(cmds.iter().any(|c| matches!(c, Command::AuthFailure { .. })));
        assert_eq!(fsm.state(), MabState::Failure);
    }

    #[test]
    fn second_dhcp_frame_while_pending_is_ignored() {
        let mut fsm = MacAuthenticationBypassStateMachine::new(port());
        fsm.event(Event::PortStatusChange { enabled: true });
        fsm.event(Event::DhcpFrameReceived(mac()));
        let cmds = fsm.event(Event::DhcpFrameReceived(mac()));
        assert!(cmds.is_empty());
    }

    #[test]
    fn aaa_timeout_fires_failure() {
        let mut fsm = MacAuthenticationBypassStateMachine::new(port());
        fsm.event(Event::PortStatusChange { enabled: true });
        fsm.event(Event::DhcpFrameReceived(mac()));
        let cmds = fsm.event(Event::AaaTimerExpired);
        assert!(cmds.iter().any(|c| matches!(c, Command::AuthFailure { .. })));
        assert_eq!(fsm.state(), MabState::Failure);
    }
}
