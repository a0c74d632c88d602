//! The dispatcher (§4.7): owns the session table, port status, and the shared RADIUS lifecycle,
//! and drives the five I/O loops plus the timer scheduler (§5).
//!
//! Split in two layers, the same way `dot8021x-fsm`'s state machines separate transition logic
//! from I/O: [`DispatcherCore`] is synchronous and pure — it consumes one inbound event at a
//! time and returns the [`Effect`]s the caller must carry out — while [`DispatcherRunner`] is
//! the thin async layer that owns the sockets, the scheduler, and the outbound queues, and
//! actually executes those effects. Every event that can reach `DispatcherCore` arrives over one
//! `mpsc` channel, so exactly one task ever touches the session table (§5's single-dispatcher
//! ordering guarantee), matching the original's single-process-per-port model.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dot8021x_codec::{eap as eap_codec, eapol as eapol_codec};
use dot8021x_fsm::eap_fsm::{self, EapState};
use dot8021x_fsm::mab_fsm;
use dot8021x_fsm::{EapEvent, FullEapStateMachine, MabEvent, MacAuthenticationBypassStateMachine, RadiusLifecycle};
use dot8021x_net::{EapSocket, MabSocket, RadiusSocket};
use dot8021x_scheduler::{JobHandle, TimerScheduler};
use dot8021x_types::{EapCode, EapFrame, EapolFrame, EapolType, MacAddress, PortId};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::config::DaemonConfig;
use crate::error::{DaemonError, Result};
use crate::queue::BoundedQueue;

/// Recommended outbound queue bound (§5).
const OUTBOUND_QUEUE_CAPACITY: usize = 1024;
/// Grace period `stop()` gives in-flight socket reads before their tasks are cancelled (§10.6).
const STOP_GRACE_PERIOD: Duration = Duration::from_millis(250);
const MAX_ETHERNET_FRAME: usize = 1514;

/// Which of a session's timers an effect/message refers to, unifying the EAP and MAB FSMs'
/// separate timer vocabularies into one key space for the runner's job table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerLabel {
    /// Retransmission of the outstanding EAP Request (EAP sessions only).
    Retrans,
    /// Wait for the AAA server's reply.
    Aaa,
    /// Reauthentication at Session-Timeout.
    Session,
}

impl From<eap_fsm::TimerKind> for TimerLabel {
    fn from(kind: eap_fsm::TimerKind) -> Self {
        match kind {
            eap_fsm::TimerKind::Retrans => Self::Retrans,
            eap_fsm::TimerKind::Aaa => Self::Aaa,
            eap_fsm::TimerKind::Session => Self::Session,
        }
    }
}

/// A side effect `DispatcherCore` asks the runner to carry out.
#[derive(Debug)]
pub enum Effect {
    /// Send an EAPOL frame on the wire, wrapped in an Ethernet II header.
    SendEap {
        /// Destination MAC.
        dst: MacAddress,
        /// Source MAC (the port's own address).
        src: MacAddress,
        /// The EAPOL frame to send.
        eapol: EapolFrame,
    },
    /// Send an already-encoded RADIUS packet to the configured server.
    SendRadius(Vec<u8>),
    /// (Re)start a per-session timer.
    ScheduleTimer {
        /// The port the timer belongs to.
        port: PortId,
        /// Which timer.
        label: TimerLabel,
        /// Delay from now.
        delay: Duration,
    },
    /// Cancel a per-session timer, if still pending.
    CancelTimer {
        /// The port the timer belongs to.
        port: PortId,
        /// Which timer.
        label: TimerLabel,
    },
    /// (Re)schedule the port's preemptive Identity Request.
    SchedulePreemptiveIdentity {
        /// The port.
        port: PortId,
        /// Delay from now.
        delay: Duration,
    },
    /// Cancel the port's preemptive Identity Request job.
    CancelPreemptiveIdentity {
        /// The port.
        port: PortId,
    },
    /// A session succeeded; invoke the configured success callback.
    AuthSuccess {
        /// Client's MAC address.
        mac: MacAddress,
        /// The port the client authenticated on.
        port: PortId,
        /// Session-Timeout to reauthenticate after, seconds.
        session_timeout: u32,
    },
    /// A session failed; invoke the configured failure callback.
    AuthFailure {
        /// Client's MAC address.
        mac: MacAddress,
        /// The port the client was on.
        port: PortId,
    },
    /// A client logged off; invoke the configured logoff callback.
    AuthLogoff {
        /// Client's MAC address.
        mac: MacAddress,
        /// The port the client was on.
        port: PortId,
    },
}

enum SessionMachine {
    Eap(FullEapStateMachine),
    Mab(MacAuthenticationBypassStateMachine),
}

impl SessionMachine {
    fn client_mac(&self) -> Option<MacAddress> {
        match self {
            Self::Eap(fsm) => fsm.client_mac(),
            Self::Mab(fsm) => fsm.client_mac(),
        }
    }
}

/// The synchronous, pure half of the dispatcher: session table, port status, and the RADIUS
/// identifier/correlation lifecycle. No socket or timer handle is reachable from here, so every
/// method runs to completion without an `.await` point — which is what makes `port_down` (§4.7's
/// atomicity requirement) trivially atomic: it is simply not possible for another event to be
/// interleaved partway through it.
pub struct DispatcherCore {
    radius: RadiusLifecycle,
    sessions: HashMap<PortId, SessionMachine>,
    port_status: HashMap<PortId, bool>,
    port_to_eapol_id: HashMap<PortId, u8>,
    port_up_identity_wait: Duration,
    preemptive_identity_interval: Duration,
}

impl DispatcherCore {
    /// Builds a core from configuration. Owns no socket or scheduler handle.
    #[must_use]
    pub fn new(config: &DaemonConfig) -> Self {
        Self {
            radius: RadiusLifecycle::new(config.radius.secret.clone().into_bytes(), config.chewie_id.clone()),
            sessions: HashMap::new(),
            port_status: HashMap::new(),
            port_to_eapol_id: HashMap::new(),
            port_up_identity_wait: Duration::from_secs(config.timers.port_up_identity_wait_secs),
            preemptive_identity_interval: Duration::from_secs(config.timers.preemptive_identity_interval_secs),
        }
    }

    /// Inbound raw Ethernet bytes off the EAPOL socket.
    pub fn handle_eapol_bytes(&mut self, bytes: &[u8]) -> Vec<Effect> {
        let (src_mac, _dst_mac, frame) = match eapol_codec::parse_ethernet(bytes) {
            Ok(v) => v,
            Err(error) => {
                tracing::warn!(%error, "dropping malformed EAPOL frame");
                return Vec::new();
            }
        };
        let Some(port) = self.single_enabled_port() else {
            tracing::warn!(%src_mac, "EAPOL frame arrived with zero or multiple enabled ports, dropping");
            return Vec::new();
        };
        self.deliver_eap_event(port, src_mac, EapEvent::EapolFrameReceived(frame))
    }

    /// A DHCP discover frame's source MAC, off the MAB socket.
    pub fn handle_dhcp_mac(&mut self, mac: MacAddress) -> Vec<Effect> {
        let Some(port) = self.single_enabled_port() else {
            tracing::warn!(%mac, "DHCP frame arrived with zero or multiple enabled ports, dropping");
            return Vec::new();
        };
        if matches!(self.sessions.get(&port), Some(SessionMachine::Eap(_))) {
            tracing::warn!(%port, "dropping DHCP frame: port already owns an EAP session");
            return Vec::new();
        }

        let mut commands = Vec::new();
        if !matches!(self.sessions.get(&port), Some(SessionMachine::Mab(_))) {
            let mut fsm = MacAuthenticationBypassStateMachine::new(port);
            commands.extend(fsm.event(MabEvent::PortStatusChange { enabled: true }));
            self.sessions.insert(port, SessionMachine::Mab(fsm));
        }
        let Some(SessionMachine::Mab(fsm)) = self.sessions.get_mut(&port) else {
            unreachable!("just inserted or matched a MAB session");
        };
        commands.extend(fsm.event(MabEvent::DhcpFrameReceived(mac)));
        self.apply_mab_commands(port, commands)
    }

    /// An inbound RADIUS reply's raw bytes, off the RADIUS socket.
    pub fn handle_radius_bytes(&mut self, bytes: &[u8]) -> Vec<Effect> {
        let reply = match self.radius.process_inbound(bytes) {
            Ok(Some(reply)) => reply,
            Ok(None) => return Vec::new(),
            Err(error) => {
                tracing::warn!(%error, "dropping invalid RADIUS reply");
                return Vec::new();
            }
        };
        let port = reply.session_key;
        match self.sessions.get_mut(&port) {
            Some(SessionMachine::Eap(fsm)) => {
                let commands = fsm.event(EapEvent::RadiusReply(reply));
                self.apply_eap_commands(port, commands)
            }
            Some(SessionMachine::Mab(fsm)) => {
                let commands = fsm.event(MabEvent::RadiusReply(reply));
                self.apply_mab_commands(port, commands)
            }
            None => {
                tracing::warn!(%port, "RADIUS reply for a session that no longer exists");
                Vec::new()
            }
        }
    }

    /// A session timer fired.
    pub fn handle_timer(&mut self, port: PortId, label: TimerLabel) -> Vec<Effect> {
        match self.sessions.get_mut(&port) {
            Some(SessionMachine::Eap(fsm)) => {
                let event = match label {
                    TimerLabel::Retrans => EapEvent::RetransTimerExpired,
                    TimerLabel::Aaa => EapEvent::AaaTimerExpired,
                    TimerLabel::Session => EapEvent::SessionTimerExpired,
                };
                let commands = fsm.event(event);
                self.apply_eap_commands(port, commands)
            }
            Some(SessionMachine::Mab(fsm)) => {
                let event = match label {
                    TimerLabel::Aaa => MabEvent::AaaTimerExpired,
                    TimerLabel::Session => MabEvent::SessionTimerExpired,
                    TimerLabel::Retrans => return Vec::new(),
                };
                let commands = fsm.event(event);
                self.apply_mab_commands(port, commands)
            }
            None => Vec::new(),
        }
    }

    /// Marks `port` enabled and schedules its first preemptive Identity Request.
    pub fn port_up(&mut self, port: PortId) -> Vec<Effect> {
        self.port_status.insert(port, true);
        vec![Effect::SchedulePreemptiveIdentity {
            port,
            delay: self.port_up_identity_wait,
        }]
    }

    /// Atomically clears a port's session, in-flight RADIUS requests, and preemptive-id state,
    /// and asks the runner to cancel every timer and job associated with it.
    pub fn port_down(&mut self, port: PortId) -> Vec<Effect> {
        self.port_status.insert(port, false);
        self.port_to_eapol_id.remove(&port);
        self.radius.forget_session(port);
        if let Some(session) = self.sessions.remove(&port) {
            match session {
                SessionMachine::Eap(mut fsm) => {
                    fsm.event(EapEvent::PortStatusChange { enabled: false });
                }
                SessionMachine::Mab(mut fsm) => {
                    fsm.event(MabEvent::PortStatusChange { enabled: false });
                }
            }
        }
        vec![
            Effect::CancelTimer { port, label: TimerLabel::Retrans },
            Effect::CancelTimer { port, label: TimerLabel::Aaa },
            Effect::CancelTimer { port, label: TimerLabel::Session },
            Effect::CancelPreemptiveIdentity { port },
        ]
    }

    /// The port's preemptive-identity job fired: if no session is currently progressing, emit a
    /// broadcast Identity Request with a fresh id; always reschedule.
    pub fn fire_preemptive_identity(&mut self, port: PortId) -> Vec<Effect> {
        if !self.port_status.get(&port).copied().unwrap_or(false) {
            return Vec::new();
        }

        let in_progress = matches!(
            self.sessions.get(&port),
            Some(SessionMachine::Eap(fsm)) if !matches!(
                fsm.state(),
                EapState::Disabled | EapState::Initialize | EapState::Failure
                    | EapState::TimeoutFailure | EapState::Logoff
            )
        );

        let mut effects = Vec::new();
        if !in_progress {
            let id = self.pick_preemptive_id(port);
            self.port_to_eapol_id.insert(port, id);
            let request = EapFrame::identity_request(id, "");
            let eapol = EapolFrame::eap_packet(eap_codec::pack(&request));
            effects.push(Effect::SendEap {
                dst: MacAddress::pae_group(),
                src: port.mac(),
                eapol,
            });
        }
        effects.push(Effect::SchedulePreemptiveIdentity {
            port,
            delay: self.preemptive_identity_interval,
        });
        effects
    }

    fn deliver_eap_event(&mut self, port: PortId, src_mac: MacAddress, event: EapEvent) -> Vec<Effect> {
        if matches!(self.sessions.get(&port), Some(SessionMachine::Mab(_))) {
            tracing::warn!(%port, "dropping EAPOL frame: port already owns a MAB session");
            return Vec::new();
        }

        if !matches!(self.sessions.get(&port), Some(SessionMachine::Eap(_))) {
            if let Some((preemptive_id, frame)) = self.as_preemptive_response(port, &event) {
                let mut fsm = FullEapStateMachine::new(port);
                fsm.set_client_mac(src_mac);
                let commands = fsm.event(EapEvent::PreemptiveResponseReceived { preemptive_id, frame });
                self.sessions.insert(port, SessionMachine::Eap(fsm));
                return self.apply_eap_commands(port, commands);
            }

            let mut fsm = FullEapStateMachine::new(port);
            fsm.set_client_mac(src_mac);
            let commands = fsm.event(EapEvent::PortStatusChange { enabled: true });
            self.sessions.insert(port, SessionMachine::Eap(fsm));
            let mut effects = self.apply_eap_commands(port, commands);

            let Some(SessionMachine::Eap(fsm)) = self.sessions.get_mut(&port) else {
                unreachable!("just inserted an EAP session");
            };
            fsm.set_client_mac(src_mac);
            let commands = fsm.event(event);
            effects.extend(self.apply_eap_commands(port, commands));
            return effects;
        }

        let Some(SessionMachine::Eap(fsm)) = self.sessions.get_mut(&port) else {
            unreachable!("just matched an EAP session");
        };
        fsm.set_client_mac(src_mac);
        let commands = fsm.event(event);
        self.apply_eap_commands(port, commands)
    }

    /// If `port` has no session yet and `event` is an EAP Response whose identifier matches the
    /// id of an outstanding preemptive broadcast on that port, returns the id and frame so the
    /// caller can route it through `EapEvent::PreemptiveResponseReceived` instead of restarting.
    fn as_preemptive_response(&self, port: PortId, event: &EapEvent) -> Option<(u8, EapolFrame)> {
        let EapEvent::EapolFrameReceived(frame) = event else {
            return None;
        };
        if frame.packet_type != EapolType::EapPacket {
            return None;
        }
        let eap = eap_codec::parse(&frame.body).ok()?;
        if eap.code != EapCode::Response {
            return None;
        }
        let preemptive_id = *self.port_to_eapol_id.get(&port)?;
        (eap.identifier == preemptive_id).then(|| (preemptive_id, frame.clone()))
    }

    fn apply_eap_commands(&mut self, port: PortId, commands: Vec<eap_fsm::Command>) -> Vec<Effect> {
        let mac = self.sessions.get(&port).and_then(SessionMachine::client_mac);
        let mut effects = Vec::with_capacity(commands.len());
        for command in commands {
            match command {
                eap_fsm::Command::SendEapolToClient(eapol) => effects.push(Effect::SendEap {
                    dst: mac.unwrap_or_else(MacAddress::pae_group),
                    src: port.mac(),
                    eapol,
                }),
                eap_fsm::Command::ForwardToRadius {
                    eap_bytes,
                    pending_eap_id,
                    identity,
                    radius_state,
                } => {
                    let Some(mac) = mac else {
                        tracing::warn!(%port, "cannot forward to RADIUS: no client MAC known yet");
                        continue;
                    };
                    match self.radius.build_access_request(
                        port,
                        mac,
                        identity.as_deref(),
                        &eap_bytes,
                        pending_eap_id,
                        radius_state,
                    ) {
                        Ok((_, bytes)) => effects.push(Effect::SendRadius(bytes)),
                        Err(error) => tracing::warn!(%error, %port, "failed to build Access-Request"),
                    }
                }
                eap_fsm::Command::ScheduleTimer { kind, delay } => {
                    effects.push(Effect::ScheduleTimer { port, label: kind.into(), delay });
                }
                eap_fsm::Command::CancelTimer(kind) => {
                    effects.push(Effect::CancelTimer { port, label: kind.into() });
                }
                eap_fsm::Command::AuthSuccess { mac, port, session_timeout } => {
                    effects.push(Effect::AuthSuccess { mac, port, session_timeout });
                }
                eap_fsm::Command::AuthFailure { mac, port } => {
                    effects.push(Effect::AuthFailure { mac, port });
                }
                eap_fsm::Command::AuthLogoff { mac, port } => {
                    effects.push(Effect::AuthLogoff { mac, port });
                }
            }
        }
        effects
    }

    fn apply_mab_commands(&mut self, port: PortId, commands: Vec<mab_fsm::Command>) -> Vec<Effect> {
        let mac = self.sessions.get(&port).and_then(SessionMachine::client_mac);
        let mut effects = Vec::with_capacity(commands.len());
        for command in commands {
            match command {
                mab_fsm::Command::ForwardToRadius { mac } => {
                    match self.radius.build_mab_access_request(port, mac) {
                        Ok((_, bytes)) => effects.push(Effect::SendRadius(bytes)),
                        Err(error) => tracing::warn!(%error, %port, "failed to build MAB Access-Request"),
                    }
                }
                mab_fsm::Command::ScheduleAaaTimer => effects.push(Effect::ScheduleTimer {
                    port,
                    label: TimerLabel::Aaa,
                    delay: Duration::from_secs(mab_fsm::AAA_WHILE_SECS),
                }),
                mab_fsm::Command::CancelAaaTimer => {
                    effects.push(Effect::CancelTimer { port, label: TimerLabel::Aaa });
                }
                mab_fsm::Command::ScheduleSessionTimer { delay } => {
                    effects.push(Effect::ScheduleTimer { port, label: TimerLabel::Session, delay });
                }
                mab_fsm::Command::AuthSuccess { mac, port, session_timeout } => {
                    effects.push(Effect::AuthSuccess { mac, port, session_timeout });
                }
                mab_fsm::Command::AuthFailure { mac, port } => {
                    effects.push(Effect::AuthFailure { mac, port });
                }
            }
        }
        let _ = mac;
        effects
    }

    fn pick_preemptive_id(&self, port: PortId) -> u8 {
        let mut candidate = self.port_to_eapol_id.get(&port).copied().unwrap_or(0).wrapping_add(1);
        let blocked = match self.sessions.get(&port) {
            Some(SessionMachine::Eap(fsm)) if !fsm.is_terminal() => Some(fsm.current_id()),
            _ => None,
        };
        for _ in 0..=u8::MAX {
            if blocked != Some(candidate) {
                return candidate;
            }
            candidate = candidate.wrapping_add(1);
        }
        tracing::warn!(%port, candidate, "exhausted 256 draws picking a collision-free preemptive id, proceeding anyway");
        candidate
    }

    fn single_enabled_port(&self) -> Option<PortId> {
        let mut enabled = self.port_status.iter().filter(|(_, &on)| on).map(|(port, _)| *port);
        let first = enabled.next()?;
        if enabled.next().is_some() {
            None
        } else {
            Some(first)
        }
    }
}

/// The three callbacks an embedder supplies (§6's embedding API).
#[derive(Clone)]
pub struct Callbacks {
    /// Invoked once per successful authentication.
    pub auth_success: Arc<dyn Fn(MacAddress, PortId, u32) + Send + Sync>,
    /// Invoked once per failed or timed-out authentication.
    pub auth_failure: Arc<dyn Fn(MacAddress, PortId) + Send + Sync>,
    /// Invoked once per EAPOL-Logoff.
    pub auth_logoff: Arc<dyn Fn(MacAddress, PortId) + Send + Sync>,
}

enum Msg {
    Eapol(Vec<u8>),
    Dhcp(MacAddress),
    Radius(Vec<u8>),
    PortUp(PortId),
    PortDown(PortId),
    Timer(PortId, TimerLabel),
    PreemptiveIdentity(PortId),
    SocketFailed(dot8021x_types::Error),
    Stop,
}

/// A cheap, cloneable handle for driving a running dispatcher: `port_up`/`port_down`/`stop`
/// (§6's runtime surface). Calling these before the paired [`DispatcherRunner::run`] starts is
/// safe; the messages simply queue.
#[derive(Clone)]
pub struct Dispatcher {
    tx: UnboundedSender<Msg>,
    running: Arc<AtomicBool>,
}

impl Dispatcher {
    /// Signals that `port` has come up.
    pub fn port_up(&self, port: PortId) {
        let _ = self.tx.send(Msg::PortUp(port));
    }

    /// Signals that `port` has gone down; clears its session atomically.
    pub fn port_down(&self, port: PortId) {
        let _ = self.tx.send(Msg::PortDown(port));
    }

    /// Requests a graceful shutdown (§5's cancellation model, §10.6's grace window).
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.tx.send(Msg::Stop);
    }

    /// True until `stop()` has been called.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Owns the sockets, the timer scheduler, and the outbound queues; interprets the `Effect`s
/// `DispatcherCore` produces. Consumed by [`DispatcherRunner::run`].
pub struct DispatcherRunner {
    core: DispatcherCore,
    eap_socket: Arc<EapSocket>,
    mab_socket: Arc<MabSocket>,
    radius_socket: Arc<RadiusSocket>,
    scheduler: TimerScheduler,
    eap_outbound: BoundedQueue<Vec<u8>>,
    radius_outbound: BoundedQueue<Vec<u8>>,
    timer_jobs: HashMap<(PortId, TimerLabel), JobHandle>,
    preemptive_jobs: HashMap<PortId, JobHandle>,
    callbacks: Callbacks,
    rx: UnboundedReceiver<Msg>,
    tx: UnboundedSender<Msg>,
    running: Arc<AtomicBool>,
}

impl DispatcherRunner {
    /// Opens the three sockets (§4.3) and builds a dispatcher bound to them, returning a handle
    /// usable before and during `run()`.
    ///
    /// # Errors
    /// Returns whatever socket setup fails with: interface lookup, promiscuous join, or the
    /// RADIUS UDP bind/connect.
    pub async fn new(config: DaemonConfig, callbacks: Callbacks) -> Result<(Dispatcher, Self)> {
        let eap_socket = Arc::new(EapSocket::open(&config.interface)?);
        let mab_socket = Arc::new(MabSocket::open(&config.interface)?);
        let radius_addr = SocketAddr::new(config.radius.server_ip, config.radius.server_port);
        let radius_socket = Arc::new(RadiusSocket::connect(radius_addr).await?);

        let core = DispatcherCore::new(&config);
        let (tx, rx) = mpsc::unbounded_channel();
        let running = Arc::new(AtomicBool::new(true));

        let handle = Dispatcher {
            tx: tx.clone(),
            running: running.clone(),
        };
        let runner = Self {
            core,
            eap_socket,
            mab_socket,
            radius_socket,
            scheduler: TimerScheduler::new(),
            eap_outbound: BoundedQueue::new("eap_outbound", OUTBOUND_QUEUE_CAPACITY),
            radius_outbound: BoundedQueue::new("radius_outbound", OUTBOUND_QUEUE_CAPACITY),
            timer_jobs: HashMap::new(),
            preemptive_jobs: HashMap::new(),
            callbacks,
            rx,
            tx,
            running,
        };
        Ok((handle, runner))
    }

    /// Spawns the five I/O loops and the timer loop, then drives the dispatcher until `stop()`
    /// is called or a socket fails fatally.
    ///
    /// # Errors
    /// Returns the first fatal socket error (§7: `SocketError`/`Io` propagate; everything else
    /// is logged and absorbed).
    pub async fn run(mut self) -> Result<()> {
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        tasks.push(self.spawn_eapol_reader());
        tasks.push(self.spawn_dhcp_reader());
        tasks.push(self.spawn_radius_reader());
        tasks.push(self.spawn_eap_writer());
        tasks.push(self.spawn_radius_writer());
        tasks.push(tokio::spawn({
            let scheduler = self.scheduler.clone();
            async move { scheduler.run().await }
        }));

        let mut fatal: Option<dot8021x_types::Error> = None;
        while let Some(msg) = self.rx.recv().await {
            match msg {
                Msg::Eapol(bytes) => {
                    let effects = self.core.handle_eapol_bytes(&bytes);
                    self.apply_effects(effects);
                }
                Msg::Dhcp(mac) => {
                    let effects = self.core.handle_dhcp_mac(mac);
                    self.apply_effects(effects);
                }
                Msg::Radius(bytes) => {
                    let effects = self.core.handle_radius_bytes(&bytes);
                    self.apply_effects(effects);
                }
                Msg::PortUp(port) => {
                    let effects = self.core.port_up(port);
                    self.apply_effects(effects);
                }
                Msg::PortDown(port) => {
                    let effects = self.core.port_down(port);
                    self.apply_effects(effects);
                }
                Msg::Timer(port, label) => {
                    let effects = self.core.handle_timer(port, label);
                    self.apply_effects(effects);
                }
                Msg::PreemptiveIdentity(port) => {
                    let effects = self.core.fire_preemptive_identity(port);
                    self.apply_effects(effects);
                }
                Msg::SocketFailed(error) => {
                    tracing::error!(%error, "socket failed fatally, stopping dispatcher");
                    self.running.store(false, Ordering::SeqCst);
                    fatal = Some(error);
                    break;
                }
                Msg::Stop => break,
            }
        }

        tokio::time::sleep(STOP_GRACE_PERIOD).await;
        for task in tasks {
            task.abort();
        }

        match fatal {
            Some(error) => Err(DaemonError::from(error)),
            None => Ok(()),
        }
    }

    fn spawn_eapol_reader(&self) -> JoinHandle<()> {
        let socket = self.eap_socket.clone();
        let tx = self.tx.clone();
        let running = self.running.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; MAX_ETHERNET_FRAME];
            while running.load(Ordering::SeqCst) {
                match socket.recv(&mut buf).await {
                    Ok(n) => {
                        if tx.send(Msg::Eapol(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        let _ = tx.send(Msg::SocketFailed(error));
                        break;
                    }
                }
            }
        })
    }

    fn spawn_dhcp_reader(&self) -> JoinHandle<()> {
        let socket = self.mab_socket.clone();
        let tx = self.tx.clone();
        let running = self.running.clone();
        tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                match socket.recv_dhcp_discover().await {
                    Ok(mac) => {
                        if tx.send(Msg::Dhcp(mac)).is_err() {
                            break;
                        }
                    }
                    // A single malformed-looking frame is logged and skipped (Open Question
                    // (b)); only a socket-level failure is fatal.
                    Err(error) if error.is_fatal() => {
                        let _ = tx.send(Msg::SocketFailed(error));
                        break;
                    }
                    Err(error) => tracing::warn!(%error, "dropping a malformed DHCP-looking frame"),
                }
            }
        })
    }

    fn spawn_radius_reader(&self) -> JoinHandle<()> {
        let socket = self.radius_socket.clone();
        let tx = self.tx.clone();
        let running = self.running.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; dot8021x_net::MAX_RADIUS_PACKET];
            while running.load(Ordering::SeqCst) {
                match socket.recv(&mut buf).await {
                    Ok(n) => {
                        if tx.send(Msg::Radius(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        let _ = tx.send(Msg::SocketFailed(error));
                        break;
                    }
                }
            }
        })
    }

    fn spawn_eap_writer(&self) -> JoinHandle<()> {
        let socket = self.eap_socket.clone();
        let queue = self.eap_outbound.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            loop {
                let frame = queue.pop().await;
                if let Err(error) = socket.send(&frame).await {
                    let _ = tx.send(Msg::SocketFailed(error));
                    break;
                }
            }
        })
    }

    fn spawn_radius_writer(&self) -> JoinHandle<()> {
        let socket = self.radius_socket.clone();
        let queue = self.radius_outbound.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            loop {
                let packet = queue.pop().await;
                if let Err(error) = socket.send(&packet).await {
                    let _ = tx.send(Msg::SocketFailed(error));
                    break;
                }
            }
        })
    }

    fn apply_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::SendEap { dst, src, eapol } => {
                    self.eap_outbound.push(eapol_codec::pack_ethernet(&eapol, dst, src));
                }
                Effect::SendRadius(bytes) => self.radius_outbound.push(bytes),
                Effect::ScheduleTimer { port, label, delay } => self.schedule_timer(port, label, delay),
                Effect::CancelTimer { port, label } => {
                    if let Some(job) = self.timer_jobs.remove(&(port, label)) {
                        job.cancel();
                    }
                }
                Effect::SchedulePreemptiveIdentity { port, delay } => self.schedule_preemptive(port, delay),
                Effect::CancelPreemptiveIdentity { port } => {
                    if let Some(job) = self.preemptive_jobs.remove(&port) {
                        job.cancel();
                    }
                }
                Effect::AuthSuccess { mac, port, session_timeout } => {
                    tracing::info!(%mac, %port, session_timeout, "auth_success");
                    (self.callbacks.auth_success)(mac, port, session_timeout);
                }
                Effect::AuthFailure { mac, port } => {
                    tracing::info!(%mac, %port, "auth_failure");
                    (self.callbacks.auth_failure)(mac, port);
                }
                Effect::AuthLogoff { mac, port } => {
                    tracing::info!(%mac, %port, "auth_logoff");
                    (self.callbacks.auth_logoff)(mac, port);
                }
            }
        }
    }

    fn schedule_timer(&mut self, port: PortId, label: TimerLabel, delay: Duration) {
        if let Some(job) = self.timer_jobs.remove(&(port, label)) {
            job.cancel();
        }
        let tx = self.tx.clone();
        let job = self.scheduler.call_later(delay, move || {
            let _ = tx.send(Msg::Timer(port, label));
        });
        self.timer_jobs.insert((port, label), job);
    }

    fn schedule_preemptive(&mut self, port: PortId, delay: Duration) {
        if let Some(job) = self.preemptive_jobs.remove(&port) {
            job.cancel();
        }
        let tx = self.tx.clone();
        let job = self.scheduler.call_later(delay, move || {
            let _ = tx.send(Msg::PreemptiveIdentity(port));
        });
        self.preemptive_jobs.insert(port, job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dot8021x_fsm::RadiusReplyEvent;
    use dot8021x_types::{RadiusAttribute, RadiusCode, RadiusPacket};

    fn config() -> DaemonConfig {
        DaemonConfig {
            interface: "eth0".to_string(),
            radius: crate::config::RadiusConfig {
                server_ip: "127.0.0.1".parse().unwrap(),
                server_port: 1812,
                secret: "s3cret".to_string(),
            },
            chewie_id: "44-44-44-44-44-44:".to_string(),
            timers: crate::config::TimersConfig::default(),
            general: crate::config::GeneralConfig::default(),
        }
    }

    fn port() -> PortId {
        "00:00:00:00:00:01".parse().unwrap()
    }

    fn client_mac() -> MacAddress {
        "aa:bb:cc:dd:ee:ff".parse().unwrap()
    }

    #[test]
    fn preemptive_identity_is_suppressed_once_a_port_is_disabled() {
        let mut core = DispatcherCore::new(&config());
        let effects = core.port_up(port());
        assert!(matches!(effects[0], Effect::SchedulePreemptiveIdentity { .. }));

        core.port_down(port());
        let effects = core.fire_preemptive_identity(port());
        assert!(effects.is_empty());
    }

    #[test]
    fn port_up_then_fire_broadcasts_an_identity_request() {
        let mut core = DispatcherCore::new(&config());
        core.port_up(port());
        let effects = core.fire_preemptive_identity(port());
        assert!(effects.iter().any(|e| matches!(e, Effect::SendEap { dst, .. } if *dst == MacAddress::pae_group())));
        assert!(effects.iter().any(|e| matches!(e, Effect::SchedulePreemptiveIdentity { .. })));
    }

    #[test]
    fn an_eapol_frame_lazily_creates_an_eap_session_and_issues_a_request() {
        let mut core = DispatcherCore::new(&config());
        core.port_up(port());

        let start = EapolFrame {
            version: 1,
            packet_type: dot8021x_types::EapolType::Start,
            body: Vec::new(),
        };
        let bytes = eapol_codec::pack_ethernet(&start, port().mac(), client_mac());
        let effects = core.handle_eapol_bytes(&bytes);
        assert!(effects.iter().any(|e| matches!(e, Effect::SendEap { .. })));
        assert!(effects.iter().any(|e| matches!(e, Effect::ScheduleTimer { label: TimerLabel::Retrans, .. })));
    }

    #[test]
    fn a_dhcp_frame_builds_a_mab_access_request() {
        let mut core = DispatcherCore::new(&config());
        core.port_up(port());
        let effects = core.handle_dhcp_mac(client_mac());
        assert!(effects.iter().any(|e| matches!(e, Effect::SendRadius(_))));
        assert!(effects.iter().any(|e| matches!(e, Effect::ScheduleTimer { label: TimerLabel::Aaa, .. })));
    }

    #[test]
    fn a_port_already_running_eap_rejects_a_dhcp_frame() {
        let mut core = DispatcherCore::new(&config());
        core.port_up(port());
        let start = EapolFrame {
            version: 1,
            packet_type: dot8021x_types::EapolType::Start,
            body: Vec::new(),
        };
        let bytes = eapol_codec::pack_ethernet(&start, port().mac(), client_mac());
        core.handle_eapol_bytes(&bytes);

        let effects = core.handle_dhcp_mac(client_mac());
        assert!(effects.is_empty());
    }

    #[test]
    fn a_radius_accept_for_a_mab_session_fires_auth_success() {
        // Wire-level signature verification is already covered in `radius_lifecycle` and
        // `dot8021x_codec::radius`; this exercises the dispatcher's own wiring from an FSM
        // command to an `Effect`, so it drives the session's FSM directly rather than round
        // tripping a freshly-signed packet through `handle_radius_bytes`.
        let mut core = DispatcherCore::new(&config());
        core.port_up(port());
        core.handle_dhcp_mac(client_mac());

        let reply = RadiusReplyEvent {
            session_key: port(),
            pending_eap_id: None,
            packet: RadiusPacket {
                code: RadiusCode::AccessAccept,
                identifier: 0,
                authenticator: [0; 16],
                attributes: vec![RadiusAttribute::SessionTimeout(1800)],
            },
        };
        let Some(SessionMachine::Mab(fsm)) = core.sessions.get_mut(&port()) else {
            panic!("expected a MAB session after a DHCP frame");
        };
        let commands = fsm.event(MabEvent::RadiusReply(reply));
        let effects = core.apply_mab_commands(port(), commands);
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::AuthSuccess { session_timeout: 1800, .. }
        )));
    }

    #[test]
    fn port_down_clears_the_session_table() {
        let mut core = DispatcherCore::new(&config());
        core.port_up(port());
        core.handle_dhcp_mac(client_mac());
        assert!(core.sessions.contains_key(&port()));

        core.port_down(port());
        assert!(!core.sessions.contains_key(&port()));
        assert_eq!(core.radius.in_flight_count(), 0);
    }
}
