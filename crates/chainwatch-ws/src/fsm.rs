//! Connection lifecycle state machine.
//!
//! State transitions:
//! - `Disconnected` → `Connecting`:  start, or the reconnect timer fired
//! - `Connecting`   → `Open`:        handshake completed
//! - `Connecting | Open` → `Disconnected`: handshake failed / transport lost,
//!   reconnect scheduled after `backoff.delay(attempts)`
//! - `Connecting | Open` → `Terminated`: lost with the attempt ceiling reached (fatal)
//! - any live state → `Closing` → `Terminated`: deliberate stop
//!
//! The machine performs no I/O. [`ConnectionFsm::handle`] returns the
//! [`Action`]s the driver must carry out, which keeps every transition
//! testable without a socket.

use std::time::Duration;

use chainwatch_core::config::ConnectionConfig;
use chainwatch_core::policy::BackoffPolicy;

use crate::error::ConnectionError;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
    /// Stopped deliberately or gave up; no further transitions.
    Terminated,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closing => write!(f, "closing"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Inputs to the state machine, delivered one at a time.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Start,
    ReconnectDue,
    Opened,
    PingReceived(Vec<u8>),
    PongReceived,
    KeepaliveTick,
    /// A ping went unanswered for the configured pong timeout.
    PongOverdue,
    Closed(ConnectionError),
    Stop,
}

/// Side effects requested by the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Open the transport.
    Connect,
    /// Send the subscribe request for `subscriptions[index]` after `delay`.
    SendSubscribe { index: usize, delay: Duration },
    StartKeepalive,
    StopKeepalive,
    SendPing,
    SendPong(Vec<u8>),
    /// Replace any pending reconnect timer with one firing after `delay`.
    ScheduleReconnect { attempt: u32, delay: Duration },
    CancelReconnect,
    /// Send a normal close frame and drop the transport.
    CloseTransport,
    /// The reconnect ceiling was reached.
    Fatal { attempts: u32 },
}

/// Static parameters for the state machine.
#[derive(Debug, Clone)]
pub struct FsmConfig {
    pub subscriptions: usize,
    pub subscribe_stagger: Duration,
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    pub pong_timeout: Option<Duration>,
}

impl FsmConfig {
    pub fn from_connection(config: &ConnectionConfig, subscriptions: usize) -> Self {
        Self {
            subscriptions,
            subscribe_stagger: config.subscribe_stagger(),
            max_attempts: config.max_reconnect_attempts,
            backoff: BackoffPolicy::new(&config.backoff),
            pong_timeout: config.pong_timeout(),
        }
    }
}

/// The connection state machine. See the module docs for transitions.
#[derive(Debug, Clone)]
pub struct ConnectionFsm {
    config: FsmConfig,
    state: ConnectionState,
    attempts: u32,
    reconnect_pending: bool,
    awaiting_pong: bool,
}

impl ConnectionFsm {
    pub fn new(config: FsmConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            attempts: 0,
            reconnect_pending: false,
            awaiting_pong: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Reconnects scheduled since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    /// Apply one event and return the resulting actions, in order.
    pub fn handle(&mut self, event: ConnectionEvent) -> Vec<Action> {
        use ConnectionEvent as E;
        use ConnectionState as S;

        match (self.state, event) {
            (S::Terminated, _) => vec![],

            (S::Disconnected, E::Start) if !self.reconnect_pending => {
                self.state = S::Connecting;
                vec![Action::Connect]
            }
            (S::Disconnected, E::ReconnectDue) if self.reconnect_pending => {
                self.reconnect_pending = false;
                self.state = S::Connecting;
                vec![Action::Connect]
            }

            (S::Connecting, E::Opened) => {
                self.state = S::Open;
                self.attempts = 0;
                self.awaiting_pong = false;
                let mut actions: Vec<Action> = (0..self.config.subscriptions)
                    .map(|index| Action::SendSubscribe {
                        index,
                        delay: self.config.subscribe_stagger * index as u32,
                    })
                    .collect();
                actions.push(Action::StartKeepalive);
                actions
            }

            (S::Connecting | S::Open, E::PingReceived(payload)) => vec![Action::SendPong(payload)],

            (S::Open, E::KeepaliveTick) => {
                if self.awaiting_pong {
                    tracing::warn!("no pong received since the previous keepalive ping");
                }
                self.awaiting_pong = true;
                vec![Action::SendPing]
            }
            (S::Open, E::PongReceived) => {
                self.awaiting_pong = false;
                vec![]
            }
            (S::Open, E::PongOverdue) => match self.config.pong_timeout {
                Some(timeout) => self.on_lost(ConnectionError::PongTimeout {
                    ms: timeout.as_millis() as u64,
                }),
                None => {
                    tracing::warn!("pong overdue");
                    vec![]
                }
            },

            (S::Connecting | S::Open, E::Closed(reason)) => self.on_lost(reason),

            (S::Closing, E::Closed(_)) => {
                self.state = S::Terminated;
                vec![]
            }

            (S::Disconnected, E::Stop) => {
                self.state = S::Terminated;
                self.reconnect_pending = false;
                vec![Action::CancelReconnect]
            }
            (S::Connecting | S::Open, E::Stop) => {
                self.state = S::Closing;
                self.reconnect_pending = false;
                vec![Action::CancelReconnect, Action::StopKeepalive, Action::CloseTransport]
            }

            (state, event) => {
                tracing::trace!(%state, ?event, "event ignored");
                vec![]
            }
        }
    }

    fn on_lost(&mut self, reason: ConnectionError) -> Vec<Action> {
        self.state = ConnectionState::Disconnected;
        self.awaiting_pong = false;
        let mut actions = vec![Action::StopKeepalive];

        if self.attempts < self.config.max_attempts {
            let delay = self.config.backoff.delay(self.attempts);
            self.attempts += 1;
            self.reconnect_pending = true;
            tracing::warn!(
                reason = %reason,
                attempt = self.attempts,
                max_attempts = self.config.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "connection lost, reconnect scheduled"
            );
            actions.push(Action::ScheduleReconnect {
                attempt: self.attempts,
                delay,
            });
        } else {
            self.state = ConnectionState::Terminated;
            self.reconnect_pending = false;
            tracing::error!(
                reason = %reason,
                attempts = self.attempts,
                "reconnect attempts exhausted"
            );
            actions.push(Action::Fatal {
                attempts: self.attempts,
            });
        }
        actions
    }
}
