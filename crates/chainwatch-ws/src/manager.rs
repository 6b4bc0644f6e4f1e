//! The connection driver.
//!
//! [`ConnectionManager`] owns the socket and executes the [`Action`]s the
//! [`ConnectionFsm`] requests. Text frames are forwarded untouched over an
//! unbounded channel; decoding happens in [`route_frames`](crate::route_frames).

use std::collections::VecDeque;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, USER_AGENT};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use chainwatch_core::config::ConnectionConfig;
use chainwatch_core::shutdown::{shutdown_signalled, sleep_until_opt};
use chainwatch_core::types::Subscription;

use crate::decoder::logs_subscribe_request;
use crate::error::ConnectionError;
use crate::fsm::{Action, ConnectionEvent, ConnectionFsm, ConnectionState, FsmConfig};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

const DEFAULT_USER_AGENT: &str = concat!("chainwatch/", env!("CARGO_PKG_VERSION"));

/// A text frame as received from the node.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    pub text: String,
    pub received_at: Instant,
}

/// How [`ConnectionManager::run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionExit {
    /// Shutdown was requested and the socket closed normally.
    Shutdown,
    /// The reconnect ceiling was reached.
    Fatal { attempts: u32 },
}

enum ConnectAbort {
    Failed(ConnectionError),
    Shutdown,
}

/// Keeps one `logsSubscribe` connection alive until shutdown or until the
/// reconnect ceiling is hit.
pub struct ConnectionManager {
    url: String,
    subscriptions: Vec<Subscription>,
    config: ConnectionConfig,
    fsm: ConnectionFsm,
    frames: mpsc::UnboundedSender<InboundFrame>,
    shutdown: watch::Receiver<bool>,
}

impl ConnectionManager {
    /// Build a manager for `url`. Returns the receiving end of the frame channel.
    pub fn new(
        url: impl Into<String>,
        subscriptions: Vec<Subscription>,
        config: ConnectionConfig,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, mpsc::UnboundedReceiver<InboundFrame>) {
        let (frames, rx) = mpsc::unbounded_channel();
        let fsm = ConnectionFsm::new(FsmConfig::from_connection(&config, subscriptions.len()));
        let manager = Self {
            url: url.into(),
            subscriptions,
            config,
            fsm,
            frames,
            shutdown,
        };
        (manager, rx)
    }

    pub fn state(&self) -> ConnectionState {
        self.fsm.state()
    }

    /// Drive the connection until it terminates.
    pub async fn run(mut self) -> ConnectionExit {
        let mut reconnect_at: Option<Instant> = None;
        let mut pending: VecDeque<Action> = self.fsm.handle(ConnectionEvent::Start).into();

        loop {
            while let Some(action) = pending.pop_front() {
                match action {
                    Action::Connect => match self.connect().await {
                        Ok(ws) => {
                            tracing::info!(url = %self.url, "connection open");
                            let opened = self.fsm.handle(ConnectionEvent::Opened);
                            pending.extend(self.serve(ws, opened).await);
                        }
                        Err(ConnectAbort::Failed(e)) => {
                            pending.extend(self.fsm.handle(ConnectionEvent::Closed(e)));
                        }
                        Err(ConnectAbort::Shutdown) => {
                            pending.extend(self.fsm.handle(ConnectionEvent::Stop));
                        }
                    },
                    Action::ScheduleReconnect { attempt, delay } => {
                        tracing::info!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "reconnecting after delay"
                        );
                        reconnect_at = Some(Instant::now() + delay);
                    }
                    Action::CancelReconnect => reconnect_at = None,
                    // No transport exists outside `serve`.
                    Action::CloseTransport => {
                        pending.extend(self.fsm.handle(ConnectionEvent::Closed(ConnectionError::LocalClose)));
                    }
                    Action::Fatal { attempts } => {
                        tracing::error!(url = %self.url, attempts, "giving up on connection");
                        return ConnectionExit::Fatal { attempts };
                    }
                    other => tracing::trace!(action = ?other, "no transport for action"),
                }
            }

            if self.fsm.state() == ConnectionState::Terminated {
                tracing::info!(url = %self.url, "connection closed");
                return ConnectionExit::Shutdown;
            }

            tokio::select! {
                _ = sleep_until_opt(reconnect_at) => {
                    reconnect_at = None;
                    pending.extend(self.fsm.handle(ConnectionEvent::ReconnectDue));
                }
                _ = shutdown_signalled(&mut self.shutdown) => {
                    pending.extend(self.fsm.handle(ConnectionEvent::Stop));
                }
            }
        }
    }

    fn request(&self) -> Result<Request, ConnectionError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ConnectionError::Handshake(e.to_string()))?;
        let agent = self.config.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
        let value = HeaderValue::from_str(agent).map_err(|e| ConnectionError::Handshake(e.to_string()))?;
        request.headers_mut().insert(USER_AGENT, value);
        Ok(request)
    }

    async fn connect(&mut self) -> Result<WsStream, ConnectAbort> {
        let request = self.request().map_err(ConnectAbort::Failed)?;
        let timeout = self.config.handshake_timeout();
        tracing::info!(url = %self.url, "connecting");

        tokio::select! {
            res = time::timeout(timeout, tokio_tungstenite::connect_async(request)) => match res {
                Ok(Ok((ws, _response))) => Ok(ws),
                Ok(Err(e)) => Err(ConnectAbort::Failed(ConnectionError::Handshake(e.to_string()))),
                Err(_) => Err(ConnectAbort::Failed(ConnectionError::HandshakeTimeout {
                    ms: timeout.as_millis() as u64,
                })),
            },
            _ = shutdown_signalled(&mut self.shutdown) => Err(ConnectAbort::Shutdown),
        }
    }

    /// Service an open socket. Returns the actions that need no transport
    /// once the state machine leaves `Open`.
    async fn serve(&mut self, ws: WsStream, opened: Vec<Action>) -> Vec<Action> {
        let (mut sink, mut stream): (WsSink, SplitStream<WsStream>) = ws.split();
        let mut queue: VecDeque<Action> = opened.into();
        let mut leftover = Vec::new();

        let mut keepalive: Option<Interval> = None;
        let mut subscribes: VecDeque<(Instant, usize)> = VecDeque::new();
        let mut pong_deadline: Option<Instant> = None;

        loop {
            while let Some(action) = queue.pop_front() {
                let sent = match action {
                    Action::SendSubscribe { index, delay } => {
                        subscribes.push_back((Instant::now() + delay, index));
                        Ok(())
                    }
                    Action::StartKeepalive => {
                        let period = self.config.keepalive_interval().max(Duration::from_millis(1));
                        let mut interval = time::interval_at(Instant::now() + period, period);
                        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        keepalive = Some(interval);
                        Ok(())
                    }
                    Action::StopKeepalive => {
                        keepalive = None;
                        pong_deadline = None;
                        subscribes.clear();
                        Ok(())
                    }
                    Action::SendPing => {
                        if let Some(timeout) = self.config.pong_timeout() {
                            pong_deadline.get_or_insert(Instant::now() + timeout);
                        }
                        sink.send(Message::Ping(Vec::new())).await
                    }
                    Action::SendPong(payload) => sink.send(Message::Pong(payload)).await,
                    Action::CloseTransport => {
                        let frame = CloseFrame {
                            code: CloseCode::Normal,
                            reason: "shutdown".into(),
                        };
                        if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                            tracing::debug!(error = %e, "close frame not sent");
                        }
                        queue.extend(self.fsm.handle(ConnectionEvent::Closed(ConnectionError::LocalClose)));
                        Ok(())
                    }
                    other => {
                        leftover.push(other);
                        Ok(())
                    }
                };
                if let Err(e) = sent {
                    tracing::warn!(error = %e, "send failed");
                    queue.extend(self.fsm.handle(ConnectionEvent::Closed(ConnectionError::Transport(e.to_string()))));
                }
            }

            if self.fsm.state() != ConnectionState::Open {
                return leftover;
            }

            let event = tokio::select! {
                msg = stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.forward(text),
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => self.forward(text),
                        Err(_) => {
                            tracing::debug!("ignoring non-UTF-8 binary frame");
                            None
                        }
                    },
                    Some(Ok(Message::Ping(payload))) => Some(ConnectionEvent::PingReceived(payload)),
                    Some(Ok(Message::Pong(_))) => {
                        pong_deadline = None;
                        Some(ConnectionEvent::PongReceived)
                    }
                    Some(Ok(Message::Close(frame))) => Some(ConnectionEvent::Closed(match frame {
                        Some(f) => ConnectionError::ClosedByPeer {
                            code: u16::from(f.code),
                            reason: f.reason.into_owned(),
                        },
                        None => ConnectionError::StreamEnded,
                    })),
                    Some(Ok(Message::Frame(_))) => None,
                    Some(Err(e)) => Some(ConnectionEvent::Closed(ConnectionError::Transport(e.to_string()))),
                    None => Some(ConnectionEvent::Closed(ConnectionError::StreamEnded)),
                },
                _ = tick_opt(&mut keepalive) => Some(ConnectionEvent::KeepaliveTick),
                _ = sleep_until_opt(subscribes.front().map(|(at, _)| *at)) => {
                    if let Some((_, index)) = subscribes.pop_front() {
                        self.subscribe(&mut sink, index).await
                    } else {
                        None
                    }
                }
                _ = sleep_until_opt(pong_deadline) => {
                    pong_deadline = None;
                    Some(ConnectionEvent::PongOverdue)
                }
                _ = shutdown_signalled(&mut self.shutdown) => Some(ConnectionEvent::Stop),
            };

            if let Some(event) = event {
                queue.extend(self.fsm.handle(event));
            }
        }
    }

    async fn subscribe(&self, sink: &mut WsSink, index: usize) -> Option<ConnectionEvent> {
        let subscription = self.subscriptions.get(index)?;
        let id = index as u64 + 1;
        let text = logs_subscribe_request(id, subscription);
        match sink.send(Message::Text(text)).await {
            Ok(()) => {
                tracing::info!(id, filter = ?subscription.filter, commitment = %subscription.commitment, "subscribe sent");
                None
            }
            Err(e) => Some(ConnectionEvent::Closed(ConnectionError::Transport(e.to_string()))),
        }
    }

    fn forward(&self, text: String) -> Option<ConnectionEvent> {
        let frame = InboundFrame {
            text,
            received_at: Instant::now(),
        };
        if self.frames.send(frame).is_err() {
            tracing::warn!("frame consumer dropped, stopping");
            return Some(ConnectionEvent::Stop);
        }
        None
    }
}

async fn tick_opt(interval: &mut Option<Interval>) {
    match interval {
        Some(i) => {
            i.tick().await;
        }
        None => std::future::pending().await,
    }
}
