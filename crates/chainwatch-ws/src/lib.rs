//! chainwatch-ws: the streaming side of ChainWatch.
//!
//! # Features
//! - `logsSubscribe` request building and frame decoding
//! - Explicit connection state machine ([`ConnectionFsm`])
//! - Auto-reconnect with capped exponential backoff and an attempt ceiling
//! - Staggered re-subscribe after every reconnect
//! - Keepalive pings, immediate pong replies, optional pong timeout
//! - Frame routing into the [`Pipeline`](chainwatch_core::Pipeline)

pub mod decoder;
pub mod error;
pub mod fsm;
pub mod manager;
pub mod request;
pub mod router;

pub use decoder::{decode, logs_subscribe_request, Frame};
pub use error::{ConnectionError, DecodeError};
pub use fsm::{Action, ConnectionEvent, ConnectionFsm, ConnectionState, FsmConfig};
pub use manager::{ConnectionExit, ConnectionManager, InboundFrame};
pub use router::{route_frames, RouterStats};
