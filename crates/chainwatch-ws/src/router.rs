//! Frame routing: decode inbound frames and hand notifications to the pipeline.

use std::sync::Arc;

use tokio::sync::mpsc;

use chainwatch_core::Pipeline;

use crate::decoder::{decode, Frame};
use crate::manager::InboundFrame;

/// Counters returned when the frame channel closes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub frames: u64,
    pub notifications: u64,
    pub acks: u64,
    pub rpc_errors: u64,
    pub malformed: u64,
    pub ignored: u64,
}

/// Consume frames until the connection side drops its sender.
pub async fn route_frames(
    mut frames: mpsc::UnboundedReceiver<InboundFrame>,
    pipeline: Arc<Pipeline>,
) -> RouterStats {
    let mut stats = RouterStats::default();

    while let Some(frame) = frames.recv().await {
        stats.frames += 1;
        match decode(&frame.text) {
            Ok(Frame::Notification(notification)) => {
                stats.notifications += 1;
                pipeline.handle_notification(notification);
            }
            Ok(Frame::Control { id, error: Some(e), .. }) => {
                stats.rpc_errors += 1;
                tracing::warn!(%id, error = %e, "request rejected by node");
            }
            Ok(Frame::Control { id, result, .. }) => {
                stats.acks += 1;
                tracing::info!(%id, subscription = ?result, "subscription confirmed");
            }
            Ok(Frame::Other(_)) => {
                stats.ignored += 1;
                tracing::trace!("ignoring unrelated frame");
            }
            Err(e) => {
                stats.malformed += 1;
                tracing::warn!(error = %e, len = frame.text.len(), "dropping malformed frame");
            }
        }
    }

    tracing::debug!(?stats, "frame channel closed");
    stats
}
