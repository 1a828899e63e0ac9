//! Frame dispatcher.
//!
//! Reads frames of one connection generation in order, decodes them and
//! hands the events to their handlers. Malformed or unknown frames are
//! logged and skipped; only read failures end the loop.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::Session;
use crate::decode::decode_frame;
use crate::events::{Event, EventKind};
use crate::frame::{Frame, InboundTag};
use crate::transport::FrameSource;

/// What happened to a single inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Decoded and passed to a registered handler.
    Delivered(EventKind),
    /// Decoded, but no handler is registered for it.
    Unhandled(EventKind),
    /// Malformed frame or payload.
    Dropped,
    /// Unknown tag, or a tag that carries no event.
    Ignored,
    /// Server asked the client to reconnect.
    Refresh,
}

/// Starts the read loop for connection `generation`.
///
/// Kept as a plain function so the spawned future does not show up in
/// the type of the async methods that call it.
pub(super) fn spawn(
    session: Session,
    generation: u64,
    source: Box<dyn FrameSource>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        run(session, generation, source, cancel).await;
    });
}

async fn run(
    session: Session,
    generation: u64,
    mut source: Box<dyn FrameSource>,
    cancel: CancellationToken,
) {
    debug!("Dispatcher for connection {} started", generation);
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Dispatcher for connection {} cancelled", generation);
                return;
            }
            frame = source.read_frame() => frame,
        };

        match frame {
            Ok(raw) => {
                if session.dispatch_frame(&raw) == FrameOutcome::Refresh {
                    info!("Server requested a refresh, reconnecting");
                    session
                        .reconnect(generation, super::ReconnectTrigger::Refresh)
                        .await;
                    if !session.is_current(generation).await {
                        return;
                    }
                }
            }
            Err(err) => {
                session.connection_lost(generation, err).await;
                return;
            }
        }
    }
}

impl Session {
    /// Processes one raw frame as if it had been read from the connection.
    ///
    /// Membership is updated before the handler runs, whether or not a
    /// handler is registered.
    pub fn dispatch_frame(&self, raw: &str) -> FrameOutcome {
        let frame = match Frame::parse(raw) {
            Ok(frame) => frame,
            Err(err) => {
                debug!("Dropping frame: {}", err);
                return FrameOutcome::Dropped;
            }
        };
        let tag: InboundTag = match frame.tag.parse() {
            Ok(tag) => tag,
            Err(()) => {
                debug!("Ignoring frame with unknown tag {}", frame.tag);
                return FrameOutcome::Ignored;
            }
        };
        if tag == InboundTag::Refresh {
            return FrameOutcome::Refresh;
        }

        let event = match decode_frame(tag, frame.payload, &self.inner.membership) {
            Ok(Some(event)) => event,
            Ok(None) => return FrameOutcome::Ignored,
            Err(err) => {
                debug!("Dropping {} frame: {}", frame.tag, err);
                return FrameOutcome::Dropped;
            }
        };

        self.apply_membership(&event);
        let kind = event.kind();
        if self.inner.handlers.deliver(event, self) {
            FrameOutcome::Delivered(kind)
        } else {
            FrameOutcome::Unhandled(kind)
        }
    }

    fn apply_membership(&self, event: &Event) {
        let membership = &self.inner.membership;
        match event {
            Event::Names(names) => {
                membership.replace_all(names.users.clone(), names.connection_count);
            }
            Event::Join(join) => {
                membership.add_if_absent(join.user.clone());
            }
            Event::Quit(quit) => {
                membership.remove(&quit.user.nick);
            }
            Event::UserUpdate(user) => {
                membership.update(user.clone());
            }
            _ => {}
        }
    }
}
