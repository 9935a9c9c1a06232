mod ws_handler;

pub use ws_handler::ws_handler;

use std::time::Duration;

/// Write deadline per outbound message.
pub(crate) const WRITE_WAIT: Duration = Duration::from_secs(10);
/// Idle read deadline, refreshed by each keepalive pong.
pub(crate) const PONG_WAIT: Duration = Duration::from_secs(60);
/// Keepalive cadence. Must be shorter than the read deadline.
pub(crate) const PING_PERIOD: Duration = Duration::from_secs(54);
/// Hard cap on one signaling frame.
pub(crate) const MAX_MESSAGE_SIZE: usize = 51200;
/// Outbound signaling queue depth per participant.
pub(crate) const SIGNAL_QUEUE_DEPTH: usize = 256;
/// Media callback event queue depth per participant.
pub(crate) const MEDIA_EVENT_QUEUE_DEPTH: usize = 256;
