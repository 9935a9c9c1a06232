use thiserror::Error;

/// Everything that can go wrong inside one participant's session.
///
/// Protocol and negotiation failures are reported back over the signaling
/// channel and the participant keeps running. Transport failures and non-EOF
/// inbound media failures are terminal for the participant that observes
/// them. Nothing here ever propagates into the room, the registry, or another
/// participant.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Malformed signaling payload, empty required field, unknown event type.
    #[error("{0}")]
    Protocol(String),

    /// The offered audio section does not carry the configured codec.
    #[error("remote peer does not support opus codec")]
    CodecMismatch,

    /// Offer/answer creation or description application failed.
    #[error("negotiation failed: {0}")]
    Negotiation(#[source] webrtc::Error),

    /// Signaling channel write failed or missed its deadline.
    #[error("signaling transport: {0}")]
    Transport(String),

    /// Writing to one subscriber's outbound track failed.
    #[error("outbound track write: {0}")]
    Media(#[source] webrtc::Error),

    /// No outbound track is provisioned for this stream id.
    #[error("no outbound track for ssrc {0}")]
    MissingTrack(u32),
}
