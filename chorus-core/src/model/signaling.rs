use serde::{Deserialize, Serialize};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// One signaling frame, exactly as it travels on the wire.
///
/// Descriptions and candidate-init payloads are the media framework's own
/// serialized forms and pass through verbatim. A frame whose `type` tag is not
/// one of the known variants parses as [`SignalEvent::Unknown`] so the server
/// can answer with an error instead of dropping the connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalEvent {
    Offer {
        offer: Option<RTCSessionDescription>,
    },
    Answer {
        answer: Option<RTCSessionDescription>,
    },
    Candidate {
        candidate: Option<RTCIceCandidateInit>,
    },
    Error {
        desc: String,
    },
    #[serde(other)]
    Unknown,
}

impl SignalEvent {
    pub fn error(desc: impl Into<String>) -> Self {
        Self::Error { desc: desc.into() }
    }
}
