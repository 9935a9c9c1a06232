use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::config::ServerConfig;
use crate::error::SessionError;

const OPUS_CLOCK_RATE: u32 = 48000;
const OPUS_PAYLOAD_TYPE: u8 = 111;

/// Events surfaced by the media framework's callbacks.
///
/// Each callback is a thin adapter that converts into one of these and hands
/// it to the participant's event pump, so no handler ever runs on the
/// framework's callback task.
#[derive(Debug)]
pub enum MediaEvent {
    RemoteTrack(Arc<TrackRemote>),
    LocalCandidate(RTCIceCandidateInit),
    StateChange(RTCPeerConnectionState),
}

/// One participant's media endpoint: an Opus-only peer connection whose
/// callbacks feed the participant's event channel.
pub struct MediaSession {
    pc: Arc<RTCPeerConnection>,
}

impl MediaSession {
    pub async fn new(
        config: &ServerConfig,
        event_tx: mpsc::Sender<MediaEvent>,
    ) -> Result<Self, SessionError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_codec(
                RTCRtpCodecParameters {
                    capability: opus_capability(),
                    payload_type: OPUS_PAYLOAD_TYPE,
                    ..Default::default()
                },
                RTPCodecType::Audio,
            )
            .map_err(SessionError::Negotiation)?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(SessionError::Negotiation)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: if config.ice_servers.is_empty() {
                vec![]
            } else {
                vec![RTCIceServer {
                    urls: config.ice_servers.clone(),
                    ..Default::default()
                }]
            },
            ..Default::default()
        };

        let pc = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .map_err(SessionError::Negotiation)?,
        );

        let state_tx = event_tx.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let tx = state_tx.clone();
            Box::pin(async move {
                let _ = tx.send(MediaEvent::StateChange(state)).await;
            })
        }));

        let ice_tx = event_tx.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else { return };
                match candidate.to_json() {
                    Ok(init) => {
                        let _ = tx.send(MediaEvent::LocalCandidate(init)).await;
                    }
                    Err(e) => warn!("failed to serialize local candidate: {e}"),
                }
            })
        }));

        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let tx = event_tx.clone();
            Box::pin(async move {
                let _ = tx.send(MediaEvent::RemoteTrack(track)).await;
            })
        }));

        Ok(Self { pc })
    }

    /// Apply a remote offer and produce the local answer.
    pub async fn apply_offer(
        &self,
        offer: RTCSessionDescription,
    ) -> Result<RTCSessionDescription, SessionError> {
        self.pc
            .set_remote_description(offer)
            .await
            .map_err(SessionError::Negotiation)?;
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(SessionError::Negotiation)?;
        self.pc
            .set_local_description(answer.clone())
            .await
            .map_err(SessionError::Negotiation)?;
        Ok(answer)
    }

    pub async fn apply_answer(&self, answer: RTCSessionDescription) -> Result<(), SessionError> {
        self.pc
            .set_remote_description(answer)
            .await
            .map_err(SessionError::Negotiation)
    }

    /// Create a local offer and apply it, ready to be sent for renegotiation.
    pub async fn create_offer(&self) -> Result<RTCSessionDescription, SessionError> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(SessionError::Negotiation)?;
        self.pc
            .set_local_description(offer.clone())
            .await
            .map_err(SessionError::Negotiation)?;
        Ok(offer)
    }

    pub async fn add_remote_candidate(
        &self,
        candidate: RTCIceCandidateInit,
    ) -> Result<(), SessionError> {
        self.pc
            .add_ice_candidate(candidate)
            .await
            .map_err(SessionError::Negotiation)
    }

    /// Guarantee an audio media section in the next answer when no outbound
    /// track has been provisioned yet.
    pub async fn add_recvonly_audio(&self) -> Result<(), SessionError> {
        self.pc
            .add_transceiver_from_kind(
                RTPCodecType::Audio,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: vec![],
                }),
            )
            .await
            .map(|_| ())
            .map_err(SessionError::Negotiation)
    }

    /// Create and attach the local audio track that will carry the publisher
    /// identified by `ssrc`.
    pub async fn add_outbound_track(
        &self,
        ssrc: u32,
    ) -> Result<Arc<TrackLocalStaticRTP>, SessionError> {
        let track = Arc::new(TrackLocalStaticRTP::new(
            opus_capability(),
            format!("audio-{ssrc}"),
            format!("chorus-{ssrc}"),
        ));
        self.pc
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(SessionError::Negotiation)?;
        Ok(track)
    }

    pub async fn close(&self) {
        if let Err(e) = self.pc.close().await {
            debug!("closing media session: {e}");
        }
    }
}

fn opus_capability() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: MIME_TYPE_OPUS.to_owned(),
        clock_rate: OPUS_CLOCK_RATE,
        channels: 2,
        sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
        rtcp_feedback: vec![],
    }
}

/// True when the offered audio section carries Opus at the configured clock
/// rate. Checked before any description is applied, so a rejected offer
/// leaves the session untouched.
pub fn supports_opus(offer: &RTCSessionDescription) -> bool {
    let Ok(parsed) = offer.unmarshal() else {
        return false;
    };
    parsed
        .media_descriptions
        .iter()
        .filter(|media| media.media_name.media == "audio")
        .flat_map(|media| media.attributes.iter())
        .filter(|attr| attr.key == "rtpmap")
        .filter_map(|attr| attr.value.as_deref())
        .any(|value| value.to_ascii_lowercase().contains("opus/48000"))
}
