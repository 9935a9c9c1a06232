use chorus_core::{ParticipantId, SignalEvent};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocalWriter;
use webrtc::track::track_remote::TrackRemote;

use crate::error::SessionError;
use crate::media::{supports_opus, MediaEvent, MediaSession};
use crate::participant::fanout;
use crate::room::Room;

/// Depth of the inbound RTP queue. Sized so ordinary jitter never stalls the
/// forwarder; a full queue blocks the reader, which pushes flow pressure back
/// into the media framework.
const RTP_QUEUE_DEPTH: usize = 100;

const WATCH_PERIOD: Duration = Duration::from_secs(5);

/// Lifecycle of one participant. `Stopped` is absorbing: all further
/// signaling input is discarded and leaving the room is idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantState {
    Connecting,
    Negotiating,
    Established,
    Stopped,
}

/// One connected peer: one signaling channel, one media session, and the
/// state machine that couples them.
///
/// The participant exclusively owns its queues, its media session, and its
/// outbound-track map; the room only keeps a back-reference that teardown
/// removes.
pub struct Participant {
    pub id: ParticipantId,
    room: Arc<Room>,
    media: MediaSession,
    signal_tx: mpsc::Sender<SignalEvent>,
    in_track: RwLock<Option<Arc<TrackRemote>>>,
    out_tracks: DashMap<u32, Arc<TrackLocalStaticRTP>>,
    rtp_tx: mpsc::Sender<rtp::packet::Packet>,
    rtp_rx: Mutex<Option<mpsc::Receiver<rtp::packet::Packet>>>,
    state: Mutex<ParticipantState>,
    recv_fallback_added: AtomicBool,
    stopped: AtomicBool,
    cancel: CancellationToken,
}

impl Participant {
    pub fn new(
        room: Arc<Room>,
        media: MediaSession,
        signal_tx: mpsc::Sender<SignalEvent>,
    ) -> Arc<Self> {
        let (rtp_tx, rtp_rx) = mpsc::channel(RTP_QUEUE_DEPTH);
        Arc::new(Self {
            id: ParticipantId::next(),
            room,
            media,
            signal_tx,
            in_track: RwLock::new(None),
            out_tracks: DashMap::new(),
            rtp_tx,
            rtp_rx: Mutex::new(Some(rtp_rx)),
            state: Mutex::new(ParticipantState::Connecting),
            recv_fallback_added: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        })
    }

    pub fn room(&self) -> &Arc<Room> {
        &self.room
    }

    pub fn state(&self) -> ParticipantState {
        *self.state.lock().unwrap()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stream id of the published inbound track, once it exists.
    pub fn inbound_ssrc(&self) -> Option<u32> {
        self.in_track.read().unwrap().as_ref().map(|t| t.ssrc())
    }

    pub fn has_subscription(&self, ssrc: u32) -> bool {
        self.out_tracks.contains_key(&ssrc)
    }

    pub(crate) fn rtp_sender(&self) -> mpsc::Sender<rtp::packet::Packet> {
        self.rtp_tx.clone()
    }

    pub(crate) fn take_rtp_receiver(&self) -> Option<mpsc::Receiver<rtp::packet::Packet>> {
        self.rtp_rx.lock().unwrap().take()
    }

    /// Enqueue one event on the outbound signaling queue. The socket itself
    /// is only ever touched by the write pump.
    pub async fn send(&self, event: SignalEvent) {
        if self.signal_tx.send(event).await.is_err() {
            debug!(participant = %self.id, "signaling queue closed, event dropped");
        }
    }

    pub async fn send_error(&self, desc: impl Into<String>) {
        self.send(SignalEvent::error(desc)).await;
    }

    /// Entry point for one raw signaling frame. Runs on its own task so a
    /// slow negotiation never blocks the socket reader.
    pub async fn handle_signal(&self, raw: &str) {
        if self.is_stopped() {
            return;
        }
        let event = match serde_json::from_str::<SignalEvent>(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!(participant = %self.id, "malformed signaling frame: {e}");
                self.send_error(format!("malformed event: {e}")).await;
                return;
            }
        };
        if let Err(e) = self.dispatch(event).await {
            warn!(participant = %self.id, "signaling event failed: {e}");
            self.send_error(e.to_string()).await;
        }
    }

    async fn dispatch(&self, event: SignalEvent) -> Result<(), SessionError> {
        match event {
            SignalEvent::Offer { offer: Some(offer) } => self.handle_offer(offer).await,
            SignalEvent::Offer { offer: None } => {
                Err(SessionError::Protocol("empty offer".into()))
            }
            SignalEvent::Answer {
                answer: Some(answer),
            } => self.media.apply_answer(answer).await,
            SignalEvent::Answer { answer: None } => {
                Err(SessionError::Protocol("empty answer".into()))
            }
            SignalEvent::Candidate {
                candidate: Some(candidate),
            } => {
                debug!(participant = %self.id, "adding remote candidate");
                self.media.add_remote_candidate(candidate).await
            }
            SignalEvent::Candidate { candidate: None } => {
                Err(SessionError::Protocol("empty candidate".into()))
            }
            SignalEvent::Error { desc } => {
                info!(participant = %self.id, "peer reported error: {desc}");
                Ok(())
            }
            SignalEvent::Unknown => Err(SessionError::Protocol("not implemented".into())),
        }
    }

    /// Validate the offer, provision one outbound track per peer that has
    /// already published, and answer. The single answer carries every current
    /// subscription; with no publishers in the room a receive-only audio
    /// transceiver keeps an audio section in the answer.
    async fn handle_offer(&self, offer: RTCSessionDescription) -> Result<(), SessionError> {
        if !supports_opus(&offer) {
            return Err(SessionError::CodecMismatch);
        }
        self.note_negotiating();

        let publishers: Vec<u32> = self
            .room
            .others(self.id)
            .into_iter()
            .filter_map(|peer| peer.inbound_ssrc())
            .collect();
        debug!(
            participant = %self.id,
            subscriptions = publishers.len(),
            "handling offer"
        );

        if publishers.is_empty()
            && self.out_tracks.is_empty()
            && !self.recv_fallback_added.swap(true, Ordering::SeqCst)
        {
            self.media.add_recvonly_audio().await?;
        }
        for ssrc in publishers {
            self.provision_outbound(ssrc).await?;
        }

        let answer = self.media.apply_offer(offer).await?;
        self.send(SignalEvent::Answer {
            answer: Some(answer),
        })
        .await;
        Ok(())
    }

    /// Create the local track that will carry the publisher with this stream
    /// id. Re-adding an existing stream id keeps the current subscription.
    pub async fn provision_outbound(&self, ssrc: u32) -> Result<(), SessionError> {
        if self.out_tracks.contains_key(&ssrc) {
            debug!(participant = %self.id, ssrc, "outbound track already provisioned");
            return Ok(());
        }
        let track = self.media.add_outbound_track(ssrc).await?;
        self.out_tracks.insert(ssrc, track);
        Ok(())
    }

    /// Server-initiated renegotiation: create an offer and push it to the
    /// peer over signaling.
    pub async fn send_offer(&self) -> Result<(), SessionError> {
        self.note_negotiating();
        let offer = self.media.create_offer().await?;
        self.send(SignalEvent::Offer { offer: Some(offer) }).await;
        Ok(())
    }

    /// Forward one of a peer's packets through the outbound track matching
    /// its stream id. A missing track or a failed write drops the packet for
    /// this subscriber only.
    pub async fn write_packet(&self, packet: &rtp::packet::Packet) -> Result<(), SessionError> {
        let track = self
            .out_tracks
            .get(&packet.header.ssrc)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(SessionError::MissingTrack(packet.header.ssrc))?;
        track
            .write_rtp(packet)
            .await
            .map(|_| ())
            .map_err(SessionError::Media)
    }

    /// Drain the media framework's events. Spawned once per participant;
    /// exits when the participant stops or the session goes away.
    pub async fn run_media_events(self: Arc<Self>, mut events: mpsc::Receiver<MediaEvent>) {
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            match event {
                MediaEvent::LocalCandidate(candidate) => {
                    self.send(SignalEvent::Candidate {
                        candidate: Some(candidate),
                    })
                    .await;
                }
                MediaEvent::RemoteTrack(track) => {
                    tokio::spawn(Arc::clone(&self).on_remote_track(track));
                }
                MediaEvent::StateChange(state) => self.on_state_change(state).await,
            }
        }
    }

    /// The peer published: record the inbound track, subscribe every other
    /// room member to it with a fresh offer, and start forwarding.
    async fn on_remote_track(self: Arc<Self>, track: Arc<TrackRemote>) {
        let ssrc = track.ssrc();
        info!(
            participant = %self.id,
            ssrc,
            codec = %track.codec().capability.mime_type,
            "inbound track started"
        );

        {
            let mut slot = self.in_track.write().unwrap();
            if slot.is_some() {
                warn!(participant = %self.id, ssrc, "ignoring additional inbound track");
                return;
            }
            *slot = Some(Arc::clone(&track));
        }

        for peer in self.room.others(self.id) {
            if let Err(e) = peer.provision_outbound(ssrc).await {
                warn!(participant = %peer.id, ssrc, "failed to provision subscription: {e}");
                peer.send_error(e.to_string()).await;
                continue;
            }
            if let Err(e) = peer.send_offer().await {
                warn!(participant = %peer.id, "renegotiation offer failed: {e}");
                peer.send_error(e.to_string()).await;
            }
        }

        fanout::start(self, track);
    }

    async fn on_state_change(&self, state: RTCPeerConnectionState) {
        info!(participant = %self.id, ?state, "media session state changed");
        match state {
            RTCPeerConnectionState::Connected => {
                self.note_established();
                info!(
                    participant = %self.id,
                    members = self.room.len(),
                    "participant established"
                );
            }
            RTCPeerConnectionState::Disconnected
            | RTCPeerConnectionState::Failed
            | RTCPeerConnectionState::Closed => {
                self.teardown().await;
            }
            _ => {}
        }
    }

    /// Stop this participant and release everything it owns: leave the room,
    /// cancel all tasks, close the media session. Idempotent; the first
    /// caller wins.
    pub async fn teardown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.state.lock().unwrap() = ParticipantState::Stopped;
        self.cancel.cancel();
        self.room.leave(self.id);
        self.media.close().await;
        info!(participant = %self.id, room = %self.room.id(), "participant stopped");
    }

    /// Periodic diagnostic logging of forwarding state.
    pub async fn run_watch(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(WATCH_PERIOD);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    debug!(
                        participant = %self.id,
                        state = ?self.state(),
                        out_tracks = self.out_tracks.len(),
                        "watch"
                    );
                }
            }
        }
    }

    fn note_negotiating(&self) {
        let mut state = self.state.lock().unwrap();
        if *state == ParticipantState::Connecting {
            *state = ParticipantState::Negotiating;
        }
    }

    fn note_established(&self) {
        let mut state = self.state.lock().unwrap();
        if *state != ParticipantState::Stopped {
            *state = ParticipantState::Established;
        }
    }
}
