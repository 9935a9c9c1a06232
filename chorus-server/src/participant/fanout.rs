//! Per-participant fan-out: one task reads the inbound track into a bounded
//! queue, a second drains the queue toward every other room member.

use std::sync::Arc;
use tracing::{debug, warn};
use webrtc::track::track_remote::TrackRemote;

use crate::error::SessionError;
use crate::participant::Participant;

/// Start the inbound reader and the forwarder for a participant whose remote
/// track just appeared.
pub(crate) fn start(participant: Arc<Participant>, track: Arc<TrackRemote>) {
    let reader = Arc::clone(&participant);
    tokio::spawn(read_inbound(reader, track));
    tokio::spawn(forward(participant));
}

/// Pull packets off the inbound track one by one and enqueue them. A full
/// queue blocks here, pressing back on the media framework. End-of-stream is
/// a clean stop; any other read error tears the participant down.
async fn read_inbound(participant: Arc<Participant>, track: Arc<TrackRemote>) {
    let rtp_tx = participant.rtp_sender();
    let cancel = participant.cancel_token();
    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = track.read_rtp() => result,
        };
        match result {
            Ok((packet, _)) => {
                if rtp_tx.send(packet).await.is_err() {
                    break;
                }
            }
            Err(e) if is_end_of_stream(&e) || participant.is_stopped() => {
                debug!(participant = %participant.id, "inbound track ended");
                break;
            }
            Err(e) => {
                warn!(participant = %participant.id, "inbound read failed: {e}");
                participant.teardown().await;
                break;
            }
        }
    }
}

/// Dequeue packets and write each one, unmodified, to every other member of
/// the room. A subscriber without a matching outbound track just misses the
/// packet; a broken subscriber never stalls the publisher.
async fn forward(participant: Arc<Participant>) {
    let Some(mut rtp_rx) = participant.take_rtp_receiver() else {
        warn!(participant = %participant.id, "forwarder already running");
        return;
    };
    let cancel = participant.cancel_token();
    loop {
        let packet = tokio::select! {
            _ = cancel.cancelled() => break,
            packet = rtp_rx.recv() => match packet {
                Some(packet) => packet,
                None => break,
            },
        };
        for peer in participant.room().others(participant.id) {
            match peer.write_packet(&packet).await {
                Ok(()) => {}
                Err(e @ SessionError::MissingTrack(_)) => {
                    debug!(publisher = %participant.id, subscriber = %peer.id, "{e}");
                }
                Err(e) => {
                    warn!(
                        publisher = %participant.id,
                        subscriber = %peer.id,
                        "forward failed: {e}"
                    );
                }
            }
        }
    }
}

fn is_end_of_stream(err: &webrtc::Error) -> bool {
    matches!(
        err,
        webrtc::Error::ErrClosedPipe | webrtc::Error::Util(webrtc::util::Error::ErrBufferClosed)
    )
}
