use chorus_core::SignalEvent;
use chorus_server::error::SessionError;
use chorus_server::participant::ParticipantState;
use chorus_server::room::Room;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use crate::utils::{
    init_tracing, offer_frame, spawn_participant, wait_for_answer, wait_for_error, wait_for_offer,
    TestClient,
};

/// Audio offer from a hand-written description carrying only PCMU.
const PCMU_OFFER_SDP: &str = "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 0\r\nc=IN IP4 0.0.0.0\r\na=rtpmap:0 PCMU/8000\r\n";

#[tokio::test]
async fn test_offer_is_answered_with_opus_audio() {
    init_tracing();
    let room = Room::new("answer");
    let mut server = spawn_participant(&room).await.expect("spawn participant");
    let client = TestClient::new().await.expect("create client");

    let offer = client.audio_offer().await.expect("create offer");
    server.participant.handle_signal(&offer_frame(offer)).await;

    let answer = wait_for_answer(&mut server.signal_rx, 5000)
        .await
        .expect("server answers");
    assert!(answer.sdp.to_ascii_lowercase().contains("opus/48000"));
    client.apply_answer(answer).await.expect("apply answer");

    assert_eq!(server.participant.state(), ParticipantState::Negotiating);
    client.close().await.expect("close client");
}

#[tokio::test]
async fn test_recvonly_offer_still_gets_an_audio_section() {
    init_tracing();
    let room = Room::new("recvonly");
    let mut server = spawn_participant(&room).await.expect("spawn participant");
    let client = TestClient::new().await.expect("create client");

    let offer = client.recvonly_offer().await.expect("create offer");
    server.participant.handle_signal(&offer_frame(offer)).await;

    let answer = wait_for_answer(&mut server.signal_rx, 5000)
        .await
        .expect("server answers");
    assert!(answer.sdp.contains("m=audio"));
    client.close().await.expect("close client");
}

#[tokio::test]
async fn test_non_opus_offer_is_rejected() {
    init_tracing();
    let room = Room::new("codec-mismatch");
    let mut server = spawn_participant(&room).await.expect("spawn participant");

    let offer = RTCSessionDescription::offer(PCMU_OFFER_SDP.to_owned()).expect("parse sdp");
    server.participant.handle_signal(&offer_frame(offer)).await;

    let desc = wait_for_error(&mut server.signal_rx, 5000)
        .await
        .expect("server reports error");
    assert_eq!(desc, "remote peer does not support opus codec");
    // The rejected offer must not have moved the participant.
    assert!(!server.participant.is_stopped());
    assert_eq!(room.len(), 1);
}

#[tokio::test]
async fn test_unknown_event_type_is_reported_not_fatal() {
    init_tracing();
    let room = Room::new("unknown-event");
    let mut server = spawn_participant(&room).await.expect("spawn participant");

    server.participant.handle_signal(r#"{"type":"hangup"}"#).await;

    let desc = wait_for_error(&mut server.signal_rx, 5000)
        .await
        .expect("server reports error");
    assert_eq!(desc, "not implemented");
    assert!(!server.participant.is_stopped());
}

#[tokio::test]
async fn test_empty_payloads_are_rejected() {
    init_tracing();
    let room = Room::new("empty-payloads");
    let mut server = spawn_participant(&room).await.expect("spawn participant");

    for (frame, expected) in [
        (r#"{"type":"offer"}"#, "empty offer"),
        (r#"{"type":"answer"}"#, "empty answer"),
        (r#"{"type":"candidate"}"#, "empty candidate"),
    ] {
        server.participant.handle_signal(frame).await;
        let desc = wait_for_error(&mut server.signal_rx, 5000)
            .await
            .expect("server reports error");
        assert_eq!(desc, expected);
    }
    assert!(!server.participant.is_stopped());
}

#[tokio::test]
async fn test_malformed_frame_is_reported_not_fatal() {
    init_tracing();
    let room = Room::new("malformed");
    let mut server = spawn_participant(&room).await.expect("spawn participant");

    server.participant.handle_signal("{not json").await;

    let desc = wait_for_error(&mut server.signal_rx, 5000)
        .await
        .expect("server reports error");
    assert!(desc.starts_with("malformed event"));
    assert!(!server.participant.is_stopped());
}

#[tokio::test]
async fn test_subscription_provision_renegotiates_with_an_offer() {
    init_tracing();
    let room = Room::new("renegotiate");
    let mut server = spawn_participant(&room).await.expect("spawn participant");

    server
        .participant
        .provision_outbound(7777)
        .await
        .expect("provision track");
    assert!(server.participant.has_subscription(7777));

    server.participant.send_offer().await.expect("send offer");
    let offer = wait_for_offer(&mut server.signal_rx, 5000)
        .await
        .expect("server offers");
    assert!(offer.sdp.contains("m=audio"));
    assert_eq!(server.participant.state(), ParticipantState::Negotiating);

    // Re-adding the same stream id keeps the existing subscription.
    server
        .participant
        .provision_outbound(7777)
        .await
        .expect("re-provision is a no-op");
    assert!(server.participant.has_subscription(7777));
}

#[tokio::test]
async fn test_packet_without_outbound_track_is_dropped() {
    init_tracing();
    let room = Room::new("missing-track");
    let server = spawn_participant(&room).await.expect("spawn participant");

    let packet = webrtc::rtp::packet::Packet {
        header: webrtc::rtp::header::Header {
            ssrc: 42,
            ..Default::default()
        },
        ..Default::default()
    };
    let err = server
        .participant
        .write_packet(&packet)
        .await
        .expect_err("no track for this ssrc");
    assert!(matches!(err, SessionError::MissingTrack(42)));
    assert!(!server.participant.is_stopped());
}

#[tokio::test]
async fn test_stopped_participant_discards_signaling() {
    init_tracing();
    let room = Room::new("stopped-input");
    let mut server = spawn_participant(&room).await.expect("spawn participant");

    server.participant.teardown().await;
    server.participant.handle_signal(r#"{"type":"hangup"}"#).await;

    // No error event: input after stop is discarded.
    let got = tokio::time::timeout(
        std::time::Duration::from_millis(300),
        server.signal_rx.recv(),
    )
    .await;
    assert!(
        !matches!(got, Ok(Some(SignalEvent::Error { .. }))),
        "stopped participant must not respond"
    );
}
