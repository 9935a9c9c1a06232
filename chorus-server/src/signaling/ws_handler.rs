use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use bytes::Bytes;
use chorus_core::SignalEvent;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::media::MediaSession;
use crate::participant::Participant;
use crate::signaling::{
    MAX_MESSAGE_SIZE, MEDIA_EVENT_QUEUE_DEPTH, PING_PERIOD, PONG_WAIT, SIGNAL_QUEUE_DEPTH,
    WRITE_WAIT,
};
use crate::AppState;

/// Upgrade one signaling connection. The request path, separators stripped,
/// is the room identifier.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(room_path): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let room_id = room_path.replace('/', "");
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, room_id, state))
}

async fn handle_socket(socket: WebSocket, room_id: String, state: AppState) {
    let (media_tx, media_rx) = mpsc::channel(MEDIA_EVENT_QUEUE_DEPTH);
    let media = match MediaSession::new(&state.config, media_tx).await {
        Ok(media) => media,
        Err(e) => {
            error!(room = %room_id, "failed to create media session: {e}");
            return;
        }
    };

    let room = state.registry.get_or_create(&room_id);
    let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_QUEUE_DEPTH);
    let participant = Participant::new(Arc::clone(&room), media, signal_tx);
    info!(
        participant = %participant.id,
        room = %room_id,
        members = room.len(),
        "signaling channel open"
    );

    room.join(Arc::clone(&participant));

    let (sender, receiver) = socket.split();
    let mut write_task = tokio::spawn(write_pump(sender, signal_rx, participant.cancel_token()));
    let mut read_task = tokio::spawn(read_pump(receiver, Arc::clone(&participant)));
    tokio::spawn(Arc::clone(&participant).run_media_events(media_rx));
    tokio::spawn(Arc::clone(&participant).run_watch());

    tokio::select! {
        _ = &mut write_task => read_task.abort(),
        _ = &mut read_task => write_task.abort(),
    }

    participant.teardown().await;
    info!(participant = %participant.id, room = %room_id, "signaling channel closed");
}

/// Sole writer of the socket: drains the participant's outbound queue and
/// drives the keepalive pings. A write that misses its deadline closes the
/// channel.
async fn write_pump(
    mut sender: SplitSink<WebSocket, Message>,
    mut signal_rx: mpsc::Receiver<SignalEvent>,
    cancel: CancellationToken,
) {
    let mut ping = interval_at(Instant::now() + PING_PERIOD, PING_PERIOD);
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            event = signal_rx.recv() => match event {
                Some(event) => match serde_json::to_string(&event) {
                    Ok(json) => Message::Text(json.into()),
                    Err(e) => {
                        error!("failed to serialize signal event: {e}");
                        continue;
                    }
                },
                None => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            },
            _ = ping.tick() => Message::Ping(Bytes::new()),
        };
        match timeout(WRITE_WAIT, sender.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!("socket write failed: {e}");
                break;
            }
            Err(_) => {
                warn!("socket write deadline exceeded");
                break;
            }
        }
    }
}

/// Read signaling frames until the peer goes away or the keepalive deadline
/// expires. Only a pong refreshes the deadline; each text frame is handled
/// on a fresh task so a slow negotiation never blocks the reader.
async fn read_pump(mut receiver: SplitStream<WebSocket>, participant: Arc<Participant>) {
    let cancel = participant.cancel_token();
    let deadline = sleep(PONG_WAIT);
    tokio::pin!(deadline);
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            _ = deadline.as_mut() => {
                warn!(participant = %participant.id, "keepalive deadline expired");
                break;
            }
            frame = receiver.next() => match frame {
                None => break,
                Some(Err(e)) => {
                    debug!(participant = %participant.id, "socket read failed: {e}");
                    break;
                }
                Some(Ok(message)) => message,
            },
        };
        match message {
            Message::Text(text) => {
                let participant = Arc::clone(&participant);
                tokio::spawn(async move { participant.handle_signal(text.as_str()).await });
            }
            Message::Pong(_) => deadline.as_mut().reset(Instant::now() + PONG_WAIT),
            Message::Close(_) => break,
            _ => {}
        }
    }
}
