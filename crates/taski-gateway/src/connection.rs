use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::session::Session;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Drive an accepted session over its WebSocket until either side goes away.
/// The session is closed on every exit path.
pub async fn run_connection(socket: WebSocket, session: Session) {
    let conn_id = session.id();
    let board_id = session.board_id();
    let (control, mut outbox) = session.split();
    let (mut sender, mut receiver) = socket.split();

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut pong_received = true;
    let mut missed_heartbeats: u8 = 0;

    loop {
        tokio::select! {
            frame = outbox.recv() => {
                let Some(frame) = frame else {
                    debug!("Outbox of {} closed", conn_id);
                    break;
                };
                if sender.send(Message::Text(frame.to_string().into())).await.is_err() {
                    break;
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => control.receive(text.as_str()).await,
                    Some(Ok(Message::Pong(_))) => pong_received = true,
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
            _ = heartbeat.tick() => {
                if std::mem::replace(&mut pong_received, false) {
                    missed_heartbeats = 0;
                } else {
                    missed_heartbeats += 1;
                    if missed_heartbeats >= 2 {
                        warn!("Heartbeat timeout on {} (missed {} pongs), dropping connection", conn_id, missed_heartbeats);
                        break;
                    }
                }
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    control.close();
    let _ = sender.close().await;
    info!(
        "{} ({}) disconnected from board {}",
        control.identity().username,
        control.identity().user_id,
        board_id
    );
}
