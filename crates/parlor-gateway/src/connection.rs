use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{error, info, warn};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Serve one WebSocket connection until it closes.
///
/// Commands from the client are handled one at a time, in arrival order.
/// Events queued for this connection are written by a separate task so a
/// slow handler never delays broadcasts from others. Once the dispatcher is
/// closed the connection finishes its current command and ends.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher) {
    let _task = dispatcher.track_connection();
    let (mut sender, mut receiver) = socket.split();

    let (conn_id, mut conn_rx) = dispatcher.connect().await;
    info!("A user connected: {}", conn_id);

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward queued events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = conn_rx.recv() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            error!("Failed to encode event for {}: {}", conn_id, e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping {}", missed_heartbeats, conn_id);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let dispatcher_recv = dispatcher.clone();
    let mut recv_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                _ = dispatcher_recv.closed() => break,
                msg = receiver.next() => msg,
            };
            let Some(Ok(msg)) = msg else { break };

            match msg {
                Message::Text(text) => {
                    dispatcher_recv.handle_text(conn_id, &text).await;
                }
                Message::Binary(data) => {
                    warn!("{} sent {} binary bytes; only text frames are understood", conn_id, data.len());
                }
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish, then for the other to stop
    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
            let _ = recv_task.await;
        }
        _ = &mut recv_task => {
            send_task.abort();
            let _ = send_task.await;
        }
    }

    dispatcher.disconnect(conn_id).await;
    info!("Connection {} closed", conn_id);
}
