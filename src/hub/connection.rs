use crate::common::context::Context;
use crate::events;
use crate::hub::{ConnHandle, Hub};
use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use axum::body::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, mpsc};
use tokio::time::{MissedTickBehavior, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Ping cadence of the write pump.
const PING_PERIOD: Duration = Duration::from_secs(54);
/// A peer that has not ponged (or sent anything) for this long is dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// Identity of one live socket, as the dispatcher sees it.
#[derive(Debug, Clone, Copy)]
pub struct ConnInfo {
    pub conn_id: Uuid,
    pub user_id: i64,
    pub team_id: i64,
}

/// Bridges one socket to the hub: registers, runs both pumps, and tears
/// everything down once either side gives up. Returns only after both
/// pumps have terminated.
pub async fn serve<C: Context>(ctx: &C, hub: Hub, socket: WebSocket, user_id: i64, team_id: i64) {
    let conn = ConnInfo {
        conn_id: Uuid::new_v4(),
        user_id,
        team_id,
    };
    let (handle, outbound) = ConnHandle::channel(conn.conn_id, user_id, team_id);
    hub.register(handle).await;

    let (socket_tx, socket_rx) = socket.split();
    let last_pong = Arc::new(Mutex::new(Instant::now()));
    let writer = tokio::spawn(write_pump(socket_tx, outbound, Arc::clone(&last_pong)));

    read_pump(ctx, &hub, conn, socket_rx, &last_pong).await;

    // Unregistering drops the hub's sender; the write pump drains what is
    // left, sends a close frame and exits.
    hub.unregister(team_id, conn.conn_id);
    let _ = writer.await;
    info!(conn_id = %conn.conn_id, user_id, team_id, "Connection closed");
}

/// Drains the outbound queue into the socket and keeps the heartbeat going.
/// Exits when the queue is closed, the socket rejects a write, or the peer
/// stops answering pings.
async fn write_pump(
    mut socket: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Utf8Bytes>,
    last_pong: Arc<Mutex<Instant>>,
) {
    let mut heartbeat = tokio::time::interval(PING_PERIOD);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of an interval fires immediately.
    heartbeat.tick().await;

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = socket.send(Message::Text(frame)).await {
                        debug!("Socket write failed: {e}");
                        break;
                    }
                }
                None => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            },
            _ = heartbeat.tick() => {
                if last_pong.lock().await.elapsed() > PONG_TIMEOUT {
                    warn!("Peer stopped answering pings, dropping connection");
                    break;
                }
                if socket.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Reads frames until the socket errors, the peer closes, or the peer goes
/// silent past the pong deadline. Decode failures are answered with an
/// `error` envelope and reading continues.
async fn read_pump<C: Context>(
    ctx: &C,
    hub: &Hub,
    conn: ConnInfo,
    mut socket: SplitStream<WebSocket>,
    last_pong: &Mutex<Instant>,
) {
    loop {
        let frame = match timeout(PONG_TIMEOUT + PING_PERIOD, socket.next()).await {
            Err(_) => {
                warn!(conn_id = %conn.conn_id, "No traffic from peer, dropping connection");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!(conn_id = %conn.conn_id, "Socket read failed: {e}");
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };
        match frame {
            Message::Text(text) => events::handle_frame(ctx, hub, conn, text.as_str()).await,
            Message::Pong(_) => {
                *last_pong.lock().await = Instant::now();
            }
            Message::Close(_) => break,
            // Pings are answered by the protocol layer; binary frames are
            // not part of the envelope protocol.
            Message::Ping(_) | Message::Binary(_) => {}
        }
    }
}
