pub mod connection;

use crate::common::error::{ServiceResult, unexpected};
use crate::models::envelopes::ServerEnvelope;
use crate::models::messages::ChatMessageModel;
use axum::extract::ws::Utf8Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{info, warn};
use uuid::Uuid;

/// Frames a connection can have in flight before the hub considers it slow.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// A registered connection as the hub sees it: identity plus the sending
/// end of its outbound queue. The hub holds the only sender; dropping the
/// handle closes the queue and lets the write pump finish.
#[derive(Debug, Clone)]
pub struct ConnHandle {
    pub conn_id: Uuid,
    pub user_id: i64,
    pub team_id: i64,
    sender: mpsc::Sender<Utf8Bytes>,
}

impl ConnHandle {
    pub fn channel(conn_id: Uuid, user_id: i64, team_id: i64) -> (Self, mpsc::Receiver<Utf8Bytes>) {
        let (sender, receiver) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let handle = Self {
            conn_id,
            user_id,
            team_id,
            sender,
        };
        (handle, receiver)
    }
}

/// How a frame that does not fit the recipient's queue is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// Fan-out: the recipient misses this frame, nobody waits.
    BestEffort,
    /// Single-recipient: a full queue means the consumer is too slow to be
    /// trusted with direct responses, so it is unregistered.
    Direct,
}

pub enum HubCommand {
    Register {
        handle: ConnHandle,
        registered: oneshot::Sender<()>,
    },
    Unregister {
        team_id: i64,
        conn_id: Uuid,
    },
}

type Registry = Arc<RwLock<HashMap<i64, Vec<ConnHandle>>>>;

/// Registry of live connections per team. Mutation goes through the actor
/// task via commands; broadcasts only take the read lock and never wait on
/// a recipient's queue.
#[derive(Clone)]
pub struct Hub {
    commands: mpsc::UnboundedSender<HubCommand>,
    registry: Registry,
}

impl Hub {
    pub fn spawn() -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let registry = Registry::default();
        tokio::spawn(run(receiver, Arc::clone(&registry)));
        Self { commands, registry }
    }

    /// Adds the connection to its team's set; resolves once the actor has
    /// applied the command. Registering an already-registered connection is
    /// a no-op.
    pub async fn register(&self, handle: ConnHandle) {
        let (registered, applied) = oneshot::channel();
        let _ = self.commands.send(HubCommand::Register { handle, registered });
        let _ = applied.await;
    }

    /// Removes the connection and closes its outbound queue. Safe to call
    /// for a connection that is already gone.
    pub fn unregister(&self, team_id: i64, conn_id: Uuid) {
        let _ = self.commands.send(HubCommand::Unregister { team_id, conn_id });
    }

    /// Serializes once and offers the same bytes to every connection in the
    /// team. Saturated recipients are skipped.
    pub async fn broadcast_to_team(
        &self,
        team_id: i64,
        envelope: &ServerEnvelope,
    ) -> ServiceResult<()> {
        let frame = encode(envelope)?;
        let registry = self.registry.read().await;
        if let Some(connections) = registry.get(&team_id) {
            for connection in connections {
                self.deliver(connection, frame.clone(), DeliveryPolicy::BestEffort);
            }
        }
        Ok(())
    }

    /// Fan-out for `message-received`: every recipient gets its own copy
    /// with `is_current_user` set relative to its own user.
    pub async fn broadcast_new_message(
        &self,
        team_id: i64,
        message: ChatMessageModel,
    ) -> ServiceResult<()> {
        let sender_id = message.sender_id()?;
        let registry = self.registry.read().await;
        if let Some(connections) = registry.get(&team_id) {
            for connection in connections {
                let mut copy = message.clone();
                copy.is_current_user = connection.user_id == sender_id;
                let frame = encode(&ServerEnvelope::MessageReceived(copy))?;
                self.deliver(connection, frame, DeliveryPolicy::BestEffort);
            }
        }
        Ok(())
    }

    /// Delivers to every connection of `user_id` in the team; a user with
    /// several sessions receives one copy per session.
    pub async fn send_to_user(
        &self,
        team_id: i64,
        user_id: i64,
        envelope: &ServerEnvelope,
    ) -> ServiceResult<()> {
        let frame = encode(envelope)?;
        let registry = self.registry.read().await;
        if let Some(connections) = registry.get(&team_id) {
            for connection in connections.iter().filter(|c| c.user_id == user_id) {
                self.deliver(connection, frame.clone(), DeliveryPolicy::Direct);
            }
        }
        Ok(())
    }

    /// Delivers to one specific connection.
    pub async fn send_to_conn(
        &self,
        team_id: i64,
        conn_id: Uuid,
        envelope: &ServerEnvelope,
    ) -> ServiceResult<()> {
        let frame = encode(envelope)?;
        let registry = self.registry.read().await;
        if let Some(connection) = registry
            .get(&team_id)
            .and_then(|connections| connections.iter().find(|c| c.conn_id == conn_id))
        {
            self.deliver(connection, frame, DeliveryPolicy::Direct);
        }
        Ok(())
    }

    fn deliver(&self, connection: &ConnHandle, frame: Utf8Bytes, policy: DeliveryPolicy) {
        match connection.sender.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => match policy {
                DeliveryPolicy::BestEffort => {
                    warn!(
                        conn_id = %connection.conn_id,
                        user_id = connection.user_id,
                        "Outbound queue full, dropping broadcast frame"
                    );
                }
                DeliveryPolicy::Direct => {
                    warn!(
                        conn_id = %connection.conn_id,
                        user_id = connection.user_id,
                        "Outbound queue full on direct send, disconnecting slow consumer"
                    );
                    self.unregister(connection.team_id, connection.conn_id);
                }
            },
            // The connection is on its way out; unregister is in flight.
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

fn encode(envelope: &ServerEnvelope) -> ServiceResult<Utf8Bytes> {
    match envelope.encode() {
        Ok(frame) => Ok(Utf8Bytes::from(frame)),
        Err(e) => unexpected(e),
    }
}

async fn run(mut commands: mpsc::UnboundedReceiver<HubCommand>, registry: Registry) {
    info!("Hub started");
    while let Some(command) = commands.recv().await {
        match command {
            HubCommand::Register { handle, registered } => {
                let mut teams = registry.write().await;
                let connections = teams.entry(handle.team_id).or_default();
                if !connections.iter().any(|c| c.conn_id == handle.conn_id) {
                    info!(
                        conn_id = %handle.conn_id,
                        user_id = handle.user_id,
                        team_id = handle.team_id,
                        team_connections = connections.len() + 1,
                        "Connection registered"
                    );
                    connections.push(handle);
                }
                let _ = registered.send(());
            }
            HubCommand::Unregister { team_id, conn_id } => {
                let mut teams = registry.write().await;
                if let Some(connections) = teams.get_mut(&team_id) {
                    let before = connections.len();
                    connections.retain(|c| c.conn_id != conn_id);
                    if connections.len() < before {
                        info!(
                            %conn_id,
                            team_id,
                            team_connections = connections.len(),
                            "Connection unregistered"
                        );
                    }
                    if connections.is_empty() {
                        teams.remove(&team_id);
                    }
                }
            }
        }
    }
    info!("Hub command channel closed, shutting down");
}
