//! Registry of live realtime connections.
//!
//! A single task owns the connection table and applies register, unregister
//! and deliver requests one at a time, in the order they arrive on its
//! command channel. Everything else talks to it through a [`HubHandle`].

pub mod connection;

use std::collections::HashMap;

use anyhow::{Error, Result, anyhow};
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        oneshot,
    },
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::notification::DeliveryMessage;

pub type ConnectionId = Uuid;

enum HubCommand {
    Register {
        user_id: String,
        connection_id: ConnectionId,
        outbound: mpsc::Sender<String>,
    },
    Unregister {
        user_id: String,
        connection_id: ConnectionId,
    },
    Deliver {
        user_id: String,
        payload: String,
    },
    OnlineUsers {
        reply: oneshot::Sender<Vec<String>>,
    },
    IsOnline {
        user_id: String,
        reply: oneshot::Sender<bool>,
    },
    Count {
        reply: oneshot::Sender<usize>,
    },
}

struct ConnectionEntry {
    id: ConnectionId,
    outbound: mpsc::Sender<String>,
}

pub struct Hub {
    connections: HashMap<String, ConnectionEntry>,
    commands: mpsc::Receiver<HubCommand>,
}

#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<HubCommand>,
}

impl Hub {
    pub fn new(command_capacity: usize) -> (Self, HubHandle) {
        let (sender, receiver) = mpsc::channel(command_capacity.max(1));

        let hub = Self {
            connections: HashMap::new(),
            commands: receiver,
        };

        (hub, HubHandle { commands: sender })
    }

    /// Starts the coordinating loop. It stops once every handle is dropped,
    /// closing all outbound queues with it.
    pub fn spawn(command_capacity: usize) -> (HubHandle, JoinHandle<()>) {
        let (hub, handle) = Self::new(command_capacity);
        let task = tokio::spawn(hub.run());
        (handle, task)
    }

    pub async fn run(mut self) {
        info!("Connection hub started");

        while let Some(command) = self.commands.recv().await {
            self.handle(command);
        }

        info!(
            remaining = self.connections.len(),
            "Connection hub stopped"
        );
    }

    fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register {
                user_id,
                connection_id,
                outbound,
            } => self.register(user_id, connection_id, outbound),
            HubCommand::Unregister {
                user_id,
                connection_id,
            } => self.unregister(&user_id, connection_id),
            HubCommand::Deliver { user_id, payload } => self.deliver(&user_id, payload),
            HubCommand::OnlineUsers { reply } => {
                let _ = reply.send(self.connections.keys().cloned().collect());
            }
            HubCommand::IsOnline { user_id, reply } => {
                let _ = reply.send(self.connections.contains_key(&user_id));
            }
            HubCommand::Count { reply } => {
                let _ = reply.send(self.connections.len());
            }
        }
    }

    fn register(&mut self, user_id: String, id: ConnectionId, outbound: mpsc::Sender<String>) {
        let entry = ConnectionEntry { id, outbound };

        // Dropping the previous entry closes its outbound queue, which ends
        // that connection's write duty.
        match self.connections.insert(user_id.clone(), entry) {
            Some(previous) => info!(
                user_id = %user_id,
                connection_id = %id,
                replaced = %previous.id,
                "User reconnected, previous connection replaced"
            ),
            None => info!(user_id = %user_id, connection_id = %id, "User connected"),
        }
    }

    fn unregister(&mut self, user_id: &str, id: ConnectionId) {
        match self.connections.get(user_id) {
            Some(entry) if entry.id == id => {
                self.connections.remove(user_id);
                info!(user_id = %user_id, connection_id = %id, "User disconnected");
            }
            _ => debug!(
                user_id = %user_id,
                connection_id = %id,
                "Ignoring unregister for a connection that is no longer current"
            ),
        }
    }

    fn deliver(&mut self, user_id: &str, payload: String) {
        let Some(entry) = self.connections.get(user_id) else {
            debug!(user_id = %user_id, "Recipient offline, skipping push");
            return;
        };

        match entry.outbound.try_send(payload) {
            Ok(()) => debug!(user_id = %user_id, "Notification queued for push"),
            Err(TrySendError::Full(_)) => {
                warn!(
                    user_id = %user_id,
                    connection_id = %entry.id,
                    "Outbound queue full, dropping slow connection"
                );
                self.connections.remove(user_id);
            }
            Err(TrySendError::Closed(_)) => {
                debug!(
                    user_id = %user_id,
                    connection_id = %entry.id,
                    "Outbound queue already closed, removing connection"
                );
                self.connections.remove(user_id);
            }
        }
    }
}

impl HubHandle {
    pub async fn register(
        &self,
        user_id: String,
        outbound: mpsc::Sender<String>,
    ) -> Result<ConnectionId, Error> {
        let connection_id = Uuid::new_v4();

        self.commands
            .send(HubCommand::Register {
                user_id,
                connection_id,
                outbound,
            })
            .await
            .map_err(|_| anyhow!("Connection hub is not running"))?;

        Ok(connection_id)
    }

    /// Only removes the entry if it still belongs to `connection_id`, so
    /// calling it more than once for the same connection is harmless.
    pub async fn unregister(&self, user_id: &str, connection_id: ConnectionId) {
        let command = HubCommand::Unregister {
            user_id: user_id.to_string(),
            connection_id,
        };

        if self.commands.send(command).await.is_err() {
            debug!(user_id = %user_id, "Connection hub stopped before unregister");
        }
    }

    /// Best-effort push. Never reports failure; the notification is already
    /// stored by the time this is called.
    pub async fn deliver(&self, message: &DeliveryMessage) {
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(
                    user_id = %message.recipient_id,
                    error = %e,
                    "Failed to serialize push message"
                );
                return;
            }
        };

        let command = HubCommand::Deliver {
            user_id: message.recipient_id.clone(),
            payload,
        };

        if self.commands.send(command).await.is_err() {
            debug!(user_id = %message.recipient_id, "Connection hub stopped, push dropped");
        }
    }

    pub async fn online_users(&self) -> Vec<String> {
        let (reply, response) = oneshot::channel();

        if self
            .commands
            .send(HubCommand::OnlineUsers { reply })
            .await
            .is_err()
        {
            return Vec::new();
        }

        response.await.unwrap_or_default()
    }

    pub async fn is_online(&self, user_id: &str) -> bool {
        let (reply, response) = oneshot::channel();
        let command = HubCommand::IsOnline {
            user_id: user_id.to_string(),
            reply,
        };

        if self.commands.send(command).await.is_err() {
            return false;
        }

        response.await.unwrap_or(false)
    }

    pub async fn connection_count(&self) -> usize {
        let (reply, response) = oneshot::channel();

        if self.commands.send(HubCommand::Count { reply }).await.is_err() {
            return 0;
        }

        response.await.unwrap_or(0)
    }
}
