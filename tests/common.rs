use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use notification_service::{
    api::AppState,
    clients::{
        database::NotificationStore, directory::RecipientDirectory, health::HealthChecker,
    },
    events::ConsumerStatus,
    hub::{HubHandle, connection::ConnectionSettings},
    models::{directory::DirectoryUser, notification::Notification},
};
use tokio::time::{Instant, sleep};
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    notifications: Mutex<Vec<Notification>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn failing() -> Self {
        Self {
            notifications: Mutex::new(Vec::new()),
            failing: AtomicBool::new(true),
        }
    }

    pub fn seed(&self, notification: Notification) {
        self.notifications.lock().unwrap().push(notification);
    }

    pub fn all(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn for_user(&self, user_id: &str) -> Vec<Notification> {
        self.all()
            .into_iter()
            .filter(|n| n.user_id == user_id)
            .collect()
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert(&self, notification: &Notification) -> Result<(), Error> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("store unavailable"));
        }
        self.notifications.lock().unwrap().push(notification.clone());
        Ok(())
    }

    async fn find_by_recipient(&self, user_id: &str) -> Result<Vec<Notification>, Error> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("store unavailable"));
        }
        let mut found = self.for_user(user_id);
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn mark_as_read(&self, id: Uuid) -> Result<bool, Error> {
        let mut notifications = self.notifications.lock().unwrap();
        match notifications.iter_mut().find(|n| n.id == id) {
            Some(notification) => {
                notification.is_read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn health_check(&self) -> Result<(), Error> {
        if self.failing.load(Ordering::SeqCst) {
            Err(anyhow!("store unavailable"))
        } else {
            Ok(())
        }
    }
}

pub struct StaticDirectory {
    users: Option<Vec<DirectoryUser>>,
    pub lookups: AtomicUsize,
}

impl StaticDirectory {
    pub fn with_users(users: Vec<DirectoryUser>) -> Self {
        Self {
            users: Some(users),
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            users: None,
            lookups: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RecipientDirectory for StaticDirectory {
    async fn list_users(&self) -> Result<Vec<DirectoryUser>, Error> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.users
            .clone()
            .ok_or_else(|| anyhow!("directory unavailable"))
    }

    async fn health_check(&self) -> Result<(), Error> {
        self.users
            .as_ref()
            .map(|_| ())
            .ok_or_else(|| anyhow!("directory unavailable"))
    }
}

pub fn directory_user(id: &str, role: &str, username: &str) -> DirectoryUser {
    DirectoryUser {
        id: id.to_string(),
        role: role.to_string(),
        username: username.to_string(),
        email: format!("{}@example.com", id),
    }
}

pub fn connection_settings() -> ConnectionSettings {
    ConnectionSettings {
        outbound_capacity: 16,
        ping_interval: Duration::from_secs(60),
        write_timeout: Duration::from_secs(2),
    }
}

pub fn app_state(
    store: Arc<dyn NotificationStore>,
    directory: Arc<dyn RecipientDirectory>,
    hub: HubHandle,
) -> Arc<AppState> {
    let consumer = ConsumerStatus::default();
    consumer.mark_running();
    app_state_with_consumer(store, directory, hub, consumer)
}

pub fn app_state_with_consumer(
    store: Arc<dyn NotificationStore>,
    directory: Arc<dyn RecipientDirectory>,
    hub: HubHandle,
    consumer: ConsumerStatus,
) -> Arc<AppState> {
    Arc::new(AppState {
        store: store.clone(),
        hub: hub.clone(),
        health_checker: HealthChecker::new(store, directory, hub, consumer),
        connection_settings: connection_settings(),
    })
}

/// Polls the hub until `user_id` reaches the expected presence.
pub async fn wait_for_presence(hub: &HubHandle, user_id: &str, online: bool) -> Result<()> {
    let deadline = Instant::now() + Duration::from_secs(2);

    while Instant::now() < deadline {
        if hub.is_online(user_id).await == online {
            return Ok(());
        }
        sleep(Duration::from_millis(10)).await;
    }

    Err(anyhow!(
        "{} did not become {} in time",
        user_id,
        if online { "online" } else { "offline" }
    ))
}
