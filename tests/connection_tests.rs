use std::time::Duration;

use anyhow::{Result, anyhow};
use axum::extract::ws::Message;
use futures_util::{Sink, Stream, sink, stream};
use notification_service::{
    hub::{Hub, HubHandle, connection::run_connection},
    models::notification::{DeliveryMessage, Notification},
};
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
    time::timeout,
};

use crate::common::{connection_settings, wait_for_presence};

type Inbound = UnboundedSender<Result<Message, String>>;

/// In-memory stand-in for a websocket: frames written by the server land in
/// the returned receiver, frames pushed into `Inbound` are read by it.
fn transport() -> (
    impl Sink<Message, Error = String> + Unpin + Send + 'static,
    impl Stream<Item = Result<Message, String>> + Unpin + Send + 'static,
    UnboundedReceiver<Message>,
    Inbound,
) {
    let (written_tx, written_rx) = mpsc::unbounded_channel::<Message>();
    let sink = Box::pin(sink::unfold(written_tx, |tx, frame: Message| async move {
        tx.send(frame).map_err(|e| e.to_string())?;
        Ok::<_, String>(tx)
    }));

    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Result<Message, String>>();
    let stream = Box::pin(stream::unfold(inbound_rx, |mut rx| async move {
        rx.recv().await.map(|frame| (frame, rx))
    }));

    (sink, stream, written_rx, inbound_tx)
}

fn spawn_connection(
    hub: &HubHandle,
    user_id: &str,
) -> (JoinHandle<()>, UnboundedReceiver<Message>, Inbound) {
    let (sink, stream, written, inbound) = transport();
    let task = tokio::spawn(run_connection(
        sink,
        stream,
        user_id.to_string(),
        hub.clone(),
        connection_settings(),
    ));
    (task, written, inbound)
}

async fn next_text(written: &mut UnboundedReceiver<Message>) -> Result<serde_json::Value> {
    loop {
        let frame = timeout(Duration::from_secs(2), written.recv())
            .await?
            .ok_or_else(|| anyhow!("transport closed"))?;
        if let Message::Text(text) = frame {
            return Ok(serde_json::from_str(text.as_str())?);
        }
    }
}

async fn expect_close(written: &mut UnboundedReceiver<Message>) -> Result<()> {
    loop {
        let frame = timeout(Duration::from_secs(2), written.recv())
            .await?
            .ok_or_else(|| anyhow!("transport closed without a close frame"))?;
        if let Message::Close(_) = frame {
            return Ok(());
        }
    }
}

/// Test: Notifications delivered to a live connection are written as text frames
#[tokio::test]
async fn test_delivered_notification_is_written_to_transport() -> Result<()> {
    let (hub, _hub_task) = Hub::spawn(16);
    let (_task, mut written, _inbound) = spawn_connection(&hub, "u1");
    wait_for_presence(&hub, "u1", true).await?;

    let notification = Notification::new("u1", "Task 'Docs' status updated to done");
    hub.deliver(&DeliveryMessage::new(notification.clone())).await;

    let frame = next_text(&mut written).await?;
    assert_eq!(frame["userId"], "u1");
    assert_eq!(frame["content"]["id"], notification.id.to_string());
    assert_eq!(frame["content"]["message"], notification.message);

    Ok(())
}

/// Test: A client close frame tears the connection down and unregisters it
#[tokio::test]
async fn test_client_close_unregisters_connection() -> Result<()> {
    let (hub, _hub_task) = Hub::spawn(16);
    let (task, mut written, inbound) = spawn_connection(&hub, "u1");
    wait_for_presence(&hub, "u1", true).await?;

    inbound.send(Ok(Message::Close(None)))?;

    timeout(Duration::from_secs(2), task).await??;
    assert!(!hub.is_online("u1").await);
    expect_close(&mut written).await?;

    Ok(())
}

/// Test: A read error is treated as a disconnect
#[tokio::test]
async fn test_read_error_unregisters_connection() -> Result<()> {
    let (hub, _hub_task) = Hub::spawn(16);
    let (task, _written, inbound) = spawn_connection(&hub, "u1");
    wait_for_presence(&hub, "u1", true).await?;

    inbound.send(Ok(Message::Text("keep-alive".into())))?;
    inbound.send(Err("connection reset".to_string()))?;

    timeout(Duration::from_secs(2), task).await??;
    assert!(!hub.is_online("u1").await);

    Ok(())
}

/// Test: A failed write unregisters the connection even while reads stay open
#[tokio::test]
async fn test_write_failure_unregisters_connection() -> Result<()> {
    let (hub, _hub_task) = Hub::spawn(16);
    let broken = Box::pin(sink::unfold((), |(), _frame: Message| async move {
        Err::<(), String>("broken pipe".to_string())
    }));
    let (_inbound, inbound_rx) = mpsc::unbounded_channel::<Result<Message, String>>();
    let stream = Box::pin(stream::unfold(inbound_rx, |mut rx| async move {
        rx.recv().await.map(|frame| (frame, rx))
    }));

    let task = tokio::spawn(run_connection(
        broken,
        stream,
        "u1".to_string(),
        hub.clone(),
        connection_settings(),
    ));
    wait_for_presence(&hub, "u1", true).await?;

    hub.deliver(&DeliveryMessage::new(Notification::new("u1", "lost")))
        .await;

    timeout(Duration::from_secs(2), task).await??;
    assert!(!hub.is_online("u1").await);

    Ok(())
}

/// Test: A reconnect closes the previous connection and keeps the new one registered
#[tokio::test]
async fn test_reconnect_closes_previous_connection() -> Result<()> {
    let (hub, _hub_task) = Hub::spawn(16);
    let (old_task, mut old_written, _old_inbound) = spawn_connection(&hub, "u1");
    wait_for_presence(&hub, "u1", true).await?;

    let (_new_task, mut new_written, _new_inbound) = spawn_connection(&hub, "u1");

    expect_close(&mut old_written).await?;
    timeout(Duration::from_secs(2), old_task).await??;

    hub.deliver(&DeliveryMessage::new(Notification::new("u1", "fresh")))
        .await;

    let frame = next_text(&mut new_written).await?;
    assert_eq!(frame["content"]["message"], "fresh");
    assert!(hub.is_online("u1").await);

    Ok(())
}
