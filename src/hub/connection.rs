use std::{fmt::Display, time::Duration};

use axum::{
    body::Bytes,
    extract::ws::{Message, WebSocket},
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::{
    sync::mpsc,
    time::{Instant, interval_at, timeout},
};
use tracing::{debug, info, warn};

use crate::hub::{ConnectionId, HubHandle};

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub outbound_capacity: usize,
    pub ping_interval: Duration,
    pub write_timeout: Duration,
}

pub async fn serve_socket(
    socket: WebSocket,
    user_id: String,
    hub: HubHandle,
    settings: ConnectionSettings,
) {
    let (sink, stream) = socket.split();
    run_connection(sink, stream, user_id, hub, settings).await;
}

/// Registers the connection, then runs its read and write duties until
/// either side ends. The entry is always unregistered on the way out.
pub async fn run_connection<Tx, Rx, E>(
    sink: Tx,
    mut stream: Rx,
    user_id: String,
    hub: HubHandle,
    settings: ConnectionSettings,
) where
    Tx: Sink<Message> + Unpin + Send + 'static,
    Tx::Error: Display + Send,
    Rx: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let (outbound, receiver) = mpsc::channel::<String>(settings.outbound_capacity.max(1));

    let connection_id = match hub.register(user_id.clone(), outbound).await {
        Ok(id) => id,
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "Could not register connection");
            return;
        }
    };

    let mut write_task = tokio::spawn(write_duty(
        sink,
        receiver,
        user_id.clone(),
        connection_id,
        hub.clone(),
        settings,
    ));

    tokio::select! {
        _ = read_duty(&mut stream, &user_id, connection_id) => {}
        _ = &mut write_task => {}
    }

    hub.unregister(&user_id, connection_id).await;

    if !write_task.is_finished() {
        let _ = write_task.await;
    }

    info!(user_id = %user_id, connection_id = %connection_id, "Connection closed");
}

/// Inbound frames only matter as a liveness signal.
async fn read_duty<Rx, E>(stream: &mut Rx, user_id: &str, connection_id: ConnectionId)
where
    Rx: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Close(_)) => {
                debug!(user_id = %user_id, connection_id = %connection_id, "Client closed connection");
                return;
            }
            Ok(_) => continue,
            Err(e) => {
                debug!(
                    user_id = %user_id,
                    connection_id = %connection_id,
                    error = %e,
                    "Read failed"
                );
                return;
            }
        }
    }
}

async fn write_duty<Tx>(
    mut sink: Tx,
    mut outbound: mpsc::Receiver<String>,
    user_id: String,
    connection_id: ConnectionId,
    hub: HubHandle,
    settings: ConnectionSettings,
) where
    Tx: Sink<Message> + Unpin,
    Tx::Error: Display,
{
    let period = settings.ping_interval.max(Duration::from_secs(1));
    let mut ping = interval_at(Instant::now() + period, period);

    loop {
        let frame = tokio::select! {
            next = outbound.recv() => match next {
                Some(payload) => Message::Text(payload.into()),
                None => {
                    debug!(user_id = %user_id, connection_id = %connection_id, "Outbound queue closed");
                    let _ = timeout(settings.write_timeout, sink.send(Message::Close(None))).await;
                    return;
                }
            },
            _ = ping.tick() => Message::Ping(Bytes::new()),
        };

        match timeout(settings.write_timeout, sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(
                    user_id = %user_id,
                    connection_id = %connection_id,
                    error = %e,
                    "Write failed, dropping connection"
                );
                hub.unregister(&user_id, connection_id).await;
                return;
            }
            Err(_) => {
                warn!(
                    user_id = %user_id,
                    connection_id = %connection_id,
                    timeout_ms = settings.write_timeout.as_millis() as u64,
                    "Write timed out, dropping connection"
                );
                hub.unregister(&user_id, connection_id).await;
                return;
            }
        }
    }
}
