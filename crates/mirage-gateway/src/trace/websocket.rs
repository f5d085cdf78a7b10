//! WebSocket endpoint streaming live traces to admin clients.

use super::TraceBus;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{CONNECTION, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, UPGRADE};
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::{Message, Role};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};

const PING_INTERVAL: Duration = Duration::from_secs(30);
/// A client that has not ponged (or sent anything) within this window is
/// considered gone and its subscription is dropped.
const CLIENT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Upgrade the connection and stream each recorded trace as one JSON text
/// frame. The subscription ends when the client closes the socket.
pub fn handle_trace_stream(
    mut req: Request<Incoming>,
    bus: Arc<TraceBus>,
) -> Response<Full<Bytes>> {
    let is_websocket = req
        .headers()
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    let key = req
        .headers()
        .get(SEC_WEBSOCKET_KEY)
        .map(|v| derive_accept_key(v.as_bytes()));

    let (Some(accept), true) = (key, is_websocket) else {
        return Response::builder()
            .status(StatusCode::BAD_REQUEST)
            .body(Full::new(Bytes::from_static(b"websocket upgrade required")))
            .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())));
    };

    let on_upgrade = hyper::upgrade::on(&mut req);
    tokio::spawn(async move {
        match on_upgrade.await {
            Ok(upgraded) => {
                let ws = WebSocketStream::from_raw_socket(
                    TokioIo::new(upgraded),
                    Role::Server,
                    None,
                )
                .await;
                stream_traces(ws, bus).await;
            }
            Err(e) => debug!("websocket upgrade failed: {e}"),
        }
    });

    Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(CONNECTION, "Upgrade")
        .header(UPGRADE, "websocket")
        .header(SEC_WEBSOCKET_ACCEPT, accept)
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

/// Three-way select: a trace arriving, the keep-alive tick, or the client
/// going away. No branch may starve the others. The client's read deadline
/// is refreshed on every pong; a silent peer is dropped once the deadline
/// lapses, even if the socket never errors.
async fn stream_traces<S>(ws: WebSocketStream<S>, bus: Arc<TraceBus>)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (sub_id, mut traces) = bus.subscribe();
    let (mut sink, mut stream) = ws.split();
    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.tick().await; // first tick fires immediately
    let mut deadline = tokio::time::Instant::now() + CLIENT_READ_TIMEOUT;

    loop {
        tokio::select! {
            trace = traces.recv() => {
                let Some(trace) = trace else {
                    // Bus closed the subscription (shutdown)
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                let payload = match serde_json::to_string(&trace) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("failed to serialize trace: {e}");
                        continue;
                    }
                };
                if sink.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if tokio::time::Instant::now() > deadline {
                    debug!(subscriber = %sub_id, "client read deadline lapsed, dropping");
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(Message::Pong(_))) => {
                        deadline = tokio::time::Instant::now() + CLIENT_READ_TIMEOUT;
                    }
                    // Stray client frames keep the read side drained but do
                    // not extend the deadline
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    bus.unsubscribe(&sub_id);
    debug!(subscriber = %sub_id, "trace stream ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_unresponsive_client_is_dropped() {
        let bus = Arc::new(TraceBus::new(10));
        let (client, server) = tokio::io::duplex(1024);
        let ws = WebSocketStream::from_raw_socket(server, Role::Server, None).await;

        let server_task = tokio::spawn(stream_traces(ws, bus.clone()));

        // The client holds the socket open but never reads, so it never
        // pongs. The subscription must still be torn down.
        let _client = client;
        server_task.await.unwrap();
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ponging_client_outlives_the_deadline() {
        let bus = Arc::new(TraceBus::new(10));
        let (client, server) = tokio::io::duplex(1024);
        let server_ws = WebSocketStream::from_raw_socket(server, Role::Server, None).await;
        let mut client_ws = WebSocketStream::from_raw_socket(client, Role::Client, None).await;

        let server_task = tokio::spawn(stream_traces(server_ws, bus.clone()));

        // Reading answers each ping with a pong automatically. Four pings
        // is 120s of virtual time, past the 60s client deadline, so
        // surviving that long proves pongs refresh it.
        let client_task = tokio::spawn(async move {
            let mut pings = 0;
            while let Some(Ok(message)) = client_ws.next().await {
                if let Message::Ping(_) = message {
                    pings += 1;
                    if pings == 4 {
                        break;
                    }
                }
            }
            client_ws.close(None).await.ok();
            pings
        });

        assert_eq!(client_task.await.unwrap(), 4);
        server_task.await.unwrap();
        assert_eq!(bus.subscriber_count(), 0);
    }
}
