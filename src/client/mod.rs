//! StreamClient: subscribe to a relay SSE endpoint and get typed events
//! over a channel, with reconnect policy owned here rather than by callers.
//!
//! GET subscriptions reconnect on transport drops with exponential backoff.
//! POST subscriptions never reconnect: re-issuing the request would run the
//! side-effecting execute a second time. Neither reconnects after a terminal
//! `completed`/`error` event.

use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::sse::{SseDecoder, SseFrame};

const BACKOFF_BASE_MS: u64 = 1000;
const BACKOFF_CAP_MS: u64 = 30_000;
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Connected,
    Message { event: String, data: Value },
    Completed(Option<Value>),
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct SubscribeOptions {
    pub method: Method,
    pub body: Option<Value>,
    pub auto_reconnect: bool,
    pub max_reconnect_attempts: u32,
    pub bearer_token: Option<String>,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            method: Method::Get,
            body: None,
            auto_reconnect: true,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            bearer_token: None,
        }
    }
}

/// Handle for one live subscription. Events arrive via [`recv`]; dropping
/// the handle (or calling [`disconnect`]) cancels pending backoff sleeps and
/// aborts any in-flight request.
pub struct StreamConnection {
    events: mpsc::Receiver<StreamEvent>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl StreamConnection {
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Idempotent; safe to call any number of times.
    pub fn disconnect(&self) {
        self.cancel.cancel();
    }
}

impl Drop for StreamConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

pub fn subscribe(url: impl Into<String>, options: SubscribeOptions) -> StreamConnection {
    let url = url.into();
    let (tx, rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let pump_cancel = cancel.clone();
    let handle = tokio::spawn(async move {
        pump(url, options, tx, pump_cancel).await;
    });
    StreamConnection {
        events: rx,
        cancel,
        handle,
    }
}

/// Delay before reconnect attempt `attempt` (1-based): 1000 × 2^attempt ms,
/// capped at 30 s.
fn reconnect_delay(attempt: u32) -> Duration {
    let ms = BACKOFF_BASE_MS
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(BACKOFF_CAP_MS);
    Duration::from_millis(ms)
}

enum TransportEnd {
    /// A terminal event was dispatched; the connection is explicitly closed
    /// and later transport noise is irrelevant.
    Terminal,
    /// Receiver dropped or disconnect() called.
    Cancelled,
    /// Transport-level drop: connect failure, read error, or server EOF
    /// without a terminal event.
    Dropped(String),
}

async fn pump(
    url: String,
    options: SubscribeOptions,
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
) {
    let client = reqwest::Client::new();
    let mut attempts: u32 = 0;

    loop {
        let end = tokio::select! {
            end = run_transport(&client, &url, &options, &tx, &mut attempts) => end,
            _ = cancel.cancelled() => TransportEnd::Cancelled,
        };

        let reason = match end {
            TransportEnd::Terminal | TransportEnd::Cancelled => return,
            TransportEnd::Dropped(reason) => reason,
        };

        if options.method == Method::Post || !options.auto_reconnect {
            let _ = tx.send(StreamEvent::Error(reason)).await;
            return;
        }
        if attempts >= options.max_reconnect_attempts {
            let _ = tx
                .send(StreamEvent::Error(format!(
                    "connection lost after {attempts} reconnect attempts: {reason}"
                )))
                .await;
            return;
        }

        attempts += 1;
        let delay = reconnect_delay(attempts);
        debug!("stream dropped ({reason}); reconnect attempt {attempts} in {delay:?}");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => return,
        }
    }
}

async fn run_transport(
    client: &reqwest::Client,
    url: &str,
    options: &SubscribeOptions,
    tx: &mpsc::Sender<StreamEvent>,
    attempts: &mut u32,
) -> TransportEnd {
    let mut request = match options.method {
        Method::Get => client.get(url),
        Method::Post => {
            let mut req = client.post(url);
            if let Some(body) = &options.body {
                req = req.json(body);
            }
            req
        }
    };
    request = request.header("Accept", "text/event-stream");
    if let Some(token) = &options.bearer_token {
        request = request.bearer_auth(token);
    }

    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => return TransportEnd::Dropped(format!("connection failed: {e}")),
    };

    let status = response.status();
    if !status.is_success() {
        // The body is read exactly once; a JSON `error` field is the real
        // failure reason when present.
        let body = response.text().await.unwrap_or_default();
        let reason = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(Value::as_str).map(String::from))
            .unwrap_or_else(|| format!("HTTP {status}"));
        let _ = tx.send(StreamEvent::Error(reason)).await;
        return TransportEnd::Terminal;
    }

    let mut decoder = SseDecoder::new();
    let mut stream = Box::pin(response.bytes_stream());

    use tokio_stream::StreamExt;
    loop {
        match stream.next().await {
            Some(Ok(chunk)) => {
                for frame in decoder.feed(&chunk) {
                    match dispatch_frame(tx, frame, attempts).await {
                        Dispatch::Continue => {}
                        Dispatch::Terminal => return TransportEnd::Terminal,
                        Dispatch::Closed => return TransportEnd::Cancelled,
                    }
                }
            }
            Some(Err(e)) => {
                return TransportEnd::Dropped(format!("stream read failed: {e}"));
            }
            None => {
                if let Some(frame) = decoder.finish() {
                    match dispatch_frame(tx, frame, attempts).await {
                        Dispatch::Continue => {}
                        Dispatch::Terminal => return TransportEnd::Terminal,
                        Dispatch::Closed => return TransportEnd::Cancelled,
                    }
                }
                return TransportEnd::Dropped("stream ended".to_string());
            }
        }
    }
}

enum Dispatch {
    Continue,
    Terminal,
    Closed,
}

async fn dispatch_frame(
    tx: &mpsc::Sender<StreamEvent>,
    frame: SseFrame,
    attempts: &mut u32,
) -> Dispatch {
    let event = match frame.event.as_str() {
        "connected" => {
            // A live connection resets the backoff clock.
            *attempts = 0;
            StreamEvent::Connected
        }
        "completed" => {
            let payload = serde_json::from_str::<Value>(&frame.data).ok();
            if tx.send(StreamEvent::Completed(payload)).await.is_err() {
                return Dispatch::Closed;
            }
            return Dispatch::Terminal;
        }
        "error" => match serde_json::from_str::<Value>(&frame.data) {
            Ok(payload) => {
                // A JSON error payload is an application-level terminal
                // failure.
                let reason = payload
                    .get("error")
                    .and_then(Value::as_str)
                    .map(String::from)
                    .unwrap_or_else(|| frame.data.clone());
                if tx.send(StreamEvent::Error(reason)).await.is_err() {
                    return Dispatch::Closed;
                }
                return Dispatch::Terminal;
            }
            // Upstream framing is not fully trusted: a non-JSON error frame
            // is forwarded as an ordinary message instead of killing the
            // stream.
            Err(_) => StreamEvent::Message {
                event: frame.event,
                data: Value::String(frame.data),
            },
        },
        _ => {
            let data = serde_json::from_str::<Value>(&frame.data)
                .unwrap_or(Value::String(frame.data));
            StreamEvent::Message {
                event: frame.event,
                data,
            }
        }
    };

    if tx.send(event).await.is_err() {
        return Dispatch::Closed;
    }
    Dispatch::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn backoff_schedule_doubles_and_caps() {
        assert_eq!(reconnect_delay(1), Duration::from_millis(2000));
        assert_eq!(reconnect_delay(2), Duration::from_millis(4000));
        assert_eq!(reconnect_delay(3), Duration::from_millis(8000));
        assert_eq!(reconnect_delay(4), Duration::from_millis(16000));
        assert_eq!(reconnect_delay(5), Duration::from_millis(30000));
        assert_eq!(reconnect_delay(12), Duration::from_millis(30000));
    }

    async fn collect_dispatch(frames: Vec<SseFrame>) -> Vec<StreamEvent> {
        let (tx, mut rx) = mpsc::channel(16);
        let mut attempts = 3;
        for frame in frames {
            if matches!(
                dispatch_frame(&tx, frame, &mut attempts).await,
                Dispatch::Terminal
            ) {
                break;
            }
        }
        drop(tx);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn connected_resets_attempt_counter() {
        let (tx, _rx) = mpsc::channel(16);
        let mut attempts = 4;
        dispatch_frame(&tx, SseFrame::new("connected", ""), &mut attempts).await;
        assert_eq!(attempts, 0);
    }

    #[tokio::test]
    async fn json_error_frame_is_terminal() {
        let events = collect_dispatch(vec![
            SseFrame::new("error", "{\"error\":\"boom\"}"),
            SseFrame::new("status", "{\"x\":1}"),
        ])
        .await;
        assert_eq!(events, vec![StreamEvent::Error("boom".to_string())]);
    }

    #[tokio::test]
    async fn non_json_error_frame_is_an_ordinary_message() {
        let events = collect_dispatch(vec![SseFrame::new("error", "not json")]).await;
        assert_eq!(
            events,
            vec![StreamEvent::Message {
                event: "error".to_string(),
                data: Value::String("not json".to_string()),
            }]
        );
    }

    #[tokio::test]
    async fn unknown_events_carry_parsed_or_raw_payloads() {
        let events = collect_dispatch(vec![
            SseFrame::new("tool_use", "{\"tool\":\"bash\"}"),
            SseFrame::new("session_name", "plain text"),
        ])
        .await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Message {
                    event: "tool_use".to_string(),
                    data: serde_json::json!({ "tool": "bash" }),
                },
                StreamEvent::Message {
                    event: "session_name".to_string(),
                    data: Value::String("plain text".to_string()),
                },
            ]
        );
    }

    #[tokio::test]
    async fn completed_with_unparsable_payload_still_terminates() {
        let events = collect_dispatch(vec![SseFrame::new("completed", "<garbage>")]).await;
        assert_eq!(events, vec![StreamEvent::Completed(None)]);
    }

    /// Minimal SSE server: serves each accepted connection with the scripted
    /// body, then closes the socket. Counts connections so tests can assert
    /// on reconnect behavior.
    async fn scripted_server(
        bodies: Vec<&'static str>,
        hits: Arc<AtomicUsize>,
    ) -> std::io::Result<String> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let n = hits.fetch_add(1, Ordering::SeqCst);
                let body = bodies.get(n.min(bodies.len() - 1)).copied().unwrap_or("");
                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n{body}"
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        Ok(format!("http://{addr}/stream"))
    }

    #[tokio::test]
    async fn terminal_completed_suppresses_reconnect() {
        let hits = Arc::new(AtomicUsize::new(0));
        let url = match scripted_server(
            vec!["event: connected\ndata: {}\n\nevent: completed\ndata: {\"sessionId\":1}\n\n"],
            hits.clone(),
        )
        .await
        {
            Ok(url) => url,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                eprintln!("Skipping socket test: bind not permitted");
                return;
            }
            Err(e) => panic!("{e}"),
        };

        let mut conn = subscribe(url, SubscribeOptions::default());
        assert_eq!(conn.recv().await, Some(StreamEvent::Connected));
        assert_eq!(
            conn.recv().await,
            Some(StreamEvent::Completed(Some(
                serde_json::json!({ "sessionId": 1 })
            )))
        );
        // Absorbing state: the channel ends, no reconnect happens even
        // though the server closed the socket afterwards.
        assert_eq!(conn.recv().await, None);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn get_transport_retries_then_reports_exhaustion() {
        let hits = Arc::new(AtomicUsize::new(0));
        // Empty bodies: every connection ends without a terminal event.
        let url = match scripted_server(vec![""], hits.clone()).await {
            Ok(url) => url,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                eprintln!("Skipping socket test: bind not permitted");
                return;
            }
            Err(e) => panic!("{e}"),
        };

        let mut conn = subscribe(
            url,
            SubscribeOptions {
                max_reconnect_attempts: 1,
                ..SubscribeOptions::default()
            },
        );

        let event = tokio::time::timeout(Duration::from_secs(10), conn.recv())
            .await
            .expect("exhaustion error within timeout");
        match event {
            Some(StreamEvent::Error(reason)) => {
                assert!(reason.contains("1 reconnect attempt"), "{reason}");
            }
            other => panic!("expected error, got {other:?}"),
        }
        assert_eq!(conn.recv().await, None);
        // Initial connection plus exactly one reconnect.
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn post_transport_never_reconnects() {
        let hits = Arc::new(AtomicUsize::new(0));
        let url = match scripted_server(
            vec!["event: connected\ndata: {}\n\n"],
            hits.clone(),
        )
        .await
        {
            Ok(url) => url,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                eprintln!("Skipping socket test: bind not permitted");
                return;
            }
            Err(e) => panic!("{e}"),
        };

        let mut conn = subscribe(
            url,
            SubscribeOptions {
                method: Method::Post,
                body: Some(serde_json::json!({ "userRequest": "hi" })),
                ..SubscribeOptions::default()
            },
        );

        assert_eq!(conn.recv().await, Some(StreamEvent::Connected));
        match conn.recv().await {
            Some(StreamEvent::Error(_)) => {}
            other => panic!("expected drop error, got {other:?}"),
        }
        assert_eq!(conn.recv().await, None);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let hits = Arc::new(AtomicUsize::new(0));
        let url = match scripted_server(vec![""], hits.clone()).await {
            Ok(url) => url,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                eprintln!("Skipping socket test: bind not permitted");
                return;
            }
            Err(e) => panic!("{e}"),
        };

        let conn = subscribe(url, SubscribeOptions::default());
        conn.disconnect();
        conn.disconnect();
        drop(conn);
    }
}
