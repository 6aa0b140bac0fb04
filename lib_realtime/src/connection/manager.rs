//! # Connection Manager
//!
//! Owns the single streaming session to the backend. A session is a spawned
//! task that multiplexes outbound commands, inbound frames and the heartbeat
//! over one WebSocket, in the same `select!` shape as the market-data stream
//! readers.
//!
//! Every `connect()` / `disconnect()` bumps a generation counter and cancels
//! the previous generation's token. A handshake or session task that finishes
//! after its generation was superseded drops its result instead of touching
//! the shared state, so a late handshake can never resurrect a session the
//! caller already tore down.
//!
//! The manager never reconnects by itself; retry policy lives in the
//! orchestrator.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures_util::sink::SinkExt;
use futures_util::stream::StreamExt;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::connection::messages::{ClientCommand, EventKind, ServerMessage, StreamEvent};
use crate::connection::state::ConnectionState;
use crate::error::SyncError;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Callback invoked for every event of the kind it was registered for.
pub type EventHandler = Arc<dyn Fn(&StreamEvent) + Send + Sync>;

const OUTBOUND_QUEUE: usize = 64;
const MAX_HEARTBEAT: Duration = Duration::from_secs(3600);

/// Credentials presented during the handshake.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// Sent as `Authorization: Bearer <token>`.
    pub token: Option<String>,
}

impl Credentials {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self { token: Some(token.into()) }
    }
}

/// Timing parameters of a streaming session.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionOptions {
    pub connect_timeout: Duration,
    /// Ping cadence; the session is declared dead after three silent intervals.
    pub heartbeat_interval: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(25),
        }
    }
}

/// Opaque token returned by [`ConnectionManager::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Registration {
    kind: EventKind,
    id: HandlerId,
    handler: EventHandler,
}

struct Session {
    state: ConnectionState,
    generation: u64,
    cancel: CancellationToken,
    outbound: Option<mpsc::Sender<ClientCommand>>,
}

struct Inner {
    session: Mutex<Session>,
    handlers: Mutex<Vec<Registration>>,
    next_handler: AtomicU64,
    options: ConnectionOptions,
}

// The guarded data stays consistent across a panic, so poisoning is ignored.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to the streaming connection. Cheap to clone; all clones share one
/// session and one handler registry.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(options: ConnectionOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                session: Mutex::new(Session {
                    state: ConnectionState::Disconnected,
                    generation: 0,
                    cancel: CancellationToken::new(),
                    outbound: None,
                }),
                handlers: Mutex::new(Vec::new()),
                next_handler: AtomicU64::new(1),
                options,
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.inner.session).state
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Opens a session to `target`, replacing any existing one. Replacing an
    /// open session emits `disconnected` for it first.
    ///
    /// Resolves once the WebSocket upgrade has completed and the session task
    /// is running. Failure and timeout leave the manager in `Error` and emit
    /// an `error` event; a `disconnect()` issued meanwhile yields
    /// [`SyncError::Cancelled`] without any event.
    pub async fn connect(&self, target: &str, credentials: &Credentials) -> Result<(), SyncError> {
        let (generation, cancel, replaced) = {
            let mut session = lock(&self.inner.session);
            let replaced = session.state == ConnectionState::Connected;
            session.cancel.cancel();
            session.generation += 1;
            session.cancel = CancellationToken::new();
            session.outbound = None;
            session.state = ConnectionState::Connecting;
            (session.generation, session.cancel.clone(), replaced)
        };

        if replaced {
            tracing::info!("Replacing the open stream session");
            self.inner.emit(&StreamEvent::Disconnected);
        }

        tracing::info!("Connecting to stream {} (generation {})", target, generation);

        let request = match build_request(target, credentials) {
            Ok(r) => r,
            Err(e) => {
                self.fail_attempt(generation, &e);
                return Err(e);
            }
        };

        let connect_timeout = self.inner.options.connect_timeout;
        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(SyncError::Cancelled),
            res = timeout(connect_timeout, connect_async(request)) => match res {
                Ok(Ok((ws, _response))) => Ok(ws),
                Ok(Err(e)) => Err(SyncError::from(e)),
                Err(_) => Err(SyncError::Timeout(connect_timeout)),
            },
        };

        let ws = match outcome {
            Ok(ws) => ws,
            Err(SyncError::Cancelled) => {
                tracing::debug!("Connect generation {} cancelled during handshake", generation);
                return Err(SyncError::Cancelled);
            }
            Err(e) => {
                tracing::warn!("Stream handshake with {} failed: {}", target, e);
                self.fail_attempt(generation, &e);
                return Err(e);
            }
        };

        let (out_tx, out_rx) = mpsc::channel(OUTBOUND_QUEUE);
        {
            let mut session = lock(&self.inner.session);
            if session.generation != generation || cancel.is_cancelled() {
                // Superseded while the upgrade was in flight; dropping `ws` closes it.
                return Err(SyncError::Cancelled);
            }
            session.state = ConnectionState::Connected;
            session.outbound = Some(out_tx);
        }

        tokio::spawn(run_session(
            Arc::downgrade(&self.inner),
            generation,
            ws,
            out_rx,
            cancel,
            self.inner.options.heartbeat_interval,
        ));

        tracing::info!("Stream connected (generation {})", generation);
        self.inner.emit(&StreamEvent::ConnectionEstablished);
        Ok(())
    }

    /// Closes the session (if any) and cancels an in-flight `connect()`.
    /// Always ends in `Disconnected`; calling it repeatedly is harmless.
    pub fn disconnect(&self) {
        let was_connected = {
            let mut session = lock(&self.inner.session);
            session.cancel.cancel();
            session.generation += 1;
            session.outbound = None;
            let previous = session.state;
            session.state = ConnectionState::Disconnected;
            previous == ConnectionState::Connected
        };

        if was_connected {
            tracing::info!("Stream disconnected");
            self.inner.emit(&StreamEvent::Disconnected);
        }
    }

    /// Queues `command` on the open session.
    pub fn send(&self, command: ClientCommand) -> Result<(), SyncError> {
        let session = lock(&self.inner.session);
        let sender = match (&session.outbound, session.state) {
            (Some(tx), ConnectionState::Connected) => tx,
            _ => return Err(SyncError::NotConnected),
        };
        sender.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                SyncError::Transport("outbound command queue is full".into())
            }
            mpsc::error::TrySendError::Closed(_) => SyncError::NotConnected,
        })
    }

    /// Registers `handler` for events of `kind`. Handlers of one kind run in
    /// registration order.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        let id = HandlerId(self.inner.next_handler.fetch_add(1, Ordering::Relaxed));
        lock(&self.inner.handlers).push(Registration {
            kind,
            id,
            handler: Arc::new(handler),
        });
        id
    }

    /// Removes a handler. Returns `false` if it was not registered for `kind`.
    pub fn off(&self, kind: EventKind, id: HandlerId) -> bool {
        let mut handlers = lock(&self.inner.handlers);
        let before = handlers.len();
        handlers.retain(|r| !(r.kind == kind && r.id == id));
        handlers.len() != before
    }

    /// Moves to `Error` and emits an `error` event, unless a newer
    /// `connect()` / `disconnect()` has taken over meanwhile.
    fn fail_attempt(&self, generation: u64, err: &SyncError) {
        let current = {
            let mut session = lock(&self.inner.session);
            if session.generation == generation {
                session.state = ConnectionState::Error;
                true
            } else {
                false
            }
        };
        if current {
            self.inner.emit(&StreamEvent::Error(err.to_string()));
        }
    }

    #[cfg(test)]
    pub(crate) fn emit_for_test(&self, event: &StreamEvent) {
        self.inner.emit(event);
    }
}

impl Inner {
    /// Runs every handler registered for the event's kind, outside any lock.
    fn emit(&self, event: &StreamEvent) {
        let kind = event.kind();
        let targets: Vec<EventHandler> = lock(&self.handlers)
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| Arc::clone(&r.handler))
            .collect();

        for handler in targets {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                tracing::error!("A '{}' handler panicked; continuing with the rest", kind);
            }
        }
    }

    /// Marks the session failed, unless it has been superseded already.
    fn session_failed(&self, generation: u64, reason: String) {
        {
            let mut session = lock(&self.session);
            if session.generation != generation {
                return;
            }
            session.state = ConnectionState::Error;
            session.outbound = None;
        }
        tracing::warn!("Stream session ended: {}", reason);
        self.emit(&StreamEvent::Error(reason));
        self.emit(&StreamEvent::Disconnected);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let session = self.session.get_mut().unwrap_or_else(PoisonError::into_inner);
        session.cancel.cancel();
    }
}

fn build_request(
    target: &str,
    credentials: &Credentials,
) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request, SyncError> {
    let mut request = target.into_client_request()?;
    if let Some(token) = &credentials.token {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| SyncError::Config(format!("invalid API token: {}", e)))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }
    Ok(request)
}

async fn run_session(
    inner: Weak<Inner>,
    generation: u64,
    ws: WsStream,
    mut out_rx: mpsc::Receiver<ClientCommand>,
    cancel: CancellationToken,
    heartbeat: Duration,
) {
    let heartbeat = heartbeat.min(MAX_HEARTBEAT);
    let (mut write, mut read) = ws.split();
    let idle_limit = heartbeat.saturating_mul(3);
    let mut last_frame = Instant::now();
    let mut ping = interval_at(Instant::now() + heartbeat, heartbeat);

    let failure: Option<String> = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = write.send(WsMessage::Close(None)).await;
                break None;
            }

            Some(command) = out_rx.recv() => {
                let text = match command.to_json() {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::error!("Dropping unserializable command {:?}: {}", command, e);
                        continue;
                    }
                };
                tracing::debug!("-> {}", text);
                if let Err(e) = write.send(WsMessage::Text(text.into())).await {
                    break Some(format!("send failed: {}", e));
                }
            }

            frame = read.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        last_frame = Instant::now();
                        match ServerMessage::decode(text.as_str()) {
                            Ok(msg) => {
                                let Some(inner) = inner.upgrade() else { break None };
                                inner.emit(&StreamEvent::from(msg));
                            }
                            Err(e) => tracing::debug!("Dropping undecodable frame: {} ({})", text.as_str(), e),
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        break Some("connection closed by server".to_string());
                    }
                    // Ping, pong and binary frames only prove liveness.
                    Some(Ok(_)) => last_frame = Instant::now(),
                    Some(Err(e)) => break Some(format!("transport error: {}", e)),
                }
            }

            _ = ping.tick() => {
                if last_frame.elapsed() >= idle_limit {
                    tracing::warn!(
                        "Watchdog triggered: no frame for {}s",
                        last_frame.elapsed().as_secs()
                    );
                    break Some(format!("heartbeat timeout after {}s", idle_limit.as_secs()));
                }
                if let Err(e) = write.send(WsMessage::Ping(Default::default())).await {
                    break Some(format!("heartbeat ping failed: {}", e));
                }
            }
        }
    };

    if let (Some(reason), Some(inner)) = (failure, inner.upgrade()) {
        inner.session_failed(generation, reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    fn fast_options() -> ConnectionOptions {
        ConnectionOptions {
            connect_timeout: Duration::from_millis(300),
            heartbeat_interval: Duration::from_secs(5),
        }
    }

    async fn wait_for_state(mgr: &ConnectionManager, want: ConnectionState) {
        for _ in 0..100 {
            if mgr.state() == want {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("state never became {:?}, still {:?}", want, mgr.state());
    }

    /// A listener that accepts TCP but never answers the upgrade.
    async fn silent_listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        (listener, url)
    }

    #[tokio::test]
    async fn test_connect_receives_alert_and_sends_token() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        let (auth_tx, auth_rx) = tokio::sync::oneshot::channel::<Option<String>>();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                let auth = req
                    .headers()
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let _ = auth_tx.send(auth);
                Ok(resp)
            };
            let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback).await.unwrap();
            let frame = serde_json::json!({
                "type": "alert",
                "data": {"id": "a-1", "type": "intrusion", "timestamp": "2024-05-01T12:00:00Z"}
            });
            ws.send(WsMessage::Text(frame.to_string().into())).await.unwrap();
            // Hold the socket open until the client goes away.
            while ws.next().await.is_some() {}
        });

        let mgr = ConnectionManager::new(fast_options());
        let (tx, mut rx) = mpsc::unbounded_channel();
        mgr.on(EventKind::Alert, move |ev| {
            let _ = tx.send(ev.clone());
        });
        let established = Arc::new(AtomicUsize::new(0));
        let counter = established.clone();
        mgr.on(EventKind::ConnectionEstablished, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        mgr.connect(&url, &Credentials::bearer("tok-1")).await.unwrap();
        assert_eq!(mgr.state(), ConnectionState::Connected);
        assert_eq!(established.load(Ordering::SeqCst), 1);
        assert_eq!(auth_rx.await.unwrap().as_deref(), Some("Bearer tok-1"));

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            StreamEvent::Alert(a) => assert_eq!(a.id, "a-1"),
            other => panic!("unexpected event {:?}", other),
        }

        mgr.disconnect();
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_outbound_command_reaches_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        let (seen_tx, seen_rx) = tokio::sync::oneshot::channel::<String>();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if let WsMessage::Text(text) = msg {
                    let _ = seen_tx.send(text.as_str().to_string());
                    break;
                }
            }
        });

        let mgr = ConnectionManager::new(fast_options());
        mgr.connect(&url, &Credentials::default()).await.unwrap();
        mgr.send(ClientCommand::AcknowledgeAlert { alert_id: "a-9".into() })
            .unwrap();

        let text = tokio::time::timeout(Duration::from_secs(2), seen_rx)
            .await
            .unwrap()
            .unwrap();
        let v: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["type"], "acknowledge_alert");
        assert_eq!(v["data"]["alertId"], "a-9");
        mgr.disconnect();
    }

    #[tokio::test]
    async fn test_handshake_timeout_moves_to_error() {
        let (_listener, url) = silent_listener().await;
        let mgr = ConnectionManager::new(fast_options());

        let err = mgr.connect(&url, &Credentials::default()).await.unwrap_err();
        assert!(matches!(err, SyncError::Timeout(_)), "got {:?}", err);
        assert_eq!(mgr.state(), ConnectionState::Error);
    }

    #[tokio::test]
    async fn test_refused_connection_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        drop(listener);

        let mgr = ConnectionManager::new(fast_options());
        let err = mgr.connect(&url, &Credentials::default()).await.unwrap_err();
        assert!(err.is_transport(), "got {:?}", err);
        assert_eq!(mgr.state(), ConnectionState::Error);
    }

    fn record_kinds(mgr: &ConnectionManager, kinds: &[EventKind]) -> Arc<Mutex<Vec<EventKind>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        for kind in kinds {
            let seen = seen.clone();
            mgr.on(*kind, move |ev| seen.lock().unwrap().push(ev.kind()));
        }
        seen
    }

    #[tokio::test]
    async fn test_failed_connect_emits_error_event() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        drop(listener);

        let mgr = ConnectionManager::new(fast_options());
        let seen = record_kinds(&mgr, &[EventKind::Error, EventKind::Disconnected]);

        assert!(mgr.connect(&url, &Credentials::default()).await.is_err());
        assert_eq!(mgr.state(), ConnectionState::Error);
        assert_eq!(*seen.lock().unwrap(), vec![EventKind::Error]);

        let (_silent, slow_url) = silent_listener().await;
        assert!(matches!(
            mgr.connect(&slow_url, &Credentials::default()).await,
            Err(SyncError::Timeout(_))
        ));
        assert_eq!(*seen.lock().unwrap(), vec![EventKind::Error, EventKind::Error]);
    }

    #[tokio::test]
    async fn test_heartbeat_watchdog_declares_idle_session_dead() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            // Never read, so pings are never answered.
            let _ws = accept_async(stream).await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let mgr = ConnectionManager::new(ConnectionOptions {
            connect_timeout: Duration::from_secs(2),
            heartbeat_interval: Duration::from_millis(100),
        });
        let seen = record_kinds(&mgr, &[EventKind::Error, EventKind::Disconnected]);
        let reason = Arc::new(Mutex::new(String::new()));
        let r = reason.clone();
        mgr.on(EventKind::Error, move |ev| {
            if let StreamEvent::Error(msg) = ev {
                *r.lock().unwrap() = msg.clone();
            }
        });

        mgr.connect(&url, &Credentials::default()).await.unwrap();
        assert_eq!(mgr.state(), ConnectionState::Connected);

        wait_for_state(&mgr, ConnectionState::Error).await;
        assert_eq!(
            *seen.lock().unwrap(),
            vec![EventKind::Error, EventKind::Disconnected]
        );
        assert!(reason.lock().unwrap().contains("heartbeat timeout"));
        assert!(matches!(
            mgr.send(ClientCommand::SubscribeCamera { camera_id: "c".into() }),
            Err(SyncError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_reconnect_while_connected_reports_old_session_gone() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        tokio::spawn(async move {
            for _ in 0..2 {
                let (stream, _) = listener.accept().await.unwrap();
                tokio::spawn(async move {
                    let mut ws = accept_async(stream).await.unwrap();
                    while ws.next().await.is_some() {}
                });
            }
        });

        let mgr = ConnectionManager::new(fast_options());
        let seen = record_kinds(
            &mgr,
            &[EventKind::ConnectionEstablished, EventKind::Disconnected, EventKind::Error],
        );

        mgr.connect(&url, &Credentials::default()).await.unwrap();
        mgr.connect(&url, &Credentials::default()).await.unwrap();
        assert_eq!(mgr.state(), ConnectionState::Connected);

        // The replaced session must not report a failure afterwards.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                EventKind::ConnectionEstablished,
                EventKind::Disconnected,
                EventKind::ConnectionEstablished,
            ]
        );
        mgr.disconnect();
    }

    #[tokio::test]
    async fn test_disconnect_during_pending_connect_wins() {
        let (_listener, url) = silent_listener().await;
        let mgr = ConnectionManager::new(ConnectionOptions {
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(5),
        });

        let pending = {
            let mgr = mgr.clone();
            tokio::spawn(async move { mgr.connect(&url, &Credentials::default()).await })
        };
        wait_for_state(&mgr, ConnectionState::Connecting).await;
        let errors = record_kinds(&mgr, &[EventKind::Error]);

        mgr.disconnect();
        let result = tokio::time::timeout(Duration::from_secs(2), pending)
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(result, Err(SyncError::Cancelled)));
        assert!(errors.lock().unwrap().is_empty());
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        assert!(mgr.send(ClientCommand::SubscribeCamera { camera_id: "c".into() }).is_err());
    }

    #[tokio::test]
    async fn test_server_close_emits_error_then_disconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let _ = ws.close(None).await;
        });

        let mgr = ConnectionManager::new(fast_options());
        let (tx, mut rx) = mpsc::unbounded_channel();
        for kind in [EventKind::Error, EventKind::Disconnected] {
            let tx = tx.clone();
            mgr.on(kind, move |ev| {
                let _ = tx.send(ev.kind());
            });
        }

        mgr.connect(&url, &Credentials::default()).await.unwrap();

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        let second = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert_eq!(first, Some(EventKind::Error));
        assert_eq!(second, Some(EventKind::Disconnected));
        assert_eq!(mgr.state(), ConnectionState::Error);
    }

    #[test]
    fn test_panicking_handler_does_not_stop_others() {
        let mgr = ConnectionManager::new(ConnectionOptions::default());
        let calls = Arc::new(AtomicUsize::new(0));

        mgr.on(EventKind::SystemStatus, |_| panic!("bad handler"));
        let c = calls.clone();
        mgr.on(EventKind::SystemStatus, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        let event = StreamEvent::SystemStatus(serde_json::json!({"running": true}));
        mgr.emit_for_test(&event);
        mgr.emit_for_test(&event);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_off_unregisters_only_matching_kind() {
        let mgr = ConnectionManager::new(ConnectionOptions::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let id = mgr.on(EventKind::SystemStatus, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!mgr.off(EventKind::Alert, id));
        assert!(mgr.off(EventKind::SystemStatus, id));
        assert!(!mgr.off(EventKind::SystemStatus, id));

        mgr.emit_for_test(&StreamEvent::SystemStatus(serde_json::Value::Null));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_send_without_session() {
        let mgr = ConnectionManager::new(ConnectionOptions::default());
        assert!(matches!(
            mgr.send(ClientCommand::SubscribeCamera { camera_id: "cam-1".into() }),
            Err(SyncError::NotConnected)
        ));
        mgr.disconnect();
        mgr.disconnect();
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
    }
}
