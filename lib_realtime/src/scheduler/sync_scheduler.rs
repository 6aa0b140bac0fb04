//! # Sync Scheduler
//!
//! The composition root and the only component the dashboard talks to.
//!
//! A `SyncScheduler` owns one actor task. Every state change (REST results,
//! pushed stream events, acknowledgements, connection transitions) reaches
//! the actor as a [`Command`] on a single channel, so buffer mutation and
//! snapshot recomputation are strictly serialized. Network work runs in
//! short-lived tasks that report back through the same channel. Each of
//! them checks the shared `active` flag first, so nothing lands after
//! teardown.
//!
//! After every applied command the actor publishes a fresh
//! `Arc<SystemData>` on a `watch` channel.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::{BoxStream, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::backends::{DashboardBackend, LiveBackend, MockBackend};
use crate::configs::sync_config::MAX_POLL_INTERVAL_SECS;
use crate::configs::{RuntimeMode, SyncConfig};
use crate::connection::{
    ClientCommand, ConnectionManager, ConnectionOptions, ConnectionState, Credentials, EventKind,
    HandlerId, StreamEvent,
};
use crate::core::{reduce_status, BoundedEventBuffer};
use crate::error::SyncError;
use crate::models::{
    AiModelUiState, Alert, CameraStatus, Detection, DetectionBatch, Feed, FeedSources, SystemData,
};
use crate::orchestrator::{FallbackOrchestrator, FeedOutcome, StreamSource};

type Responder = oneshot::Sender<Result<(), SyncError>>;

const MAX_POLL_INTERVAL: Duration = Duration::from_secs(MAX_POLL_INTERVAL_SECS);

/// Messages processed by the actor, in arrival order.
enum Command {
    /// Run the full init sequence. `retry()` passes a responder.
    Init { responder: Option<Responder> },
    InitDone { responder: Option<Responder>, result: Result<(), SyncError> },
    Cameras(Result<FeedOutcome<Vec<CameraStatus>>, String>),
    Alerts(Result<FeedOutcome<Vec<Alert>>, String>),
    Detections(Result<FeedOutcome<DetectionBatch>, String>),
    SystemStatus(Result<FeedOutcome<Value>, String>),
    StreamOpened(Result<StreamSource, String>),
    StreamProbeFailed(String),
    Event(StreamEvent),
    Acknowledge { alert_id: String, responder: Responder },
    AcknowledgeDone {
        alert_id: String,
        result: Result<FeedOutcome<()>, SyncError>,
        responder: Responder,
    },
}

/// Everything a background task needs to do network work and report back.
#[derive(Clone)]
struct TaskContext {
    orchestrator: Arc<FallbackOrchestrator>,
    conn: ConnectionManager,
    ws_url: Arc<str>,
    credentials: Credentials,
    commands: mpsc::UnboundedSender<Command>,
    active: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl TaskContext {
    fn deliver(&self, command: Command) {
        if self.active.load(Ordering::SeqCst) {
            let _ = self.commands.send(command);
        } else {
            tracing::debug!("Scheduler inactive; dropping late result");
        }
    }

    async fn deliver_feed<T, Fut>(
        &self,
        fetch: Fut,
        wrap: fn(Result<FeedOutcome<T>, String>) -> Command,
    ) -> Option<SyncError>
    where
        Fut: Future<Output = Result<FeedOutcome<T>, SyncError>>,
    {
        match fetch.await {
            Ok(outcome) => {
                self.deliver(wrap(Ok(outcome)));
                None
            }
            Err(e) => {
                self.deliver(wrap(Err(e.to_string())));
                Some(e)
            }
        }
    }
}

/// Handle to a running synchronization session.
///
/// Dropping the handle cancels the session; [`SyncScheduler::teardown`] does
/// the same and additionally waits for the actor to finish.
pub struct SyncScheduler {
    mode: RuntimeMode,
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<Arc<SystemData>>,
    conn: ConnectionManager,
    handler_ids: Vec<(EventKind, HandlerId)>,
    active: Arc<AtomicBool>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncScheduler {
    /// Builds the live REST backend and the mock backend from `config` and
    /// starts the session.
    pub fn from_config(config: SyncConfig) -> Result<Self, SyncError> {
        let live: Arc<dyn DashboardBackend> = Arc::new(LiveBackend::new(&config)?);
        let mock: Arc<dyn DashboardBackend> = Arc::new(MockBackend::new(config.mock_event_interval));
        Ok(Self::start(config, live, mock))
    }

    /// Resolves the runtime mode, spawns the actor and kicks off the initial
    /// load (stream open plus all four feeds, concurrently). Must be called
    /// from within a Tokio runtime.
    pub fn start(
        config: SyncConfig,
        live: Arc<dyn DashboardBackend>,
        mock: Arc<dyn DashboardBackend>,
    ) -> Self {
        let mode = config.runtime_mode();
        tracing::info!("Starting sync scheduler in {} mode", mode);

        let conn = ConnectionManager::new(ConnectionOptions {
            connect_timeout: config.connect_timeout,
            heartbeat_interval: config.heartbeat_interval,
        });
        let orchestrator = Arc::new(FallbackOrchestrator::new(
            mode,
            live,
            mock,
            config.reconnect.clone(),
        ));

        let (tx, rx) = mpsc::unbounded_channel();
        let (publisher, snapshots) = watch::channel(Arc::new(SystemData::empty(mode)));
        let active = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();

        let mut handler_ids = Vec::new();
        for kind in EventKind::DATA.into_iter().chain(EventKind::LIFECYCLE) {
            let tx = tx.clone();
            let active = active.clone();
            let id = conn.on(kind, move |event| {
                if active.load(Ordering::SeqCst) {
                    let _ = tx.send(Command::Event(event.clone()));
                }
            });
            handler_ids.push((kind, id));
        }

        let ctx = TaskContext {
            orchestrator,
            conn: conn.clone(),
            ws_url: Arc::from(config.ws_url.as_str()),
            credentials: Credentials {
                token: config.api_token.clone(),
            },
            commands: tx.clone(),
            active: active.clone(),
            cancel: cancel.clone(),
        };

        let actor = SchedulerActor::new(&config, mode, ctx, publisher);
        let _ = tx.send(Command::Init { responder: None });
        let task = tokio::spawn(actor.run(rx, config.poll_interval));

        Self {
            mode,
            commands: tx,
            snapshots,
            conn,
            handler_ids,
            active,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn mode(&self) -> RuntimeMode {
        self.mode
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> Arc<SystemData> {
        self.snapshots.borrow().clone()
    }

    /// A receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<SystemData>> {
        self.snapshots.clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.conn.state()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Clears the error state and re-runs the full init sequence.
    ///
    /// Only a live-mode failure is returned; in auto and mock mode problems
    /// end up in the snapshot's `error` field instead.
    pub async fn retry(&self) -> Result<(), SyncError> {
        let (tx, rx) = oneshot::channel();
        self.submit(Command::Init { responder: Some(tx) })?;
        rx.await.unwrap_or(Err(SyncError::Inactive))
    }

    /// Acknowledges an alert, over the stream when it is open and over REST
    /// otherwise. The snapshot's copy of the alert is replaced by an
    /// acknowledged one once the backend accepted the request.
    pub async fn acknowledge_alert(&self, alert_id: &str) -> Result<(), SyncError> {
        let (tx, rx) = oneshot::channel();
        self.submit(Command::Acknowledge {
            alert_id: alert_id.to_string(),
            responder: tx,
        })?;
        rx.await.unwrap_or(Err(SyncError::Inactive))
    }

    /// Asks the backend to stream a camera. A no-op without a live session,
    /// except in live mode, where it fails with [`SyncError::NotConnected`].
    pub fn subscribe_camera(&self, camera_id: &str) -> Result<(), SyncError> {
        self.camera_command(ClientCommand::SubscribeCamera {
            camera_id: camera_id.to_string(),
        })
    }

    pub fn unsubscribe_camera(&self, camera_id: &str) -> Result<(), SyncError> {
        self.camera_command(ClientCommand::UnsubscribeCamera {
            camera_id: camera_id.to_string(),
        })
    }

    /// Stops the session: disconnects, stops the timer and the simulated
    /// feed, releases buffers and waits for the actor. Safe to call twice.
    pub async fn teardown(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            tracing::info!("Tearing down sync scheduler ({} mode)", self.mode);
        }
        self.shutdown();

        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!("Scheduler task ended abnormally: {}", e);
            }
        }
    }

    fn submit(&self, command: Command) -> Result<(), SyncError> {
        if !self.is_active() {
            return Err(SyncError::Inactive);
        }
        self.commands.send(command).map_err(|_| SyncError::Inactive)
    }

    fn camera_command(&self, command: ClientCommand) -> Result<(), SyncError> {
        if !self.is_active() {
            return Err(SyncError::Inactive);
        }
        match self.conn.send(command) {
            Err(SyncError::NotConnected) if self.mode != RuntimeMode::Live => {
                tracing::debug!("No live stream; camera subscription skipped");
                Ok(())
            }
            other => other,
        }
    }

    fn shutdown(&self) {
        self.active.store(false, Ordering::SeqCst);
        for (kind, id) in &self.handler_ids {
            self.conn.off(*kind, *id);
        }
        self.cancel.cancel();
        self.conn.disconnect();
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// State owned by the actor task. Never shared.
struct SchedulerActor {
    mode: RuntimeMode,
    ctx: TaskContext,
    publisher: watch::Sender<Arc<SystemData>>,

    cameras: BoundedEventBuffer<CameraStatus>,
    alerts: BoundedEventBuffer<Alert>,
    detections: BoundedEventBuffer<Detection>,
    detection_stats: Option<Value>,
    system_health: Option<Value>,
    ai_model_status: AiModelUiState,
    sources: FeedSources,
    last_update: Option<chrono::DateTime<Utc>>,

    feed_errors: BTreeMap<Feed, String>,
    stream_error: Option<String>,
    stream_opening: bool,
    simulated: Option<CancellationToken>,
}

impl SchedulerActor {
    fn new(
        config: &SyncConfig,
        mode: RuntimeMode,
        ctx: TaskContext,
        publisher: watch::Sender<Arc<SystemData>>,
    ) -> Self {
        Self {
            mode,
            ctx,
            publisher,
            cameras: BoundedEventBuffer::new(config.camera_capacity),
            alerts: BoundedEventBuffer::new(config.alert_capacity),
            detections: BoundedEventBuffer::new(config.detection_capacity),
            detection_stats: None,
            system_health: None,
            ai_model_status: AiModelUiState::Standby,
            sources: FeedSources::default(),
            last_update: None,
            feed_errors: BTreeMap::new(),
            stream_error: None,
            stream_opening: false,
            simulated: None,
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>, poll_interval: Duration) {
        let poll_interval = poll_interval.min(MAX_POLL_INTERVAL);
        let mut poll = interval_at(Instant::now() + poll_interval, poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let cancel = self.ctx.cancel.clone();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(command) = rx.recv() => self.handle(command),
                _ = poll.tick() => self.on_poll_tick(),
            }
        }

        self.release();
        tracing::info!("Sync scheduler stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Init { responder } => self.start_init(responder),
            Command::InitDone { responder, result } => {
                self.stream_opening = false;
                if let Some(responder) = responder {
                    let _ = responder.send(result);
                }
            }
            Command::Cameras(result) => {
                if let Some(outcome) = self.record_feed(Feed::Cameras, result) {
                    self.cameras.replace(outcome);
                }
            }
            Command::Alerts(result) => {
                if let Some(outcome) = self.record_feed(Feed::Alerts, result) {
                    self.alerts.replace(outcome);
                }
            }
            Command::Detections(result) => {
                if let Some(batch) = self.record_feed(Feed::Detections, result) {
                    self.detections.replace(batch.detections);
                    self.detection_stats = batch.stats;
                }
            }
            Command::SystemStatus(result) => {
                if let Some(status) = self.record_feed(Feed::SystemStatus, result) {
                    self.apply_status(status);
                }
            }
            Command::StreamOpened(result) => self.on_stream_opened(result),
            Command::StreamProbeFailed(reason) => {
                self.stream_error = Some(format!("Live stream unavailable ({})", reason));
            }
            Command::Event(event) => self.on_event(event),
            Command::Acknowledge { alert_id, responder } => {
                self.on_acknowledge(alert_id, responder);
                return;
            }
            Command::AcknowledgeDone {
                alert_id,
                result,
                responder,
            } => self.on_acknowledge_done(alert_id, result, responder),
        }
        self.publish();
    }

    fn start_init(&mut self, responder: Option<Responder>) {
        self.feed_errors.clear();
        self.stream_error = None;
        self.stream_opening = true;
        tokio::spawn(run_init(self.ctx.clone(), responder));
    }

    fn on_poll_tick(&mut self) {
        let refetch_all = !self.is_connected();
        let reprobe = self.mode.allows_live() && !self.ctx.conn.is_connected() && !self.stream_opening;
        tracing::debug!("Poll tick (refetch_all: {}, reprobe: {})", refetch_all, reprobe);
        tokio::spawn(run_poll(self.ctx.clone(), refetch_all, reprobe));
    }

    /// Stores the feed's source and warning; returns the data on success.
    fn record_feed<T>(&mut self, feed: Feed, result: Result<FeedOutcome<T>, String>) -> Option<T> {
        match result {
            Ok(outcome) => {
                self.sources.set(feed, outcome.source);
                match outcome.warning {
                    Some(warning) => self.feed_errors.insert(feed, warning),
                    None => self.feed_errors.remove(&feed),
                };
                self.last_update = Some(Utc::now());
                Some(outcome.data)
            }
            Err(e) => {
                tracing::error!("Fetching {} failed: {}", feed, e);
                self.feed_errors.insert(feed, e);
                None
            }
        }
    }

    fn apply_status(&mut self, status: Value) {
        let next = reduce_status(Some(&status));
        if next != self.ai_model_status {
            tracing::info!("AI model status: {:?} -> {:?}", self.ai_model_status, next);
        }
        self.ai_model_status = next;
        self.system_health = Some(status);
    }

    fn on_stream_opened(&mut self, result: Result<StreamSource, String>) {
        match result {
            Ok(StreamSource::Live) => self.stop_simulated(),
            Ok(StreamSource::Simulated { feed, reason }) => {
                self.stream_error = reason;
                self.start_simulated(feed);
            }
            Err(e) => self.stream_error = Some(format!("Live stream unavailable ({})", e)),
        }
    }

    fn on_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Alert(alert) => self.alerts.push(alert),
            StreamEvent::Detection(detection) => self.detections.push(detection),
            StreamEvent::CameraStatus(update) => self.apply_camera_update(update),
            StreamEvent::SystemStatus(status) => self.apply_status(status),
            StreamEvent::ConnectionEstablished => {
                self.stream_error = None;
                self.stop_simulated();
                return;
            }
            StreamEvent::Error(reason) => {
                self.stream_error = Some(format!("Stream error: {}", reason));
                return;
            }
            StreamEvent::Disconnected => return,
        }
        self.last_update = Some(Utc::now());
    }

    fn apply_camera_update(&mut self, update: CameraStatus) {
        if self.cameras.iter().any(|c| c.camera_id == update.camera_id) {
            let merged: Vec<CameraStatus> = self
                .cameras
                .iter()
                .map(|c| {
                    if c.camera_id == update.camera_id {
                        c.merged_with(&update)
                    } else {
                        c.clone()
                    }
                })
                .collect();
            self.cameras.replace(merged);
        } else {
            self.cameras.push(update);
        }
    }

    fn on_acknowledge(&mut self, alert_id: String, responder: Responder) {
        if self.ctx.conn.is_connected() {
            let command = ClientCommand::AcknowledgeAlert {
                alert_id: alert_id.clone(),
            };
            match self.ctx.conn.send(command) {
                Ok(()) => {
                    self.mark_acknowledged(&alert_id);
                    self.publish();
                    let _ = responder.send(Ok(()));
                    return;
                }
                Err(e) => tracing::warn!("Stream acknowledge failed ({}); using REST", e),
            }
        }

        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            let result = ctx.orchestrator.acknowledge_alert(&alert_id).await;
            ctx.deliver(Command::AcknowledgeDone {
                alert_id,
                result,
                responder,
            });
        });
    }

    fn on_acknowledge_done(
        &mut self,
        alert_id: String,
        result: Result<FeedOutcome<()>, SyncError>,
        responder: Responder,
    ) {
        match result {
            Ok(outcome) => {
                if let Some(warning) = outcome.warning {
                    self.feed_errors.insert(Feed::Alerts, warning);
                }
                self.mark_acknowledged(&alert_id);
                let _ = responder.send(Ok(()));
            }
            Err(e) => {
                tracing::error!("Acknowledging alert {} failed: {}", alert_id, e);
                self.feed_errors
                    .insert(Feed::Alerts, format!("Failed to acknowledge alert {}: {}", alert_id, e));
                let reply = if self.mode == RuntimeMode::Live { Err(e) } else { Ok(()) };
                let _ = responder.send(reply);
            }
        }
    }

    fn mark_acknowledged(&mut self, alert_id: &str) {
        let updated: Vec<Alert> = self
            .alerts
            .iter()
            .map(|a| if a.id == alert_id { a.acknowledge() } else { a.clone() })
            .collect();
        self.alerts.replace(updated);
    }

    fn start_simulated(&mut self, mut feed: BoxStream<'static, StreamEvent>) {
        self.stop_simulated();
        let token = self.ctx.cancel.child_token();
        self.simulated = Some(token.clone());

        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    next = feed.next() => match next {
                        Some(event) => ctx.deliver(Command::Event(event)),
                        None => break,
                    },
                }
            }
        });
        tracing::info!("Simulated event feed started");
    }

    fn stop_simulated(&mut self) {
        if let Some(token) = self.simulated.take() {
            token.cancel();
            tracing::info!("Simulated event feed stopped");
        }
    }

    /// In mock mode the simulated feed is the connection.
    fn is_connected(&self) -> bool {
        self.ctx.conn.is_connected() || (self.mode == RuntimeMode::Mock && self.simulated.is_some())
    }

    fn connection_state(&self) -> ConnectionState {
        if self.mode == RuntimeMode::Mock && self.simulated.is_some() {
            ConnectionState::Connected
        } else {
            self.ctx.conn.state()
        }
    }

    fn error_banner(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .stream_error
            .iter()
            .chain(self.feed_errors.values())
            .map(String::as_str)
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }

    fn publish(&self) {
        let snapshot = SystemData {
            cameras: self.cameras.snapshot(),
            alerts: self.alerts.snapshot(),
            detections: self.detections.snapshot(),
            detection_stats: self.detection_stats.clone(),
            system_health: self.system_health.clone(),
            ai_model_status: self.ai_model_status,
            is_connected: self.is_connected(),
            connection_state: self.connection_state(),
            last_update: self.last_update,
            error: self.error_banner(),
            mode: self.mode,
            sources: self.sources,
        };
        self.publisher.send_replace(Arc::new(snapshot));
    }

    fn release(&mut self) {
        self.stop_simulated();
        self.cameras.clear();
        self.alerts.clear();
        self.detections.clear();
        self.publisher.send_replace(Arc::new(SystemData::empty(self.mode)));
    }
}

/// Opens the stream and fetches all four feeds concurrently; each result is
/// applied as soon as it arrives.
async fn run_init(ctx: TaskContext, responder: Option<Responder>) {
    let orchestrator = ctx.orchestrator.clone();

    let stream = async {
        let opened = orchestrator
            .open_stream(&ctx.conn, &ctx.ws_url, &ctx.credentials, &ctx.cancel)
            .await;
        match opened {
            Ok(source) => {
                ctx.deliver(Command::StreamOpened(Ok(source)));
                None
            }
            // Superseded by a newer attempt or by teardown.
            Err(SyncError::Cancelled) => None,
            Err(e) => {
                ctx.deliver(Command::StreamOpened(Err(e.to_string())));
                Some(e)
            }
        }
    };

    let (stream_err, cameras_err, alerts_err, detections_err, status_err) = tokio::join!(
        stream,
        ctx.deliver_feed(orchestrator.fetch_cameras(), Command::Cameras),
        ctx.deliver_feed(orchestrator.fetch_alerts(), Command::Alerts),
        ctx.deliver_feed(orchestrator.fetch_detections(), Command::Detections),
        ctx.deliver_feed(orchestrator.fetch_system_status(), Command::SystemStatus),
    );

    let first_err = [stream_err, cameras_err, alerts_err, detections_err, status_err]
        .into_iter()
        .flatten()
        .next();

    let result = match first_err {
        Some(e) if orchestrator.mode() == RuntimeMode::Live => Err(e),
        _ => Ok(()),
    };
    ctx.deliver(Command::InitDone { responder, result });
}

async fn run_poll(ctx: TaskContext, refetch_all: bool, reprobe: bool) {
    let orchestrator = ctx.orchestrator.clone();

    ctx.deliver_feed(orchestrator.fetch_system_status(), Command::SystemStatus)
        .await;

    if refetch_all {
        tokio::join!(
            ctx.deliver_feed(orchestrator.fetch_cameras(), Command::Cameras),
            ctx.deliver_feed(orchestrator.fetch_alerts(), Command::Alerts),
            ctx.deliver_feed(orchestrator.fetch_detections(), Command::Detections),
        );
    }

    if reprobe && ctx.active.load(Ordering::SeqCst) {
        match orchestrator
            .reprobe_stream(&ctx.conn, &ctx.ws_url, &ctx.credentials)
            .await
        {
            Ok(()) | Err(SyncError::Cancelled) => {}
            Err(e) => ctx.deliver(Command::StreamProbeFailed(e.to_string())),
        }
    }
}
