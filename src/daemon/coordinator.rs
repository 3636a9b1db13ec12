//! The coordinator: single owner of the timer engine.
//!
//! Every trigger (consumer requests, wake alarms, ticks, remote results)
//! arrives as a [`Command`] on one queue and is applied to completion before
//! the next is taken. After each command the coordinator:
//! 1. drains engine events (notifications, session log, pushes)
//! 2. persists state if anything changed
//! 3. publishes one snapshot to every attached consumer

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::broadcast::{BroadcastHub, ConsumerId};
use super::clock::{Clock, Ticker, TokioWakeScheduler};
use super::timer::{TimerEngine, TimerEvent};
use crate::notification::{NotificationContent, Notifier};
use crate::storage::{self, StateStore};
use crate::sync::{PullOutcome, Reconciler, RemoteStore, SyncMessage, SyncSink};
use crate::types::{Identity, IpcRequest, IpcResponse, PersistedState, Snapshot, SyncRecord};

// ============================================================================
// Command
// ============================================================================

/// Work item for the coordinator queue.
#[derive(Debug)]
pub enum Command {
    /// A consumer request awaiting a reply
    Request {
        request: IpcRequest,
        reply: oneshot::Sender<IpcResponse>,
    },
    /// Attach a push consumer
    Subscribe {
        label: String,
        reply: oneshot::Sender<Subscription>,
    },
    /// Detach a push consumer
    Detach { consumer: ConsumerId },
    /// The deadline alarm fired
    Wake,
    /// The refresh ticker fired
    Tick,
    /// A remote exchange finished
    Sync(SyncMessage),
    /// Stop the coordinator
    Shutdown,
}

/// A push consumer registration.
#[derive(Debug)]
pub struct Subscription {
    pub consumer: ConsumerId,
    /// Snapshot at the time of subscribing
    pub initial: Snapshot,
    /// Snapshots published after `initial`
    pub updates: mpsc::UnboundedReceiver<Snapshot>,
}

// ============================================================================
// CoordinatorHandle
// ============================================================================

/// Cloneable sender side of the coordinator queue.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl CoordinatorHandle {
    /// Sends a request and waits for the reply.
    pub async fn request(&self, request: IpcRequest) -> IpcResponse {
        let (reply, rx) = oneshot::channel();
        if !self.send(Command::Request { request, reply }) {
            return IpcResponse::error("Timer service is not running");
        }
        rx.await
            .unwrap_or_else(|_| IpcResponse::error("Timer service stopped before replying"))
    }

    /// Attaches a push consumer.
    pub async fn subscribe(&self, label: impl Into<String>) -> Option<Subscription> {
        let (reply, rx) = oneshot::channel();
        if !self.send(Command::Subscribe {
            label: label.into(),
            reply,
        }) {
            return None;
        }
        rx.await.ok()
    }

    /// Detaches a push consumer.
    pub fn detach(&self, consumer: ConsumerId) {
        self.send(Command::Detach { consumer });
    }

    /// Signals that the deadline alarm fired.
    pub fn wake(&self) {
        self.send(Command::Wake);
    }

    /// Signals a refresh tick.
    pub fn tick(&self) {
        self.send(Command::Tick);
    }

    /// Stops the coordinator after the commands already queued.
    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    fn send(&self, command: Command) -> bool {
        self.tx.send(command).is_ok()
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Intervals used by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorOptions {
    /// Refresh period while a session runs
    pub tick_interval: Duration,
    /// Remote poll period while signed in
    pub poll_interval: Duration,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(250),
            poll_interval: crate::sync::DEFAULT_POLL_INTERVAL,
        }
    }
}

/// When to publish after settling a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Publish {
    /// Only if the state changed
    IfChanged,
    /// If the state changed or the visible second moved
    OnTick,
    /// Always
    Always,
}

/// Owner of the engine, the consumer registry and the reconciler.
pub struct Coordinator<R: RemoteStore> {
    engine: TimerEngine,
    events: mpsc::UnboundedReceiver<TimerEvent>,
    hub: BroadcastHub,
    store: Box<dyn StateStore>,
    notifier: Arc<dyn Notifier>,
    reconciler: Option<Reconciler<R>>,
    identity: Option<Identity>,
    device_id: String,
    ticker: Ticker,
    options: CoordinatorOptions,
    commands: mpsc::UnboundedReceiver<Command>,
    handle: CoordinatorHandle,
    last_published: Option<Snapshot>,
    identity_changed: bool,
    needs_push: bool,
}

impl<R: RemoteStore> Coordinator<R> {
    /// Builds a coordinator from stored state.
    ///
    /// Must be called inside a tokio runtime: a running session restored
    /// from `store` re-arms its wake immediately.
    pub fn new(
        store: Box<dyn StateStore>,
        remote: Option<Arc<R>>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        options: CoordinatorOptions,
    ) -> (Self, CoordinatorHandle) {
        let state = storage::load_or_default(store.as_ref());
        let (tx, commands) = mpsc::unbounded_channel();
        let handle = CoordinatorHandle { tx };

        let wake_handle = handle.clone();
        let wake = TokioWakeScheduler::new(Arc::clone(&clock), Arc::new(move || wake_handle.wake()));

        let (event_tx, events) = mpsc::unbounded_channel();
        let engine = TimerEngine::restore(
            state.settings,
            state.session,
            clock,
            Box::new(wake),
            event_tx,
        );

        let reconciler = remote.map(|remote| {
            let sync_handle = handle.clone();
            let sink: SyncSink = Arc::new(move |message| {
                sync_handle.send(Command::Sync(message));
            });
            Reconciler::new(remote, state.device_id.clone(), sink)
        });

        let coordinator = Self {
            engine,
            events,
            hub: BroadcastHub::new(),
            store,
            notifier,
            reconciler,
            identity: state.identity,
            device_id: state.device_id,
            ticker: Ticker::new(),
            options,
            commands,
            handle: handle.clone(),
            last_published: None,
            identity_changed: false,
            needs_push: false,
        };

        (coordinator, handle)
    }

    /// Runs until [`CoordinatorHandle::shutdown`] is called.
    pub async fn run(mut self) {
        if let Some(identity) = self.identity.clone() {
            if let Some(reconciler) = self.reconciler.as_mut() {
                reconciler.resume(identity);
                reconciler.start_polling(self.options.poll_interval);
            }
        }
        self.settle(Publish::Always);
        info!("Coordinator running (device {})", self.device_id);

        while let Some(command) = self.commands.recv().await {
            if matches!(command, Command::Shutdown) {
                break;
            }
            self.handle_command(command);
        }

        self.ticker.stop();
        if let Some(reconciler) = self.reconciler.as_mut() {
            reconciler.stop_polling();
        }
        self.persist();
        info!("Coordinator stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Request { request, reply } => {
                let response = self.handle_request(request);
                let _ = reply.send(response);
            }
            Command::Subscribe { label, reply } => {
                let initial = self.settle(Publish::IfChanged);
                let (consumer, updates) = self.hub.attach(label);
                let subscription = Subscription {
                    consumer,
                    initial,
                    updates,
                };
                if reply.send(subscription).is_err() {
                    self.hub.detach(consumer);
                }
            }
            Command::Detach { consumer } => {
                self.hub.detach(consumer);
            }
            Command::Wake => {
                self.engine.handle_wake();
                self.settle(Publish::IfChanged);
            }
            Command::Tick => {
                self.settle(Publish::OnTick);
            }
            Command::Sync(message) => self.handle_sync(message),
            Command::Shutdown => {}
        }
    }

    fn handle_request(&mut self, request: IpcRequest) -> IpcResponse {
        debug!("Request: {}", request.action());
        let message = match request {
            IpcRequest::GetState => "Current state",
            IpcRequest::Start => {
                self.engine.start();
                "Timer started"
            }
            IpcRequest::Pause => {
                self.engine.pause();
                "Timer paused"
            }
            IpcRequest::Reset => {
                self.engine.reset();
                "Timer reset"
            }
            IpcRequest::Skip => {
                self.engine.skip();
                "Session skipped"
            }
            IpcRequest::UpdateSettings { data } => {
                self.engine.update_settings(&data);
                "Settings updated"
            }
            IpcRequest::SignIn { identity } => {
                self.sign_in(identity);
                "Signed in"
            }
            IpcRequest::SignOut => {
                self.sign_out();
                "Signed out"
            }
            IpcRequest::Subscribe => {
                return IpcResponse::error("subscribe requires a streaming connection");
            }
        };

        let snapshot = self.settle(Publish::IfChanged);
        IpcResponse::success(message, Some(snapshot))
    }

    fn sign_in(&mut self, identity: Identity) {
        info!("Signing in as {}", identity.user_id);
        self.identity = Some(identity.clone());
        self.identity_changed = true;

        match self.reconciler.as_mut() {
            Some(reconciler) => {
                reconciler.attach(identity, self.engine.revision());
                reconciler.start_polling(self.options.poll_interval);
            }
            None => warn!("Remote store not configured; staying local"),
        }
    }

    fn sign_out(&mut self) {
        if self.identity.is_none() {
            return;
        }
        if let Some(reconciler) = self.reconciler.as_mut() {
            reconciler.detach();
        }
        self.identity = None;
        self.identity_changed = true;
        info!("Signed out");
    }

    fn handle_sync(&mut self, message: SyncMessage) {
        let current = self.identity.as_ref().map(|i| i.user_id.as_str());

        match message {
            SyncMessage::Pulled { user_id, outcome } => {
                if current != Some(user_id.as_str()) {
                    debug!("Dropping pull for stale identity {}", user_id);
                    return;
                }
                self.apply_pull(outcome);
                self.settle(Publish::IfChanged);
            }
            SyncMessage::PushAcked {
                user_id,
                revision,
                record,
            } => {
                if current != Some(user_id.as_str()) {
                    return;
                }
                if self.engine.acknowledge_push(revision, record.updated_at) {
                    self.persist();
                }
            }
        }
    }

    fn apply_pull(&mut self, outcome: PullOutcome) {
        match outcome {
            PullOutcome::Initial {
                record,
                settings,
                revision,
            } => {
                // Local changes made while the pull was in flight outrank it;
                // the record then only wins if it is strictly newer.
                let untouched = revision == self.engine.revision();
                match settings {
                    Some(settings) => self.engine.adopt_remote_settings(settings),
                    None => {
                        let settings = self.engine.settings().clone();
                        if let Some(reconciler) = self.reconciler.as_mut() {
                            reconciler.push_settings(&settings);
                        }
                    }
                }
                match record {
                    Some(record) if untouched => self.engine.overwrite_from_remote(&record),
                    Some(record) => {
                        debug!("Local session changed during the initial pull");
                        self.apply_if_newer(&record);
                    }
                    None => self.needs_push = true,
                }
            }
            PullOutcome::Poll { record } => match record {
                Some(record) => self.apply_if_newer(&record),
                None => self.needs_push = true,
            },
        }
    }

    /// Adopts `record` if strictly newer; re-pushes local state if older.
    fn apply_if_newer(&mut self, record: &SyncRecord) {
        let local = self.engine.session().updated_at;
        if !self.engine.apply_remote(record) && record.updated_at < local {
            self.needs_push = true;
        }
    }

    /// Drains engine events, persists, publishes and returns the current
    /// stamped snapshot.
    fn settle(&mut self, publish: Publish) -> Snapshot {
        let before = self.engine.revision();
        let mut snapshot = self.engine.snapshot();
        snapshot.authenticated = self.identity.is_some();

        let mut changed = self.engine.revision() != before;
        while let Ok(event) = self.events.try_recv() {
            changed = true;
            self.dispatch(event);
        }
        if std::mem::take(&mut self.identity_changed) {
            changed = true;
        }

        if std::mem::take(&mut self.needs_push) {
            if let Some(reconciler) = self.reconciler.as_mut() {
                reconciler.push(self.engine.session(), self.engine.revision());
            }
        }
        self.sync_ticker();

        if changed {
            self.persist();
        }

        let visible_moved = self.last_published.as_ref().map_or(true, |last| {
            last.remaining_seconds != snapshot.remaining_seconds
                || last.phase != snapshot.phase
                || last.kind != snapshot.kind
        });
        let should_publish = match publish {
            Publish::Always => true,
            Publish::IfChanged => changed,
            Publish::OnTick => changed || visible_moved,
        };

        if should_publish {
            self.hub.publish(&mut snapshot);
            self.last_published = Some(snapshot.clone());
        } else {
            self.hub.stamp(&mut snapshot);
        }
        snapshot
    }

    fn dispatch(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::Completed {
                ended, next, entry, ..
            } => {
                if self.engine.settings().notifications_enabled {
                    let content = NotificationContent::for_transition(ended, next);
                    self.notifier.notify(&content.title, &content.message);
                }
                if let (Some(entry), Some(reconciler)) = (entry, self.reconciler.as_mut()) {
                    reconciler.record_session(entry);
                }
                self.needs_push = true;
            }
            TimerEvent::Reset { interrupted, .. } => {
                if let (Some(entry), Some(reconciler)) = (interrupted, self.reconciler.as_mut()) {
                    reconciler.record_session(entry);
                }
                self.needs_push = true;
            }
            TimerEvent::Started { .. } | TimerEvent::Paused { .. } => {
                self.needs_push = true;
            }
            TimerEvent::SettingsUpdated {
                settings,
                from_remote,
            } => {
                if !from_remote {
                    if let Some(reconciler) = self.reconciler.as_mut() {
                        reconciler.push_settings(&settings);
                    }
                }
            }
            TimerEvent::RemoteApplied { updated_at } => {
                debug!("Remote state from {} applied", updated_at);
            }
        }
    }

    fn sync_ticker(&mut self) {
        let running = self.engine.session().is_running();
        if running && !self.ticker.is_running() {
            let handle = self.handle.clone();
            self.ticker
                .start(self.options.tick_interval, move || handle.tick());
        } else if !running && self.ticker.is_running() {
            self.ticker.stop();
        }
    }

    fn persist(&self) {
        let state = PersistedState {
            settings: self.engine.settings().clone(),
            session: self.engine.session().clone(),
            identity: self.identity.clone(),
            device_id: self.device_id.clone(),
        };
        if let Err(e) = self.store.save(&state) {
            warn!("Failed to persist state: {}", e);
        }
    }
}
