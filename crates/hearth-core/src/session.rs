// ── Session controller ──
//
// Full lifecycle for one device session: load the stored credential,
// authenticate, subscribe to the update stream, and route commands.
// Every transition of a running session is serialized through the event
// queue and applied by a single processor task.

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use hearth_api::Credential;
use serde::Serialize;
use strum::Display;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::{AuthEvent, AuthSession, AuthorizationFlow, TokenStore};
use crate::command::{self, CommandDispatcher, CommandEnvelope, PendingCommand, PendingCommands};
use crate::config::SessionConfig;
use crate::error::{CoreError, ErrorKind};
use crate::model::{DeviceSnapshot, SnapshotSet, StructureSnapshot};
use crate::queue::{EventQueue, Input, InputReceiver, InputSender};
use crate::store::DataStore;
use crate::stream::{Connectivity, EntityStream, StreamUpdate, SubscriptionHandle, UpdateStream};
use crate::upstream::{DeviceApi, HttpDeviceApi};

const EVENT_CHANNEL_SIZE: usize = 64;
const PENDING_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

// ── SessionState / SessionEvent ──────────────────────────────────────

/// Lifecycle state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Live,
    /// Live, but the update stream is reconnecting. Last-known state stays.
    Degraded,
    Revoked,
    Closed,
}

impl SessionState {
    pub fn is_running(self) -> bool {
        matches!(self, Self::Live | Self::Degraded)
    }
}

/// Notifications for the consumer layer.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// An interactive authorization flow is required.
    NeedsAuth,
    /// First full state after going live.
    Ready(SnapshotSet),
    /// State changed after `Ready`.
    Updated(SnapshotSet),
    Error(ErrorKind),
}

// ── SessionController ────────────────────────────────────────────────

/// Entry point for consumers.
///
/// Cheaply cloneable via `Arc<SessionInner>`. Construct one per process
/// and pass it around; nothing here is global.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    api: Arc<dyn DeviceApi>,
    auth: AuthSession,
    stream: UpdateStream,
    store: Arc<DataStore>,
    pending: PendingCommands,
    queue: EventQueue,
    dispatcher: CommandDispatcher,
    state: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    cancel: CancellationToken,
    /// Token for the current run. Claiming, cancelling and going live all
    /// happen under this lock.
    run: StdMutex<CancellationToken>,
    subscription: StdMutex<Option<SubscriptionHandle>>,
    task_handles: StdMutex<Vec<JoinHandle<()>>>,
}

impl SessionController {
    /// Session against the real upstream. Does not touch the network;
    /// call [`start()`](Self::start).
    pub fn new(config: SessionConfig, token_store: Arc<dyn TokenStore>) -> Result<Self, CoreError> {
        let api = HttpDeviceApi::new(&config)?;
        Ok(Self::with_api(config, Arc::new(api), token_store))
    }

    /// Session against any [`DeviceApi`].
    pub fn with_api(
        config: SessionConfig,
        api: Arc<dyn DeviceApi>,
        token_store: Arc<dyn TokenStore>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Unauthenticated);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let cancel = CancellationToken::new();
        let run = cancel.child_token();
        let pending = PendingCommands::new();
        let queue = EventQueue::default();
        let dispatcher = CommandDispatcher::new(queue.clone(), pending.subscribe());

        Self {
            inner: Arc::new(SessionInner {
                config,
                auth: AuthSession::new(Arc::clone(&api), token_store),
                api,
                stream: UpdateStream::new(),
                store: Arc::new(DataStore::new()),
                pending,
                queue,
                dispatcher,
                state,
                events,
                cancel,
                run: StdMutex::new(run),
                subscription: StdMutex::new(None),
                task_handles: StdMutex::new(Vec::new()),
            }),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<DataStore> {
        &self.inner.store
    }

    pub fn auth(&self) -> &AuthSession {
        &self.inner.auth
    }

    pub fn update_stream(&self) -> &UpdateStream {
        &self.inner.stream
    }

    pub fn dispatcher(&self) -> CommandDispatcher {
        self.inner.dispatcher.clone()
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn snapshot(&self) -> SnapshotSet {
        self.inner.store.snapshot_set()
    }

    pub fn thermostats(&self) -> EntityStream<DeviceSnapshot> {
        self.inner.store.subscribe_thermostats()
    }

    pub fn structures(&self) -> EntityStream<StructureSnapshot> {
        self.inner.store.subscribe_structures()
    }

    pub fn pending_commands(&self) -> Arc<Vec<PendingCommand>> {
        self.inner.pending.current()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Load the stored credential and, if there is one, authenticate and
    /// go live. Without one, emits [`SessionEvent::NeedsAuth`].
    ///
    /// Returns the resulting state. A running session is left alone.
    pub async fn start(&self) -> Result<SessionState, CoreError> {
        let claimed =
            self.claim_run(|state| !state.is_running() && state != SessionState::Authenticating);
        let cancel = match claimed {
            Ok(cancel) => cancel,
            Err(current) => return Ok(current),
        };

        let Some(credential) = self.inner.auth.token_store().load() else {
            info!("no stored credential");
            if self.finish_run(&cancel, SessionState::Unauthenticated) {
                self.emit(SessionEvent::NeedsAuth);
            }
            return Ok(self.state());
        };
        self.authenticate(credential, &cancel).await
    }

    /// A fresh interactive authorization flow for the configured client.
    pub fn authorization_flow(&self) -> AuthorizationFlow {
        AuthorizationFlow::new(
            &self.inner.config.endpoints.authorize_url,
            self.inner.config.client.clone(),
        )
    }

    /// Finish `flow` with what the user pasted back (code or redirect
    /// URL), persist the credential, and go live.
    pub async fn complete_authorization(
        &self,
        flow: &AuthorizationFlow,
        input: &str,
    ) -> Result<SessionState, CoreError> {
        self.teardown(SessionState::Closed).await;
        let Ok(cancel) = self.claim_run(|_| true) else {
            return Err(CoreError::Cancelled);
        };

        let exchanged = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(CoreError::Cancelled),
            result = self.inner.auth.exchange(flow, input) => result,
        };
        let credential = match exchanged {
            Ok(credential) => credential,
            Err(e) => {
                warn!(error = %e, "authorization code exchange failed");
                if self.finish_run(&cancel, SessionState::Unauthenticated) {
                    self.emit(SessionEvent::Error(e.kind()));
                }
                return Err(e);
            }
        };
        self.authenticate(credential, &cancel).await
    }

    /// End the session and forget the credential everywhere.
    pub async fn logout(&self) -> Result<(), CoreError> {
        self.teardown(SessionState::Closed).await;
        self.inner.store.clear();
        let cleared = self.inner.auth.token_store().save(None);
        self.set_state(SessionState::Unauthenticated);
        self.emit(SessionEvent::NeedsAuth);
        info!("logged out");
        cleared
    }

    /// Stop the stream and in-flight work, keeping the stored credential.
    pub async fn shutdown(&self) {
        self.teardown(SessionState::Closed).await;
        debug!("session shut down");
    }

    // ── Private helpers ──────────────────────────────────────────────

    async fn authenticate(
        &self,
        credential: Credential,
        cancel: &CancellationToken,
    ) -> Result<SessionState, CoreError> {
        match self.inner.auth.begin(credential, cancel).await {
            Ok(AuthEvent::Success) => self.go_live(cancel).await,
            Ok(AuthEvent::Revoked) => {
                if !cancel.is_cancelled() {
                    self.end_for_reauth(SessionState::Revoked, ErrorKind::AuthRevoked);
                }
                Ok(self.state())
            }
            Ok(AuthEvent::Failure { reason }) => {
                debug!(%reason, "authentication failed");
                if !cancel.is_cancelled() {
                    self.end_for_reauth(SessionState::Unauthenticated, ErrorKind::AuthRejected);
                }
                Ok(self.state())
            }
            Err(e) => {
                // Teardown owns the state once it has cancelled us.
                if self.finish_run(cancel, SessionState::Unauthenticated) {
                    self.emit(SessionEvent::Error(e.kind()));
                }
                Err(e)
            }
        }
    }

    async fn go_live(&self, cancel: &CancellationToken) -> Result<SessionState, CoreError> {
        let credential = self
            .inner
            .auth
            .credential()
            .ok_or(CoreError::NotAuthenticated)?;
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }

        let (tx, rx) = self.inner.queue.open();
        let updates = tx.clone();
        let subscription = self.inner.stream.subscribe(move |update| {
            if updates.send(Input::Update(update)).is_err() {
                debug!("session queue closed, dropping update");
            }
        });

        if let Err(e) = self
            .inner
            .stream
            .open(self.inner.api.as_ref(), &credential, cancel)
            .await
        {
            warn!(error = %e, "could not open update stream");
            let settled = self.finish_run(cancel, SessionState::Unauthenticated);
            abandon_run(&self.inner.queue, cancel, &tx, subscription);
            if settled {
                self.inner.auth.sign_out();
                self.emit(SessionEvent::Error(e.kind()));
            }
            return Err(e);
        }

        {
            let _run = self.run();
            // Live before the processor runs, so connectivity changes it
            // handles apply to a running session.
            let went_live = !cancel.is_cancelled()
                && self.inner.state.send_if_modified(|state| {
                    if *state == SessionState::Authenticating {
                        *state = SessionState::Live;
                        true
                    } else {
                        false
                    }
                });
            if !went_live {
                debug!("run cancelled before going live");
                abandon_run(&self.inner.queue, cancel, &tx, subscription);
                return Err(CoreError::Cancelled);
            }
            *self.subscription() = Some(subscription);

            let processor = Processor {
                session: self.clone(),
                tx,
                cancel: cancel.clone(),
                ready: false,
            };
            self.task_handles().push(tokio::spawn(processor.run(rx)));
        }

        info!("session live");
        Ok(self.state())
    }

    /// Move to `Authenticating` with a fresh run token if `allow` accepts
    /// the current state. Otherwise hands back that state.
    fn claim_run(
        &self,
        allow: impl Fn(SessionState) -> bool,
    ) -> Result<CancellationToken, SessionState> {
        let mut run = self.run();
        let current = *self.inner.state.borrow();
        if !allow(current) {
            return Err(current);
        }
        self.set_state(SessionState::Authenticating);
        let cancel = self.inner.cancel.child_token();
        *run = cancel.clone();
        Ok(cancel)
    }

    /// Settle a run in `state` unless it was cancelled. Returns whether
    /// the state was written.
    fn finish_run(&self, cancel: &CancellationToken, state: SessionState) -> bool {
        let _run = self.run();
        if cancel.is_cancelled() {
            return false;
        }
        self.set_state(state);
        true
    }

    /// Cancel the current run, move to `next`, and wait for the run's
    /// tasks. The stored credential is not touched.
    async fn teardown(&self, next: SessionState) {
        let (cancelled, handles) = {
            let run = self.run();
            run.cancel();
            self.set_state(next);
            self.detach();
            let handles: Vec<_> = self.task_handles().drain(..).collect();
            (run.clone(), handles)
        };

        for handle in handles {
            let _ = handle.await;
        }

        // A run claimed since then owns the credential and pending set.
        let run = self.run();
        if *run == cancelled {
            self.inner.pending.clear();
            self.inner.auth.sign_out();
        }
    }

    /// Drop the stream subscription and stop accepting queue input.
    fn detach(&self) {
        self.inner.stream.unsubscribe_all();
        self.subscription().take();
        self.inner.queue.close();
    }

    /// Credential is gone: clear all state and ask for a new flow.
    fn end_for_reauth(&self, state: SessionState, kind: ErrorKind) {
        self.detach();
        self.inner.store.clear();
        self.inner.pending.clear();
        self.set_state(state);
        self.emit(SessionEvent::Error(kind));
        self.emit(SessionEvent::NeedsAuth);
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.inner.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "session state changed");
        }
    }

    /// Move to `to` only while the session is running.
    fn set_running_state(&self, to: SessionState) {
        self.inner.state.send_if_modified(|state| {
            if state.is_running() && *state != to {
                *state = to;
                true
            } else {
                false
            }
        });
    }

    fn emit(&self, event: SessionEvent) {
        // No listeners is fine.
        let _ = self.inner.events.send(event);
    }

    fn run(&self) -> MutexGuard<'_, CancellationToken> {
        self.inner.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn task_handles(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.inner
            .task_handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn subscription(&self) -> MutexGuard<'_, Option<SubscriptionHandle>> {
        self.inner
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Undo what a run attached without touching a later run: its feed stops
/// with `cancel`, and the queue and handler slot are released only while
/// they are still this run's.
fn abandon_run(
    queue: &EventQueue,
    cancel: &CancellationToken,
    tx: &InputSender,
    subscription: SubscriptionHandle,
) {
    cancel.cancel();
    queue.close_if(tx);
    subscription.release();
}

// ── Processor task ───────────────────────────────────────────────────

/// Single consumer of the event queue for one session run.
struct Processor {
    session: SessionController,
    /// Sender handed to dispatch tasks for their completions.
    tx: InputSender,
    cancel: CancellationToken,
    ready: bool,
}

impl Processor {
    async fn run(mut self, mut rx: InputReceiver) {
        let timeout = self.session.inner.config.pending_command_timeout;
        let mut sweep = tokio::time::interval(PENDING_SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                input = rx.recv() => {
                    let Some(input) = input else { break };
                    if self.handle(input).is_break() {
                        break;
                    }
                }
                _ = sweep.tick() => {
                    self.session.inner.pending.expire(Utc::now(), timeout);
                }
            }
        }

        debug!("session processor exiting");
    }

    fn handle(&mut self, input: Input) -> ControlFlow<()> {
        match input {
            Input::Update(update) => self.on_update(update),
            Input::Command(envelope) => {
                self.on_command(envelope);
                ControlFlow::Continue(())
            }
            Input::Completed {
                pending_ids,
                result,
                response_tx,
            } => self.on_completed(&pending_ids, result, response_tx),
        }
    }

    fn on_update(&mut self, update: StreamUpdate) -> ControlFlow<()> {
        let inner = &self.session.inner;

        match update {
            StreamUpdate::Initial(snapshots) | StreamUpdate::Resync(snapshots) => {
                for device in &snapshots.thermostats {
                    inner.pending.reconcile_thermostat(device);
                }
                for structure in &snapshots.structures {
                    inner.pending.reconcile_structure(structure);
                }
                inner.store.apply_snapshots(snapshots);

                let set = inner.store.snapshot_set();
                if self.ready {
                    debug!("full resync applied");
                    self.session.emit(SessionEvent::Updated(set));
                } else {
                    self.ready = true;
                    info!(
                        thermostats = set.thermostats.len(),
                        structures = set.structures.len(),
                        "initial snapshot received"
                    );
                    self.session.emit(SessionEvent::Ready(set));
                }
            }
            StreamUpdate::Thermostat(device) => {
                if inner.store.apply_thermostat(device.clone()).changed() {
                    inner.pending.reconcile_thermostat(&device);
                    self.session
                        .emit(SessionEvent::Updated(inner.store.snapshot_set()));
                }
            }
            StreamUpdate::Structure(structure) => {
                if inner.store.apply_structure(structure.clone()).changed() {
                    inner.pending.reconcile_structure(&structure);
                    self.session
                        .emit(SessionEvent::Updated(inner.store.snapshot_set()));
                }
            }
            StreamUpdate::Connectivity(Connectivity::Degraded { reason }) => {
                warn!(%reason, "update stream degraded, keeping last-known state");
                self.session.set_running_state(SessionState::Degraded);
                self.session
                    .emit(SessionEvent::Error(ErrorKind::NetworkUnavailable));
            }
            StreamUpdate::Connectivity(Connectivity::Restored) => {
                info!("update stream restored");
                self.session.set_running_state(SessionState::Live);
            }
            StreamUpdate::AuthRevoked => {
                return self.reauth(ErrorKind::AuthRevoked, "revoked by server");
            }
        }
        ControlFlow::Continue(())
    }

    fn on_command(&self, envelope: CommandEnvelope) {
        let CommandEnvelope {
            command,
            response_tx,
        } = envelope;
        let inner = &self.session.inner;

        let Some(credential) = inner.auth.credential() else {
            let _ = response_tx.send(Err(CoreError::NotAuthenticated));
            return;
        };

        let plan = match command::plan(&inner.store, &command) {
            Ok(plan) => plan,
            Err(e) => {
                debug!(error = %e, target_id = command.target(), "command rejected locally");
                let _ = response_tx.send(Err(e));
                return;
            }
        };

        command::apply_optimistic(&inner.store, &command);
        let pending_ids = inner
            .pending
            .track(command.target(), &plan.expected, Utc::now());
        self.session
            .emit(SessionEvent::Updated(inner.store.snapshot_set()));
        debug!(?command, "dispatching command");

        let api = Arc::clone(&inner.api);
        let tx = self.tx.clone();
        let cancel = self.cancel.clone();
        let mutation = plan.mutation;

        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                // Dropping `response_tx` tells the caller the session went away.
                () = cancel.cancelled() => return,
                result = api.dispatch(&credential, &mutation) => {
                    result.map_err(CoreError::from_dispatch)
                }
            };
            let completed = Input::Completed {
                pending_ids,
                result,
                response_tx,
            };
            if tx.send(completed).is_err() {
                debug!("session gone, dropping command completion");
            }
        });
    }

    fn on_completed(
        &self,
        pending_ids: &[u64],
        result: Result<(), CoreError>,
        response_tx: oneshot::Sender<Result<(), CoreError>>,
    ) -> ControlFlow<()> {
        let Err(e) = result else {
            debug!("command acknowledged");
            let _ = response_tx.send(Ok(()));
            return ControlFlow::Continue(());
        };

        // Optimistic state stays; the next snapshot corrects it.
        self.session.inner.pending.remove(pending_ids);
        let kind = e.kind();
        warn!(error = %e, "command failed");

        let flow = if kind.needs_reauth() {
            self.reauth(kind, &e.to_string())
        } else {
            self.session.emit(SessionEvent::Error(kind));
            ControlFlow::Continue(())
        };
        let _ = response_tx.send(Err(e));
        flow
    }

    /// The server no longer accepts the credential. Ends this run.
    fn reauth(&self, kind: ErrorKind, reason: &str) -> ControlFlow<()> {
        let auth = &self.session.inner.auth;
        let state = if kind == ErrorKind::AuthRevoked {
            auth.revoked();
            SessionState::Revoked
        } else {
            auth.rejected(reason);
            SessionState::Unauthenticated
        };
        self.session.end_for_reauth(state, kind);
        self.cancel.cancel();
        ControlFlow::Break(())
    }
}
