//! Matchmaking control loop.
//!
//! [`spawn_runtime`] starts one task that owns every piece of mutable client
//! state: the lifecycle state machine, the lobby directory, the current
//! session record, and the pending-call tracker. Commands, call completions,
//! and backend notifications are all funneled into that task through
//! channels, so no state is ever mutated concurrently. In-flight backend
//! calls run in spawned tasks that only post epoch-tagged completion
//! envelopes back; envelopes whose epoch is no longer current are discarded.

use std::sync::Arc;

use lobby_core::{
    CallKind, ClientChannelError, ClientChannels, ClientCommand, ClientError, ClientErrorCategory,
    ClientEvent, ClientState, ClientStateMachine, EnterResponse, Epoch, EventStream,
    LobbyDirectory, LobbyNotification, LobbySummary, LobbyVisibility, PendingCalls, SessionId,
    SessionRecord, TransportError,
};
use lobby_platform::SessionBackend;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Buffer size of the internal completion channel.
const COMPLETION_BUFFER: usize = 16;

/// Runtime tuning values.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Command channel buffer size.
    pub command_buffer: usize,
    /// Event broadcast buffer size.
    pub event_buffer: usize,
    /// Member capacity of lobbies created from this client.
    pub created_lobby_limit: u32,
    /// Visibility of lobbies created from this client.
    pub created_lobby_visibility: LobbyVisibility,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command_buffer: 128,
            event_buffer: 512,
            created_lobby_limit: 4,
            created_lobby_visibility: LobbyVisibility::Private,
        }
    }
}

/// Thin handle to a running session runtime.
#[derive(Debug)]
pub struct RuntimeHandle {
    channels: ClientChannels,
    shutdown: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl RuntimeHandle {
    /// Send one command to the runtime.
    pub async fn send(&self, command: ClientCommand) -> Result<(), ClientChannelError> {
        self.channels.send_command(command).await
    }

    /// Subscribe to emitted client events.
    pub fn subscribe(&self) -> EventStream {
        self.channels.subscribe()
    }

    /// Stop the runtime and wait for teardown to finish.
    ///
    /// Teardown issues the fire-and-forget leave when the client still
    /// occupies a lobby.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let _ = self.task.await;
    }
}

/// Spawn a session runtime over `backend` with default tuning.
pub fn spawn_runtime<B: SessionBackend>(backend: Arc<B>) -> RuntimeHandle {
    spawn_runtime_with_config(backend, RuntimeConfig::default())
}

/// Spawn a session runtime over `backend`.
pub fn spawn_runtime_with_config<B: SessionBackend>(
    backend: Arc<B>,
    config: RuntimeConfig,
) -> RuntimeHandle {
    let (channels, command_rx) = ClientChannels::new(config.command_buffer, config.event_buffer);
    let shutdown = CancellationToken::new();
    let runtime = SessionRuntime::new(backend, channels.clone(), command_rx, config);

    let stop = shutdown.child_token();
    let task = tokio::spawn(async move {
        runtime.run(stop).await;
    });

    RuntimeHandle {
        channels,
        shutdown,
        task,
    }
}

/// Epoch-tagged completion envelope posted by in-flight call tasks.
#[derive(Debug)]
struct CallCompletion {
    kind: CallKind,
    epoch: Epoch,
    outcome: CallOutcome,
}

#[derive(Debug)]
enum CallOutcome {
    Refresh(Result<Vec<SessionId>, TransportError>),
    Join(SessionId, Result<EnterResponse, TransportError>),
    Create(Result<SessionId, TransportError>),
}

struct SessionRuntime<B: SessionBackend> {
    backend: Arc<B>,
    channels: ClientChannels,
    command_rx: mpsc::Receiver<ClientCommand>,
    completion_tx: mpsc::Sender<CallCompletion>,
    completion_rx: mpsc::Receiver<CallCompletion>,
    notification_rx: broadcast::Receiver<LobbyNotification>,
    config: RuntimeConfig,
    machine: ClientStateMachine,
    directory: LobbyDirectory,
    current_session: Option<SessionRecord>,
    pending: PendingCalls,
}

impl<B: SessionBackend> SessionRuntime<B> {
    fn new(
        backend: Arc<B>,
        channels: ClientChannels,
        command_rx: mpsc::Receiver<ClientCommand>,
        config: RuntimeConfig,
    ) -> Self {
        let (completion_tx, completion_rx) = mpsc::channel(COMPLETION_BUFFER);
        let notification_rx = backend.notifications();
        Self {
            backend,
            channels,
            command_rx,
            completion_tx,
            completion_rx,
            notification_rx,
            config,
            machine: ClientStateMachine::default(),
            directory: LobbyDirectory::new(),
            current_session: None,
            pending: PendingCalls::new(),
        }
    }

    async fn run(mut self, stop: CancellationToken) {
        debug!("session runtime started");
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                command = self.command_rx.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(command);
                }
                completion = self.completion_rx.recv() => {
                    // The runtime holds its own sender, so the channel never closes.
                    if let Some(completion) = completion {
                        self.handle_completion(completion);
                    }
                }
                note = self.notification_rx.recv() => {
                    match note {
                        Ok(note) => self.handle_notification(note),
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "notification stream lagged; notifications dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            error!("notification stream closed; stopping runtime");
                            break;
                        }
                    }
                }
            }
        }
        self.teardown();
        debug!("session runtime exited");
    }

    fn handle_command(&mut self, command: ClientCommand) {
        debug!(command = command_kind(&command), "handling command");
        match command {
            ClientCommand::Activate => self.handle_activate(),
            ClientCommand::Refresh => self.handle_refresh(),
            ClientCommand::Select { index } => self.handle_select(index),
            ClientCommand::Join => self.handle_join(),
            ClientCommand::Create => self.handle_create(),
            ClientCommand::AcknowledgeJoinFailure => self.handle_acknowledge(),
            ClientCommand::Leave => self.handle_leave(),
            ClientCommand::SubmitChat { text } => self.handle_submit_chat(&text),
        }
    }

    fn handle_activate(&mut self) {
        if !self.backend.is_available() {
            warn!("matchmaking backend unavailable at activation");
            match self.machine.on_backend_unavailable() {
                Ok(events) => self.emit_all(events),
                Err(err) => self.reject(err),
            }
            return;
        }

        match self.machine.apply(&ClientCommand::Activate) {
            Ok(events) => {
                self.emit_all(events);
                self.start_refresh();
            }
            Err(err) => self.reject(err),
        }
    }

    fn handle_refresh(&mut self) {
        match self.machine.apply(&ClientCommand::Refresh) {
            Ok(events) => {
                self.directory.clear();
                self.emit_all(events);
                self.start_refresh();
            }
            Err(err) => self.reject(err),
        }
    }

    fn handle_select(&mut self, index: usize) {
        if let Err(err) = self.machine.apply(&ClientCommand::Select { index }) {
            self.reject(err);
            return;
        }

        match self.directory.select(index) {
            Ok(_) => {
                let detail = self
                    .directory
                    .metadata_line(index)
                    .unwrap_or_default();
                self.channels
                    .emit(ClientEvent::SelectionChanged { index, detail });
            }
            Err(err) => self.reject(ClientError::new(
                ClientErrorCategory::Contract,
                "selection_out_of_range",
                err.to_string(),
            )),
        }
    }

    fn handle_join(&mut self) {
        let Some(target) = self.directory.selected_lobby().map(|lobby| lobby.id) else {
            self.reject(ClientError::no_selection());
            return;
        };

        match self.machine.apply(&ClientCommand::Join) {
            Ok(events) => {
                // The selection always resets when ResultsReady is left.
                self.directory.clear_selection();
                self.emit_all(events);
                self.start_join(target);
            }
            Err(err) => self.reject(err),
        }
    }

    fn handle_create(&mut self) {
        match self.machine.apply(&ClientCommand::Create) {
            Ok(events) => {
                self.directory.clear_selection();
                self.emit_all(events);
                self.start_create();
            }
            Err(err) => self.reject(err),
        }
    }

    fn handle_acknowledge(&mut self) {
        match self.machine.apply(&ClientCommand::AcknowledgeJoinFailure) {
            Ok(events) => {
                self.directory.clear();
                self.emit_all(events);
                self.start_refresh();
            }
            Err(err) => self.reject(err),
        }
    }

    fn handle_leave(&mut self) {
        match self.machine.apply(&ClientCommand::Leave) {
            Ok(events) => {
                // The record is cleared before any state-dependent call is
                // issued again.
                if let Some(record) = self.current_session.take() {
                    info!(lobby = %record.id, "leaving lobby");
                    self.backend.leave_lobby(record.id);
                }
                self.channels.emit(ClientEvent::SessionLeft);
                self.directory.clear();
                self.emit_all(events);
                self.start_refresh();
            }
            Err(err) => self.reject(err),
        }
    }

    fn handle_submit_chat(&mut self, text: &str) {
        if let Err(err) = self.machine.apply(&ClientCommand::SubmitChat {
            text: String::new(),
        }) {
            self.reject(err);
            return;
        }

        let Some(record) = self.current_session else {
            self.reject(ClientError::invalid_state(
                self.machine.state(),
                "submit_chat",
            ));
            return;
        };

        let bytes = text.as_bytes();
        debug!(
            lobby = %record.id,
            chars = text.chars().count(),
            bytes = bytes.len(),
            "submitting chat text"
        );
        if !self.backend.send_chat_message(record.id, bytes) {
            warn!(lobby = %record.id, "chat send refused by backend");
        }
    }

    fn start_refresh(&mut self) {
        // Short-circuit before issuing the call when the capability dropped
        // away after activation.
        if !self.backend.is_available() {
            warn!("matchmaking backend unavailable; refresh not issued");
            match self.machine.on_transport_failure(CallKind::Refresh) {
                Ok(events) => {
                    self.channels.emit(ClientEvent::CallFailed {
                        kind: CallKind::Refresh,
                        error: ClientError::backend_unavailable(),
                    });
                    self.emit_all(events);
                }
                Err(err) => error!(error = %err, "refresh short-circuit outside Refreshing"),
            }
            return;
        }

        let Some(epoch) = self.begin_call(CallKind::Refresh) else {
            return;
        };

        let backend = Arc::clone(&self.backend);
        let tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let outcome = CallOutcome::Refresh(backend.list_lobbies().await);
            let _ = tx
                .send(CallCompletion {
                    kind: CallKind::Refresh,
                    epoch,
                    outcome,
                })
                .await;
        });
    }

    fn start_join(&mut self, target: SessionId) {
        let Some(epoch) = self.begin_call(CallKind::Join) else {
            return;
        };

        let backend = Arc::clone(&self.backend);
        let tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let outcome = CallOutcome::Join(target, backend.join_lobby(target).await);
            let _ = tx
                .send(CallCompletion {
                    kind: CallKind::Join,
                    epoch,
                    outcome,
                })
                .await;
        });
    }

    fn start_create(&mut self) {
        let Some(epoch) = self.begin_call(CallKind::Create) else {
            return;
        };

        let backend = Arc::clone(&self.backend);
        let tx = self.completion_tx.clone();
        let visibility = self.config.created_lobby_visibility;
        let limit = self.config.created_lobby_limit;
        tokio::spawn(async move {
            let outcome = CallOutcome::Create(backend.create_lobby(visibility, limit).await);
            let _ = tx
                .send(CallCompletion {
                    kind: CallKind::Create,
                    epoch,
                    outcome,
                })
                .await;
        });
    }

    fn begin_call(&mut self, kind: CallKind) -> Option<Epoch> {
        match self.pending.begin(kind) {
            Ok(epoch) => {
                debug!(%kind, %epoch, "issuing backend call");
                Some(epoch)
            }
            Err(err) => {
                self.reject(err);
                None
            }
        }
    }

    fn handle_completion(&mut self, completion: CallCompletion) {
        if !self.pending.finish(completion.kind, completion.epoch) {
            debug!(
                kind = %completion.kind,
                epoch = %completion.epoch,
                "discarding stale call completion"
            );
            return;
        }

        match completion.outcome {
            CallOutcome::Refresh(Ok(ids)) => self.finish_refresh(&ids),
            CallOutcome::Refresh(Err(err)) => self.abandon_call(CallKind::Refresh, err),
            CallOutcome::Join(target, Ok(response)) => self.finish_enter_attempt(target, response),
            CallOutcome::Join(_, Err(err)) => self.abandon_call(CallKind::Join, err),
            CallOutcome::Create(Ok(id)) => self.finish_enter_attempt(id, EnterResponse::Success),
            CallOutcome::Create(Err(err)) => self.abandon_call(CallKind::Create, err),
        }
    }

    fn finish_refresh(&mut self, ids: &[SessionId]) {
        let lobbies = self.fetch_summaries(ids);
        let count = lobbies.len();
        info!(count, "lobby list refresh completed");

        match self.machine.on_refresh_complete(count) {
            Ok(events) => {
                if count == 0 {
                    self.directory.clear();
                } else {
                    self.directory.replace(lobbies.clone());
                    self.channels.emit(ClientEvent::DirectoryUpdated { lobbies });
                }
                self.emit_all(events);
            }
            Err(err) => error!(error = %err, "refresh completion outside Refreshing"),
        }
    }

    fn finish_enter_attempt(&mut self, target: SessionId, response: EnterResponse) {
        if !response.is_success() {
            info!(lobby = %target, ?response, "lobby enter rejected");
            match self.machine.on_enter_result(false) {
                Ok(events) => {
                    self.channels.emit(ClientEvent::JoinRejected { response });
                    self.emit_all(events);
                }
                Err(err) => error!(error = %err, "enter rejection outside Joining/Creating"),
            }
            return;
        }

        // Populate the record from the membership queries at this moment.
        let record = SessionRecord {
            id: target,
            member_count: self.backend.member_count(target).unwrap_or(0),
            member_limit: self.backend.member_limit(target).unwrap_or(0),
        };

        match self.machine.on_enter_result(true) {
            Ok(events) => {
                info!(
                    lobby = %record.id,
                    members = record.member_count,
                    limit = record.member_limit,
                    "entered lobby"
                );
                self.current_session = Some(record);
                self.channels.emit(ClientEvent::SessionEntered { record });
                self.emit_all(events);
            }
            Err(err) => error!(error = %err, "enter success outside Joining/Creating"),
        }
    }

    fn abandon_call(&mut self, kind: CallKind, err: TransportError) {
        warn!(%kind, reason = %err.reason, "call failed at the transport layer; abandoning");
        match self.machine.on_transport_failure(kind) {
            Ok(events) => {
                self.channels.emit(ClientEvent::CallFailed {
                    kind,
                    error: err.into(),
                });
                self.emit_all(events);
            }
            Err(machine_err) => {
                error!(error = %machine_err, "transport failure did not match client state");
            }
        }
    }

    fn fetch_summaries(&self, ids: &[SessionId]) -> Vec<LobbySummary> {
        let mut lobbies = Vec::with_capacity(ids.len());
        for &id in ids {
            let (Some(member_count), Some(member_limit)) =
                (self.backend.member_count(id), self.backend.member_limit(id))
            else {
                warn!(lobby = %id, "listed lobby vanished before membership query; skipping");
                continue;
            };

            let mut metadata = Vec::new();
            for index in 0..self.backend.metadata_count(id) {
                match self.backend.metadata_at(id, index) {
                    Ok(pair) => metadata.push(pair),
                    Err(err) => {
                        // One broken entry never aborts the listing.
                        warn!(lobby = %id, index, error = %err, "skipping metadata entry");
                    }
                }
            }

            lobbies.push(LobbySummary {
                id,
                member_count,
                member_limit,
                metadata,
            });
        }
        lobbies
    }

    fn handle_notification(&mut self, note: LobbyNotification) {
        match note {
            LobbyNotification::ChatMessage { id, sender, body } => {
                if self.current_lobby() != Some(id) {
                    debug!(lobby = %id, "chat message for non-current lobby; discarded");
                    return;
                }
                let text = String::from_utf8_lossy(&body).into_owned();
                self.channels.emit(ClientEvent::ChatLine { sender, text });
            }
            LobbyNotification::MembershipChanged {
                id,
                subject,
                actor,
                change,
            } => {
                debug!(lobby = %id, %subject, %actor, ?change, "membership changed");
                if self.current_lobby() != Some(id) {
                    return;
                }
                if let Some(record) = self.current_session.as_mut() {
                    record.member_count = self.backend.member_count(id).unwrap_or(0);
                    record.member_limit = self.backend.member_limit(id).unwrap_or(0);
                    let record = *record;
                    self.channels.emit(ClientEvent::SessionUpdated { record });
                }
            }
            LobbyNotification::Kicked {
                id,
                admin,
                due_to_disconnect,
            } => {
                if self.current_lobby() != Some(id)
                    || self.machine.state() != ClientState::InSession
                {
                    debug!(lobby = %id, "kick for non-current lobby; discarded");
                    return;
                }
                warn!(lobby = %id, %admin, due_to_disconnect, "kicked from lobby");
                match self.machine.on_kicked() {
                    Ok(events) => {
                        self.current_session = None;
                        self.channels.emit(ClientEvent::SessionLeft);
                        self.directory.clear();
                        self.emit_all(events);
                        self.start_refresh();
                    }
                    Err(err) => error!(error = %err, "kick transition rejected"),
                }
            }
            LobbyNotification::Invited { id, from } => {
                info!(lobby = %id, %from, "lobby invite received");
                self.channels.emit(ClientEvent::InviteReceived { id, from });
            }
            LobbyNotification::FavoritesChanged => {
                debug!("favorites list changed");
            }
            LobbyNotification::DataChanged { id, member } => {
                debug!(lobby = %id, ?member, "lobby data changed");
            }
        }
    }

    fn current_lobby(&self) -> Option<SessionId> {
        self.current_session.map(|record| record.id)
    }

    fn emit_all(&self, events: Vec<ClientEvent>) {
        for event in events {
            self.channels.emit(event);
        }
    }

    fn reject(&self, error: ClientError) {
        debug!(code = %error.code, "command rejected");
        self.channels.emit(ClientEvent::CommandRejected { error });
    }

    fn teardown(&mut self) {
        // Issued exactly once, synchronously, before the backend handle is
        // released, regardless of exit path.
        if let Some(record) = self.current_session.take() {
            info!(lobby = %record.id, "teardown while in lobby; issuing leave");
            self.backend.leave_lobby(record.id);
        } else {
            debug!("teardown without occupied lobby; leave skipped");
        }
        self.pending.clear();
    }
}

fn command_kind(command: &ClientCommand) -> &'static str {
    match command {
        ClientCommand::Activate => "activate",
        ClientCommand::Refresh => "refresh",
        ClientCommand::Select { .. } => "select",
        ClientCommand::Join => "join",
        ClientCommand::Create => "create",
        ClientCommand::AcknowledgeJoinFailure => "acknowledge_join_failure",
        ClientCommand::Leave => "leave",
        ClientCommand::SubmitChat { .. } => "submit_chat",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lobby_core::MemberId;
    use lobby_platform::LoopbackBackend;

    fn runtime_over(backend: Arc<LoopbackBackend>) -> SessionRuntime<LoopbackBackend> {
        let (channels, command_rx) = ClientChannels::new(8, 64);
        SessionRuntime::new(backend, channels, command_rx, RuntimeConfig::default())
    }

    #[tokio::test]
    async fn stale_completion_is_discarded_without_transition() {
        let backend = Arc::new(LoopbackBackend::new(MemberId(100)));
        let seeded = backend.seed_lobby(4, vec![MemberId(1)], Vec::new());
        let mut runtime = runtime_over(Arc::clone(&backend));

        runtime.handle_command(ClientCommand::Activate);
        assert_eq!(runtime.machine.state(), ClientState::Refreshing);

        let stale = runtime
            .pending
            .abandon(CallKind::Refresh)
            .expect("refresh must be in flight");
        runtime.handle_completion(CallCompletion {
            kind: CallKind::Refresh,
            epoch: stale,
            outcome: CallOutcome::Refresh(Ok(vec![seeded])),
        });

        assert_eq!(runtime.machine.state(), ClientState::Refreshing);
        assert!(runtime.directory.is_empty());
    }

    #[tokio::test]
    async fn duplicate_completion_envelope_is_stale() {
        let backend = Arc::new(LoopbackBackend::new(MemberId(100)));
        let seeded = backend.seed_lobby(4, vec![MemberId(1)], Vec::new());
        let mut runtime = runtime_over(Arc::clone(&backend));

        runtime.handle_command(ClientCommand::Activate);
        runtime.pending.abandon(CallKind::Refresh);
        let live = runtime
            .pending
            .begin(CallKind::Refresh)
            .expect("reissue should work");

        runtime.handle_completion(CallCompletion {
            kind: CallKind::Refresh,
            epoch: live,
            outcome: CallOutcome::Refresh(Ok(vec![seeded])),
        });
        assert_eq!(runtime.machine.state(), ClientState::ResultsReady);
        assert_eq!(runtime.directory.len(), 1);

        // A second delivery of the same envelope must change nothing.
        runtime.handle_completion(CallCompletion {
            kind: CallKind::Refresh,
            epoch: live,
            outcome: CallOutcome::Refresh(Ok(Vec::new())),
        });
        assert_eq!(runtime.machine.state(), ClientState::ResultsReady);
        assert_eq!(runtime.directory.len(), 1);
    }

    #[tokio::test]
    async fn refresh_skips_lobby_that_vanished_mid_listing() {
        let backend = Arc::new(LoopbackBackend::new(MemberId(100)));
        let seeded = backend.seed_lobby(4, vec![MemberId(1)], Vec::new());
        let mut runtime = runtime_over(Arc::clone(&backend));

        runtime.handle_command(ClientCommand::Activate);
        runtime.pending.abandon(CallKind::Refresh);
        let live = runtime
            .pending
            .begin(CallKind::Refresh)
            .expect("reissue should work");

        runtime.handle_completion(CallCompletion {
            kind: CallKind::Refresh,
            epoch: live,
            outcome: CallOutcome::Refresh(Ok(vec![seeded, SessionId(999)])),
        });

        assert_eq!(runtime.machine.state(), ClientState::ResultsReady);
        assert_eq!(runtime.directory.len(), 1);
    }
}
