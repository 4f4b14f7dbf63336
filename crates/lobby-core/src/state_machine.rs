use crate::{
    error::ClientError,
    types::{CallKind, ClientCommand, ClientEvent, ClientState},
};

/// Finite-state controller for the matchmaking lifecycle.
///
/// The machine owns the `ClientState` value exclusively; every mutation goes
/// through `apply` (user commands) or one of the `on_*` methods (completions
/// and forced transitions), so side effects stay centralized in the runtime
/// that commits the resulting events. Rejected inputs leave the state
/// untouched.
#[derive(Debug, Clone)]
pub struct ClientStateMachine {
    state: ClientState,
}

impl Default for ClientStateMachine {
    fn default() -> Self {
        Self {
            state: ClientState::Init,
        }
    }
}

impl ClientStateMachine {
    /// Current client state.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Validate and apply a user command.
    ///
    /// `Activate` transitions toward `Refreshing`; when the backend
    /// capability is absent the runtime routes activation to
    /// [`ClientStateMachine::on_backend_unavailable`] instead.
    pub fn apply(&mut self, command: &ClientCommand) -> Result<Vec<ClientEvent>, ClientError> {
        use ClientCommand::*;

        match command {
            Activate => self.transition_from_state(
                ClientState::Init,
                ClientState::Refreshing,
                "activate",
            ),
            Refresh => self.transition_from_any_of(
                &[ClientState::NoResultsFound, ClientState::ResultsReady],
                ClientState::Refreshing,
                "refresh",
            ),
            Select { .. } => {
                if self.state == ClientState::ResultsReady {
                    Ok(Vec::new())
                } else {
                    Err(ClientError::invalid_state(self.state, "select"))
                }
            }
            Join => self.transition_from_state(
                ClientState::ResultsReady,
                ClientState::Joining,
                "join",
            ),
            Create => self.transition_from_state(
                ClientState::ResultsReady,
                ClientState::Creating,
                "create",
            ),
            AcknowledgeJoinFailure => self.transition_from_state(
                ClientState::JoinFailed,
                ClientState::Refreshing,
                "acknowledge_join_failure",
            ),
            Leave => self.transition_from_state(
                ClientState::InSession,
                ClientState::Refreshing,
                "leave",
            ),
            SubmitChat { .. } => {
                if self.state == ClientState::InSession {
                    Ok(Vec::new())
                } else {
                    Err(ClientError::invalid_state(self.state, "submit_chat"))
                }
            }
        }
    }

    /// Activation found the backend capability absent.
    ///
    /// Terminal for this session until external re-initialization.
    pub fn on_backend_unavailable(&mut self) -> Result<Vec<ClientEvent>, ClientError> {
        self.transition_from_state(
            ClientState::Init,
            ClientState::BackendUnavailable,
            "backend_unavailable",
        )
    }

    /// A refresh call completed with `lobby_count` candidates.
    pub fn on_refresh_complete(
        &mut self,
        lobby_count: usize,
    ) -> Result<Vec<ClientEvent>, ClientError> {
        let next = if lobby_count == 0 {
            ClientState::NoResultsFound
        } else {
            ClientState::ResultsReady
        };
        self.transition_from_state(ClientState::Refreshing, next, "refresh_complete")
    }

    /// A join or create call completed with a logical outcome.
    pub fn on_enter_result(&mut self, success: bool) -> Result<Vec<ClientEvent>, ClientError> {
        let next = if success {
            ClientState::InSession
        } else {
            ClientState::JoinFailed
        };
        self.transition_from_any_of(
            &[ClientState::Joining, ClientState::Creating],
            next,
            "enter_result",
        )
    }

    /// An issued call failed at the transport layer and was abandoned.
    ///
    /// The machine reverts to a state with a manual retry affordance; nothing
    /// is retried automatically.
    pub fn on_transport_failure(
        &mut self,
        kind: CallKind,
    ) -> Result<Vec<ClientEvent>, ClientError> {
        match (self.state, kind) {
            (ClientState::Refreshing, CallKind::Refresh) => self.transition_from_state(
                ClientState::Refreshing,
                ClientState::NoResultsFound,
                "refresh_transport_failure",
            ),
            (ClientState::Joining, CallKind::Join) | (ClientState::Creating, CallKind::Create) => {
                self.transition_from_any_of(
                    &[ClientState::Joining, ClientState::Creating],
                    ClientState::ResultsReady,
                    "enter_transport_failure",
                )
            }
            _ => Err(ClientError::invalid_state(self.state, "transport_failure")),
        }
    }

    /// The backend removed the local user from the occupied lobby.
    pub fn on_kicked(&mut self) -> Result<Vec<ClientEvent>, ClientError> {
        self.transition_from_state(ClientState::InSession, ClientState::Refreshing, "kicked")
    }

    fn transition_from_state(
        &mut self,
        expected: ClientState,
        next: ClientState,
        action: &str,
    ) -> Result<Vec<ClientEvent>, ClientError> {
        if self.state != expected {
            return Err(ClientError::invalid_state(self.state, action));
        }
        self.state = next;
        Ok(vec![ClientEvent::StateChanged { state: next }])
    }

    fn transition_from_any_of(
        &mut self,
        expected: &[ClientState],
        next: ClientState,
        action: &str,
    ) -> Result<Vec<ClientEvent>, ClientError> {
        if !expected.contains(&self.state) {
            return Err(ClientError::invalid_state(self.state, action));
        }
        self.state = next;
        Ok(vec![ClientEvent::StateChanged { state: next }])
    }
}
