//! Frontend-facing state reducer for `lobbychat-console`.

use lobby_core::{ClientEvent, ClientState, EnterResponse, LobbySummary, SessionRecord};
use tracing::debug;

const DEFAULT_STATUS: &str = "Init.";

/// Lobby list row consumed by the console renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyRowView {
    /// Zero-based row index, matching the `select` command argument.
    pub index: usize,
    /// Rendered row text.
    pub text: String,
    /// Whether this row is the current selection.
    pub is_selected: bool,
}

/// Full UI snapshot emitted after each applied event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleSnapshot {
    /// One-line status header.
    pub status_text: String,
    /// Lobby list rows in directory order.
    pub lobby_rows: Vec<LobbyRowView>,
    /// Metadata line of the selected lobby.
    pub detail_text: String,
    /// In-session header line.
    pub session_text: String,
    /// Chat pane lines, oldest first.
    pub chat_lines: Vec<String>,
    /// Whether the join action is currently usable.
    pub join_enabled: bool,
    /// Whether the session panel replaces the lobby list.
    pub session_panel_visible: bool,
    /// Last surfaced error, when one is pending.
    pub error_text: Option<String>,
}

/// Mutable app state folding runtime events into render snapshots.
#[derive(Debug, Clone)]
pub struct ConsoleState {
    chat_max_lines: usize,
    state: ClientState,
    lobbies: Vec<LobbySummary>,
    selected: Option<usize>,
    detail_text: String,
    session_text: String,
    status_text: String,
    chat_lines: Vec<String>,
    last_rejection: Option<EnterResponse>,
    error_text: Option<String>,
}

impl ConsoleState {
    /// Create a new reducer state.
    pub fn new(chat_max_lines: usize) -> Self {
        Self {
            chat_max_lines: chat_max_lines.max(1),
            state: ClientState::Init,
            lobbies: Vec::new(),
            selected: None,
            detail_text: String::new(),
            session_text: String::new(),
            status_text: DEFAULT_STATUS.to_owned(),
            chat_lines: Vec::new(),
            last_rejection: None,
            error_text: None,
        }
    }

    /// Current client state as last reported by the runtime.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Fold one runtime event into the state.
    pub fn apply(&mut self, event: &ClientEvent) {
        match event {
            ClientEvent::StateChanged { state } => self.apply_state(*state),
            ClientEvent::DirectoryUpdated { lobbies } => {
                self.lobbies = lobbies.clone();
                self.selected = None;
                self.detail_text.clear();
            }
            ClientEvent::SelectionChanged { index, detail } => {
                self.selected = Some(*index);
                self.detail_text = detail.clone();
            }
            ClientEvent::SessionEntered { record } | ClientEvent::SessionUpdated { record } => {
                self.session_text = session_line(record);
            }
            ClientEvent::SessionLeft => {
                self.session_text.clear();
            }
            ClientEvent::ChatLine { sender, text } => {
                self.push_chat_line(format!("{sender}: {text}"));
            }
            ClientEvent::InviteReceived { id, from } => {
                self.push_chat_line(format!("* invite from {from} to lobby {id}"));
            }
            ClientEvent::JoinRejected { response } => {
                self.last_rejection = Some(*response);
            }
            ClientEvent::CallFailed { kind, error } => {
                self.error_text = Some(format!("{kind} failed: {}", error.message));
            }
            ClientEvent::CommandRejected { error } => {
                debug!(code = %error.code, "command rejected");
                self.error_text = Some(error.message.clone());
            }
        }
    }

    /// Current immutable snapshot for rendering.
    pub fn snapshot(&self) -> ConsoleSnapshot {
        let lobby_rows = self
            .lobbies
            .iter()
            .enumerate()
            .map(|(index, lobby)| LobbyRowView {
                index,
                text: format!(
                    "{index} - Lobby: {} - Players: {}/{}",
                    lobby.id, lobby.member_count, lobby.member_limit
                ),
                is_selected: self.selected == Some(index),
            })
            .collect();

        ConsoleSnapshot {
            status_text: self.status_text.clone(),
            lobby_rows,
            detail_text: self.detail_text.clone(),
            session_text: self.session_text.clone(),
            chat_lines: self.chat_lines.clone(),
            join_enabled: self.state == ClientState::ResultsReady && self.selected.is_some(),
            session_panel_visible: self.state == ClientState::InSession,
            error_text: self.error_text.clone(),
        }
    }

    /// Clear the pending error message.
    pub fn clear_error(&mut self) {
        self.error_text = None;
    }

    fn apply_state(&mut self, state: ClientState) {
        self.state = state;
        self.status_text = match state {
            ClientState::Init => DEFAULT_STATUS.to_owned(),
            ClientState::BackendUnavailable => "Matchmaking is not available...".to_owned(),
            ClientState::Refreshing => {
                self.lobbies.clear();
                self.selected = None;
                self.detail_text.clear();
                "Refreshing...".to_owned()
            }
            ClientState::NoResultsFound => "No lobbies found...".to_owned(),
            ClientState::ResultsReady => format!("Found {} lobbies:", self.lobbies.len()),
            ClientState::Joining => "Joining...".to_owned(),
            ClientState::Creating => "Creating...".to_owned(),
            ClientState::JoinFailed => match self.last_rejection.take() {
                Some(response) => format!("Failed to join: {response:?}"),
                None => "Failed to join...".to_owned(),
            },
            ClientState::InSession => {
                // Entering a lobby starts with a clean chat pane.
                self.chat_lines.clear();
                self.session_text.clone()
            }
        };
    }

    fn push_chat_line(&mut self, line: String) {
        self.chat_lines.push(line);
        if self.chat_lines.len() > self.chat_max_lines {
            let excess = self.chat_lines.len() - self.chat_max_lines;
            self.chat_lines.drain(0..excess);
        }
    }
}

fn session_line(record: &SessionRecord) -> String {
    format!(
        "Lobby: {} - Slots: {}/{}",
        record.id, record.member_count, record.member_limit
    )
}
