//! Core contract shared between the session runtime and frontend consumers.
//!
//! This crate defines the command/event protocol, the client lifecycle state
//! machine, the lobby directory snapshot, the pending-call tracker, and the
//! common error/channel abstractions.

/// Pending-call tracker with epoch-tagged at-most-once completion.
pub mod calls;
/// Async command/event channel primitives.
pub mod channel;
/// Lobby directory snapshot and selection.
pub mod directory;
/// Stable client error types.
pub mod error;
/// Client lifecycle state machine.
pub mod state_machine;
/// Frontend-facing protocol types (commands, events, payloads).
pub mod types;

pub use calls::{Epoch, PendingCalls};
pub use channel::{ClientChannelError, ClientChannels, EventStream};
pub use directory::{DirectoryError, LobbyDirectory};
pub use error::{ClientError, ClientErrorCategory, MetadataError, TransportError};
pub use state_machine::ClientStateMachine;
pub use types::{
    CallKind, ClientCommand, ClientEvent, ClientState, EnterResponse, LobbyNotification,
    LobbySummary, LobbyVisibility, MemberChange, MemberId, SessionId, SessionRecord,
};
