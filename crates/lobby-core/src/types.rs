use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Opaque 64-bit identifier of a remotely hosted lobby/session.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque 64-bit identifier of a remote member/account.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
pub struct MemberId(pub u64);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client lifecycle state reported to the frontend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClientState {
    /// Client has not been activated yet.
    Init,
    /// The matchmaking backend capability is absent; terminal until external
    /// re-initialization.
    BackendUnavailable,
    /// A lobby-list refresh call is in flight.
    Refreshing,
    /// The last refresh completed with zero candidate lobbies.
    NoResultsFound,
    /// The directory holds at least one candidate lobby.
    ResultsReady,
    /// A join call is in flight for the selected lobby.
    Joining,
    /// A create call is in flight.
    Creating,
    /// The last join attempt was logically rejected by the backend.
    JoinFailed,
    /// The client occupies a lobby; the session record is populated.
    InSession,
}

/// Logical outcome code of a join attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EnterResponse {
    /// Join succeeded.
    Success,
    /// The lobby no longer exists.
    DoesntExist,
    /// The caller lacks permission to join.
    NotAllowed,
    /// The lobby is at member capacity.
    Full,
    /// Unexpected backend-side error.
    Error,
    /// The caller is banned from the lobby.
    Banned,
    /// The caller's account is limited.
    Limited,
    /// The owning clan has disabled the lobby.
    ClanDisabled,
    /// The caller carries a community ban.
    CommunityBan,
    /// A lobby member has blocked the caller.
    MemberBlockedYou,
    /// The caller has blocked a lobby member.
    YouBlockedMember,
}

impl EnterResponse {
    /// Whether the response admits the caller into the lobby.
    pub fn is_success(self) -> bool {
        matches!(self, EnterResponse::Success)
    }
}

/// Visibility of a lobby at creation time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LobbyVisibility {
    /// Joinable by invite only.
    Private,
    /// Joinable by friends of members.
    FriendsOnly,
    /// Returned by lobby-list searches.
    Public,
    /// Joinable but never returned by searches.
    Invisible,
}

/// Membership-change flag carried by membership notifications.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MemberChange {
    /// A member entered the lobby.
    Entered,
    /// A member left voluntarily.
    Left,
    /// A member lost its connection.
    Disconnected,
    /// A member was kicked by an admin.
    Kicked,
    /// A member was banned by an admin.
    Banned,
}

/// Kind of an asynchronous backend call issued by the runtime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// Lobby-list refresh.
    Refresh,
    /// Join the selected lobby.
    Join,
    /// Create a new lobby.
    Create,
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallKind::Refresh => "refresh",
            CallKind::Join => "join",
            CallKind::Create => "create",
        };
        f.write_str(name)
    }
}

/// One candidate lobby as fetched during a directory refresh.
///
/// Immutable once fetched; the directory replaces the full snapshot on every
/// refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LobbySummary {
    /// Session identifier.
    pub id: SessionId,
    /// Member count at fetch time.
    pub member_count: u32,
    /// Member capacity at fetch time.
    pub member_limit: u32,
    /// Key/value metadata pairs in fetch order.
    pub metadata: Vec<(String, String)>,
}

/// The lobby the client currently occupies.
///
/// Exists only while the client state is `InSession`; cleared on leave, kick,
/// or disconnect before any state-dependent call is retried.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionRecord {
    /// Session identifier.
    pub id: SessionId,
    /// Member count as of the last membership query.
    pub member_count: u32,
    /// Member capacity as of the last membership query.
    pub member_limit: u32,
}

/// Command channel input accepted by the session runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClientCommand {
    /// Activate the client: check backend availability and start the first
    /// refresh.
    Activate,
    /// Re-fetch the lobby directory.
    Refresh,
    /// Record the user's pick in the current directory snapshot.
    Select {
        /// Zero-based index into the current snapshot.
        index: usize,
    },
    /// Join the currently selected lobby.
    Join,
    /// Create a new lobby and enter it.
    Create,
    /// Acknowledge a failed join and return to refreshing.
    AcknowledgeJoinFailure,
    /// Leave the occupied lobby.
    Leave,
    /// Send chat text to the occupied lobby.
    SubmitChat {
        /// Raw chat line as typed; encoded to UTF-8 bytes on send.
        text: String,
    },
}

/// Event channel output emitted by the session runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClientEvent {
    /// Client lifecycle transition.
    StateChanged {
        /// New client state.
        state: ClientState,
    },
    /// Full directory snapshot replacement.
    DirectoryUpdated {
        /// Latest candidate lobbies in backend order.
        lobbies: Vec<LobbySummary>,
    },
    /// The user's selection changed.
    SelectionChanged {
        /// Selected index in the current snapshot.
        index: usize,
        /// Rendered metadata line for the selected lobby.
        detail: String,
    },
    /// The client entered a lobby.
    SessionEntered {
        /// Populated session record.
        record: SessionRecord,
    },
    /// Membership of the occupied lobby changed.
    SessionUpdated {
        /// Re-queried session record.
        record: SessionRecord,
    },
    /// The client left (or was removed from) the occupied lobby.
    SessionLeft,
    /// A chat line arrived for the occupied lobby.
    ChatLine {
        /// Sending member.
        sender: MemberId,
        /// Decoded chat text.
        text: String,
    },
    /// An invite to another lobby arrived.
    InviteReceived {
        /// Inviting lobby.
        id: SessionId,
        /// Inviting member.
        from: MemberId,
    },
    /// A join attempt was logically rejected by the backend.
    JoinRejected {
        /// Rejection reason, retained for display.
        response: EnterResponse,
    },
    /// An issued call failed at the transport layer and was abandoned.
    CallFailed {
        /// Which call failed.
        kind: CallKind,
        /// Stable error payload with the backend-supplied reason.
        error: ClientError,
    },
    /// A command was rejected without a state change.
    CommandRejected {
        /// Stable error payload describing the rejection.
        error: ClientError,
    },
}

/// Notification pushed by the backend without a locally issued request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum LobbyNotification {
    /// A chat message was delivered to a lobby.
    ChatMessage {
        /// Target lobby.
        id: SessionId,
        /// Sending member.
        sender: MemberId,
        /// Raw message bytes.
        body: Vec<u8>,
    },
    /// Lobby membership changed.
    MembershipChanged {
        /// Target lobby.
        id: SessionId,
        /// Member whose membership changed.
        subject: MemberId,
        /// Member that caused the change.
        actor: MemberId,
        /// What happened to the subject.
        change: MemberChange,
    },
    /// The local user was kicked from a lobby.
    Kicked {
        /// Target lobby.
        id: SessionId,
        /// Admin that issued the kick.
        admin: MemberId,
        /// Whether the kick was caused by a disconnect.
        due_to_disconnect: bool,
    },
    /// The local user was invited to a lobby.
    Invited {
        /// Inviting lobby.
        id: SessionId,
        /// Inviting member.
        from: MemberId,
    },
    /// The user's favorite-servers list changed.
    FavoritesChanged,
    /// Lobby key/value data changed.
    DataChanged {
        /// Target lobby.
        id: SessionId,
        /// Member whose data changed, when member-scoped.
        member: Option<MemberId>,
    },
}
