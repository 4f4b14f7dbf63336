//! Session backend capability used by the lobby runtime.
//!
//! [`SessionBackend`] abstracts the matchmaking/session library the runtime
//! talks to. [`LoopbackBackend`] implements it over an in-memory lobby table
//! so the runtime can be exercised without a real transport; it is the
//! backend used by the console app, the smoke binary, and the runtime tests.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        Mutex, RwLock,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use lobby_core::{
    CallKind, EnterResponse, LobbyNotification, LobbyVisibility, MemberChange, MemberId,
    MetadataError, SessionId, TransportError,
};
use tokio::sync::broadcast;
use tracing::debug;

/// Buffer size of the notification broadcast channel.
const NOTIFICATION_BUFFER: usize = 64;

/// Capability contract for a matchmaking/session backend.
///
/// Calls that round-trip the network are async and can fail at the transport
/// layer; the membership and metadata getters read already-replicated lobby
/// data and are synchronous, mirroring the split in the underlying session
/// libraries this models.
pub trait SessionBackend: Send + Sync + 'static {
    /// Whether the backend capability is present at all.
    fn is_available(&self) -> bool;

    /// Fetch the identifiers of the currently listed lobbies.
    fn list_lobbies(
        &self,
    ) -> impl Future<Output = Result<Vec<SessionId>, TransportError>> + Send;

    /// Create a lobby and enter it as its first member.
    fn create_lobby(
        &self,
        visibility: LobbyVisibility,
        member_limit: u32,
    ) -> impl Future<Output = Result<SessionId, TransportError>> + Send;

    /// Attempt to join a lobby; the logical outcome is an [`EnterResponse`].
    fn join_lobby(
        &self,
        id: SessionId,
    ) -> impl Future<Output = Result<EnterResponse, TransportError>> + Send;

    /// Leave a lobby. Fire-and-forget: no completion is delivered.
    fn leave_lobby(&self, id: SessionId);

    /// Send raw chat bytes to a lobby; `false` means the send was refused.
    fn send_chat_message(&self, id: SessionId, bytes: &[u8]) -> bool;

    /// Member count of a known lobby.
    fn member_count(&self, id: SessionId) -> Option<u32>;

    /// Member capacity of a known lobby.
    fn member_limit(&self, id: SessionId) -> Option<u32>;

    /// Number of key/value metadata entries on a lobby.
    fn metadata_count(&self, id: SessionId) -> u32;

    /// Key/value metadata entry at `index`, in fetch order.
    fn metadata_at(&self, id: SessionId, index: u32) -> Result<(String, String), MetadataError>;

    /// Subscribe to backend-pushed notifications.
    fn notifications(&self) -> broadcast::Receiver<LobbyNotification>;
}

#[derive(Debug, Clone)]
struct LobbyEntry {
    visibility: LobbyVisibility,
    member_limit: u32,
    members: Vec<MemberId>,
    metadata: Vec<(String, String)>,
}

/// In-memory [`SessionBackend`] with scripting knobs for tests and demos.
///
/// Lobbies live in an in-process table; chat is echoed to every notification
/// subscriber, including the sender. Transport failures, enter responses,
/// call latency, and broken metadata entries can all be scripted.
pub struct LoopbackBackend {
    local_member: MemberId,
    next_id: AtomicU64,
    lobbies: RwLock<BTreeMap<u64, LobbyEntry>>,
    fail_next: Mutex<HashMap<CallKind, String>>,
    scripted_enter: Mutex<Option<EnterResponse>>,
    poisoned_metadata: RwLock<HashSet<(u64, u32)>>,
    call_delay: Mutex<Option<Duration>>,
    left: Mutex<Vec<SessionId>>,
    notify_tx: broadcast::Sender<LobbyNotification>,
}

impl LoopbackBackend {
    /// Create a backend with no lobbies, acting as `local_member`.
    pub fn new(local_member: MemberId) -> Self {
        let (notify_tx, _) = broadcast::channel(NOTIFICATION_BUFFER);
        Self {
            local_member,
            next_id: AtomicU64::new(1),
            lobbies: RwLock::new(BTreeMap::new()),
            fail_next: Mutex::new(HashMap::new()),
            scripted_enter: Mutex::new(None),
            poisoned_metadata: RwLock::new(HashSet::new()),
            call_delay: Mutex::new(None),
            left: Mutex::new(Vec::new()),
            notify_tx,
        }
    }

    /// The member the backend acts as.
    pub fn local_member(&self) -> MemberId {
        self.local_member
    }

    /// Insert a listed public lobby and return its id.
    pub fn seed_lobby(
        &self,
        member_limit: u32,
        members: Vec<MemberId>,
        metadata: Vec<(String, String)>,
    ) -> SessionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lobbies().insert(
            id,
            LobbyEntry {
                visibility: LobbyVisibility::Public,
                member_limit,
                members,
                metadata,
            },
        );
        SessionId(id)
    }

    /// Script the next call of `kind` to fail at the transport layer.
    pub fn fail_next(&self, kind: CallKind, reason: impl Into<String>) {
        self.fail_next
            .lock()
            .expect("fail_next lock poisoned")
            .insert(kind, reason.into());
    }

    /// Script the logical outcome of the next join attempt.
    pub fn script_enter_response(&self, response: EnterResponse) {
        *self
            .scripted_enter
            .lock()
            .expect("scripted_enter lock poisoned") = Some(response);
    }

    /// Make the metadata entry at `(id, index)` fail when fetched.
    pub fn poison_metadata(&self, id: SessionId, index: u32) {
        self.poisoned_metadata
            .write()
            .expect("poisoned_metadata lock poisoned")
            .insert((id.0, index));
    }

    /// Delay every subsequent async call by `delay`.
    pub fn set_call_delay(&self, delay: Duration) {
        *self.call_delay.lock().expect("call_delay lock poisoned") = Some(delay);
    }

    /// Lobbies the local member left, in call order.
    pub fn left_lobbies(&self) -> Vec<SessionId> {
        self.left.lock().expect("left lock poisoned").clone()
    }

    /// Deliver a chat message from a remote member.
    pub fn push_chat(&self, id: SessionId, sender: MemberId, body: impl Into<Vec<u8>>) {
        let _ = self.notify_tx.send(LobbyNotification::ChatMessage {
            id,
            sender,
            body: body.into(),
        });
    }

    /// Kick the local member out of `id`.
    pub fn kick(&self, id: SessionId, admin: MemberId, due_to_disconnect: bool) {
        if let Some(entry) = self.lobbies().get_mut(&id.0) {
            entry.members.retain(|member| *member != self.local_member);
        }
        let _ = self.notify_tx.send(LobbyNotification::Kicked {
            id,
            admin,
            due_to_disconnect,
        });
    }

    /// Deliver a lobby invite to the local member.
    pub fn invite(&self, id: SessionId, from: MemberId) {
        let _ = self.notify_tx.send(LobbyNotification::Invited { id, from });
    }

    /// Join `id` as a remote member, emitting the membership notification.
    pub fn remote_join(&self, id: SessionId, member: MemberId) {
        if let Some(entry) = self.lobbies().get_mut(&id.0) {
            entry.members.push(member);
        }
        let _ = self.notify_tx.send(LobbyNotification::MembershipChanged {
            id,
            subject: member,
            actor: member,
            change: MemberChange::Entered,
        });
    }

    fn lobbies(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<u64, LobbyEntry>> {
        self.lobbies.write().expect("lobbies lock poisoned")
    }

    fn lobbies_read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<u64, LobbyEntry>> {
        self.lobbies.read().expect("lobbies lock poisoned")
    }

    async fn simulate_round_trip(&self, kind: CallKind) -> Result<(), TransportError> {
        let delay = *self.call_delay.lock().expect("call_delay lock poisoned");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .fail_next
            .lock()
            .expect("fail_next lock poisoned")
            .remove(&kind);
        match scripted {
            Some(reason) => Err(TransportError::new(reason)),
            None => Ok(()),
        }
    }
}

impl SessionBackend for LoopbackBackend {
    fn is_available(&self) -> bool {
        true
    }

    async fn list_lobbies(&self) -> Result<Vec<SessionId>, TransportError> {
        self.simulate_round_trip(CallKind::Refresh).await?;

        let ids = self
            .lobbies_read()
            .iter()
            .filter(|(_, entry)| entry.visibility == LobbyVisibility::Public)
            .map(|(id, _)| SessionId(*id))
            .collect();
        Ok(ids)
    }

    async fn create_lobby(
        &self,
        visibility: LobbyVisibility,
        member_limit: u32,
    ) -> Result<SessionId, TransportError> {
        self.simulate_round_trip(CallKind::Create).await?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lobbies().insert(
            id,
            LobbyEntry {
                visibility,
                member_limit,
                members: vec![self.local_member],
                metadata: Vec::new(),
            },
        );
        debug!(lobby = id, ?visibility, member_limit, "created lobby");
        Ok(SessionId(id))
    }

    async fn join_lobby(&self, id: SessionId) -> Result<EnterResponse, TransportError> {
        self.simulate_round_trip(CallKind::Join).await?;

        let scripted = self
            .scripted_enter
            .lock()
            .expect("scripted_enter lock poisoned")
            .take();
        if let Some(response) = scripted {
            return Ok(response);
        }

        let mut lobbies = self.lobbies();
        let Some(entry) = lobbies.get_mut(&id.0) else {
            return Ok(EnterResponse::DoesntExist);
        };
        if entry.members.len() as u32 >= entry.member_limit {
            return Ok(EnterResponse::Full);
        }

        entry.members.push(self.local_member);
        drop(lobbies);

        let _ = self.notify_tx.send(LobbyNotification::MembershipChanged {
            id,
            subject: self.local_member,
            actor: self.local_member,
            change: MemberChange::Entered,
        });
        Ok(EnterResponse::Success)
    }

    fn leave_lobby(&self, id: SessionId) {
        if let Some(entry) = self.lobbies().get_mut(&id.0) {
            entry.members.retain(|member| *member != self.local_member);
        }
        self.left.lock().expect("left lock poisoned").push(id);

        let _ = self.notify_tx.send(LobbyNotification::MembershipChanged {
            id,
            subject: self.local_member,
            actor: self.local_member,
            change: MemberChange::Left,
        });
    }

    fn send_chat_message(&self, id: SessionId, bytes: &[u8]) -> bool {
        let is_member = self
            .lobbies_read()
            .get(&id.0)
            .is_some_and(|entry| entry.members.contains(&self.local_member));
        if !is_member {
            return false;
        }

        let _ = self.notify_tx.send(LobbyNotification::ChatMessage {
            id,
            sender: self.local_member,
            body: bytes.to_vec(),
        });
        true
    }

    fn member_count(&self, id: SessionId) -> Option<u32> {
        self.lobbies_read()
            .get(&id.0)
            .map(|entry| entry.members.len() as u32)
    }

    fn member_limit(&self, id: SessionId) -> Option<u32> {
        self.lobbies_read().get(&id.0).map(|entry| entry.member_limit)
    }

    fn metadata_count(&self, id: SessionId) -> u32 {
        self.lobbies_read()
            .get(&id.0)
            .map(|entry| entry.metadata.len() as u32)
            .unwrap_or(0)
    }

    fn metadata_at(&self, id: SessionId, index: u32) -> Result<(String, String), MetadataError> {
        let poisoned = self
            .poisoned_metadata
            .read()
            .expect("poisoned_metadata lock poisoned")
            .contains(&(id.0, index));
        if poisoned {
            return Err(MetadataError::Unavailable(format!(
                "entry {index} of lobby {id} is unreadable"
            )));
        }

        self.lobbies_read()
            .get(&id.0)
            .and_then(|entry| entry.metadata.get(index as usize).cloned())
            .ok_or(MetadataError::OutOfRange { id: id.0, index })
    }

    fn notifications(&self) -> broadcast::Receiver<LobbyNotification> {
        self.notify_tx.subscribe()
    }
}

/// A backend whose capability is absent.
///
/// Every call behaves as if the underlying session library was never
/// initialized; the runtime is expected to check `is_available` at
/// activation and never get further.
pub struct OfflineBackend {
    notify_tx: broadcast::Sender<LobbyNotification>,
}

impl OfflineBackend {
    /// Create an offline backend.
    pub fn new() -> Self {
        let (notify_tx, _) = broadcast::channel(1);
        Self { notify_tx }
    }
}

impl Default for OfflineBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBackend for OfflineBackend {
    fn is_available(&self) -> bool {
        false
    }

    async fn list_lobbies(&self) -> Result<Vec<SessionId>, TransportError> {
        Err(TransportError::new("backend is offline"))
    }

    async fn create_lobby(
        &self,
        _visibility: LobbyVisibility,
        _member_limit: u32,
    ) -> Result<SessionId, TransportError> {
        Err(TransportError::new("backend is offline"))
    }

    async fn join_lobby(&self, _id: SessionId) -> Result<EnterResponse, TransportError> {
        Err(TransportError::new("backend is offline"))
    }

    fn leave_lobby(&self, _id: SessionId) {}

    fn send_chat_message(&self, _id: SessionId, _bytes: &[u8]) -> bool {
        false
    }

    fn member_count(&self, _id: SessionId) -> Option<u32> {
        None
    }

    fn member_limit(&self, _id: SessionId) -> Option<u32> {
        None
    }

    fn metadata_count(&self, _id: SessionId) -> u32 {
        0
    }

    fn metadata_at(&self, _id: SessionId, index: u32) -> Result<(String, String), MetadataError> {
        Err(MetadataError::OutOfRange { id: 0, index })
    }

    fn notifications(&self) -> broadcast::Receiver<LobbyNotification> {
        self.notify_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> LoopbackBackend {
        LoopbackBackend::new(MemberId(100))
    }

    #[tokio::test]
    async fn lists_only_public_lobbies() {
        let backend = backend();
        let public = backend.seed_lobby(4, vec![MemberId(1)], Vec::new());
        backend
            .create_lobby(LobbyVisibility::Private, 4)
            .await
            .expect("create should work");

        let listed = backend.list_lobbies().await.expect("list should work");
        assert_eq!(listed, vec![public]);
    }

    #[tokio::test]
    async fn join_fills_lobby_and_reports_full() {
        let backend = backend();
        let id = backend.seed_lobby(1, vec![MemberId(1)], Vec::new());

        let response = backend.join_lobby(id).await.expect("join should complete");
        assert_eq!(response, EnterResponse::Full);
    }

    #[tokio::test]
    async fn join_of_unknown_lobby_reports_doesnt_exist() {
        let backend = backend();
        let response = backend
            .join_lobby(SessionId(999))
            .await
            .expect("join should complete");
        assert_eq!(response, EnterResponse::DoesntExist);
    }

    #[tokio::test]
    async fn scripted_transport_failure_fires_once() {
        let backend = backend();
        backend.seed_lobby(4, vec![MemberId(1)], Vec::new());
        backend.fail_next(CallKind::Refresh, "io timeout");

        let err = backend
            .list_lobbies()
            .await
            .expect_err("scripted failure must fire");
        assert_eq!(err.reason, "io timeout");

        backend
            .list_lobbies()
            .await
            .expect("next call should succeed");
    }

    #[tokio::test]
    async fn chat_send_requires_membership_and_echoes() {
        let backend = backend();
        let id = backend.seed_lobby(4, vec![MemberId(1)], Vec::new());
        assert!(!backend.send_chat_message(id, b"hello"));

        backend.join_lobby(id).await.expect("join should work");
        let mut notifications = backend.notifications();
        assert!(backend.send_chat_message(id, b"hello"));

        let note = notifications.recv().await.expect("echo should arrive");
        assert_eq!(
            note,
            LobbyNotification::ChatMessage {
                id,
                sender: MemberId(100),
                body: b"hello".to_vec(),
            }
        );
    }

    #[test]
    fn poisoned_metadata_entry_fails_individually() {
        let backend = backend();
        let id = backend.seed_lobby(
            4,
            vec![MemberId(1)],
            vec![
                ("map".to_owned(), "dust".to_owned()),
                ("mode".to_owned(), "ffa".to_owned()),
            ],
        );
        backend.poison_metadata(id, 1);

        assert_eq!(backend.metadata_count(id), 2);
        assert!(backend.metadata_at(id, 0).is_ok());
        assert!(matches!(
            backend.metadata_at(id, 1),
            Err(MetadataError::Unavailable(_))
        ));
    }

    #[test]
    fn leave_is_recorded_and_membership_drops() {
        let backend = backend();
        let id = backend.seed_lobby(4, vec![MemberId(1), MemberId(100)], Vec::new());

        backend.leave_lobby(id);
        assert_eq!(backend.left_lobbies(), vec![id]);
        assert_eq!(backend.member_count(id), Some(1));
    }

    #[test]
    fn offline_backend_reports_unavailable() {
        let backend = OfflineBackend::new();
        assert!(!backend.is_available());
        assert!(!backend.send_chat_message(SessionId(1), b"x"));
    }
}
