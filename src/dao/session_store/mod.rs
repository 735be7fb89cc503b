//! Store adapter consumed by the lifecycle controller.

/// Always-available in-memory backend.
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::time::SystemTime;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{
    CounterDelta, ParticipantEntity, ParticipantPatch, SessionEntity, SessionPatch, SessionStatus,
    UserEntity,
};
use crate::dao::storage::StorageResult;

/// Outcome of inserting a session while the unique-open-session constraint is
/// enforced inside the store.
#[derive(Debug)]
pub enum SessionInsert {
    /// The session row was created.
    Inserted(SessionEntity),
    /// Another open session already exists; nothing was written.
    OpenSessionExists,
}

/// Outcome of inserting a participant row. The insert and the occupancy
/// increment are a single atomic unit inside the store, so concurrent joins
/// racing for the last slot cannot both succeed.
#[derive(Debug)]
pub enum ParticipantInsert {
    /// The row was created and `current_players` incremented.
    Inserted(ParticipantEntity),
    /// A row for this (user, session) pair already exists.
    DuplicateUser,
    /// Admitting one more player would close the capacity gate
    /// (`current_players + 1 >= max_players`).
    CapacityExhausted,
    /// The session is no longer open (or does not exist).
    SessionClosed,
}

/// Outcome of deleting a participant row. A settled session's membership and
/// occupancy are frozen, so the delete re-checks the owning session inside
/// the store's atomic unit.
#[derive(Debug)]
pub enum ParticipantDelete {
    /// The row was removed and `current_players` decremented.
    Deleted,
    /// No row with this id exists.
    NotFound,
    /// The owning session is no longer open; nothing was written.
    SessionClosed,
}

/// Outcome of patching a participant row. Pick rewrites are refused once the
/// owning session closed; `is_winner` flags may still be written afterwards,
/// which is how settlement records its outcomes.
#[derive(Debug)]
pub enum ParticipantUpdate {
    /// The patch applied; the updated row is returned.
    Updated(ParticipantEntity),
    /// No row with this id exists.
    NotFound,
    /// The patch carried a pick but the owning session is no longer open;
    /// nothing was written.
    SessionClosed,
}

/// Abstraction over the persistence layer for sessions, participants and
/// user counters.
///
/// Implementations must provide durable, independently consistent rows with
/// conditional update support; `conditional_update_session` is the
/// enforcement point for exactly-once settlement.
pub trait SessionStore: Send + Sync {
    /// Fetch the single session whose status is still open, if any.
    fn get_open_session(&self) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;

    /// Fetch a session by id.
    fn get_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;

    /// Insert a new session, refusing if an open session already exists.
    fn insert_session(
        &self,
        session: SessionEntity,
    ) -> BoxFuture<'static, StorageResult<SessionInsert>>;

    /// Apply `patch` to the session only if its status is still one of
    /// `expected`. Returns the updated row, or `None` when the expectation
    /// failed (a concurrent caller got there first).
    fn conditional_update_session(
        &self,
        id: Uuid,
        expected: Vec<SessionStatus>,
        patch: SessionPatch,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;

    /// Fetch the participant row for a (user, session) pair.
    fn get_participant(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>>;

    /// All participant rows of a session.
    fn list_participants(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>>;

    /// Insert a participant row, incrementing the session's occupancy in the
    /// same atomic unit.
    fn insert_participant(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<ParticipantInsert>>;

    /// Delete a participant row, decrementing the session's occupancy in the
    /// same atomic unit. Refused once the owning session is closed.
    fn delete_participant(&self, id: Uuid)
    -> BoxFuture<'static, StorageResult<ParticipantDelete>>;

    /// Apply `patch` to a participant row. A patch carrying `chosen_number`
    /// is refused once the owning session is closed; an `is_winner`-only
    /// patch always applies.
    fn update_participant(
        &self,
        id: Uuid,
        patch: ParticipantPatch,
    ) -> BoxFuture<'static, StorageResult<ParticipantUpdate>>;

    /// Add `delta` to a user's lifetime counters, creating the counter row if
    /// it does not exist yet.
    fn update_user_counters(
        &self,
        user_id: Uuid,
        delta: CounterDelta,
    ) -> BoxFuture<'static, StorageResult<UserEntity>>;

    /// Users ranked by lifetime wins, most wins first.
    fn list_top_users(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<UserEntity>>>;

    /// Sessions created within `[from, to)`.
    fn list_sessions_between(
        &self,
        from: SystemTime,
        to: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>>;

    /// Check backend connectivity.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;

    /// Attempt to re-establish a dropped backend connection.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
