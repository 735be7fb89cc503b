//! In-memory [`SessionStore`] backend.
//!
//! Every logically mutating operation takes the single write lock, so the
//! occupancy counter can never drift from the participant rows and the
//! conditional session update is naturally race-free. This is the default
//! backend and the one the service tests run against.

use std::{collections::HashMap, sync::Arc, time::SystemTime};

use futures::future::BoxFuture;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::dao::{
    models::{
        CounterDelta, ParticipantEntity, ParticipantPatch, SessionEntity, SessionPatch,
        SessionStatus, UserEntity,
    },
    session_store::{
        ParticipantDelete, ParticipantInsert, ParticipantUpdate, SessionInsert, SessionStore,
    },
    storage::StorageResult,
};

#[derive(Default)]
struct MemoryState {
    sessions: HashMap<Uuid, SessionEntity>,
    participants: HashMap<Uuid, ParticipantEntity>,
    users: HashMap<Uuid, UserEntity>,
}

/// Process-local store keeping all rows behind one lock.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewind a session's creation instant so tests can cross the play
    /// window without sleeping.
    #[cfg(test)]
    pub(crate) async fn backdate_session(&self, id: Uuid, created_at: SystemTime) {
        let mut state = self.state.write().await;
        if let Some(session) = state.sessions.get_mut(&id) {
            session.created_at = created_at;
        }
    }
}

fn apply_session_patch(session: &mut SessionEntity, patch: &SessionPatch) {
    if let Some(status) = patch.status {
        session.status = status;
    }
    if let Some(number) = patch.winning_number {
        session.winning_number = Some(number);
    }
    if let Some(ended_at) = patch.ended_at {
        session.ended_at = Some(ended_at);
    }
}

fn apply_participant_patch(participant: &mut ParticipantEntity, patch: &ParticipantPatch) {
    if let Some(number) = patch.chosen_number {
        participant.chosen_number = Some(number);
    }
    if let Some(is_winner) = patch.is_winner {
        participant.is_winner = is_winner;
    }
}

impl SessionStore for MemorySessionStore {
    fn get_open_session(&self) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let state = store.state.read().await;
            Ok(state
                .sessions
                .values()
                .find(|session| session.status.is_open())
                .cloned())
        })
    }

    fn get_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let state = store.state.read().await;
            Ok(state.sessions.get(&id).cloned())
        })
    }

    fn insert_session(
        &self,
        session: SessionEntity,
    ) -> BoxFuture<'static, StorageResult<SessionInsert>> {
        let store = self.clone();
        Box::pin(async move {
            let mut state = store.state.write().await;
            if state.sessions.values().any(|row| row.status.is_open()) {
                return Ok(SessionInsert::OpenSessionExists);
            }
            state.sessions.insert(session.id, session.clone());
            Ok(SessionInsert::Inserted(session))
        })
    }

    fn conditional_update_session(
        &self,
        id: Uuid,
        expected: Vec<SessionStatus>,
        patch: SessionPatch,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut state = store.state.write().await;
            let Some(session) = state.sessions.get_mut(&id) else {
                return Ok(None);
            };
            if !expected.contains(&session.status) {
                return Ok(None);
            }
            apply_session_patch(session, &patch);
            Ok(Some(session.clone()))
        })
    }

    fn get_participant(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let state = store.state.read().await;
            Ok(state
                .participants
                .values()
                .find(|row| row.user_id == user_id && row.session_id == session_id)
                .cloned())
        })
    }

    fn list_participants(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let state = store.state.read().await;
            let mut rows: Vec<ParticipantEntity> = state
                .participants
                .values()
                .filter(|row| row.session_id == session_id)
                .cloned()
                .collect();
            rows.sort_by_key(|row| row.joined_at);
            Ok(rows)
        })
    }

    fn insert_participant(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<ParticipantInsert>> {
        let store = self.clone();
        Box::pin(async move {
            let mut state = store.state.write().await;

            let Some(session) = state.sessions.get(&participant.session_id) else {
                return Ok(ParticipantInsert::SessionClosed);
            };
            if !session.status.is_open() {
                return Ok(ParticipantInsert::SessionClosed);
            }
            if state.participants.values().any(|row| {
                row.session_id == participant.session_id && row.user_id == participant.user_id
            }) {
                return Ok(ParticipantInsert::DuplicateUser);
            }
            // Gate bound re-checked under the lock so racing joins cannot
            // both claim the last admissible slot.
            if session.current_players + 1 >= session.max_players {
                return Ok(ParticipantInsert::CapacityExhausted);
            }

            let session_id = participant.session_id;
            state.participants.insert(participant.id, participant.clone());
            if let Some(session) = state.sessions.get_mut(&session_id) {
                session.current_players += 1;
            }
            Ok(ParticipantInsert::Inserted(participant))
        })
    }

    fn delete_participant(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<ParticipantDelete>> {
        let store = self.clone();
        Box::pin(async move {
            let mut state = store.state.write().await;
            let Some(row) = state.participants.get(&id) else {
                return Ok(ParticipantDelete::NotFound);
            };
            // A settled session's membership and occupancy are frozen.
            let session_id = row.session_id;
            match state.sessions.get(&session_id) {
                Some(session) if session.status.is_open() => {}
                _ => return Ok(ParticipantDelete::SessionClosed),
            }

            state.participants.remove(&id);
            if let Some(session) = state.sessions.get_mut(&session_id) {
                session.current_players = session.current_players.saturating_sub(1);
            }
            Ok(ParticipantDelete::Deleted)
        })
    }

    fn update_participant(
        &self,
        id: Uuid,
        patch: ParticipantPatch,
    ) -> BoxFuture<'static, StorageResult<ParticipantUpdate>> {
        let store = self.clone();
        Box::pin(async move {
            let mut state = store.state.write().await;
            let Some(session_id) = state.participants.get(&id).map(|row| row.session_id) else {
                return Ok(ParticipantUpdate::NotFound);
            };
            // Picks are frozen once the session closed; is_winner flags are
            // written by settlement after the close and stay allowed.
            if patch.chosen_number.is_some() {
                match state.sessions.get(&session_id) {
                    Some(session) if session.status.is_open() => {}
                    _ => return Ok(ParticipantUpdate::SessionClosed),
                }
            }

            let Some(row) = state.participants.get_mut(&id) else {
                return Ok(ParticipantUpdate::NotFound);
            };
            apply_participant_patch(row, &patch);
            Ok(ParticipantUpdate::Updated(row.clone()))
        })
    }

    fn update_user_counters(
        &self,
        user_id: Uuid,
        delta: CounterDelta,
    ) -> BoxFuture<'static, StorageResult<UserEntity>> {
        let store = self.clone();
        Box::pin(async move {
            let mut state = store.state.write().await;
            let user = state.users.entry(user_id).or_insert_with(|| UserEntity {
                id: user_id,
                total_wins: 0,
                total_losses: 0,
            });
            user.total_wins += delta.wins;
            user.total_losses += delta.losses;
            Ok(user.clone())
        })
    }

    fn list_top_users(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<UserEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let state = store.state.read().await;
            let mut users: Vec<UserEntity> = state.users.values().cloned().collect();
            users.sort_by(|a, b| {
                b.total_wins
                    .cmp(&a.total_wins)
                    .then(a.total_losses.cmp(&b.total_losses))
            });
            users.truncate(limit);
            Ok(users)
        })
    }

    fn list_sessions_between(
        &self,
        from: SystemTime,
        to: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let state = store.state.read().await;
            let mut rows: Vec<SessionEntity> = state
                .sessions
                .values()
                .filter(|session| session.created_at >= from && session.created_at < to)
                .cloned()
                .collect();
            rows.sort_by_key(|session| session.created_at);
            Ok(rows)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn session(max_players: u32) -> SessionEntity {
        SessionEntity {
            id: Uuid::new_v4(),
            status: SessionStatus::Waiting,
            max_players,
            current_players: 0,
            session_duration_secs: 100,
            created_at: SystemTime::now(),
            ended_at: None,
            winning_number: None,
        }
    }

    fn participant(session_id: Uuid, user_id: Uuid) -> ParticipantEntity {
        ParticipantEntity {
            id: Uuid::new_v4(),
            session_id,
            user_id,
            chosen_number: None,
            is_winner: false,
            is_starter: false,
            joined_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn second_open_session_is_refused() {
        let store = MemorySessionStore::new();
        let first = session(10);
        assert!(matches!(
            store.insert_session(first.clone()).await.unwrap(),
            SessionInsert::Inserted(_)
        ));
        assert!(matches!(
            store.insert_session(session(10)).await.unwrap(),
            SessionInsert::OpenSessionExists
        ));

        // Once the first session is finished a new one may be created.
        store
            .conditional_update_session(
                first.id,
                SessionStatus::OPEN.to_vec(),
                SessionPatch {
                    status: Some(SessionStatus::Finished),
                    winning_number: Some(4),
                    ended_at: Some(SystemTime::now()),
                },
            )
            .await
            .unwrap()
            .expect("conditional update should apply");
        assert!(matches!(
            store.insert_session(session(10)).await.unwrap(),
            SessionInsert::Inserted(_)
        ));
    }

    #[tokio::test]
    async fn conditional_update_fails_once_finished() {
        let store = MemorySessionStore::new();
        let row = session(5);
        store.insert_session(row.clone()).await.unwrap();

        let patch = SessionPatch {
            status: Some(SessionStatus::Finished),
            winning_number: Some(7),
            ended_at: Some(SystemTime::now()),
        };
        let updated = store
            .conditional_update_session(row.id, SessionStatus::OPEN.to_vec(), patch.clone())
            .await
            .unwrap();
        assert_eq!(updated.unwrap().winning_number, Some(7));

        // A losing concurrent settler sees the expectation fail.
        let second = store
            .conditional_update_session(row.id, SessionStatus::OPEN.to_vec(), patch)
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn participant_insert_enforces_uniqueness_and_capacity() {
        let store = MemorySessionStore::new();
        let row = session(3);
        store.insert_session(row.clone()).await.unwrap();

        let user = Uuid::new_v4();
        assert!(matches!(
            store.insert_participant(participant(row.id, user)).await.unwrap(),
            ParticipantInsert::Inserted(_)
        ));
        assert!(matches!(
            store.insert_participant(participant(row.id, user)).await.unwrap(),
            ParticipantInsert::DuplicateUser
        ));

        // max_players = 3 admits two players before the gate closes.
        assert!(matches!(
            store
                .insert_participant(participant(row.id, Uuid::new_v4()))
                .await
                .unwrap(),
            ParticipantInsert::Inserted(_)
        ));
        assert!(matches!(
            store
                .insert_participant(participant(row.id, Uuid::new_v4()))
                .await
                .unwrap(),
            ParticipantInsert::CapacityExhausted
        ));

        let stored = store.get_session(row.id).await.unwrap().unwrap();
        assert_eq!(stored.current_players, 2);
    }

    #[tokio::test]
    async fn delete_decrements_occupancy() {
        let store = MemorySessionStore::new();
        let row = session(5);
        store.insert_session(row.clone()).await.unwrap();

        let member = participant(row.id, Uuid::new_v4());
        store.insert_participant(member.clone()).await.unwrap();
        assert!(matches!(
            store.delete_participant(member.id).await.unwrap(),
            ParticipantDelete::Deleted
        ));
        assert!(matches!(
            store.delete_participant(member.id).await.unwrap(),
            ParticipantDelete::NotFound
        ));

        let stored = store.get_session(row.id).await.unwrap().unwrap();
        assert_eq!(stored.current_players, 0);
    }

    #[tokio::test]
    async fn settled_session_freezes_membership_and_picks() {
        let store = MemorySessionStore::new();
        let row = session(5);
        store.insert_session(row.clone()).await.unwrap();

        let member = participant(row.id, Uuid::new_v4());
        store.insert_participant(member.clone()).await.unwrap();
        store
            .update_participant(
                member.id,
                ParticipantPatch {
                    chosen_number: Some(3),
                    is_winner: None,
                },
            )
            .await
            .unwrap();

        store
            .conditional_update_session(
                row.id,
                SessionStatus::OPEN.to_vec(),
                SessionPatch {
                    status: Some(SessionStatus::Finished),
                    winning_number: Some(3),
                    ended_at: Some(SystemTime::now()),
                },
            )
            .await
            .unwrap()
            .expect("conditional update should apply");

        // Pick rewrites and leaves bounce off the settled session.
        assert!(matches!(
            store
                .update_participant(
                    member.id,
                    ParticipantPatch {
                        chosen_number: Some(9),
                        is_winner: None,
                    },
                )
                .await
                .unwrap(),
            ParticipantUpdate::SessionClosed
        ));
        assert!(matches!(
            store.delete_participant(member.id).await.unwrap(),
            ParticipantDelete::SessionClosed
        ));

        // The winner flag is still writable; that is how scoring lands.
        let flagged = store
            .update_participant(
                member.id,
                ParticipantPatch {
                    chosen_number: None,
                    is_winner: Some(true),
                },
            )
            .await
            .unwrap();
        let ParticipantUpdate::Updated(flagged) = flagged else {
            panic!("is_winner patch should apply after settlement");
        };
        assert!(flagged.is_winner);
        assert_eq!(flagged.chosen_number, Some(3));

        let stored = store.get_session(row.id).await.unwrap().unwrap();
        assert_eq!(stored.current_players, 1);
    }

    #[tokio::test]
    async fn history_window_is_half_open() {
        let store = MemorySessionStore::new();
        let mut row = session(5);
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        row.created_at = base;
        store.insert_session(row.clone()).await.unwrap();

        let hits = store
            .list_sessions_between(base, base + Duration::from_secs(86_400))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let misses = store
            .list_sessions_between(base + Duration::from_secs(1), base + Duration::from_secs(2))
            .await
            .unwrap();
        assert!(misses.is_empty());
    }
}
