//! Session lifecycle controller.
//!
//! Single public entry surface of the game core. Every operation that reads
//! a session first re-validates its open status against the clock and lazily
//! settles an expired one before any further logic runs; there is no
//! background timer driving expiry.

use std::{
    sync::Arc,
    time::SystemTime,
};

use uuid::Uuid;

use crate::{
    dao::{
        models::{ParticipantEntity, ParticipantPatch, SessionEntity, SessionStatus},
        session_store::{
            ParticipantDelete, ParticipantInsert, ParticipantUpdate, SessionInsert, SessionStore,
        },
    },
    dto::game::{ActiveGameResponse, EndGameResponse, GameSummary, ParticipantSummary},
    error::{ConflictReason, ServiceError, StateReason},
    services::{
        capacity::{self, JoinDecision},
        expiry, settlement,
    },
    state::SharedState,
};

/// Resolve the single open session, settling it first if its window elapsed.
///
/// Returns `None` both when no session is open and when the open one just
/// expired (it is settled before this returns).
async fn resolve_open_session(
    store: &Arc<dyn SessionStore>,
) -> Result<Option<SessionEntity>, ServiceError> {
    let Some(session) = store.get_open_session().await? else {
        return Ok(None);
    };

    if expiry::has_expired(&session, SystemTime::now()) {
        settlement::settle(store, &session).await?;
        return Ok(None);
    }

    Ok(Some(session))
}

/// Load a session by id and require it to still be open after the expiry
/// check; an expired one is settled on the way out.
async fn load_open_session(
    store: &Arc<dyn SessionStore>,
    game_id: Uuid,
) -> Result<SessionEntity, ServiceError> {
    let Some(session) = store.get_session(game_id).await? else {
        return Err(ServiceError::NotFound(format!(
            "game session `{game_id}` not found"
        )));
    };

    if !session.status.is_open() {
        return Err(ServiceError::State(StateReason::SessionEnded));
    }

    if expiry::has_expired(&session, SystemTime::now()) {
        settlement::settle(store, &session).await?;
        return Err(ServiceError::State(StateReason::SessionEnded));
    }

    Ok(session)
}

/// Fetch the open session together with the calling user's membership.
pub async fn active_game(
    state: &SharedState,
    user_id: Uuid,
) -> Result<ActiveGameResponse, ServiceError> {
    let store = state.require_session_store().await?;

    let Some(session) = resolve_open_session(&store).await? else {
        return Ok(ActiveGameResponse::none_open());
    };

    let participant = store.get_participant(user_id, session.id).await?;
    let player_count = session.current_players;

    Ok(ActiveGameResponse {
        game: Some(session.into()),
        participant: participant.map(Into::into),
        player_count: Some(player_count),
    })
}

/// Create a fresh session with the calling user as starter.
///
/// The open-session check and the insert are not two trusted steps: the
/// store's unique-open-session constraint is what serializes concurrent
/// creators, and losing that race reports the same conflict as the check.
pub async fn new_game(state: &SharedState, user_id: Uuid) -> Result<GameSummary, ServiceError> {
    let store = state.require_session_store().await?;

    if resolve_open_session(&store).await?.is_some() {
        return Err(ServiceError::Conflict(ConflictReason::ActiveSessionExists));
    }

    let session = SessionEntity {
        id: Uuid::new_v4(),
        status: SessionStatus::Waiting,
        max_players: state.config().max_players(),
        current_players: 0,
        session_duration_secs: state.config().session_duration_secs(),
        created_at: SystemTime::now(),
        ended_at: None,
        winning_number: None,
    };

    let session = match store.insert_session(session).await? {
        SessionInsert::Inserted(session) => session,
        SessionInsert::OpenSessionExists => {
            return Err(ServiceError::Conflict(ConflictReason::ActiveSessionExists));
        }
    };

    let starter = ParticipantEntity {
        id: Uuid::new_v4(),
        session_id: session.id,
        user_id,
        chosen_number: None,
        is_winner: false,
        is_starter: true,
        joined_at: SystemTime::now(),
    };

    match store.insert_participant(starter).await? {
        ParticipantInsert::Inserted(_) => {}
        ParticipantInsert::DuplicateUser => {
            return Err(ServiceError::Conflict(ConflictReason::AlreadyJoined));
        }
        ParticipantInsert::CapacityExhausted => {
            return Err(ServiceError::Conflict(ConflictReason::SessionFull));
        }
        ParticipantInsert::SessionClosed => {
            return Err(ServiceError::State(StateReason::SessionEnded));
        }
    }

    let session = store
        .get_session(session.id)
        .await?
        .ok_or_else(|| ServiceError::Unexpected("created session vanished".into()))?;

    Ok(session.into())
}

/// Join an open session, subject to the capacity gate.
pub async fn join_game(
    state: &SharedState,
    user_id: Uuid,
    game_id: Uuid,
) -> Result<GameSummary, ServiceError> {
    let store = state.require_session_store().await?;
    let session = load_open_session(&store, game_id).await?;

    let existing = store.get_participant(user_id, session.id).await?;
    if let JoinDecision::Reject(reason) = capacity::evaluate(&session, existing.as_ref()) {
        return Err(ServiceError::Conflict(reason));
    }

    let participant = ParticipantEntity {
        id: Uuid::new_v4(),
        session_id: session.id,
        user_id,
        chosen_number: None,
        is_winner: false,
        is_starter: false,
        joined_at: SystemTime::now(),
    };

    // The store re-checks the gate under its own atomic unit; the decision
    // above can go stale between the read and the insert.
    match store.insert_participant(participant).await? {
        ParticipantInsert::Inserted(_) => {}
        ParticipantInsert::DuplicateUser => {
            return Err(ServiceError::Conflict(ConflictReason::AlreadyJoined));
        }
        ParticipantInsert::CapacityExhausted => {
            return Err(ServiceError::Conflict(ConflictReason::SessionFull));
        }
        ParticipantInsert::SessionClosed => {
            return Err(ServiceError::State(StateReason::SessionEnded));
        }
    }

    let session = store
        .get_session(session.id)
        .await?
        .ok_or_else(|| ServiceError::Unexpected("joined session vanished".into()))?;

    Ok(session.into())
}

/// Leave an open session, freeing the occupancy slot.
pub async fn leave_game(
    state: &SharedState,
    user_id: Uuid,
    game_id: Uuid,
) -> Result<GameSummary, ServiceError> {
    let store = state.require_session_store().await?;
    let session = load_open_session(&store, game_id).await?;

    let existing = store.get_participant(user_id, session.id).await?;
    let participant =
        capacity::evaluate_leave(existing.as_ref()).map_err(ServiceError::Conflict)?;

    match store.delete_participant(participant.id).await? {
        ParticipantDelete::Deleted => {}
        // Row disappeared between the read and the delete.
        ParticipantDelete::NotFound => {
            return Err(ServiceError::Conflict(ConflictReason::NotJoined));
        }
        // Settlement got there first; the membership is frozen.
        ParticipantDelete::SessionClosed => {
            return Err(ServiceError::State(StateReason::SessionEnded));
        }
    }

    let session = store
        .get_session(session.id)
        .await?
        .ok_or_else(|| ServiceError::Unexpected("left session vanished".into()))?;

    Ok(session.into())
}

/// Overwrite the calling user's pick for an open session.
pub async fn set_number(
    state: &SharedState,
    user_id: Uuid,
    game_id: Uuid,
    chosen_number: u8,
) -> Result<ParticipantSummary, ServiceError> {
    if !(settlement::WINNING_NUMBER_MIN..=settlement::WINNING_NUMBER_MAX).contains(&chosen_number)
    {
        return Err(ServiceError::InvalidInput(format!(
            "chosen number must be between {} and {} (got {chosen_number})",
            settlement::WINNING_NUMBER_MIN,
            settlement::WINNING_NUMBER_MAX,
        )));
    }

    let store = state.require_session_store().await?;
    let session = load_open_session(&store, game_id).await?;

    let Some(participant) = store.get_participant(user_id, session.id).await? else {
        return Err(ServiceError::Conflict(ConflictReason::NotAParticipant));
    };

    let updated = store
        .update_participant(
            participant.id,
            ParticipantPatch {
                chosen_number: Some(chosen_number),
                is_winner: None,
            },
        )
        .await?;

    match updated {
        ParticipantUpdate::Updated(row) => Ok(row.into()),
        // Concurrent leave between the read and the write.
        ParticipantUpdate::NotFound => {
            Err(ServiceError::Conflict(ConflictReason::NotAParticipant))
        }
        // Settlement got there first; the pick is frozen.
        ParticipantUpdate::SessionClosed => Err(ServiceError::State(StateReason::SessionEnded)),
    }
}

/// Settle a session whose window elapsed, or report its settled state.
pub async fn end_game(state: &SharedState, game_id: Uuid) -> Result<EndGameResponse, ServiceError> {
    let store = state.require_session_store().await?;

    let Some(session) = store.get_session(game_id).await? else {
        return Err(ServiceError::NotFound(format!(
            "game session `{game_id}` not found"
        )));
    };

    if session.status == SessionStatus::Finished {
        return settled_state(&store, session).await;
    }

    if !expiry::has_expired(&session, SystemTime::now()) {
        return Err(ServiceError::State(StateReason::NotYetEnded));
    }

    let report = settlement::settle(&store, &session).await?;
    if report.settled_here {
        return Ok(report.into());
    }

    // Lost the settlement race; report the state the winner produced.
    settled_state(&store, report.session).await
}

/// Build the end-game response for a session that is already finished,
/// deriving outcomes from the stored participant flags.
async fn settled_state(
    store: &Arc<dyn SessionStore>,
    session: SessionEntity,
) -> Result<EndGameResponse, ServiceError> {
    let participants = store.list_participants(session.id).await?;
    let outcomes = participants
        .into_iter()
        .map(|row| {
            settlement::ParticipantOutcome {
                participant_id: row.id,
                user_id: row.user_id,
                chosen_number: row.chosen_number,
                is_winner: row.is_winner,
                error: None,
            }
            .into()
        })
        .collect();

    Ok(EndGameResponse {
        game: session.into(),
        outcomes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::{models::CounterDelta, session_store::memory::MemorySessionStore},
        state::AppState,
    };
    use std::time::Duration;

    async fn test_state(duration_secs: u64, max_players: u32) -> SharedState {
        let state = AppState::new(AppConfig::for_tests(duration_secs, max_players));
        state
            .install_session_store(Arc::new(MemorySessionStore::new()))
            .await;
        state
    }

    async fn store(state: &SharedState) -> Arc<dyn SessionStore> {
        state.require_session_store().await.unwrap()
    }

    /// Plant an already-expired open session with the given members.
    async fn plant_expired_session(
        state: &SharedState,
        users: &[Uuid],
        picks: &[Option<u8>],
    ) -> Uuid {
        let store = store(state).await;
        let session = SessionEntity {
            id: Uuid::new_v4(),
            status: SessionStatus::Active,
            max_players: 10,
            current_players: 0,
            session_duration_secs: 100,
            created_at: SystemTime::now() - Duration::from_secs(101),
            ended_at: None,
            winning_number: None,
        };
        store.insert_session(session.clone()).await.unwrap();
        for (user_id, pick) in users.iter().zip(picks) {
            store
                .insert_participant(ParticipantEntity {
                    id: Uuid::new_v4(),
                    session_id: session.id,
                    user_id: *user_id,
                    chosen_number: *pick,
                    is_winner: false,
                    is_starter: false,
                    joined_at: SystemTime::now(),
                })
                .await
                .unwrap();
        }
        session.id
    }

    #[tokio::test]
    async fn new_game_seats_the_starter() {
        let state = test_state(100, 10).await;
        let user = Uuid::new_v4();

        let summary = new_game(&state, user).await.unwrap();
        assert_eq!(summary.status, SessionStatus::Waiting);
        assert_eq!(summary.current_players, 1);
        assert!(summary.winning_number.is_none());

        let active = active_game(&state, user).await.unwrap();
        let participant = active.participant.unwrap();
        assert!(participant.is_starter);
        assert_eq!(active.player_count, Some(1));
    }

    #[tokio::test]
    async fn second_create_conflicts_while_a_session_is_open() {
        let state = test_state(100, 10).await;
        new_game(&state, Uuid::new_v4()).await.unwrap();

        let err = new_game(&state, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Conflict(ConflictReason::ActiveSessionExists)
        ));
    }

    #[tokio::test]
    async fn concurrent_creates_admit_exactly_one_session() {
        let state = test_state(100, 10).await;

        let attempts = (0..8).map(|_| {
            let state = state.clone();
            tokio::spawn(async move { new_game(&state, Uuid::new_v4()).await })
        });
        let results = futures::future::join_all(attempts).await;

        let successes = results
            .into_iter()
            .map(|joined| joined.unwrap())
            .filter(Result::is_ok)
            .count();
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn join_then_leave_round_trips_occupancy() {
        let state = test_state(100, 10).await;
        let starter = Uuid::new_v4();
        let joiner = Uuid::new_v4();

        let created = new_game(&state, starter).await.unwrap();

        let joined = join_game(&state, joiner, created.id).await.unwrap();
        assert_eq!(joined.current_players, 2);

        let left = leave_game(&state, joiner, created.id).await.unwrap();
        assert_eq!(left.current_players, 1);
        assert!(
            store(&state)
                .await
                .get_participant(joiner, created.id)
                .await
                .unwrap()
                .is_none()
        );

        // A fresh join after leaving succeeds as a brand-new participant.
        let rejoined = join_game(&state, joiner, created.id).await.unwrap();
        assert_eq!(rejoined.current_players, 2);
    }

    #[tokio::test]
    async fn join_rejections_carry_stable_reasons() {
        // max_players = 3 admits the starter plus one joiner.
        let state = test_state(100, 3).await;
        let starter = Uuid::new_v4();
        let second = Uuid::new_v4();
        let third = Uuid::new_v4();

        let created = new_game(&state, starter).await.unwrap();
        join_game(&state, second, created.id).await.unwrap();

        let err = join_game(&state, second, created.id).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Conflict(ConflictReason::AlreadyJoined)
        ));

        let err = join_game(&state, third, created.id).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Conflict(ConflictReason::SessionFull)
        ));

        let err = leave_game(&state, third, created.id).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Conflict(ConflictReason::NotJoined)
        ));
    }

    #[tokio::test]
    async fn set_number_overwrites_while_open() {
        let state = test_state(100, 10).await;
        let user = Uuid::new_v4();
        let created = new_game(&state, user).await.unwrap();

        let first = set_number(&state, user, created.id, 3).await.unwrap();
        assert_eq!(first.chosen_number, Some(3));

        let second = set_number(&state, user, created.id, 8).await.unwrap();
        assert_eq!(second.chosen_number, Some(8));

        let err = set_number(&state, user, created.id, 0).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        let stranger = Uuid::new_v4();
        let err = set_number(&state, stranger, created.id, 5).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Conflict(ConflictReason::NotAParticipant)
        ));
    }

    #[tokio::test]
    async fn active_game_settles_an_expired_session_lazily() {
        let state = test_state(100, 10).await;
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let session_id = plant_expired_session(&state, &[a, b], &[Some(4), Some(7)]).await;

        let response = active_game(&state, a).await.unwrap();
        assert!(response.game.is_none());

        let store = store(&state).await;
        let settled = store.get_session(session_id).await.unwrap().unwrap();
        assert_eq!(settled.status, SessionStatus::Finished);
        let drawn = settled.winning_number.unwrap();
        assert!((1..=9).contains(&drawn));

        // Five more reads change nothing: same draw, counters moved once.
        for _ in 0..5 {
            let again = active_game(&state, b).await.unwrap();
            assert!(again.game.is_none());
        }
        let after = store.get_session(session_id).await.unwrap().unwrap();
        assert_eq!(after.winning_number, Some(drawn));
        for user_id in [a, b] {
            let user = store
                .update_user_counters(user_id, CounterDelta::default())
                .await
                .unwrap();
            assert_eq!(user.total_wins + user.total_losses, 1);
        }
    }

    #[tokio::test]
    async fn mutations_are_refused_once_the_window_elapsed() {
        let state = test_state(100, 10).await;
        let a = Uuid::new_v4();
        let session_id = plant_expired_session(&state, &[a], &[Some(2)]).await;

        let err = join_game(&state, Uuid::new_v4(), session_id).await.unwrap_err();
        assert!(matches!(err, ServiceError::State(StateReason::SessionEnded)));

        let err = set_number(&state, a, session_id, 6).await.unwrap_err();
        assert!(matches!(err, ServiceError::State(StateReason::SessionEnded)));

        let err = leave_game(&state, a, session_id).await.unwrap_err();
        assert!(matches!(err, ServiceError::State(StateReason::SessionEnded)));
    }

    #[tokio::test]
    async fn end_game_respects_the_window_and_is_idempotent() {
        let state = test_state(100, 10).await;
        let user = Uuid::new_v4();
        let created = new_game(&state, user).await.unwrap();

        let err = end_game(&state, created.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::State(StateReason::NotYetEnded)));

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let expired = {
            // Finish the fresh session so a new expired one can be planted.
            let store = store(&state).await;
            store
                .conditional_update_session(
                    created.id,
                    SessionStatus::OPEN.to_vec(),
                    crate::dao::models::SessionPatch {
                        status: Some(SessionStatus::Finished),
                        winning_number: Some(1),
                        ended_at: Some(SystemTime::now()),
                    },
                )
                .await
                .unwrap();
            plant_expired_session(&state, &[a, b], &[Some(5), None]).await
        };

        let first = end_game(&state, expired).await.unwrap();
        let drawn = first.game.winning_number.unwrap();
        assert_eq!(first.outcomes.len(), 2);

        let second = end_game(&state, expired).await.unwrap();
        assert_eq!(second.game.winning_number, Some(drawn));
        assert_eq!(second.outcomes.len(), 2);
        for (lhs, rhs) in first.outcomes.iter().zip(&second.outcomes) {
            assert_eq!(lhs.is_winner, rhs.is_winner);
        }
    }

    #[tokio::test]
    async fn full_round_scenario() {
        // duration = 100s, capacity admits two players (starter + one join).
        let state = AppState::new(AppConfig::for_tests(100, 3));
        let memory = MemorySessionStore::new();
        state.install_session_store(Arc::new(memory.clone())).await;

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        let created = new_game(&state, a).await.unwrap();
        assert_eq!(created.current_players, 1);

        let joined = join_game(&state, b, created.id).await.unwrap();
        assert_eq!(joined.current_players, 2);

        let err = join_game(&state, c, created.id).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Conflict(ConflictReason::SessionFull)
        ));

        set_number(&state, a, created.id, 4).await.unwrap();
        set_number(&state, b, created.id, 9).await.unwrap();

        let err = end_game(&state, created.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::State(StateReason::NotYetEnded)));

        // Rewind the clock instead of sleeping out the window.
        memory
            .backdate_session(created.id, SystemTime::now() - Duration::from_secs(101))
            .await;

        let ended = end_game(&state, created.id).await.unwrap();
        assert_eq!(ended.game.status, SessionStatus::Finished);
        let drawn = ended.game.winning_number.unwrap();
        assert!((1..=9).contains(&drawn));
        assert_eq!(ended.outcomes.len(), 2);
        let winners = ended.outcomes.iter().filter(|o| o.is_winner).count();
        assert!(winners <= 1);

        // A second end reports the same draw, and a new round may start.
        let again = end_game(&state, created.id).await.unwrap();
        assert_eq!(again.game.winning_number, Some(drawn));
        new_game(&state, c).await.unwrap();
    }
}
