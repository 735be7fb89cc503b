//! Ranking and history read models.

use std::time::{Duration, SystemTime};

use time::{Date, format_description::BorrowedFormatItem, macros::format_description};

use crate::{
    dto::leaderboard::{GameHistoryResponse, TopPlayersResponse},
    error::ServiceError,
    state::SharedState,
};

/// Number of entries returned by the top-players ranking.
const TOP_PLAYERS_LIMIT: usize = 10;

const DATE_FORMAT: &[BorrowedFormatItem<'_>] = format_description!("[year]-[month]-[day]");

/// Rank users by lifetime wins, best first.
pub async fn top_players(state: &SharedState) -> Result<TopPlayersResponse, ServiceError> {
    let store = state.require_session_store().await?;
    let users = store.list_top_users(TOP_PLAYERS_LIMIT).await?;

    Ok(TopPlayersResponse {
        players: users.into_iter().map(Into::into).collect(),
    })
}

/// List the sessions created on one UTC calendar date (`YYYY-MM-DD`).
pub async fn games_on_date(
    state: &SharedState,
    raw_date: &str,
) -> Result<GameHistoryResponse, ServiceError> {
    let date = Date::parse(raw_date, DATE_FORMAT).map_err(|_| {
        ServiceError::InvalidInput(format!("`{raw_date}` is not a YYYY-MM-DD date"))
    })?;

    let from = SystemTime::from(date.midnight().assume_utc());
    let to = from + Duration::from_secs(86_400);

    let store = state.require_session_store().await?;
    let sessions = store.list_sessions_between(from, to).await?;

    Ok(GameHistoryResponse {
        date: raw_date.to_string(),
        games: sessions.into_iter().map(Into::into).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::{CounterDelta, SessionEntity, SessionStatus},
            session_store::memory::MemorySessionStore,
        },
        state::AppState,
    };
    use std::sync::Arc;
    use uuid::Uuid;

    async fn test_state() -> SharedState {
        let state = AppState::new(AppConfig::for_tests(100, 10));
        state
            .install_session_store(Arc::new(MemorySessionStore::new()))
            .await;
        state
    }

    #[tokio::test]
    async fn top_players_ranks_by_wins() {
        let state = test_state().await;
        let store = state.require_session_store().await.unwrap();

        let champion = Uuid::new_v4();
        let runner_up = Uuid::new_v4();
        for _ in 0..3 {
            store
                .update_user_counters(champion, CounterDelta::win())
                .await
                .unwrap();
        }
        store
            .update_user_counters(runner_up, CounterDelta::win())
            .await
            .unwrap();
        store
            .update_user_counters(runner_up, CounterDelta::loss())
            .await
            .unwrap();

        let ranking = top_players(&state).await.unwrap();
        assert_eq!(ranking.players.len(), 2);
        assert_eq!(ranking.players[0].user_id, champion);
        assert_eq!(ranking.players[0].total_wins, 3);
        assert_eq!(ranking.players[1].user_id, runner_up);
    }

    #[tokio::test]
    async fn history_rejects_malformed_dates() {
        let state = test_state().await;
        for raw in ["2026-13-01", "yesterday", "2026/08/27", ""] {
            let err = games_on_date(&state, raw).await.unwrap_err();
            assert!(matches!(err, ServiceError::InvalidInput(_)), "{raw}");
        }
    }

    #[tokio::test]
    async fn history_returns_sessions_of_that_day_only() {
        let state = test_state().await;
        let store = state.require_session_store().await.unwrap();

        let session = SessionEntity {
            id: Uuid::new_v4(),
            status: SessionStatus::Finished,
            max_players: 10,
            current_players: 0,
            session_duration_secs: 100,
            created_at: SystemTime::from(
                Date::parse("2026-08-27", DATE_FORMAT)
                    .unwrap()
                    .midnight()
                    .assume_utc(),
            ) + Duration::from_secs(3_600),
            ended_at: None,
            winning_number: Some(5),
        };
        store.insert_session(session.clone()).await.unwrap();

        let same_day = games_on_date(&state, "2026-08-27").await.unwrap();
        assert_eq!(same_day.games.len(), 1);
        assert_eq!(same_day.games[0].id, session.id);

        let day_after = games_on_date(&state, "2026-08-28").await.unwrap();
        assert!(day_after.games.is_empty());
    }
}
