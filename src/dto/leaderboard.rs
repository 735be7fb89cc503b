use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::UserEntity;
use crate::dto::game::GameSummary;

/// One entry of the top-players ranking.
#[derive(Debug, Serialize, ToSchema)]
pub struct TopPlayerEntry {
    /// User identifier.
    pub user_id: Uuid,
    /// Lifetime sessions won.
    pub total_wins: u64,
    /// Lifetime sessions lost.
    pub total_losses: u64,
}

impl From<UserEntity> for TopPlayerEntry {
    fn from(user: UserEntity) -> Self {
        Self {
            user_id: user.id,
            total_wins: user.total_wins,
            total_losses: user.total_losses,
        }
    }
}

/// Ranking of users by lifetime wins.
#[derive(Debug, Serialize, ToSchema)]
pub struct TopPlayersResponse {
    /// Entries ordered best first.
    pub players: Vec<TopPlayerEntry>,
}

/// Sessions created on one calendar date.
#[derive(Debug, Serialize, ToSchema)]
pub struct GameHistoryResponse {
    /// The queried date, `YYYY-MM-DD`.
    pub date: String,
    /// Sessions created that day, oldest first.
    pub games: Vec<GameSummary>,
}
