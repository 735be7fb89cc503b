use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use validator::Validate;

use crate::{
    dto::{
        game::{
            ActiveGameResponse, EndGameResponse, GameSummary, ManageGameRequest,
            ParticipantSummary, SetNumberRequest,
        },
        leaderboard::{GameHistoryResponse, TopPlayersResponse},
    },
    error::AppError,
    routes::identity::AuthenticatedUser,
    services::{game_service, leaderboard_service},
    state::SharedState,
};

/// Routes driving the game session lifecycle.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/games/active", get(active_game))
        .route("/games/new-game", post(new_game))
        .route("/games/join-game", post(join_game))
        .route("/games/leave-game", post(leave_game))
        .route("/games/set-number", post(set_number))
        .route("/games/end-game", post(end_game))
        .route("/games/top-players", get(top_players))
        .route("/games/history/{date}", get(game_history))
}

/// Return the open session, settling it first if its play window elapsed.
#[utoipa::path(
    get,
    path = "/games/active",
    tag = "games",
    responses(
        (status = 200, description = "Open session (all fields null when none is open)", body = ActiveGameResponse),
        (status = 401, description = "Missing or malformed x-user-id header"),
    )
)]
pub async fn active_game(
    State(state): State<SharedState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<Json<ActiveGameResponse>, AppError> {
    let response = game_service::active_game(&state, user_id).await?;
    Ok(Json(response))
}

/// Create a fresh session with the caller as starter.
#[utoipa::path(
    post,
    path = "/games/new-game",
    tag = "games",
    responses(
        (status = 200, description = "Session created", body = GameSummary),
        (status = 409, description = "An open session already exists"),
    )
)]
pub async fn new_game(
    State(state): State<SharedState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<Json<GameSummary>, AppError> {
    let summary = game_service::new_game(&state, user_id).await?;
    Ok(Json(summary))
}

/// Join an open session.
#[utoipa::path(
    post,
    path = "/games/join-game",
    tag = "games",
    request_body = ManageGameRequest,
    responses(
        (status = 200, description = "Joined", body = GameSummary),
        (status = 409, description = "Already joined, session full, or session ended"),
    )
)]
pub async fn join_game(
    State(state): State<SharedState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(payload): Json<ManageGameRequest>,
) -> Result<Json<GameSummary>, AppError> {
    payload.validate()?;
    let summary = game_service::join_game(&state, user_id, payload.game_id).await?;
    Ok(Json(summary))
}

/// Leave an open session.
#[utoipa::path(
    post,
    path = "/games/leave-game",
    tag = "games",
    request_body = ManageGameRequest,
    responses(
        (status = 200, description = "Left", body = GameSummary),
        (status = 409, description = "Not joined or session ended"),
    )
)]
pub async fn leave_game(
    State(state): State<SharedState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(payload): Json<ManageGameRequest>,
) -> Result<Json<GameSummary>, AppError> {
    payload.validate()?;
    let summary = game_service::leave_game(&state, user_id, payload.game_id).await?;
    Ok(Json(summary))
}

/// Submit or overwrite the caller's number pick.
#[utoipa::path(
    post,
    path = "/games/set-number",
    tag = "games",
    request_body = SetNumberRequest,
    responses(
        (status = 200, description = "Pick recorded", body = ParticipantSummary),
        (status = 400, description = "Pick outside [1,9]"),
        (status = 409, description = "Not a participant or session ended"),
    )
)]
pub async fn set_number(
    State(state): State<SharedState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(payload): Json<SetNumberRequest>,
) -> Result<Json<ParticipantSummary>, AppError> {
    payload.validate()?;
    let summary =
        game_service::set_number(&state, user_id, payload.game_id, payload.chosen_number).await?;
    Ok(Json(summary))
}

/// Settle a session whose play window elapsed.
#[utoipa::path(
    post,
    path = "/games/end-game",
    tag = "games",
    request_body = ManageGameRequest,
    responses(
        (status = 200, description = "Settled (or already settled)", body = EndGameResponse),
        (status = 409, description = "Play window has not elapsed yet"),
    )
)]
pub async fn end_game(
    State(state): State<SharedState>,
    Json(payload): Json<ManageGameRequest>,
) -> Result<Json<EndGameResponse>, AppError> {
    payload.validate()?;
    let response = game_service::end_game(&state, payload.game_id).await?;
    Ok(Json(response))
}

/// Rank users by lifetime wins.
#[utoipa::path(
    get,
    path = "/games/top-players",
    tag = "leaderboard",
    responses(
        (status = 200, description = "Top players, best first", body = TopPlayersResponse),
    )
)]
pub async fn top_players(
    State(state): State<SharedState>,
) -> Result<Json<TopPlayersResponse>, AppError> {
    let response = leaderboard_service::top_players(&state).await?;
    Ok(Json(response))
}

/// List the sessions created on one UTC calendar date.
#[utoipa::path(
    get,
    path = "/games/history/{date}",
    tag = "leaderboard",
    params(("date" = String, Path, description = "Calendar date, YYYY-MM-DD")),
    responses(
        (status = 200, description = "Sessions created that day", body = GameHistoryResponse),
        (status = 400, description = "Malformed date"),
    )
)]
pub async fn game_history(
    State(state): State<SharedState>,
    Path(date): Path<String>,
) -> Result<Json<GameHistoryResponse>, AppError> {
    let response = leaderboard_service::games_on_date(&state, &date).await?;
    Ok(Json(response))
}
