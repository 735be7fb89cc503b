use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Lucky Nine Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::game::active_game,
        crate::routes::game::new_game,
        crate::routes::game::join_game,
        crate::routes::game::leave_game,
        crate::routes::game::set_number,
        crate::routes::game::end_game,
        crate::routes::game::top_players,
        crate::routes::game::game_history,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::game::ManageGameRequest,
            crate::dto::game::SetNumberRequest,
            crate::dto::game::GameSummary,
            crate::dto::game::ParticipantSummary,
            crate::dto::game::ActiveGameResponse,
            crate::dto::game::ParticipantOutcomeSummary,
            crate::dto::game::EndGameResponse,
            crate::dto::leaderboard::TopPlayerEntry,
            crate::dto::leaderboard::TopPlayersResponse,
            crate::dto::leaderboard::GameHistoryResponse,
            crate::dao::models::SessionStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "games", description = "Game session lifecycle operations"),
        (name = "leaderboard", description = "Rankings and session history"),
    )
)]
pub struct ApiDoc;
