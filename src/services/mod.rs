/// Join admission rules.
pub mod capacity;
/// OpenAPI documentation generation.
pub mod documentation;
/// Play window expiry predicate.
pub mod expiry;
/// Core session lifecycle operations.
pub mod game_service;
/// Health check service.
pub mod health_service;
/// Rankings and session history read models.
pub mod leaderboard_service;
/// Winner draw and exactly-once scoring.
pub mod settlement;
