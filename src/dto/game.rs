use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::{ParticipantEntity, SessionEntity, SessionStatus},
    dto::{format_system_time, validation::validate_chosen_number},
    services::settlement::{ParticipantOutcome, SettlementReport},
};

/// Payload targeting a specific game session (join, leave, end).
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ManageGameRequest {
    /// Identifier of the targeted session.
    pub game_id: Uuid,
}

/// Payload submitting (or overwriting) a number pick.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SetNumberRequest {
    /// Identifier of the targeted session.
    pub game_id: Uuid,
    /// The pick; must fall in [1,9].
    pub chosen_number: u8,
}

impl Validate for SetNumberRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_chosen_number(&self.chosen_number) {
            errors.add("chosen_number", e);
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Public projection of a session row.
#[derive(Debug, Serialize, ToSchema)]
pub struct GameSummary {
    /// Session identifier.
    pub id: Uuid,
    /// Lifecycle status at read time (post expiry check).
    pub status: SessionStatus,
    /// Configured capacity.
    pub max_players: u32,
    /// Occupancy at read time.
    pub current_players: u32,
    /// Play window length in seconds.
    pub session_duration_secs: u64,
    /// RFC3339 creation timestamp.
    pub created_at: String,
    /// RFC3339 instant at which the play window closes.
    pub ends_at: String,
    /// RFC3339 settlement timestamp, once settled.
    pub ended_at: Option<String>,
    /// Drawn number, once settled.
    pub winning_number: Option<u8>,
}

impl From<SessionEntity> for GameSummary {
    fn from(session: SessionEntity) -> Self {
        let ends_at = format_system_time(session.ends_at());
        Self {
            id: session.id,
            status: session.status,
            max_players: session.max_players,
            current_players: session.current_players,
            session_duration_secs: session.session_duration_secs,
            created_at: format_system_time(session.created_at),
            ends_at,
            ended_at: session.ended_at.map(format_system_time),
            winning_number: session.winning_number,
        }
    }
}

/// Public projection of a participant row.
#[derive(Debug, Serialize, ToSchema)]
pub struct ParticipantSummary {
    /// Participant row identifier.
    pub id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Current pick, if any.
    pub chosen_number: Option<u8>,
    /// Outcome flag; meaningful once the session is finished.
    pub is_winner: bool,
    /// Whether this participant created the session.
    pub is_starter: bool,
    /// RFC3339 join timestamp.
    pub joined_at: String,
}

impl From<ParticipantEntity> for ParticipantSummary {
    fn from(participant: ParticipantEntity) -> Self {
        Self {
            id: participant.id,
            user_id: participant.user_id,
            chosen_number: participant.chosen_number,
            is_winner: participant.is_winner,
            is_starter: participant.is_starter,
            joined_at: format_system_time(participant.joined_at),
        }
    }
}

/// Response of the active-game lookup.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActiveGameResponse {
    /// The open session, or `None` when no session is open (including the
    /// case where an expired one was just settled by this very call).
    pub game: Option<GameSummary>,
    /// The calling user's membership in that session, if any.
    pub participant: Option<ParticipantSummary>,
    /// Number of participants in the open session.
    pub player_count: Option<u32>,
}

impl ActiveGameResponse {
    /// Response used when no session is currently open.
    pub fn none_open() -> Self {
        Self {
            game: None,
            participant: None,
            player_count: None,
        }
    }
}

/// Per-participant scoring result exposed after settlement.
#[derive(Debug, Serialize, ToSchema)]
pub struct ParticipantOutcomeSummary {
    /// Participant row that was scored.
    pub participant_id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// The pick held at settlement time.
    pub chosen_number: Option<u8>,
    /// Whether the pick matched the drawn number.
    pub is_winner: bool,
    /// Failure description when scoring this participant did not apply.
    pub error: Option<String>,
}

impl From<ParticipantOutcome> for ParticipantOutcomeSummary {
    fn from(outcome: ParticipantOutcome) -> Self {
        Self {
            participant_id: outcome.participant_id,
            user_id: outcome.user_id,
            chosen_number: outcome.chosen_number,
            is_winner: outcome.is_winner,
            error: outcome.error,
        }
    }
}

/// Response of the end-game operation.
#[derive(Debug, Serialize, ToSchema)]
pub struct EndGameResponse {
    /// The session after settlement.
    pub game: GameSummary,
    /// Per-participant scoring outcomes. When the session had already been
    /// settled by an earlier call these are rebuilt from the stored flags.
    pub outcomes: Vec<ParticipantOutcomeSummary>,
}

impl From<SettlementReport> for EndGameResponse {
    fn from(report: SettlementReport) -> Self {
        Self {
            game: report.session.into(),
            outcomes: report.outcomes.into_iter().map(Into::into).collect(),
        }
    }
}
