use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Lifecycle status of a game session.
///
/// `Waiting` and `Active` are both "open": the session accepts joins, leaves
/// and number picks. `Finished` is terminal and is only ever set by the
/// settlement pass together with the winning number.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Session exists and is accepting players.
    Waiting,
    /// Session is underway (still open for join/leave/pick).
    Active,
    /// Session has been settled; occupancy and picks are frozen.
    Finished,
}

impl SessionStatus {
    /// Whether the session still accepts lifecycle mutations.
    pub fn is_open(self) -> bool {
        matches!(self, SessionStatus::Waiting | SessionStatus::Active)
    }

    /// The statuses considered open, in the order they are reached.
    pub const OPEN: [SessionStatus; 2] = [SessionStatus::Waiting, SessionStatus::Active];
}

/// One time-boxed round of the number-guessing game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEntity {
    /// Primary key of the session.
    pub id: Uuid,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Maximum number of players configured at creation.
    pub max_players: u32,
    /// Number of participant rows currently attached to the session.
    pub current_players: u32,
    /// Length of the play window, in seconds, fixed at creation.
    pub session_duration_secs: u64,
    /// Creation timestamp; the window runs from here.
    pub created_at: SystemTime,
    /// Set when the session is settled.
    pub ended_at: Option<SystemTime>,
    /// Drawn number in [1,9]; unset until settlement.
    pub winning_number: Option<u8>,
}

impl SessionEntity {
    /// Instant at which the session's play window closes.
    pub fn ends_at(&self) -> SystemTime {
        self.created_at + Duration::from_secs(self.session_duration_secs)
    }
}

/// A user's membership record within one session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantEntity {
    /// Primary key of the participant row.
    pub id: Uuid,
    /// Session this row belongs to.
    pub session_id: Uuid,
    /// Owning user; unique per session.
    pub user_id: Uuid,
    /// The user's current pick, overwritable while the session is open.
    pub chosen_number: Option<u8>,
    /// Outcome flag, set exactly once by settlement.
    pub is_winner: bool,
    /// True only for the participant whose join created the session.
    pub is_starter: bool,
    /// When the user joined.
    pub joined_at: SystemTime,
}

/// Lifetime counters for a user. The identity itself is owned by the external
/// identity provider; only the counters are scored here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserEntity {
    /// Identifier supplied by the identity provider.
    pub id: Uuid,
    /// Sessions won, monotonically non-decreasing.
    pub total_wins: u64,
    /// Sessions lost, monotonically non-decreasing.
    pub total_losses: u64,
}

/// Partial update applied to a session through a conditional write.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    /// New status, if changing.
    pub status: Option<SessionStatus>,
    /// Winning number to record.
    pub winning_number: Option<u8>,
    /// Settlement timestamp to record.
    pub ended_at: Option<SystemTime>,
}

/// Partial update applied to a participant row.
#[derive(Debug, Clone, Default)]
pub struct ParticipantPatch {
    /// New pick for the participant.
    pub chosen_number: Option<u8>,
    /// Outcome flag written by settlement.
    pub is_winner: Option<bool>,
}

/// Increment applied to a user's lifetime counters; settlement uses exactly
/// one of the two fields per participant per session.
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterDelta {
    /// Wins to add.
    pub wins: u64,
    /// Losses to add.
    pub losses: u64,
}

impl CounterDelta {
    /// Delta for a session won.
    pub fn win() -> Self {
        Self { wins: 1, losses: 0 }
    }

    /// Delta for a session lost.
    pub fn loss() -> Self {
        Self { wins: 0, losses: 1 }
    }
}
