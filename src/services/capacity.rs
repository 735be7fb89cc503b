//! Admission control for session membership.

use crate::{
    dao::models::{ParticipantEntity, SessionEntity},
    error::ConflictReason,
};

/// Outcome of evaluating whether a user may join a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinDecision {
    /// The user may join; the caller must insert the participant and bump
    /// occupancy as one atomic unit.
    Allow,
    /// The join is rejected with a stable reason.
    Reject(ConflictReason),
}

/// Evaluate the join rules in order: membership uniqueness first, then the
/// capacity bound.
///
/// The bound is `current_players + 1 >= max_players`, i.e. the gate closes
/// one slot before nominal capacity; a session configured for N players
/// admits N-1. Intent upstream is ambiguous, so the behavior is kept as
/// deployed rather than corrected.
pub fn evaluate(session: &SessionEntity, existing: Option<&ParticipantEntity>) -> JoinDecision {
    if existing.is_some() {
        return JoinDecision::Reject(ConflictReason::AlreadyJoined);
    }

    if session.current_players + 1 >= session.max_players {
        return JoinDecision::Reject(ConflictReason::SessionFull);
    }

    JoinDecision::Allow
}

/// Evaluate the leave rule: a participant row must exist.
pub fn evaluate_leave(
    existing: Option<&ParticipantEntity>,
) -> Result<&ParticipantEntity, ConflictReason> {
    existing.ok_or(ConflictReason::NotJoined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::SessionStatus;
    use std::time::SystemTime;
    use uuid::Uuid;

    fn session(max_players: u32, current_players: u32) -> SessionEntity {
        SessionEntity {
            id: Uuid::new_v4(),
            status: SessionStatus::Active,
            max_players,
            current_players,
            session_duration_secs: 100,
            created_at: SystemTime::now(),
            ended_at: None,
            winning_number: None,
        }
    }

    fn member(session_id: Uuid) -> ParticipantEntity {
        ParticipantEntity {
            id: Uuid::new_v4(),
            session_id,
            user_id: Uuid::new_v4(),
            chosen_number: None,
            is_winner: false,
            is_starter: false,
            joined_at: SystemTime::now(),
        }
    }

    #[test]
    fn existing_membership_wins_over_capacity() {
        // Even a full session reports AlreadyJoined first.
        let row = session(2, 1);
        let existing = member(row.id);
        assert_eq!(
            evaluate(&row, Some(&existing)),
            JoinDecision::Reject(ConflictReason::AlreadyJoined)
        );
    }

    #[test]
    fn gate_closes_one_slot_before_nominal_capacity() {
        // max_players = 4: occupancy 0, 1 and 2 are admissible, 3 is not.
        assert_eq!(evaluate(&session(4, 0), None), JoinDecision::Allow);
        assert_eq!(evaluate(&session(4, 2), None), JoinDecision::Allow);
        assert_eq!(
            evaluate(&session(4, 3), None),
            JoinDecision::Reject(ConflictReason::SessionFull)
        );
    }

    #[test]
    fn two_player_session_admits_a_single_player() {
        assert_eq!(evaluate(&session(2, 0), None), JoinDecision::Allow);
        assert_eq!(
            evaluate(&session(2, 1), None),
            JoinDecision::Reject(ConflictReason::SessionFull)
        );
    }

    #[test]
    fn leave_requires_membership() {
        let row = session(5, 2);
        let existing = member(row.id);
        assert_eq!(evaluate_leave(Some(&existing)).unwrap().id, existing.id);
        assert_eq!(
            evaluate_leave(None).unwrap_err(),
            ConflictReason::NotJoined
        );
    }
}
