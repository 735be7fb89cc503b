//! Clock-based expiry evaluation.
//!
//! A session's `status` field is not authoritative on its own: the transition
//! to finished happens lazily, on the next read, so every consumer must
//! re-validate an open status against the clock before trusting it.

use std::time::SystemTime;

use crate::dao::models::SessionEntity;

/// Whether the session's play window has elapsed at `now`.
///
/// The boundary is inclusive: a session with `created_at = T` and duration
/// `D` is expired for every `now >= T + D`.
pub fn has_expired(session: &SessionEntity, now: SystemTime) -> bool {
    now >= session.ends_at()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::SessionStatus;
    use std::time::Duration;
    use uuid::Uuid;

    fn session_created_at(created_at: SystemTime, duration_secs: u64) -> SessionEntity {
        SessionEntity {
            id: Uuid::new_v4(),
            status: SessionStatus::Waiting,
            max_players: 10,
            current_players: 0,
            session_duration_secs: duration_secs,
            created_at,
            ended_at: None,
            winning_number: None,
        }
    }

    #[test]
    fn open_strictly_before_the_deadline() {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let session = session_created_at(start, 100);

        assert!(!has_expired(&session, start));
        assert!(!has_expired(
            &session,
            start + Duration::from_secs(99) + Duration::from_millis(999)
        ));
    }

    #[test]
    fn deadline_itself_counts_as_expired() {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let session = session_created_at(start, 100);

        assert!(has_expired(&session, start + Duration::from_secs(100)));
        assert!(has_expired(&session, start + Duration::from_secs(101)));
    }
}
