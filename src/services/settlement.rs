//! One-time session settlement: winner draw, status flip, and scoring.

use std::{sync::Arc, time::SystemTime};

use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{
            CounterDelta, ParticipantEntity, ParticipantPatch, SessionEntity, SessionPatch,
            SessionStatus,
        },
        session_store::{ParticipantUpdate, SessionStore},
    },
    error::ServiceError,
};

/// Smallest drawable winning number.
pub const WINNING_NUMBER_MIN: u8 = 1;
/// Largest drawable winning number.
pub const WINNING_NUMBER_MAX: u8 = 9;

/// Scoring outcome for one participant of a settled session.
#[derive(Debug, Clone)]
pub struct ParticipantOutcome {
    /// Participant row that was scored.
    pub participant_id: Uuid,
    /// Owning user whose counters moved.
    pub user_id: Uuid,
    /// The pick the participant held at settlement time.
    pub chosen_number: Option<u8>,
    /// Whether the pick matched the drawn number.
    pub is_winner: bool,
    /// Present when scoring this participant failed; the failure never
    /// aborts scoring of the remaining participants.
    pub error: Option<String>,
}

/// Result of one settlement pass.
#[derive(Debug, Clone)]
pub struct SettlementReport {
    /// The session row after the finished transition.
    pub session: SessionEntity,
    /// Per-participant scoring outcomes; empty when this caller lost the
    /// settlement race and scoring had already happened elsewhere.
    pub outcomes: Vec<ParticipantOutcome>,
    /// Whether this caller performed the settlement or merely observed one
    /// already performed by a concurrent caller.
    pub settled_here: bool,
}

/// Draw a winning number uniformly from [1,9].
fn draw_winning_number() -> u8 {
    rand::rng().random_range(WINNING_NUMBER_MIN..=WINNING_NUMBER_MAX)
}

/// Settle an expired session exactly once.
///
/// The conditional status flip is the enforcement point: when two callers
/// detect expiry simultaneously, only the one whose update-where-still-open
/// applies gets to score participants. The loser re-reads the session and
/// returns without re-drawing or re-scoring.
///
/// The finished/winning-number write is the durability-critical step and any
/// failure there fails the whole attempt; per-participant scoring afterwards
/// is best-effort, log-and-continue.
pub async fn settle(
    store: &Arc<dyn SessionStore>,
    session: &SessionEntity,
) -> Result<SettlementReport, ServiceError> {
    let drawn = draw_winning_number();
    let patch = SessionPatch {
        status: Some(SessionStatus::Finished),
        winning_number: Some(drawn),
        ended_at: Some(SystemTime::now()),
    };

    let updated = store
        .conditional_update_session(session.id, SessionStatus::OPEN.to_vec(), patch)
        .await?;

    let Some(settled) = updated else {
        // A concurrent caller won the race; trust its draw and its scoring.
        let current = store.get_session(session.id).await?.ok_or_else(|| {
            ServiceError::NotFound(format!("session `{}` not found", session.id))
        })?;
        return Ok(SettlementReport {
            session: current,
            outcomes: Vec::new(),
            settled_here: false,
        });
    };

    info!(
        session_id = %settled.id,
        winning_number = drawn,
        "session expired; settling"
    );

    let participants = store.list_participants(settled.id).await?;
    let mut outcomes = Vec::with_capacity(participants.len());
    for participant in participants {
        outcomes.push(score_participant(store, drawn, participant).await);
    }

    Ok(SettlementReport {
        session: settled,
        outcomes,
        settled_here: true,
    })
}

async fn score_participant(
    store: &Arc<dyn SessionStore>,
    winning_number: u8,
    participant: ParticipantEntity,
) -> ParticipantOutcome {
    let is_winner = participant.chosen_number == Some(winning_number);
    let mut outcome = ParticipantOutcome {
        participant_id: participant.id,
        user_id: participant.user_id,
        chosen_number: participant.chosen_number,
        is_winner,
        error: None,
    };

    let flagged = store
        .update_participant(
            participant.id,
            ParticipantPatch {
                chosen_number: None,
                is_winner: Some(is_winner),
            },
        )
        .await;
    match flagged {
        Ok(ParticipantUpdate::Updated(_)) => {}
        Ok(_) => {
            warn!(
                participant_id = %participant.id,
                user_id = %participant.user_id,
                "participant row missing at scoring time; continuing with remaining participants"
            );
            outcome.error = Some("participant row missing at scoring time".into());
            return outcome;
        }
        Err(err) => {
            warn!(
                participant_id = %participant.id,
                user_id = %participant.user_id,
                error = %err,
                "failed to flag participant outcome; continuing with remaining participants"
            );
            outcome.error = Some(err.to_string());
            return outcome;
        }
    }

    let delta = if is_winner {
        CounterDelta::win()
    } else {
        CounterDelta::loss()
    };
    if let Err(err) = store.update_user_counters(participant.user_id, delta).await {
        warn!(
            participant_id = %participant.id,
            user_id = %participant.user_id,
            error = %err,
            "failed to update user counters; continuing with remaining participants"
        );
        outcome.error = Some(err.to_string());
    }

    outcome
}
