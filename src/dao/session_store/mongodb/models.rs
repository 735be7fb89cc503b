use mongodb::bson::{Binary, DateTime, Document, doc, spec::BinarySubtype};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{ParticipantEntity, SessionEntity, SessionStatus, UserEntity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSessionDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    status: SessionStatus,
    /// Present while the session is open; a sparse unique index on this field
    /// is what enforces the single-open-session invariant across processes.
    #[serde(skip_serializing_if = "Option::is_none")]
    open_slot: Option<i32>,
    max_players: u32,
    current_players: u32,
    session_duration_secs: u64,
    created_at: DateTime,
    ended_at: Option<DateTime>,
    winning_number: Option<u8>,
}

impl From<SessionEntity> for MongoSessionDocument {
    fn from(value: SessionEntity) -> Self {
        Self {
            id: value.id,
            status: value.status,
            open_slot: value.status.is_open().then_some(1),
            max_players: value.max_players,
            current_players: value.current_players,
            session_duration_secs: value.session_duration_secs,
            created_at: DateTime::from_system_time(value.created_at),
            ended_at: value.ended_at.map(DateTime::from_system_time),
            winning_number: value.winning_number,
        }
    }
}

impl From<MongoSessionDocument> for SessionEntity {
    fn from(value: MongoSessionDocument) -> Self {
        Self {
            id: value.id,
            status: value.status,
            max_players: value.max_players,
            current_players: value.current_players,
            session_duration_secs: value.session_duration_secs,
            created_at: value.created_at.to_system_time(),
            ended_at: value.ended_at.map(|at| at.to_system_time()),
            winning_number: value.winning_number,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoParticipantDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    session_id: Uuid,
    user_id: Uuid,
    chosen_number: Option<u8>,
    is_winner: bool,
    is_starter: bool,
    joined_at: DateTime,
}

impl From<ParticipantEntity> for MongoParticipantDocument {
    fn from(value: ParticipantEntity) -> Self {
        Self {
            id: value.id,
            session_id: value.session_id,
            user_id: value.user_id,
            chosen_number: value.chosen_number,
            is_winner: value.is_winner,
            is_starter: value.is_starter,
            joined_at: DateTime::from_system_time(value.joined_at),
        }
    }
}

impl From<MongoParticipantDocument> for ParticipantEntity {
    fn from(value: MongoParticipantDocument) -> Self {
        Self {
            id: value.id,
            session_id: value.session_id,
            user_id: value.user_id,
            chosen_number: value.chosen_number,
            is_winner: value.is_winner,
            is_starter: value.is_starter,
            joined_at: value.joined_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoUserDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    #[serde(default)]
    total_wins: u64,
    #[serde(default)]
    total_losses: u64,
}

impl From<MongoUserDocument> for UserEntity {
    fn from(value: MongoUserDocument) -> Self {
        Self {
            id: value.id,
            total_wins: value.total_wins,
            total_losses: value.total_losses,
        }
    }
}

pub fn uuid_as_binary(id: Uuid) -> Binary {
    Binary {
        subtype: BinarySubtype::Uuid,
        bytes: id.into_bytes().to_vec(),
    }
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": uuid_as_binary(id)}
}

pub fn status_str(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Waiting => "waiting",
        SessionStatus::Active => "active",
        SessionStatus::Finished => "finished",
    }
}
