use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

/// Result alias for MongoDB backend operations.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures raised by the MongoDB backend, one variant per operation family.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// The connection URI could not be parsed.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        /// The offending URI.
        uri: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The client could not be built from parsed options.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The initial ping never succeeded within the retry budget.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        /// Pings attempted before giving up.
        attempts: u32,
        /// Driver error of the last attempt.
        #[source]
        source: MongoError,
    },
    /// A routine health ping failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Index bootstrap failed.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        /// Collection carrying the index.
        collection: &'static str,
        /// Index description.
        index: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A session write did not apply.
    #[error("failed to write session `{id}`")]
    WriteSession {
        /// Session id.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A session read failed.
    #[error("failed to load session")]
    LoadSession {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A participant write did not apply.
    #[error("failed to write participant `{id}`")]
    WriteParticipant {
        /// Participant row id.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A single participant read failed.
    #[error("failed to load participant `{id}`")]
    LoadParticipant {
        /// Participant row id.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A participant listing failed.
    #[error("failed to load participants for session `{session_id}`")]
    LoadParticipants {
        /// Session whose rows were requested.
        session_id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A user counter write did not apply.
    #[error("failed to update counters for user `{user_id}`")]
    WriteUser {
        /// User whose counters were targeted.
        user_id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A user listing failed.
    #[error("failed to list users")]
    ListUsers {
        /// Driver error.
        #[source]
        source: MongoError,
    },
}
