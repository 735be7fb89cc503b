/// Database model definitions.
pub mod models;
/// Session, participant and user-counter storage backends.
pub mod session_store;
/// Storage abstraction layer for database operations.
pub mod storage;
