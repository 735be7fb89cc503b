use std::{sync::Arc, time::SystemTime};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Collection, Database,
    bson::{DateTime, Document, doc},
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoParticipantDocument, MongoSessionDocument, MongoUserDocument, doc_id, status_str,
        uuid_as_binary,
    },
};
use crate::dao::{
    models::{
        CounterDelta, ParticipantEntity, ParticipantPatch, SessionEntity, SessionPatch,
        SessionStatus, UserEntity,
    },
    session_store::{
        ParticipantDelete, ParticipantInsert, ParticipantUpdate, SessionInsert, SessionStore,
    },
    storage::StorageResult,
};

const SESSION_COLLECTION_NAME: &str = "game_sessions";
const PARTICIPANT_COLLECTION_NAME: &str = "session_participants";
const USER_COLLECTION_NAME: &str = "users";

const DUPLICATE_KEY_CODE: i32 = 11000;

/// MongoDB-backed [`SessionStore`] sharing one client across clones.
#[derive(Clone)]
pub struct MongoSessionStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    database: RwLock<Database>,
    config: MongoConfig,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.database.read().await.clone();

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let database =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        *self.database.write().await = database;
        Ok(())
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        &*err.kind,
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE
    )
}

fn open_status_filter() -> Document {
    doc! { "$in": SessionStatus::OPEN.map(status_str).to_vec() }
}

fn session_update_doc(patch: &SessionPatch) -> Document {
    let mut set = Document::new();
    let mut unset = Document::new();
    if let Some(status) = patch.status {
        set.insert("status", status_str(status));
        if !status.is_open() {
            unset.insert("open_slot", "");
        }
    }
    if let Some(number) = patch.winning_number {
        set.insert("winning_number", number as i32);
    }
    if let Some(ended_at) = patch.ended_at {
        set.insert("ended_at", DateTime::from_system_time(ended_at));
    }

    let mut update = doc! { "$set": set };
    if !unset.is_empty() {
        update.insert("$unset", unset);
    }
    update
}

impl MongoSessionStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let database = establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            database: RwLock::new(database),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;

        // A sparse unique index over the open marker allows at most one
        // session document to carry it, which is the cross-process
        // single-open-session invariant.
        let sessions = database.collection::<Document>(SESSION_COLLECTION_NAME);
        let open_index = mongodb::IndexModel::builder()
            .keys(doc! {"open_slot": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("session_open_slot_idx".to_owned()))
                    .unique(Some(true))
                    .sparse(Some(true))
                    .build(),
            )
            .build();
        sessions
            .create_index(open_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: SESSION_COLLECTION_NAME,
                index: "open_slot",
                source,
            })?;

        let participants = database.collection::<Document>(PARTICIPANT_COLLECTION_NAME);
        let membership_index = mongodb::IndexModel::builder()
            .keys(doc! {"session_id": 1, "user_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("participant_membership_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        participants
            .create_index(membership_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PARTICIPANT_COLLECTION_NAME,
                index: "session_id,user_id",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        self.inner.database.read().await.clone()
    }

    async fn session_collection(&self) -> Collection<MongoSessionDocument> {
        self.database()
            .await
            .collection::<MongoSessionDocument>(SESSION_COLLECTION_NAME)
    }

    async fn participant_collection(&self) -> Collection<MongoParticipantDocument> {
        self.database()
            .await
            .collection::<MongoParticipantDocument>(PARTICIPANT_COLLECTION_NAME)
    }

    async fn user_collection(&self) -> Collection<MongoUserDocument> {
        self.database()
            .await
            .collection::<MongoUserDocument>(USER_COLLECTION_NAME)
    }

    async fn get_open_session(&self) -> MongoResult<Option<SessionEntity>> {
        let collection = self.session_collection().await;
        let document = collection
            .find_one(doc! {"status": open_status_filter()})
            .await
            .map_err(|source| MongoDaoError::LoadSession { source })?;
        Ok(document.map(Into::into))
    }

    async fn get_session(&self, id: Uuid) -> MongoResult<Option<SessionEntity>> {
        let collection = self.session_collection().await;
        let document = collection
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadSession { source })?;
        Ok(document.map(Into::into))
    }

    async fn insert_session(&self, session: SessionEntity) -> MongoResult<SessionInsert> {
        let collection = self.session_collection().await;
        let document: MongoSessionDocument = session.clone().into();
        match collection.insert_one(&document).await {
            Ok(_) => Ok(SessionInsert::Inserted(session)),
            Err(err) if is_duplicate_key(&err) => Ok(SessionInsert::OpenSessionExists),
            Err(source) => Err(MongoDaoError::WriteSession {
                id: session.id,
                source,
            }),
        }
    }

    async fn conditional_update_session(
        &self,
        id: Uuid,
        expected: Vec<SessionStatus>,
        patch: SessionPatch,
    ) -> MongoResult<Option<SessionEntity>> {
        let collection = self.session_collection().await;
        let expected: Vec<&str> = expected.into_iter().map(status_str).collect();
        let filter = doc! {
            "_id": uuid_as_binary(id),
            "status": { "$in": expected },
        };

        let updated = collection
            .find_one_and_update(filter, session_update_doc(&patch))
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::WriteSession { id, source })?;

        Ok(updated.map(Into::into))
    }

    async fn get_participant(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> MongoResult<Option<ParticipantEntity>> {
        let collection = self.participant_collection().await;
        let document = collection
            .find_one(doc! {
                "session_id": uuid_as_binary(session_id),
                "user_id": uuid_as_binary(user_id),
            })
            .await
            .map_err(|source| MongoDaoError::LoadParticipants { session_id, source })?;
        Ok(document.map(Into::into))
    }

    async fn list_participants(&self, session_id: Uuid) -> MongoResult<Vec<ParticipantEntity>> {
        let collection = self.participant_collection().await;
        let documents: Vec<MongoParticipantDocument> = collection
            .find(doc! {"session_id": uuid_as_binary(session_id)})
            .sort(doc! {"joined_at": 1})
            .await
            .map_err(|source| MongoDaoError::LoadParticipants { session_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadParticipants { session_id, source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    /// Claim an occupancy slot, then insert the membership row. The slot claim
    /// re-checks the capacity bound server-side so racing joins cannot
    /// overshoot; the unique membership index backstops duplicate users.
    async fn insert_participant(
        &self,
        participant: ParticipantEntity,
    ) -> MongoResult<ParticipantInsert> {
        if self
            .get_participant(participant.user_id, participant.session_id)
            .await?
            .is_some()
        {
            return Ok(ParticipantInsert::DuplicateUser);
        }

        let sessions = self.session_collection().await;
        let session_id = participant.session_id;
        let claim_filter = doc! {
            "_id": uuid_as_binary(session_id),
            "status": open_status_filter(),
            "$expr": { "$lt": [ { "$add": ["$current_players", 1] }, "$max_players" ] },
        };
        let claimed = sessions
            .find_one_and_update(claim_filter, doc! { "$inc": { "current_players": 1 } })
            .await
            .map_err(|source| MongoDaoError::WriteSession {
                id: session_id,
                source,
            })?;

        if claimed.is_none() {
            let current = self.get_session(session_id).await?;
            return Ok(match current {
                Some(session) if session.status.is_open() => ParticipantInsert::CapacityExhausted,
                _ => ParticipantInsert::SessionClosed,
            });
        }

        let collection = self.participant_collection().await;
        let document: MongoParticipantDocument = participant.clone().into();
        match collection.insert_one(&document).await {
            Ok(_) => Ok(ParticipantInsert::Inserted(participant)),
            Err(err) => {
                // Release the claimed slot before reporting the failure.
                if let Err(release_err) = sessions
                    .update_one(
                        doc_id(session_id),
                        doc! { "$inc": { "current_players": -1 } },
                    )
                    .await
                {
                    warn!(
                        session_id = %session_id,
                        error = %release_err,
                        "failed to release occupancy slot after participant insert error"
                    );
                }
                if is_duplicate_key(&err) {
                    Ok(ParticipantInsert::DuplicateUser)
                } else {
                    Err(MongoDaoError::WriteParticipant {
                        id: participant.id,
                        source: err,
                    })
                }
            }
        }
    }

    async fn find_participant_by_id(&self, id: Uuid) -> MongoResult<Option<ParticipantEntity>> {
        let collection = self.participant_collection().await;
        let document = collection
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadParticipant { id, source })?;
        Ok(document.map(Into::into))
    }

    /// Release the occupancy slot only while the session is still open; the
    /// filter re-checks the status server-side so a racing settlement cannot
    /// see a finished session's frozen occupancy move.
    async fn delete_participant(&self, id: Uuid) -> MongoResult<ParticipantDelete> {
        let Some(row) = self.find_participant_by_id(id).await? else {
            return Ok(ParticipantDelete::NotFound);
        };

        let sessions = self.session_collection().await;
        let released = sessions
            .find_one_and_update(
                doc! {
                    "_id": uuid_as_binary(row.session_id),
                    "status": open_status_filter(),
                },
                doc! { "$inc": { "current_players": -1 } },
            )
            .await
            .map_err(|source| MongoDaoError::WriteSession {
                id: row.session_id,
                source,
            })?;

        if released.is_none() {
            return Ok(ParticipantDelete::SessionClosed);
        }

        let collection = self.participant_collection().await;
        let deleted = collection
            .delete_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::WriteParticipant { id, source })?;

        if deleted.deleted_count == 0 {
            // Row vanished between the read and the delete; give the slot
            // back before reporting.
            if let Err(restore_err) = sessions
                .update_one(
                    doc_id(row.session_id),
                    doc! { "$inc": { "current_players": 1 } },
                )
                .await
            {
                warn!(
                    session_id = %row.session_id,
                    error = %restore_err,
                    "failed to restore occupancy slot after participant delete race"
                );
            }
            return Ok(ParticipantDelete::NotFound);
        }

        Ok(ParticipantDelete::Deleted)
    }

    async fn update_participant(
        &self,
        id: Uuid,
        patch: ParticipantPatch,
    ) -> MongoResult<ParticipantUpdate> {
        // Pick rewrites require the owning session to still be open;
        // is_winner-only patches are the settlement path and stay allowed.
        if patch.chosen_number.is_some() {
            let Some(row) = self.find_participant_by_id(id).await? else {
                return Ok(ParticipantUpdate::NotFound);
            };
            match self.get_session(row.session_id).await? {
                Some(session) if session.status.is_open() => {}
                _ => return Ok(ParticipantUpdate::SessionClosed),
            }
        }

        let mut set = Document::new();
        if let Some(number) = patch.chosen_number {
            set.insert("chosen_number", number as i32);
        }
        if let Some(is_winner) = patch.is_winner {
            set.insert("is_winner", is_winner);
        }

        let collection = self.participant_collection().await;
        let updated = collection
            .find_one_and_update(doc_id(id), doc! { "$set": set })
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::WriteParticipant { id, source })?;

        Ok(match updated {
            Some(document) => ParticipantUpdate::Updated(document.into()),
            None => ParticipantUpdate::NotFound,
        })
    }

    async fn update_user_counters(
        &self,
        user_id: Uuid,
        delta: CounterDelta,
    ) -> MongoResult<UserEntity> {
        let collection = self.user_collection().await;
        let updated = collection
            .find_one_and_update(
                doc_id(user_id),
                doc! { "$inc": {
                    "total_wins": delta.wins as i64,
                    "total_losses": delta.losses as i64,
                } },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::WriteUser { user_id, source })?;

        match updated {
            Some(document) => Ok(document.into()),
            None => Ok(UserEntity {
                id: user_id,
                total_wins: delta.wins,
                total_losses: delta.losses,
            }),
        }
    }

    async fn list_top_users(&self, limit: usize) -> MongoResult<Vec<UserEntity>> {
        let collection = self.user_collection().await;
        let documents: Vec<MongoUserDocument> = collection
            .find(doc! {})
            .sort(doc! {"total_wins": -1, "total_losses": 1})
            .limit(limit as i64)
            .await
            .map_err(|source| MongoDaoError::ListUsers { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListUsers { source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn list_sessions_between(
        &self,
        from: SystemTime,
        to: SystemTime,
    ) -> MongoResult<Vec<SessionEntity>> {
        let collection = self.session_collection().await;
        let documents: Vec<MongoSessionDocument> = collection
            .find(doc! { "created_at": {
                "$gte": DateTime::from_system_time(from),
                "$lt": DateTime::from_system_time(to),
            } })
            .sort(doc! {"created_at": 1})
            .await
            .map_err(|source| MongoDaoError::LoadSession { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadSession { source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }
}

impl SessionStore for MongoSessionStore {
    fn get_open_session(&self) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.get_open_session().await.map_err(Into::into) })
    }

    fn get_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.get_session(id).await.map_err(Into::into) })
    }

    fn insert_session(
        &self,
        session: SessionEntity,
    ) -> BoxFuture<'static, StorageResult<SessionInsert>> {
        let store = self.clone();
        Box::pin(async move { store.insert_session(session).await.map_err(Into::into) })
    }

    fn conditional_update_session(
        &self,
        id: Uuid,
        expected: Vec<SessionStatus>,
        patch: SessionPatch,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .conditional_update_session(id, expected, patch)
                .await
                .map_err(Into::into)
        })
    }

    fn get_participant(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .get_participant(user_id, session_id)
                .await
                .map_err(Into::into)
        })
    }

    fn list_participants(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_participants(session_id).await.map_err(Into::into) })
    }

    fn insert_participant(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<ParticipantInsert>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .insert_participant(participant)
                .await
                .map_err(Into::into)
        })
    }

    fn delete_participant(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<ParticipantDelete>> {
        let store = self.clone();
        Box::pin(async move { store.delete_participant(id).await.map_err(Into::into) })
    }

    fn update_participant(
        &self,
        id: Uuid,
        patch: ParticipantPatch,
    ) -> BoxFuture<'static, StorageResult<ParticipantUpdate>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .update_participant(id, patch)
                .await
                .map_err(Into::into)
        })
    }

    fn update_user_counters(
        &self,
        user_id: Uuid,
        delta: CounterDelta,
    ) -> BoxFuture<'static, StorageResult<UserEntity>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .update_user_counters(user_id, delta)
                .await
                .map_err(Into::into)
        })
    }

    fn list_top_users(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<UserEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_top_users(limit).await.map_err(Into::into) })
    }

    fn list_sessions_between(
        &self,
        from: SystemTime,
        to: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list_sessions_between(from, to)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
