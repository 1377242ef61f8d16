use bson::{Document, doc, oid::ObjectId};
use hirewire_db::models::{Call, CallParticipant};
use mongodb::Database;

use super::base::{BaseDao, DaoResult};

pub struct CallDao {
    pub calls: BaseDao<Call>,
    pub participants: BaseDao<CallParticipant>,
}

impl CallDao {
    pub fn new(db: &Database) -> Self {
        Self {
            calls: BaseDao::new(db, Call::COLLECTION),
            participants: BaseDao::new(db, CallParticipant::COLLECTION),
        }
    }

    // ── Calls ───────────────────────────────────────────────────

    pub async fn create(&self, call: Call) -> DaoResult<Call> {
        let id = self.calls.insert_one(&call).await?;
        self.calls.find_by_id(id).await
    }

    pub async fn find_by_id(&self, id: ObjectId) -> DaoResult<Option<Call>> {
        self.calls.find_one(doc! { "_id": id }).await
    }

    pub async fn find_by_room_id(&self, room_id: &str) -> DaoResult<Option<Call>> {
        self.calls.find_one(doc! { "room_id": room_id }).await
    }

    pub async fn find_active_by_workspace(&self, workspace_id: ObjectId) -> DaoResult<Vec<Call>> {
        self.calls
            .find_many(
                doc! { "workspace_id": workspace_id, "status": { "$ne": "ended" } },
                Some(doc! { "created_at": -1 }),
            )
            .await
    }

    /// The non-ended call in which the user is currently `connecting` or
    /// `connected`, if any. The unique-active-call invariant keeps this to
    /// at most one.
    pub async fn find_active_for_user(&self, user_id: ObjectId) -> DaoResult<Option<Call>> {
        let rows = self
            .participants
            .find_many(
                doc! {
                    "user_id": user_id,
                    "status": { "$in": ["connecting", "connected"] },
                },
                None,
            )
            .await?;

        for row in rows {
            if let Some(call) = self.find_by_id(row.call_id).await? {
                if call.status != hirewire_db::models::CallStatus::Ended {
                    return Ok(Some(call));
                }
            }
        }
        Ok(None)
    }

    pub async fn update_call(&self, id: ObjectId, update: Document) -> DaoResult<Call> {
        self.calls.update_by_id(id, update).await?;
        self.calls.find_by_id(id).await
    }

    pub async fn find_stale_pending(&self, created_before: bson::DateTime) -> DaoResult<Vec<Call>> {
        self.calls
            .find_many(
                doc! { "status": "pending", "created_at": { "$lt": created_before } },
                Some(doc! { "created_at": 1 }),
            )
            .await
    }

    // ── Participants ────────────────────────────────────────────

    pub async fn add_participant(&self, participant: CallParticipant) -> DaoResult<CallParticipant> {
        let id = self.participants.insert_one(&participant).await?;
        self.participants.find_by_id(id).await
    }

    pub async fn find_participants(&self, call_id: ObjectId) -> DaoResult<Vec<CallParticipant>> {
        self.participants
            .find_many(
                doc! { "call_id": call_id },
                Some(doc! { "created_at": 1 }),
            )
            .await
    }

    pub async fn find_participant(
        &self,
        call_id: ObjectId,
        user_id: ObjectId,
    ) -> DaoResult<Option<CallParticipant>> {
        self.participants
            .find_one(doc! { "call_id": call_id, "user_id": user_id })
            .await
    }

    pub async fn update_participant(
        &self,
        id: ObjectId,
        update: Document,
    ) -> DaoResult<CallParticipant> {
        let matched = self.participants.update_by_id(id, update).await;
        match matched {
            Ok(_) => self.participants.find_by_id(id).await,
            Err(e) => Err(e),
        }
    }

}
