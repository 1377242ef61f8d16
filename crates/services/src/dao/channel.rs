use bson::{doc, oid::ObjectId};
use hirewire_db::models::{Channel, ChannelMember};
use mongodb::Database;

use super::base::{BaseDao, DaoResult};

pub struct ChannelDao {
    pub base: BaseDao<Channel>,
    pub members: BaseDao<ChannelMember>,
}

impl ChannelDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, Channel::COLLECTION),
            members: BaseDao::new(db, ChannelMember::COLLECTION),
        }
    }

    pub async fn find_by_id(&self, id: ObjectId) -> DaoResult<Option<Channel>> {
        self.base.find_one(doc! { "_id": id }).await
    }

    /// Public channels are open to everyone in the workspace; private ones
    /// require a membership row.
    pub async fn has_access(&self, channel_id: ObjectId, user_id: ObjectId) -> DaoResult<bool> {
        let channel = match self.find_by_id(channel_id).await? {
            Some(c) => c,
            None => return Ok(false),
        };
        if !channel.is_private {
            return Ok(true);
        }
        let membership = self
            .members
            .find_one(doc! { "channel_id": channel_id, "user_id": user_id })
            .await?;
        Ok(membership.is_some())
    }

    pub async fn find_member_user_ids(&self, channel_id: ObjectId) -> DaoResult<Vec<ObjectId>> {
        let members = self
            .members
            .find_many(doc! { "channel_id": channel_id }, None)
            .await?;
        Ok(members.into_iter().map(|m| m.user_id).collect())
    }
}
