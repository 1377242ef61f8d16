use bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

/// Team channel a call can be bound to. Private channels gate call access
/// on membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub workspace_id: ObjectId,
    pub name: String,
    #[serde(default)]
    pub is_private: bool,
    pub created_at: DateTime,
}

impl Channel {
    pub const COLLECTION: &'static str = "channels";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMember {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub channel_id: ObjectId,
    pub user_id: ObjectId,
    pub created_at: DateTime,
}

impl ChannelMember {
    pub const COLLECTION: &'static str = "channel_members";
}
