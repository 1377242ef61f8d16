use bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

/// Platform user. The call core consumes these read-only; account
/// management lives elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub email: String,
    pub username: String,
    pub display_name: String,
    pub avatar: Option<String>,
    /// Administrators may end calls and toggle recording on any call.
    #[serde(default)]
    pub is_admin: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl User {
    pub const COLLECTION: &'static str = "users";
}
