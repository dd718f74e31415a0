use chrono::{DateTime, Utc};
use serde::Serialize;

pub mod chat_manager;
pub mod message_manager;
pub mod user_manager;

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password: String,
    pub pic: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user as it leaves the server: everything but the password hash.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    #[serde(rename = "_id")]
    pub id: i64,
    pub name: String,
    pub email: String,
    pub pic: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            pic: user.pic,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Short projection used wherever a message names its author.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Sender {
    #[serde(rename = "_id")]
    pub id: i64,
    pub name: String,
    pub pic: String,
    pub email: String,
}

impl From<User> for Sender {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            pic: user.pic,
            email: user.email,
        }
    }
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct ChatRow {
    pub id: i64,
    pub chat_name: String,
    pub is_group_chat: bool,
    pub group_admin_id: Option<i64>,
    pub latest_message_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub sender_id: i64,
    pub content: String,
    pub chat_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `latestMessage` of a chat: the sender is resolved, the chat stays a reference.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LatestMessage {
    #[serde(rename = "_id")]
    pub id: i64,
    pub sender: Sender,
    pub content: String,
    pub chat: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A chat with its members, admin and latest message resolved.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoom {
    #[serde(rename = "_id")]
    pub id: i64,
    pub chat_name: String,
    pub is_group_chat: bool,
    pub users: Vec<PublicUser>,
    pub group_admin: Option<PublicUser>,
    pub latest_message: Option<LatestMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(rename = "_id")]
    pub id: i64,
    pub sender: Sender,
    pub content: String,
    pub chat: ChatRoom,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
