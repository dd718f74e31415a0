use chrono::Utc;
use sqlx::error::ErrorKind;

use super::{user_manager::UserManager, ChatRoom, ChatRow, LatestMessage, MessageRow, Sender, User};

/// Name given to every one-to-one chat; clients show the other member instead.
pub const ONE_TO_ONE_NAME: &str = "sender";

pub struct ChatManager<'a> {
    pool: &'a sqlx::SqlitePool,
}

impl<'a> ChatManager<'a> {
    pub fn new(pool: &'a sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Chat Not Found")]
    DoesNotExist,
    /// A write broke a constraint, most often a member id with no user behind it.
    #[error("{0}")]
    Rejected(String),
    #[error(transparent)]
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::DoesNotExist,
            sqlx::Error::Database(ref e) if !matches!(e.kind(), ErrorKind::Other) => {
                Error::Rejected(e.message().to_owned())
            }
            _ => Error::DatabaseError(err),
        }
    }
}

impl ChatManager<'_> {
    /// Resolves members, admin and latest message of a stored chat.
    pub async fn populate(&self, row: ChatRow) -> Result<ChatRoom, sqlx::Error> {
        let users = sqlx::query_as::<_, User>(
            "SELECT User.* FROM ChatUser
             JOIN User ON User.id = ChatUser.user_id
             WHERE ChatUser.chat_id = ?
             ORDER BY ChatUser.id",
        )
        .bind(row.id)
        .fetch_all(self.pool)
        .await?;

        let group_admin = match row.group_admin_id {
            Some(id) => UserManager::new(self.pool).find_by_id(id).await?,
            None => None,
        };

        let latest_message = match row.latest_message_id {
            Some(id) => Some(self.latest_message(id).await?),
            None => None,
        };

        Ok(ChatRoom {
            id: row.id,
            chat_name: row.chat_name,
            is_group_chat: row.is_group_chat,
            users: users.into_iter().map(Into::into).collect(),
            group_admin: group_admin.map(Into::into),
            latest_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    async fn latest_message(&self, message_id: i64) -> Result<LatestMessage, sqlx::Error> {
        let message = sqlx::query_as::<_, MessageRow>("SELECT * FROM Message WHERE id = ?")
            .bind(message_id)
            .fetch_one(self.pool)
            .await?;
        let sender = sqlx::query_as::<_, User>("SELECT * FROM User WHERE id = ?")
            .bind(message.sender_id)
            .fetch_one(self.pool)
            .await?;

        Ok(LatestMessage {
            id: message.id,
            sender: Sender::from(sender),
            content: message.content,
            chat: message.chat_id,
            created_at: message.created_at,
            updated_at: message.updated_at,
        })
    }

    pub async fn find_chat(&self, chat_id: i64) -> Result<ChatRoom, Error> {
        let row = sqlx::query_as::<_, ChatRow>("SELECT * FROM Chat WHERE id = ?")
            .bind(chat_id)
            .fetch_one(self.pool)
            .await?;
        Ok(self.populate(row).await?)
    }

    /// Returns the one-to-one chat whose members are exactly `me` and `other`,
    /// creating it when none exists. Two concurrent first calls for a pair can both create one.
    pub async fn access_chat(&self, me: i64, other: i64) -> Result<ChatRoom, Error> {
        let existing = sqlx::query_as::<_, ChatRow>(
            "SELECT * FROM Chat
             WHERE is_group_chat = FALSE
               AND EXISTS (SELECT 1 FROM ChatUser WHERE chat_id = Chat.id AND user_id = ?)
               AND EXISTS (SELECT 1 FROM ChatUser WHERE chat_id = Chat.id AND user_id = ?)
               AND (SELECT COUNT(*) FROM ChatUser WHERE chat_id = Chat.id) = 2
             ORDER BY id
             LIMIT 1",
        )
        .bind(me)
        .bind(other)
        .fetch_optional(self.pool)
        .await?;

        if let Some(row) = existing {
            return Ok(self.populate(row).await?);
        }

        tracing::debug!(me, other, "creating one-to-one chat");
        let chat_id = self
            .new_chat(ONE_TO_ONE_NAME, false, None, &[me, other])
            .await?;
        self.find_chat(chat_id).await
    }

    /// All chats `user_id` belongs to, most recently updated first.
    pub async fn list_chats(&self, user_id: i64) -> Result<Vec<ChatRoom>, sqlx::Error> {
        let rows = sqlx::query_as::<_, ChatRow>(
            "SELECT * FROM Chat
             WHERE EXISTS (SELECT 1 FROM ChatUser WHERE chat_id = Chat.id AND user_id = ?)
             ORDER BY updated_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        let mut chats = Vec::with_capacity(rows.len());
        for row in rows {
            chats.push(self.populate(row).await?);
        }
        Ok(chats)
    }

    /// Creates a group of `members` plus `admin`, who is appended last.
    pub async fn new_group(
        &self,
        name: &str,
        members: &[i64],
        admin: i64,
    ) -> Result<ChatRoom, Error> {
        let mut users = members.to_vec();
        users.push(admin);
        let chat_id = self.new_chat(name, true, Some(admin), &users).await?;
        self.find_chat(chat_id).await
    }

    async fn new_chat(
        &self,
        name: &str,
        is_group_chat: bool,
        group_admin: Option<i64>,
        users: &[i64],
    ) -> Result<i64, sqlx::Error> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let chat_id: i64 = sqlx::query_scalar(
            "INSERT INTO Chat(chat_name, is_group_chat, group_admin_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(name)
        .bind(is_group_chat)
        .bind(group_admin)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        for &user_id in users {
            sqlx::query("INSERT OR IGNORE INTO ChatUser(chat_id, user_id) VALUES (?, ?)")
                .bind(chat_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(chat_id)
    }

    pub async fn rename_group(&self, chat_id: i64, name: &str) -> Result<ChatRoom, Error> {
        let done = sqlx::query("UPDATE Chat SET chat_name = ?, updated_at = ? WHERE id = ?")
            .bind(name)
            .bind(Utc::now())
            .bind(chat_id)
            .execute(self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(Error::DoesNotExist);
        }
        self.find_chat(chat_id).await
    }

    /// Appends `user_id` to the member list. Adding a current member is a no-op.
    pub async fn add_to_group(&self, chat_id: i64, user_id: i64) -> Result<ChatRoom, Error> {
        let mut tx = self.pool.begin().await?;
        let done = sqlx::query("UPDATE Chat SET updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;
        if done.rows_affected() == 0 {
            return Err(Error::DoesNotExist);
        }
        sqlx::query("INSERT OR IGNORE INTO ChatUser(chat_id, user_id) VALUES (?, ?)")
            .bind(chat_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.find_chat(chat_id).await
    }

    pub async fn remove_from_group(&self, chat_id: i64, user_id: i64) -> Result<ChatRoom, Error> {
        let mut tx = self.pool.begin().await?;
        let done = sqlx::query("UPDATE Chat SET updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;
        if done.rows_affected() == 0 {
            return Err(Error::DoesNotExist);
        }
        sqlx::query("DELETE FROM ChatUser WHERE chat_id = ? AND user_id = ?")
            .bind(chat_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.find_chat(chat_id).await
    }
}
