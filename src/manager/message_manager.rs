use chrono::Utc;

use super::{
    chat_manager::{self, ChatManager},
    ChatMessage, MessageRow, Sender, User,
};

pub struct MessageManager<'a> {
    pool: &'a sqlx::SqlitePool,
}

impl<'a> MessageManager<'a> {
    pub fn new(pool: &'a sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

impl MessageManager<'_> {
    /// Stores a message from `sender` and makes it the chat's latest message.
    pub async fn new_message(
        &self,
        sender: &User,
        chat_id: i64,
        content: &str,
    ) -> Result<ChatMessage, chat_manager::Error> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let touched = sqlx::query("UPDATE Chat SET updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;
        if touched.rows_affected() == 0 {
            return Err(chat_manager::Error::DoesNotExist);
        }

        let message = sqlx::query_as::<_, MessageRow>(
            "INSERT INTO Message(sender_id, content, chat_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(sender.id)
        .bind(content)
        .bind(chat_id)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE Chat SET latest_message_id = ? WHERE id = ?")
            .bind(message.id)
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        let chat = ChatManager::new(self.pool).find_chat(chat_id).await?;
        Ok(ChatMessage {
            id: message.id,
            sender: Sender::from(sender.clone()),
            content: message.content,
            chat,
            created_at: message.created_at,
            updated_at: message.updated_at,
        })
    }

    /// Every message of a chat, oldest first.
    pub async fn list_messages(&self, chat_id: i64) -> Result<Vec<ChatMessage>, chat_manager::Error> {
        let chat = ChatManager::new(self.pool).find_chat(chat_id).await?;

        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT * FROM Message WHERE chat_id = ? ORDER BY created_at, id",
        )
        .bind(chat_id)
        .fetch_all(self.pool)
        .await?;

        let senders = sqlx::query_as::<_, User>(
            "SELECT DISTINCT User.* FROM Message
             JOIN User ON User.id = Message.sender_id
             WHERE Message.chat_id = ?",
        )
        .bind(chat_id)
        .fetch_all(self.pool)
        .await?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            let sender = senders
                .iter()
                .find(|u| u.id == row.sender_id)
                .cloned()
                // a dangling sender is a broken row, not a missing chat
                .ok_or(chat_manager::Error::DatabaseError(sqlx::Error::RowNotFound))?;
            messages.push(ChatMessage {
                id: row.id,
                sender: sender.into(),
                content: row.content,
                chat: chat.clone(),
                created_at: row.created_at,
                updated_at: row.updated_at,
            });
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::user_manager::UserManager;

    async fn user(pool: &sqlx::SqlitePool, id: i64) -> User {
        UserManager::new(pool).find_by_id(id).await.unwrap().unwrap()
    }

    #[sqlx::test(fixtures("users", "chats", "messages"))]
    async fn ok_list_messages_oldest_first(pool: sqlx::SqlitePool) {
        let messages = MessageManager::new(&pool).list_messages(1).await.unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hey bob", "hi ann"]);
        assert_eq!(messages[0].sender.id, 1);
        assert_eq!(messages[1].sender.id, 3);
        assert_eq!(messages[0].chat.id, 1);
    }

    #[sqlx::test(fixtures("users", "chats"))]
    async fn ok_new_message_becomes_latest(pool: sqlx::SqlitePool) {
        let sender = user(&pool, 2).await;
        let message = MessageManager::new(&pool)
            .new_message(&sender, 3, "hello carl")
            .await
            .unwrap();

        assert_eq!(message.sender.id, 2);
        assert_eq!(message.chat.id, 3);
        assert_eq!(message.chat.users.len(), 2);
        assert_eq!(message.chat.latest_message.as_ref().unwrap().id, message.id);

        // the chat moves to the top of its members' lists
        let chats = ChatManager::new(&pool).list_chats(2).await.unwrap();
        assert_eq!(chats[0].id, 3);
    }

    #[sqlx::test(fixtures("users", "chats"))]
    async fn err_new_message_in_missing_chat(pool: sqlx::SqlitePool) {
        let sender = user(&pool, 1).await;
        assert!(matches!(
            MessageManager::new(&pool).new_message(&sender, 77, "lost").await,
            Err(chat_manager::Error::DoesNotExist)
        ));
    }

    #[sqlx::test(fixtures("users", "chats"))]
    async fn err_list_messages_of_missing_chat(pool: sqlx::SqlitePool) {
        assert!(matches!(
            MessageManager::new(&pool).list_messages(77).await,
            Err(chat_manager::Error::DoesNotExist)
        ));
    }

    #[sqlx::test(fixtures("users", "chats", "messages"))]
    async fn err_list_messages_with_dangling_sender(pool: sqlx::SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        sqlx::query("PRAGMA foreign_keys = OFF")
            .execute(&mut *conn)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO Message (sender_id, content, chat_id, created_at, updated_at)
             VALUES (99, 'ghost', 1, '2024-01-02T09:07:00+00:00', '2024-01-02T09:07:00+00:00')",
        )
        .execute(&mut *conn)
        .await
        .unwrap();
        drop(conn);

        assert!(matches!(
            MessageManager::new(&pool).list_messages(1).await,
            Err(chat_manager::Error::DatabaseError(sqlx::Error::RowNotFound))
        ));
    }
}
