use sqlx::{Sqlite, Transaction};

use pigeon_core::MessageData;

use crate::Result;
use crate::models::{Message, RemoteKey};
use crate::notifier::StoreChange;
use crate::store::{PigeonDb, now_millis};

/// Per-chat message threads. Rows and remote keys are both scoped by
/// `chat_id`; one chat's chain never touches another's.
impl PigeonDb {
    pub async fn message_page(
        &self,
        chat_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MessageData>> {
        let rows = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE chat_id = ?
             ORDER BY timestamp DESC, message_id DESC LIMIT ? OFFSET ?",
        )
        .bind(chat_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(Message::into_data).collect()
    }

    pub async fn all_messages(&self, chat_id: &str) -> Result<Vec<MessageData>> {
        self.message_page(chat_id, -1, 0).await
    }

    pub async fn get_message(&self, chat_id: &str, message_id: &str) -> Result<Option<MessageData>> {
        let row = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE chat_id = ? AND message_id = ?",
        )
        .bind(chat_id)
        .bind(message_id)
        .fetch_optional(self.pool())
        .await?;
        row.map(Message::into_data).transpose()
    }

    pub async fn message_chain_tail(&self, chat_id: &str) -> Result<Option<RemoteKey>> {
        Ok(sqlx::query_as::<_, RemoteKey>(
            "SELECT message_id AS id, previous_cursor, next_cursor, created_at
             FROM message_remote_keys WHERE chat_id = ? AND previous_cursor IS NULL
             ORDER BY created_at ASC LIMIT 1",
        )
        .bind(chat_id)
        .fetch_optional(self.pool())
        .await?)
    }

    pub async fn message_count(&self, chat_id: &str) -> Result<i64> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE chat_id = ?")
                .bind(chat_id)
                .fetch_one(self.pool())
                .await?,
        )
    }

    pub async fn message_remote_key(
        &self,
        chat_id: &str,
        message_id: &str,
    ) -> Result<Option<RemoteKey>> {
        Ok(sqlx::query_as::<_, RemoteKey>(
            "SELECT message_id AS id, previous_cursor, next_cursor, created_at
             FROM message_remote_keys WHERE chat_id = ? AND message_id = ?",
        )
        .bind(chat_id)
        .bind(message_id)
        .fetch_optional(self.pool())
        .await?)
    }

    pub async fn message_chain_head(&self, chat_id: &str) -> Result<Option<RemoteKey>> {
        Ok(sqlx::query_as::<_, RemoteKey>(
            "SELECT message_id AS id, previous_cursor, next_cursor, created_at
             FROM message_remote_keys WHERE chat_id = ? ORDER BY created_at DESC LIMIT 1",
        )
        .bind(chat_id)
        .fetch_optional(self.pool())
        .await?)
    }

    pub async fn insert_message_page(
        &self,
        chat_id: &str,
        page: &[MessageData],
        link_to_next: Option<&str>,
    ) -> Result<bool> {
        if page.is_empty() {
            return Ok(true);
        }

        let mut tx = self.pool().begin().await?;
        let n = page.len();

        let base = match link_to_next {
            None => {
                let existing: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM message_remote_keys WHERE chat_id = ?",
                )
                .bind(chat_id)
                .fetch_one(&mut *tx)
                .await?;
                if existing > 0 {
                    return Ok(false);
                }
                now_millis()
            }
            Some(anchor) => {
                let anchor_key = sqlx::query_as::<_, RemoteKey>(
                    "SELECT message_id AS id, previous_cursor, next_cursor, created_at
                     FROM message_remote_keys WHERE chat_id = ? AND message_id = ?",
                )
                .bind(chat_id)
                .bind(anchor)
                .fetch_optional(&mut *tx)
                .await?;

                match anchor_key {
                    Some(key) if key.previous_cursor.is_none() => {}
                    _ => return Ok(false),
                }

                let floor: i64 = sqlx::query_scalar(
                    "SELECT COALESCE(MIN(created_at), ?) FROM message_remote_keys WHERE chat_id = ?",
                )
                .bind(now_millis())
                .bind(chat_id)
                .fetch_one(&mut *tx)
                .await?;
                floor - n as i64
            }
        };

        for (i, message) in page.iter().enumerate() {
            let previous = page.get(i + 1).map(|m| m.message_id.as_str());
            let next = if i == 0 {
                link_to_next
            } else {
                Some(page[i - 1].message_id.as_str())
            };
            let stamp = base + (n - 1 - i) as i64;

            upsert_message_row(&mut tx, message).await?;
            sqlx::query(
                "INSERT OR REPLACE INTO message_remote_keys
                 (message_id, chat_id, previous_cursor, next_cursor, created_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&message.message_id)
            .bind(chat_id)
            .bind(previous)
            .bind(next)
            .bind(stamp)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(anchor) = link_to_next {
            sqlx::query(
                "UPDATE message_remote_keys SET previous_cursor = ?
                 WHERE chat_id = ? AND message_id = ?",
            )
            .bind(&page[0].message_id)
            .bind(chat_id)
            .bind(anchor)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        self.notify(StoreChange::Messages {
            chat_id: chat_id.to_string(),
        });
        Ok(true)
    }

    pub async fn prepend_message(&self, message: &MessageData) -> Result<bool> {
        let chat_id = message.chat_id.as_str();
        let mut tx = self.pool().begin().await?;

        let exists: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM messages WHERE chat_id = ? AND message_id = ?",
        )
        .bind(chat_id)
        .bind(&message.message_id)
        .fetch_optional(&mut *tx)
        .await?;
        if exists.is_some() {
            return Ok(false);
        }

        let max: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(created_at), 0) FROM message_remote_keys WHERE chat_id = ?",
        )
        .bind(chat_id)
        .fetch_one(&mut *tx)
        .await?;
        let stamp = now_millis().max(max + 1);

        let head_id: Option<String> = sqlx::query_scalar(
            "SELECT message_id FROM message_remote_keys
             WHERE chat_id = ? AND message_id != ? ORDER BY created_at DESC LIMIT 1",
        )
        .bind(chat_id)
        .bind(&message.message_id)
        .fetch_optional(&mut *tx)
        .await?;

        let key_exists: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM message_remote_keys WHERE chat_id = ? AND message_id = ?",
        )
        .bind(chat_id)
        .bind(&message.message_id)
        .fetch_optional(&mut *tx)
        .await?;

        if key_exists.is_some() {
            sqlx::query(
                "UPDATE message_remote_keys
                 SET previous_cursor = ?, next_cursor = NULL, created_at = ?
                 WHERE chat_id = ? AND message_id = ?",
            )
            .bind(head_id.as_deref())
            .bind(stamp)
            .bind(chat_id)
            .bind(&message.message_id)
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query(
                "INSERT INTO message_remote_keys
                 (message_id, chat_id, previous_cursor, next_cursor, created_at)
                 VALUES (?, ?, ?, NULL, ?)",
            )
            .bind(&message.message_id)
            .bind(chat_id)
            .bind(head_id.as_deref())
            .bind(stamp)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(ref old_head) = head_id {
            sqlx::query(
                "UPDATE message_remote_keys SET next_cursor = ?
                 WHERE chat_id = ? AND message_id = ?",
            )
            .bind(&message.message_id)
            .bind(chat_id)
            .bind(old_head)
            .execute(&mut *tx)
            .await?;
        }

        upsert_message_row(&mut tx, message).await?;
        tx.commit().await?;
        self.notify(StoreChange::Messages {
            chat_id: chat_id.to_string(),
        });
        Ok(true)
    }

    pub async fn replace_message(&self, message: &MessageData) -> Result<bool> {
        let content = serde_json::to_string(&message.content)?;

        let result = sqlx::query(
            "UPDATE messages SET sender_id = ?, content = ?, message_type = ?, timestamp = ?
             WHERE chat_id = ? AND message_id = ?",
        )
        .bind(&message.sender_id)
        .bind(content)
        .bind(message.content.kind())
        .bind(message.timestamp)
        .bind(&message.chat_id)
        .bind(&message.message_id)
        .execute(self.pool())
        .await?;

        let changed = result.rows_affected() > 0;
        if changed {
            self.notify(StoreChange::Messages {
                chat_id: message.chat_id.clone(),
            });
        }
        Ok(changed)
    }

    pub async fn remove_message(&self, chat_id: &str, message_id: &str) -> Result<bool> {
        let mut tx = self.pool().begin().await?;

        let entity_rows = sqlx::query("DELETE FROM messages WHERE chat_id = ? AND message_id = ?")
            .bind(chat_id)
            .bind(message_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let key_rows =
            sqlx::query("DELETE FROM message_remote_keys WHERE chat_id = ? AND message_id = ?")
                .bind(chat_id)
                .bind(message_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();

        tx.commit().await?;

        let removed = entity_rows > 0 || key_rows > 0;
        if removed {
            self.notify(StoreChange::Messages {
                chat_id: chat_id.to_string(),
            });
        }
        Ok(removed)
    }
}

async fn upsert_message_row(tx: &mut Transaction<'_, Sqlite>, message: &MessageData) -> Result<()> {
    let content = serde_json::to_string(&message.content)?;

    sqlx::query(
        "INSERT OR REPLACE INTO messages
         (message_id, chat_id, sender_id, content, message_type, timestamp)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&message.message_id)
    .bind(&message.chat_id)
    .bind(&message.sender_id)
    .bind(content)
    .bind(message.content.kind())
    .bind(message.timestamp)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
