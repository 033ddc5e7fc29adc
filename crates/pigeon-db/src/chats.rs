use sqlx::{Sqlite, Transaction};

use pigeon_core::ChatData;

use crate::Result;
use crate::models::{Chat, RemoteKey};
use crate::notifier::StoreChange;
use crate::store::{PigeonDb, now_millis};

/// Chat collection: entity rows plus the `chat_remote_keys` pagination chain.
///
/// Every operation that touches both an entity row and its key row runs in a
/// single transaction; the chain must never observe one without the other.
impl PigeonDb {
    pub async fn chat_page(&self, limit: i64, offset: i64) -> Result<Vec<ChatData>> {
        let rows = sqlx::query_as::<_, Chat>(
            "SELECT * FROM chats ORDER BY last_message_timestamp DESC, chat_id DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(Chat::into_data).collect()
    }

    /// Every locally cached chat, newest first. The cache holds exactly the
    /// loaded window, so this is what a paged view renders.
    pub async fn all_chats(&self) -> Result<Vec<ChatData>> {
        self.chat_page(-1, 0).await
    }

    pub async fn get_chat(&self, chat_id: &str) -> Result<Option<ChatData>> {
        let row = sqlx::query_as::<_, Chat>("SELECT * FROM chats WHERE chat_id = ?")
            .bind(chat_id)
            .fetch_optional(self.pool())
            .await?;
        row.map(Chat::into_data).transpose()
    }

    /// Tail of the chat chain: the oldest loaded item with no older link.
    /// Returns nothing when every candidate's older cursor is dead, which
    /// the pagination reader treats as end-of-chain.
    pub async fn chat_chain_tail(&self) -> Result<Option<RemoteKey>> {
        Ok(sqlx::query_as::<_, RemoteKey>(
            "SELECT chat_id AS id, previous_cursor, next_cursor, created_at
             FROM chat_remote_keys WHERE previous_cursor IS NULL
             ORDER BY created_at ASC LIMIT 1",
        )
        .fetch_optional(self.pool())
        .await?)
    }

    pub async fn chat_count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM chats")
            .fetch_one(self.pool())
            .await?)
    }

    pub async fn chat_remote_key(&self, chat_id: &str) -> Result<Option<RemoteKey>> {
        Ok(sqlx::query_as::<_, RemoteKey>(
            "SELECT chat_id AS id, previous_cursor, next_cursor, created_at
             FROM chat_remote_keys WHERE chat_id = ?",
        )
        .bind(chat_id)
        .fetch_optional(self.pool())
        .await?)
    }

    /// Head of the chat chain: the most recently linked key.
    pub async fn chat_chain_head(&self) -> Result<Option<RemoteKey>> {
        Ok(sqlx::query_as::<_, RemoteKey>(
            "SELECT chat_id AS id, previous_cursor, next_cursor, created_at
             FROM chat_remote_keys ORDER BY created_at DESC LIMIT 1",
        )
        .fetch_optional(self.pool())
        .await?)
    }

    /// Insert a fetched page (newest first) with its chain links.
    ///
    /// `link_to_next = None` is the initial page: the oldest item becomes the
    /// chain tail and the newest the head. With `link_to_next = Some(anchor)`
    /// the page extends the chain below `anchor`; the anchor is re-checked
    /// inside the transaction and the page is discarded (`Ok(false)`) if it
    /// stopped being the tail while the fetch was in flight.
    pub async fn insert_chat_page(
        &self,
        page: &[ChatData],
        link_to_next: Option<&str>,
    ) -> Result<bool> {
        if page.is_empty() {
            return Ok(true);
        }

        let mut tx = self.pool().begin().await?;
        let n = page.len();

        let base = match link_to_next {
            None => {
                let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chat_remote_keys")
                    .fetch_one(&mut *tx)
                    .await?;
                if existing > 0 {
                    return Ok(false);
                }
                now_millis()
            }
            Some(anchor) => {
                let anchor_key = sqlx::query_as::<_, RemoteKey>(
                    "SELECT chat_id AS id, previous_cursor, next_cursor, created_at
                     FROM chat_remote_keys WHERE chat_id = ?",
                )
                .bind(anchor)
                .fetch_optional(&mut *tx)
                .await?;

                match anchor_key {
                    Some(key) if key.previous_cursor.is_none() => {}
                    // Anchor vanished or already has an older neighbour: a
                    // competing load got here first, drop this page.
                    _ => return Ok(false),
                }

                let floor: i64 =
                    sqlx::query_scalar("SELECT COALESCE(MIN(created_at), ?) FROM chat_remote_keys")
                        .bind(now_millis())
                        .fetch_one(&mut *tx)
                        .await?;
                // Appended pages stamp below everything already linked so the
                // chain head keeps the largest created_at.
                floor - n as i64
            }
        };

        for (i, chat) in page.iter().enumerate() {
            let previous = page.get(i + 1).map(|c| c.chat_id.as_str());
            let next = if i == 0 {
                link_to_next
            } else {
                Some(page[i - 1].chat_id.as_str())
            };
            // Newest item of the page gets the largest stamp.
            let stamp = base + (n - 1 - i) as i64;

            upsert_chat_row(&mut tx, chat).await?;
            sqlx::query(
                "INSERT OR REPLACE INTO chat_remote_keys
                 (chat_id, previous_cursor, next_cursor, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(&chat.chat_id)
            .bind(previous)
            .bind(next)
            .bind(stamp)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(anchor) = link_to_next {
            sqlx::query("UPDATE chat_remote_keys SET previous_cursor = ? WHERE chat_id = ?")
                .bind(&page[0].chat_id)
                .bind(anchor)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        self.notify(StoreChange::Chats);
        Ok(true)
    }

    /// Live-added chat: link it as the new chain head.
    ///
    /// Idempotent — returns `Ok(false)` without touching anything when the
    /// chat is already cached. A key row left over from a partial operation
    /// is refreshed and re-linked instead of duplicated.
    pub async fn prepend_chat(&self, chat: &ChatData) -> Result<bool> {
        let mut tx = self.pool().begin().await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM chats WHERE chat_id = ?")
            .bind(&chat.chat_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_some() {
            return Ok(false);
        }

        let stamp = next_chat_stamp(&mut tx).await?;
        let head_id: Option<String> = sqlx::query_scalar(
            "SELECT chat_id FROM chat_remote_keys WHERE chat_id != ?
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(&chat.chat_id)
        .fetch_optional(&mut *tx)
        .await?;

        let key_exists: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM chat_remote_keys WHERE chat_id = ?")
                .bind(&chat.chat_id)
                .fetch_optional(&mut *tx)
                .await?;

        if key_exists.is_some() {
            sqlx::query(
                "UPDATE chat_remote_keys
                 SET previous_cursor = ?, next_cursor = NULL, created_at = ? WHERE chat_id = ?",
            )
            .bind(head_id.as_deref())
            .bind(stamp)
            .bind(&chat.chat_id)
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query(
                "INSERT INTO chat_remote_keys (chat_id, previous_cursor, next_cursor, created_at)
                 VALUES (?, ?, NULL, ?)",
            )
            .bind(&chat.chat_id)
            .bind(head_id.as_deref())
            .bind(stamp)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(ref old_head) = head_id {
            sqlx::query("UPDATE chat_remote_keys SET next_cursor = ? WHERE chat_id = ?")
                .bind(&chat.chat_id)
                .bind(old_head)
                .execute(&mut *tx)
                .await?;
        }

        upsert_chat_row(&mut tx, chat).await?;
        tx.commit().await?;
        self.notify(StoreChange::Chats);
        Ok(true)
    }

    /// Replace the entity row in place; the chain position is untouched.
    pub async fn replace_chat(&self, chat: &ChatData) -> Result<bool> {
        let last_message = chat
            .last_message
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let members_json = members_json(chat)?;

        let result = sqlx::query(
            "UPDATE chats SET title = ?, photo_url = ?, last_message = ?,
             last_message_timestamp = ?, members_json = ?, updated_at = ? WHERE chat_id = ?",
        )
        .bind(&chat.title)
        .bind(&chat.photo_url)
        .bind(last_message)
        .bind(chat.last_message_timestamp)
        .bind(members_json)
        .bind(now_millis())
        .bind(&chat.chat_id)
        .execute(self.pool())
        .await?;

        let changed = result.rows_affected() > 0;
        if changed {
            self.notify(StoreChange::Chats);
        }
        Ok(changed)
    }

    /// Delete the chat, its key and its whole message thread in one
    /// transaction. Neighbouring keys keep their now-dead cursors; the
    /// pagination reader treats those as end-of-chain.
    pub async fn remove_chat(&self, chat_id: &str) -> Result<bool> {
        let mut tx = self.pool().begin().await?;

        let entity_rows = sqlx::query("DELETE FROM chats WHERE chat_id = ?")
            .bind(chat_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let key_rows = sqlx::query("DELETE FROM chat_remote_keys WHERE chat_id = ?")
            .bind(chat_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM messages WHERE chat_id = ?")
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM message_remote_keys WHERE chat_id = ?")
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let removed = entity_rows > 0 || key_rows > 0;
        if removed {
            self.notify(StoreChange::Chats);
            self.notify(StoreChange::Messages {
                chat_id: chat_id.to_string(),
            });
        }
        Ok(removed)
    }
}

fn members_json(chat: &ChatData) -> Result<Option<String>> {
    if chat.members.is_empty() {
        Ok(None)
    } else {
        Ok(Some(serde_json::to_string(&chat.members)?))
    }
}

async fn upsert_chat_row(tx: &mut Transaction<'_, Sqlite>, chat: &ChatData) -> Result<()> {
    let last_message = chat
        .last_message
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let members = members_json(chat)?;

    sqlx::query(
        "INSERT OR REPLACE INTO chats
         (chat_id, title, photo_url, last_message, last_message_timestamp, members_json, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&chat.chat_id)
    .bind(&chat.title)
    .bind(&chat.photo_url)
    .bind(last_message)
    .bind(chat.last_message_timestamp)
    .bind(members)
    .bind(now_millis())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn next_chat_stamp(tx: &mut Transaction<'_, Sqlite>) -> Result<i64> {
    let max: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(created_at), 0) FROM chat_remote_keys")
        .fetch_one(&mut **tx)
        .await?;
    Ok(now_millis().max(max + 1))
}
