use sqlx::{Sqlite, Transaction};

use pigeon_core::UserData;

use crate::Result;
use crate::models::{RemoteKey, User};
use crate::notifier::StoreChange;
use crate::store::{PigeonDb, now_millis};

/// Friends collection, mirrored from the remote friends list in insertion
/// order (`added_at`). Chain discipline identical to the chat collection.
impl PigeonDb {
    pub async fn friend_page(&self, limit: i64, offset: i64) -> Result<Vec<UserData>> {
        let rows = sqlx::query_as::<_, User>(
            "SELECT * FROM users ORDER BY added_at DESC, user_id DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(User::into_data).collect())
    }

    pub async fn all_friends(&self) -> Result<Vec<UserData>> {
        self.friend_page(-1, 0).await
    }

    pub async fn get_friend(&self, user_id: &str) -> Result<Option<UserData>> {
        let row = sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(User::into_data))
    }

    pub async fn friend_chain_tail(&self) -> Result<Option<RemoteKey>> {
        Ok(sqlx::query_as::<_, RemoteKey>(
            "SELECT user_id AS id, previous_cursor, next_cursor, created_at
             FROM friend_remote_keys WHERE previous_cursor IS NULL
             ORDER BY created_at ASC LIMIT 1",
        )
        .fetch_optional(self.pool())
        .await?)
    }

    pub async fn friend_count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(self.pool())
            .await?)
    }

    pub async fn friend_remote_key(&self, user_id: &str) -> Result<Option<RemoteKey>> {
        Ok(sqlx::query_as::<_, RemoteKey>(
            "SELECT user_id AS id, previous_cursor, next_cursor, created_at
             FROM friend_remote_keys WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?)
    }

    pub async fn friend_chain_head(&self) -> Result<Option<RemoteKey>> {
        Ok(sqlx::query_as::<_, RemoteKey>(
            "SELECT user_id AS id, previous_cursor, next_cursor, created_at
             FROM friend_remote_keys ORDER BY created_at DESC LIMIT 1",
        )
        .fetch_optional(self.pool())
        .await?)
    }

    pub async fn insert_friend_page(
        &self,
        page: &[UserData],
        link_to_next: Option<&str>,
    ) -> Result<bool> {
        if page.is_empty() {
            return Ok(true);
        }

        let mut tx = self.pool().begin().await?;
        let n = page.len();

        let base = match link_to_next {
            None => {
                let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM friend_remote_keys")
                    .fetch_one(&mut *tx)
                    .await?;
                if existing > 0 {
                    return Ok(false);
                }
                now_millis()
            }
            Some(anchor) => {
                let anchor_key = sqlx::query_as::<_, RemoteKey>(
                    "SELECT user_id AS id, previous_cursor, next_cursor, created_at
                     FROM friend_remote_keys WHERE user_id = ?",
                )
                .bind(anchor)
                .fetch_optional(&mut *tx)
                .await?;

                match anchor_key {
                    Some(key) if key.previous_cursor.is_none() => {}
                    _ => return Ok(false),
                }

                let floor: i64 = sqlx::query_scalar(
                    "SELECT COALESCE(MIN(created_at), ?) FROM friend_remote_keys",
                )
                .bind(now_millis())
                .fetch_one(&mut *tx)
                .await?;
                floor - n as i64
            }
        };

        for (i, user) in page.iter().enumerate() {
            let previous = page.get(i + 1).map(|u| u.user_id.as_str());
            let next = if i == 0 {
                link_to_next
            } else {
                Some(page[i - 1].user_id.as_str())
            };
            let stamp = base + (n - 1 - i) as i64;

            upsert_user_row(&mut tx, user).await?;
            sqlx::query(
                "INSERT OR REPLACE INTO friend_remote_keys
                 (user_id, previous_cursor, next_cursor, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(&user.user_id)
            .bind(previous)
            .bind(next)
            .bind(stamp)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(anchor) = link_to_next {
            sqlx::query("UPDATE friend_remote_keys SET previous_cursor = ? WHERE user_id = ?")
                .bind(&page[0].user_id)
                .bind(anchor)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        self.notify(StoreChange::Friends);
        Ok(true)
    }

    pub async fn prepend_friend(&self, user: &UserData) -> Result<bool> {
        let mut tx = self.pool().begin().await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM users WHERE user_id = ?")
            .bind(&user.user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_some() {
            return Ok(false);
        }

        let max: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(created_at), 0) FROM friend_remote_keys")
                .fetch_one(&mut *tx)
                .await?;
        let stamp = now_millis().max(max + 1);

        let head_id: Option<String> = sqlx::query_scalar(
            "SELECT user_id FROM friend_remote_keys WHERE user_id != ?
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(&user.user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let key_exists: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM friend_remote_keys WHERE user_id = ?")
                .bind(&user.user_id)
                .fetch_optional(&mut *tx)
                .await?;

        if key_exists.is_some() {
            sqlx::query(
                "UPDATE friend_remote_keys
                 SET previous_cursor = ?, next_cursor = NULL, created_at = ? WHERE user_id = ?",
            )
            .bind(head_id.as_deref())
            .bind(stamp)
            .bind(&user.user_id)
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query(
                "INSERT INTO friend_remote_keys (user_id, previous_cursor, next_cursor, created_at)
                 VALUES (?, ?, NULL, ?)",
            )
            .bind(&user.user_id)
            .bind(head_id.as_deref())
            .bind(stamp)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(ref old_head) = head_id {
            sqlx::query("UPDATE friend_remote_keys SET next_cursor = ? WHERE user_id = ?")
                .bind(&user.user_id)
                .bind(old_head)
                .execute(&mut *tx)
                .await?;
        }

        upsert_user_row(&mut tx, user).await?;
        tx.commit().await?;
        self.notify(StoreChange::Friends);
        Ok(true)
    }

    pub async fn replace_friend(&self, user: &UserData) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE users SET display_name = ?, email = ?, photo_url = ?, status = ?,
             last_seen = ?, added_at = ?, updated_at = ? WHERE user_id = ?",
        )
        .bind(&user.display_name)
        .bind(&user.email)
        .bind(&user.photo_url)
        .bind(&user.status)
        .bind(user.last_seen)
        .bind(user.added_at)
        .bind(now_millis())
        .bind(&user.user_id)
        .execute(self.pool())
        .await?;

        let changed = result.rows_affected() > 0;
        if changed {
            self.notify(StoreChange::Friends);
        }
        Ok(changed)
    }

    pub async fn remove_friend(&self, user_id: &str) -> Result<bool> {
        let mut tx = self.pool().begin().await?;

        let entity_rows = sqlx::query("DELETE FROM users WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let key_rows = sqlx::query("DELETE FROM friend_remote_keys WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        let removed = entity_rows > 0 || key_rows > 0;
        if removed {
            self.notify(StoreChange::Friends);
        }
        Ok(removed)
    }
}

async fn upsert_user_row(tx: &mut Transaction<'_, Sqlite>, user: &UserData) -> Result<()> {
    sqlx::query(
        "INSERT OR REPLACE INTO users
         (user_id, display_name, email, photo_url, status, last_seen, added_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&user.user_id)
    .bind(&user.display_name)
    .bind(&user.email)
    .bind(&user.photo_url)
    .bind(&user.status)
    .bind(user.last_seen)
    .bind(user.added_at)
    .bind(now_millis())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn friend(id: &str, added_at: i64) -> UserData {
        UserData {
            user_id: id.to_string(),
            display_name: Some(format!("user {id}")),
            email: Some(format!("{id}@example.com")),
            photo_url: None,
            status: None,
            last_seen: 0,
            added_at,
        }
    }

    #[tokio::test]
    async fn friends_page_in_insertion_order() {
        let db = PigeonDb::in_memory().await.unwrap();
        db.insert_friend_page(&[friend("u3", 30), friend("u2", 20), friend("u1", 10)], None)
            .await
            .unwrap();

        let page = db.friend_page(2, 0).await.unwrap();
        let ids: Vec<_> = page.iter().map(|u| u.user_id.as_str()).collect();
        assert_eq!(ids, ["u3", "u2"]);

        assert_eq!(db.friend_chain_head().await.unwrap().unwrap().id, "u3");
        let tail = db.friend_remote_key("u1").await.unwrap().unwrap();
        assert_eq!(tail.previous_cursor, None);
        assert_eq!(tail.next_cursor.as_deref(), Some("u2"));
    }

    #[tokio::test]
    async fn removal_is_atomic() {
        let db = PigeonDb::in_memory().await.unwrap();
        db.insert_friend_page(&[friend("u2", 20), friend("u1", 10)], None)
            .await
            .unwrap();

        assert!(db.remove_friend("u2").await.unwrap());
        assert!(db.get_friend("u2").await.unwrap().is_none());
        assert!(db.friend_remote_key("u2").await.unwrap().is_none());

        // Never an entity without its key or a key without its entity.
        assert_eq!(db.friend_count().await.unwrap(), 1);
        assert!(db.friend_remote_key("u1").await.unwrap().is_some());
    }
}
