use std::path::PathBuf;

use directories::ProjectDirs;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite, SqlitePool};
use tokio::sync::broadcast;

use pigeon_core::{ProfileData, Screen};

use crate::Result;
use crate::error::DbError;
use crate::models::{AppSettings, Profile};
use crate::notifier::{StoreChange, StoreNotifier};
use crate::schema::SCHEMA;

/// The local store: one SQLite database holding the cached collections,
/// their remote-key chains, the profile and the app-settings singleton.
pub struct PigeonDb {
    pool: Pool<Sqlite>,
    notifier: StoreNotifier,
}

impl PigeonDb {
    pub async fn new() -> Result<Self> {
        let db_path = Self::default_db_path()?;

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
        let pool = SqlitePool::connect(&db_url).await?;

        tracing::info!("Local store initialized at {}", db_path.display());

        Self::from_pool(pool).await
    }

    pub async fn new_with_path(path: &str) -> Result<Self> {
        let db_url = format!("sqlite:{}?mode=rwc", path);
        let pool = SqlitePool::connect(&db_url).await?;
        Self::from_pool(pool).await
    }

    /// In-memory store for tests. The pool is pinned to one connection so
    /// every caller sees the same `:memory:` database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: Pool<Sqlite>) -> Result<Self> {
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        sqlx::query("INSERT OR IGNORE INTO app_settings (id) VALUES (0)")
            .execute(&pool)
            .await?;

        Ok(Self {
            pool,
            notifier: StoreNotifier::new(),
        })
    }

    fn default_db_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("im", "pigeon", "pigeon").ok_or(DbError::DataDir)?;
        Ok(dirs.data_dir().join("pigeon.db"))
    }

    pub(crate) fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Stream of committed collection mutations, for paged-view refresh.
    pub fn changes(&self) -> broadcast::Receiver<StoreChange> {
        self.notifier.subscribe()
    }

    pub(crate) fn notify(&self, change: StoreChange) {
        self.notifier.notify(change);
    }

    // ------------------------------------------------------------------
    // App settings (singleton row, id 0)
    // ------------------------------------------------------------------

    pub async fn settings(&self) -> Result<AppSettings> {
        Ok(
            sqlx::query_as::<_, AppSettings>("SELECT * FROM app_settings WHERE id = 0")
                .fetch_one(&self.pool)
                .await?,
        )
    }

    pub async fn set_current_screen(
        &self,
        screen: Screen,
        open_chat_id: Option<&str>,
    ) -> Result<()> {
        sqlx::query("UPDATE app_settings SET current_screen = ?, open_chat_id = ? WHERE id = 0")
            .bind(screen.as_str())
            .bind(open_chat_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_email_verified(&self, verified: bool) -> Result<()> {
        sqlx::query("UPDATE app_settings SET email_verified = ? WHERE id = 0")
            .bind(verified)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Profile
    // ------------------------------------------------------------------

    pub async fn save_profile(&self, profile: &ProfileData) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO profile (user_id, display_name, email, photo_url, status, last_seen, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(user_id) DO UPDATE SET
                 display_name = excluded.display_name,
                 email = excluded.email,
                 photo_url = excluded.photo_url,
                 status = excluded.status,
                 last_seen = excluded.last_seen,
                 updated_at = excluded.updated_at"#,
        )
        .bind(&profile.user_id)
        .bind(&profile.display_name)
        .bind(&profile.email)
        .bind(&profile.photo_url)
        .bind(&profile.status)
        .bind(profile.last_seen)
        .bind(now_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_profile(&self) -> Result<Option<ProfileData>> {
        let row = sqlx::query_as::<_, Profile>("SELECT * FROM profile LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Profile::into_data))
    }

    pub async fn set_profile_last_seen(&self, last_seen: i64) -> Result<()> {
        sqlx::query("UPDATE profile SET last_seen = ?, updated_at = ?")
            .bind(last_seen)
            .bind(now_millis())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub(crate) fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
