use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
    str::FromStr,
};

use shared::domain::{MomentId, ReplyId, UserId, VisionId};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct StoredUser {
    pub id: UserId,
    pub username: String,
    pub full_name: String,
    pub avatar_url: Option<String>,
    pub groups: Vec<String>,
    pub visible_on_home: bool,
    pub date_joined: DateTime<Utc>,
}

/// Author or supporter reference joined from the users table.
#[derive(Debug, Clone)]
pub struct StoredUserRef {
    pub id: UserId,
    pub username: String,
    pub full_name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StoredVision {
    pub id: VisionId,
    pub author: StoredUserRef,
    pub category: Option<String>,
    pub text: String,
    pub featured: bool,
    pub inspiration_id: Option<MomentId>,
    pub tweet_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StoredReply {
    pub id: ReplyId,
    pub vision_id: VisionId,
    pub author: StoredUserRef,
    pub text: String,
    pub tweet_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StoredMoment {
    pub id: MomentId,
    pub tweet_id: Option<String>,
    pub username: String,
    pub text: String,
    pub media_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Upserts on username. Repeat logins refresh the display name and
    /// keep the old avatar when the new one is absent.
    pub async fn create_user(
        &self,
        username: &str,
        full_name: &str,
        avatar_url: Option<&str>,
    ) -> Result<UserId> {
        let rec = sqlx::query(
            "INSERT INTO users (username, full_name, avatar_url) VALUES (?, ?, ?)
             ON CONFLICT(username) DO UPDATE SET
                full_name = excluded.full_name,
                avatar_url = COALESCE(excluded.avatar_url, users.avatar_url)
             RETURNING id",
        )
        .bind(username)
        .bind(full_name)
        .bind(avatar_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(UserId(rec.get::<i64, _>(0)))
    }

    pub async fn get_user(&self, user_id: UserId) -> Result<Option<StoredUser>> {
        let row = sqlx::query(
            "SELECT id, username, full_name, avatar_url, visible_on_home, date_joined
             FROM users WHERE id = ?",
        )
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let groups = self.groups_for_user(user_id).await?;
        Ok(Some(user_from_row(&row, groups)))
    }

    pub async fn user_id_for_username(&self, username: &str) -> Result<Option<UserId>> {
        let row = sqlx::query("SELECT id FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| UserId(r.get::<i64, _>(0))))
    }

    pub async fn list_users(&self, visible_only: bool) -> Result<Vec<StoredUser>> {
        let sql = if visible_only {
            "SELECT id, username, full_name, avatar_url, visible_on_home, date_joined
             FROM users WHERE visible_on_home = 1 ORDER BY id"
        } else {
            "SELECT id, username, full_name, avatar_url, visible_on_home, date_joined
             FROM users ORDER BY id"
        };
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;

        let mut groups_by_user = self.all_group_memberships().await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let id = row.get::<i64, _>(0);
                let groups = groups_by_user.remove(&id).unwrap_or_default();
                user_from_row(&row, groups)
            })
            .collect())
    }

    pub async fn set_visible_on_home(&self, user_id: UserId, visible: bool) -> Result<bool> {
        let affected = sqlx::query("UPDATE users SET visible_on_home = ? WHERE id = ?")
            .bind(visible)
            .bind(user_id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    pub async fn groups_for_user(&self, user_id: UserId) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT g.name
             FROM user_groups ug
             INNER JOIN groups g ON g.id = ug.group_id
             WHERE ug.user_id = ?
             ORDER BY g.name",
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.get::<String, _>(0)).collect())
    }

    pub async fn add_user_to_group(&self, user_id: UserId, group: &str) -> Result<()> {
        sqlx::query("INSERT INTO groups (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
            .bind(group)
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "INSERT INTO user_groups (user_id, group_id)
             SELECT ?, id FROM groups WHERE name = ?
             ON CONFLICT(user_id, group_id) DO NOTHING",
        )
        .bind(user_id.0)
        .bind(group)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove_user_from_group(&self, user_id: UserId, group: &str) -> Result<()> {
        sqlx::query(
            "DELETE FROM user_groups
             WHERE user_id = ? AND group_id IN (SELECT id FROM groups WHERE name = ?)",
        )
        .bind(user_id.0)
        .bind(group)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn create_vision(
        &self,
        author: UserId,
        category: Option<&str>,
        text: &str,
        inspiration: Option<MomentId>,
    ) -> Result<VisionId> {
        let rec = sqlx::query(
            "INSERT INTO visions (author_id, category, text, inspiration_id)
             VALUES (?, ?, ?, ?)
             RETURNING id",
        )
        .bind(author.0)
        .bind(category)
        .bind(text)
        .bind(inspiration.map(|m| m.0))
        .fetch_one(&self.pool)
        .await?;
        Ok(VisionId(rec.get::<i64, _>(0)))
    }

    pub async fn get_vision(&self, vision_id: VisionId) -> Result<Option<StoredVision>> {
        let sql = format!("{VISION_SELECT} WHERE v.id = ?");
        let row = sqlx::query(&sql)
            .bind(vision_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| vision_from_row(&r)))
    }

    /// Newest first. The id tiebreak keeps ordering stable when two
    /// visions land within the same timestamp second.
    pub async fn list_visions(&self) -> Result<Vec<StoredVision>> {
        let sql = format!("{VISION_SELECT} ORDER BY v.created_at DESC, v.id DESC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(vision_from_row).collect())
    }

    pub async fn set_featured(&self, vision_id: VisionId, featured: bool) -> Result<bool> {
        let affected = sqlx::query(
            "UPDATE visions SET featured = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(featured)
        .bind(vision_id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }

    pub async fn add_supporter(&self, vision_id: VisionId, user_id: UserId) -> Result<()> {
        sqlx::query(
            "INSERT INTO vision_supporters (vision_id, user_id) VALUES (?, ?)
             ON CONFLICT(vision_id, user_id) DO NOTHING",
        )
        .bind(vision_id.0)
        .bind(user_id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove_supporter(&self, vision_id: VisionId, user_id: UserId) -> Result<()> {
        sqlx::query("DELETE FROM vision_supporters WHERE vision_id = ? AND user_id = ?")
            .bind(vision_id.0)
            .bind(user_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn supporters_for_vision(&self, vision_id: VisionId) -> Result<Vec<StoredUserRef>> {
        let rows = sqlx::query(
            "SELECT u.id, u.username, u.full_name, u.avatar_url
             FROM vision_supporters vs
             INNER JOIN users u ON u.id = vs.user_id
             WHERE vs.vision_id = ?
             ORDER BY vs.added_at, u.id",
        )
        .bind(vision_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| user_ref_from_row(r, 0)).collect())
    }

    pub async fn upsert_share(
        &self,
        vision_id: VisionId,
        user_id: UserId,
        tweet_id: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO shares (vision_id, user_id, tweet_id) VALUES (?, ?, ?)
             ON CONFLICT(vision_id, user_id) DO UPDATE SET tweet_id = excluded.tweet_id",
        )
        .bind(vision_id.0)
        .bind(user_id.0)
        .bind(tweet_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_share(&self, vision_id: VisionId, user_id: UserId) -> Result<u64> {
        let affected = sqlx::query("DELETE FROM shares WHERE vision_id = ? AND user_id = ?")
            .bind(vision_id.0)
            .bind(user_id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected)
    }

    pub async fn sharers_for_vision(&self, vision_id: VisionId) -> Result<Vec<UserId>> {
        let rows = sqlx::query("SELECT user_id FROM shares WHERE vision_id = ? ORDER BY id")
            .bind(vision_id.0)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| UserId(r.get::<i64, _>(0)))
            .collect())
    }

    pub async fn create_reply(
        &self,
        vision_id: VisionId,
        author: UserId,
        text: &str,
    ) -> Result<ReplyId> {
        let rec = sqlx::query(
            "INSERT INTO replies (vision_id, author_id, text) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(vision_id.0)
        .bind(author.0)
        .bind(text)
        .fetch_one(&self.pool)
        .await?;
        Ok(ReplyId(rec.get::<i64, _>(0)))
    }

    /// Oldest first, the reading order of a conversation.
    pub async fn replies_for_vision(&self, vision_id: VisionId) -> Result<Vec<StoredReply>> {
        let rows = sqlx::query(
            "SELECT r.id, r.vision_id, r.text, r.tweet_id, r.created_at, r.updated_at,
                    u.id, u.username, u.full_name, u.avatar_url
             FROM replies r
             INNER JOIN users u ON u.id = r.author_id
             WHERE r.vision_id = ?
             ORDER BY r.created_at, r.id",
        )
        .bind(vision_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| StoredReply {
                id: ReplyId(r.get::<i64, _>(0)),
                vision_id: VisionId(r.get::<i64, _>(1)),
                text: r.get::<String, _>(2),
                tweet_id: r.get::<Option<String>, _>(3),
                created_at: r.get::<DateTime<Utc>, _>(4),
                updated_at: r.get::<DateTime<Utc>, _>(5),
                author: user_ref_from_row(r, 6),
            })
            .collect())
    }

    /// Tweets arrive from several pollers at once, so the tweet id is
    /// the conflict key and the newest text wins.
    pub async fn upsert_moment_by_tweet_id(
        &self,
        tweet_id: &str,
        username: &str,
        text: &str,
        media_url: Option<&str>,
    ) -> Result<MomentId> {
        let rec = sqlx::query(
            "INSERT INTO moments (tweet_id, username, text, media_url) VALUES (?, ?, ?, ?)
             ON CONFLICT(tweet_id) DO UPDATE SET
                username = excluded.username,
                text = excluded.text,
                media_url = excluded.media_url,
                updated_at = CURRENT_TIMESTAMP
             RETURNING id",
        )
        .bind(tweet_id)
        .bind(username)
        .bind(text)
        .bind(media_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(MomentId(rec.get::<i64, _>(0)))
    }

    pub async fn get_moment(&self, moment_id: MomentId) -> Result<Option<StoredMoment>> {
        let row = sqlx::query(
            "SELECT id, tweet_id, username, text, media_url, created_at, updated_at
             FROM moments WHERE id = ?",
        )
        .bind(moment_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| StoredMoment {
            id: MomentId(r.get::<i64, _>(0)),
            tweet_id: r.get::<Option<String>, _>(1),
            username: r.get::<String, _>(2),
            text: r.get::<String, _>(3),
            media_url: r.get::<Option<String>, _>(4),
            created_at: r.get::<DateTime<Utc>, _>(5),
            updated_at: r.get::<DateTime<Utc>, _>(6),
        }))
    }

    async fn all_group_memberships(&self) -> Result<HashMap<i64, Vec<String>>> {
        let rows = sqlx::query(
            "SELECT ug.user_id, g.name
             FROM user_groups ug
             INNER JOIN groups g ON g.id = ug.group_id
             ORDER BY g.name",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut by_user: HashMap<i64, Vec<String>> = HashMap::new();
        for row in rows {
            by_user
                .entry(row.get::<i64, _>(0))
                .or_default()
                .push(row.get::<String, _>(1));
        }
        Ok(by_user)
    }
}

const VISION_SELECT: &str =
    "SELECT v.id, v.category, v.text, v.featured, v.inspiration_id, v.tweet_id,
            v.created_at, v.updated_at,
            u.id, u.username, u.full_name, u.avatar_url
     FROM visions v
     INNER JOIN users u ON u.id = v.author_id";

fn vision_from_row(row: &sqlx::sqlite::SqliteRow) -> StoredVision {
    StoredVision {
        id: VisionId(row.get::<i64, _>(0)),
        category: row.get::<Option<String>, _>(1),
        text: row.get::<String, _>(2),
        featured: row.get::<bool, _>(3),
        inspiration_id: row.get::<Option<i64>, _>(4).map(MomentId),
        tweet_id: row.get::<Option<String>, _>(5),
        created_at: row.get::<DateTime<Utc>, _>(6),
        updated_at: row.get::<DateTime<Utc>, _>(7),
        author: user_ref_from_row(row, 8),
    }
}

fn user_ref_from_row(row: &sqlx::sqlite::SqliteRow, offset: usize) -> StoredUserRef {
    StoredUserRef {
        id: UserId(row.get::<i64, _>(offset)),
        username: row.get::<String, _>(offset + 1),
        full_name: row.get::<String, _>(offset + 2),
        avatar_url: row.get::<Option<String>, _>(offset + 3),
    }
}

fn user_from_row(row: &sqlx::sqlite::SqliteRow, groups: Vec<String>) -> StoredUser {
    StoredUser {
        id: UserId(row.get::<i64, _>(0)),
        username: row.get::<String, _>(1),
        full_name: row.get::<String, _>(2),
        avatar_url: row.get::<Option<String>, _>(3),
        groups,
        visible_on_home: row.get::<bool, _>(4),
        date_joined: row.get::<DateTime<Utc>, _>(5),
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    if path.is_empty() || path.starts_with(':') {
        return None;
    }
    Some(PathBuf::from(path))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
