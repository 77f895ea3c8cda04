//! Record persistence layer for TubeCast.
//!
//! All structs in this module mirror how records are serialized to disk and
//! exposed to the API. SQLite is the storage engine; id sets (subscribers,
//! reactions, playlist membership) are stored as JSON array columns and kept
//! consistent with their counters by the domain operations, which run inside
//! a single transaction per mutation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, Transaction, params, params_from_iter};
use serde::{Deserialize, Serialize};

use crate::error::ServiceResult;

/// Display subset of an account, projected alongside a video or comment so
/// clients can render the owning channel without a second fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSummary {
    pub id: String,
    pub channel_name: String,
    pub logo_url: String,
    pub subscribers: i64,
}

/// Rows stored in the `accounts` table.
///
/// `subscribers` counts `subscribed_by`; the two stay in lockstep because
/// every mutation touching them commits both in one transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    pub id: String,
    pub channel_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub phone: String,
    #[serde(default, skip_serializing)]
    pub password_hash: String,
    pub logo_url: String,
    pub logo_id: String,
    pub subscribers: i64,
    #[serde(default)]
    pub subscribed_by: Vec<String>,
    #[serde(default)]
    pub subscribed_channels: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Rows stored in the `videos` table. `video_id` and `thumbnail_id` are the
/// object-storage deletion handles for the two media assets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub video_url: String,
    pub video_id: String,
    pub thumbnail_url: String,
    pub thumbnail_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub category: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub likes: i64,
    pub dislikes: i64,
    pub views: i64,
    #[serde(default)]
    pub liked_by: Vec<String>,
    #[serde(default)]
    pub disliked_by: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// Owning channel, populated by the `*_with_channel` queries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelSummary>,
}

/// Rows stored in the `playlists` table. `video_ids` is ordered but must
/// never contain a duplicate entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistRecord {
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub video_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// Member summaries, populated by `playlists::get_playlist`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub videos: Option<Vec<PlaylistVideoSummary>>,
}

/// The subset of a video a playlist projection carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistVideoSummary {
    pub id: String,
    pub title: String,
    pub thumbnail_url: String,
}

/// Rows stored in the `comments` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRecord {
    pub id: String,
    pub video_id: String,
    pub user_id: String,
    pub comment_text: String,
    pub created_at: DateTime<Utc>,
    /// Authoring channel, populated by `comments_for_video`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<ChannelSummary>,
}

/// Cloneable handle that opens a short-lived connection per operation. This
/// avoids keeping a single connection open across threads/tasks; WAL mode
/// keeps readers from blocking writers.
#[derive(Debug, Clone)]
pub struct Store {
    db_path: PathBuf,
}

impl Store {
    /// Opens (and if necessary creates) the SQLite DB and ensures the
    /// expected schema exists. Schema creation runs in a transaction so a
    /// failure leaves the DB untouched.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {}", parent.display()))?;
        }

        let mut conn = Connection::open(path)
            .with_context(|| format!("opening database {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("enabling WAL mode")?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .context("setting synchronous mode")?;

        let tx = conn.transaction().context("starting schema transaction")?;
        tx.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                channel_name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                phone TEXT NOT NULL DEFAULT '',
                password_hash TEXT NOT NULL,
                logo_url TEXT NOT NULL DEFAULT '',
                logo_id TEXT NOT NULL DEFAULT '',
                subscribers INTEGER NOT NULL DEFAULT 0,
                subscribed_by_json TEXT NOT NULL DEFAULT '[]',
                subscribed_channels_json TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS videos (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                video_url TEXT NOT NULL,
                video_id TEXT NOT NULL,
                thumbnail_url TEXT NOT NULL,
                thumbnail_id TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT '',
                tags_json TEXT NOT NULL DEFAULT '[]',
                likes INTEGER NOT NULL DEFAULT 0,
                dislikes INTEGER NOT NULL DEFAULT 0,
                views INTEGER NOT NULL DEFAULT 0,
                liked_by_json TEXT NOT NULL DEFAULT '[]',
                disliked_by_json TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES accounts(id)
            );

            CREATE TABLE IF NOT EXISTS playlists (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                video_ids_json TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES accounts(id)
            );

            CREATE TABLE IF NOT EXISTS comments (
                id TEXT PRIMARY KEY,
                video_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                comment_text TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (video_id) REFERENCES videos(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES accounts(id)
            );

            CREATE INDEX IF NOT EXISTS idx_videos_user ON videos(user_id);
            CREATE INDEX IF NOT EXISTS idx_videos_category ON videos(category);
            CREATE INDEX IF NOT EXISTS idx_comments_video ON comments(video_id);
            "#,
        )
        .context("creating tables")?;
        tx.commit().context("committing schema")?;

        Ok(Self {
            db_path: path.to_path_buf(),
        })
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("enabling foreign keys")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .context("setting busy timeout")?;
        Ok(conn)
    }

    /// Runs `f` against a dedicated connection. Read-only paths use this.
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> ServiceResult<T>,
    ) -> ServiceResult<T> {
        let conn = self.connect()?;
        f(&conn)
    }

    /// Runs `f` inside a transaction and commits on success. Every mutating
    /// operation goes through here so multi-record edits (subscribe touches
    /// two accounts) and counter/set pairs commit as one logical unit.
    pub fn with_tx<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> ServiceResult<T>,
    ) -> ServiceResult<T> {
        let mut conn = self.connect()?;
        let tx = conn
            .transaction()
            .context("starting transaction")
            .map_err(crate::error::ServiceError::Internal)?;
        let out = f(&tx)?;
        tx.commit()
            .context("committing transaction")
            .map_err(crate::error::ServiceError::Internal)?;
        Ok(out)
    }
}

const ACCOUNT_COLUMNS: &str = "id, channel_name, email, phone, password_hash, logo_url, logo_id, \
     subscribers, subscribed_by_json, subscribed_channels_json, created_at";

const VIDEO_COLUMNS: &str = "id, user_id, title, description, video_url, video_id, thumbnail_url, \
     thumbnail_id, category, tags_json, likes, dislikes, views, liked_by_json, disliked_by_json, \
     created_at";

const VIDEO_COLUMNS_QUALIFIED: &str =
    "v.id, v.user_id, v.title, v.description, v.video_url, v.video_id, v.thumbnail_url, \
     v.thumbnail_id, v.category, v.tags_json, v.likes, v.dislikes, v.views, v.liked_by_json, \
     v.disliked_by_json, v.created_at";

pub fn get_account(conn: &Connection, id: &str) -> ServiceResult<Option<AccountRecord>> {
    let mut stmt = conn.prepare(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"))?;
    let mut rows = stmt.query(params![id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_account(row)?)),
        None => Ok(None),
    }
}

pub fn get_account_by_email(conn: &Connection, email: &str) -> ServiceResult<Option<AccountRecord>> {
    let mut stmt =
        conn.prepare(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = ?1"))?;
    let mut rows = stmt.query(params![email])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_account(row)?)),
        None => Ok(None),
    }
}

pub fn insert_account(conn: &Connection, record: &AccountRecord) -> ServiceResult<()> {
    conn.execute(
        r#"
        INSERT INTO accounts (
            id, channel_name, email, phone, password_hash, logo_url, logo_id,
            subscribers, subscribed_by_json, subscribed_channels_json, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
        params![
            record.id,
            record.channel_name,
            record.email,
            record.phone,
            record.password_hash,
            record.logo_url,
            record.logo_id,
            record.subscribers,
            serde_json::to_string(&record.subscribed_by)?,
            serde_json::to_string(&record.subscribed_channels)?,
            record.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Writes back every mutable account field. `id` and `created_at` never
/// change after registration.
pub fn update_account(conn: &Connection, record: &AccountRecord) -> ServiceResult<()> {
    conn.execute(
        r#"
        UPDATE accounts SET
            channel_name = ?2, email = ?3, phone = ?4, password_hash = ?5,
            logo_url = ?6, logo_id = ?7, subscribers = ?8,
            subscribed_by_json = ?9, subscribed_channels_json = ?10
        WHERE id = ?1
        "#,
        params![
            record.id,
            record.channel_name,
            record.email,
            record.phone,
            record.password_hash,
            record.logo_url,
            record.logo_id,
            record.subscribers,
            serde_json::to_string(&record.subscribed_by)?,
            serde_json::to_string(&record.subscribed_channels)?,
        ],
    )?;
    Ok(())
}

pub fn list_accounts_by_ids(conn: &Connection, ids: &[String]) -> ServiceResult<Vec<AccountRecord>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id IN ({placeholders}) \
         ORDER BY created_at DESC, rowid DESC"
    ))?;
    let mut rows = stmt.query(params_from_iter(ids))?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        records.push(row_to_account(row)?);
    }
    Ok(records)
}

pub fn get_video(conn: &Connection, id: &str) -> ServiceResult<Option<VideoRecord>> {
    let mut stmt = conn.prepare(&format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE id = ?1"))?;
    let mut rows = stmt.query(params![id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_video(row)?)),
        None => Ok(None),
    }
}

/// Fetches a video with its owning channel's display subset joined in.
pub fn get_video_with_channel(conn: &Connection, id: &str) -> ServiceResult<Option<VideoRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {VIDEO_COLUMNS_QUALIFIED}, a.channel_name, a.logo_url, a.subscribers AS channel_subscribers \
         FROM videos v JOIN accounts a ON a.id = v.user_id WHERE v.id = ?1"
    ))?;
    let mut rows = stmt.query(params![id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_video_with_channel(row)?)),
        None => Ok(None),
    }
}

pub fn insert_video(conn: &Connection, record: &VideoRecord) -> ServiceResult<()> {
    conn.execute(
        r#"
        INSERT INTO videos (
            id, user_id, title, description, video_url, video_id, thumbnail_url,
            thumbnail_id, category, tags_json, likes, dislikes, views,
            liked_by_json, disliked_by_json, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
        "#,
        params![
            record.id,
            record.user_id,
            record.title,
            record.description,
            record.video_url,
            record.video_id,
            record.thumbnail_url,
            record.thumbnail_id,
            record.category,
            serde_json::to_string(&record.tags)?,
            record.likes,
            record.dislikes,
            record.views,
            serde_json::to_string(&record.liked_by)?,
            serde_json::to_string(&record.disliked_by)?,
            record.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Writes back every mutable video field. `id`, `user_id` and `created_at`
/// never change after upload.
pub fn update_video(conn: &Connection, record: &VideoRecord) -> ServiceResult<()> {
    conn.execute(
        r#"
        UPDATE videos SET
            title = ?2, description = ?3, video_url = ?4, video_id = ?5,
            thumbnail_url = ?6, thumbnail_id = ?7, category = ?8, tags_json = ?9,
            likes = ?10, dislikes = ?11, views = ?12,
            liked_by_json = ?13, disliked_by_json = ?14
        WHERE id = ?1
        "#,
        params![
            record.id,
            record.title,
            record.description,
            record.video_url,
            record.video_id,
            record.thumbnail_url,
            record.thumbnail_id,
            record.category,
            serde_json::to_string(&record.tags)?,
            record.likes,
            record.dislikes,
            record.views,
            serde_json::to_string(&record.liked_by)?,
            serde_json::to_string(&record.disliked_by)?,
        ],
    )?;
    Ok(())
}

pub fn delete_video(conn: &Connection, id: &str) -> ServiceResult<usize> {
    Ok(conn.execute("DELETE FROM videos WHERE id = ?1", params![id])?)
}

/// Unconditional, atomic view bump. Returns the new count, or `None` when the
/// video does not exist.
pub fn increment_views(conn: &Connection, id: &str) -> ServiceResult<Option<i64>> {
    let changed = conn.execute(
        "UPDATE videos SET views = views + 1 WHERE id = ?1",
        params![id],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    let mut stmt = conn.prepare("SELECT views FROM videos WHERE id = ?1")?;
    let mut rows = stmt.query(params![id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}

pub fn list_videos_by_owner(conn: &Connection, user_id: &str) -> ServiceResult<Vec<VideoRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {VIDEO_COLUMNS_QUALIFIED}, a.channel_name, a.logo_url, a.subscribers AS channel_subscribers \
         FROM videos v JOIN accounts a ON a.id = v.user_id WHERE v.user_id = ?1 \
         ORDER BY v.created_at DESC, v.rowid DESC"
    ))?;
    let mut rows = stmt.query(params![user_id])?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        records.push(row_to_video_with_channel(row)?);
    }
    Ok(records)
}

pub fn list_videos_by_category(conn: &Connection, category: &str) -> ServiceResult<Vec<VideoRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {VIDEO_COLUMNS} FROM videos WHERE category = ?1 \
         ORDER BY created_at DESC, rowid DESC"
    ))?;
    let mut rows = stmt.query(params![category])?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        records.push(row_to_video(row)?);
    }
    Ok(records)
}

pub fn list_videos_by_owners(conn: &Connection, owners: &[String]) -> ServiceResult<Vec<VideoRecord>> {
    if owners.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; owners.len()].join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT {VIDEO_COLUMNS} FROM videos WHERE user_id IN ({placeholders}) \
         ORDER BY created_at DESC, rowid DESC"
    ))?;
    let mut rows = stmt.query(params_from_iter(owners))?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        records.push(row_to_video(row)?);
    }
    Ok(records)
}

/// Member summaries for a playlist projection, returned in playlist order.
pub fn video_summaries(conn: &Connection, ids: &[String]) -> ServiceResult<Vec<PlaylistVideoSummary>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT id, title, thumbnail_url FROM videos WHERE id IN ({placeholders})"
    ))?;
    let mut rows = stmt.query(params_from_iter(ids))?;
    let mut found = Vec::new();
    while let Some(row) = rows.next()? {
        found.push(PlaylistVideoSummary {
            id: row.get("id")?,
            title: row.get("title")?,
            thumbnail_url: row.get("thumbnail_url")?,
        });
    }
    let mut ordered = Vec::with_capacity(found.len());
    for id in ids {
        if let Some(summary) = found.iter().find(|summary| &summary.id == id) {
            ordered.push(summary.clone());
        }
    }
    Ok(ordered)
}

pub fn get_playlist(conn: &Connection, id: &str) -> ServiceResult<Option<PlaylistRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, title, video_ids_json, created_at FROM playlists WHERE id = ?1",
    )?;
    let mut rows = stmt.query(params![id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_playlist(row)?)),
        None => Ok(None),
    }
}

pub fn insert_playlist(conn: &Connection, record: &PlaylistRecord) -> ServiceResult<()> {
    conn.execute(
        r#"
        INSERT INTO playlists (id, user_id, title, video_ids_json, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            record.id,
            record.user_id,
            record.title,
            serde_json::to_string(&record.video_ids)?,
            record.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn update_playlist(conn: &Connection, record: &PlaylistRecord) -> ServiceResult<()> {
    conn.execute(
        "UPDATE playlists SET title = ?2, video_ids_json = ?3 WHERE id = ?1",
        params![
            record.id,
            record.title,
            serde_json::to_string(&record.video_ids)?,
        ],
    )?;
    Ok(())
}

pub fn delete_playlist(conn: &Connection, id: &str) -> ServiceResult<usize> {
    Ok(conn.execute("DELETE FROM playlists WHERE id = ?1", params![id])?)
}

pub fn list_playlists_page(
    conn: &Connection,
    limit: i64,
    offset: i64,
) -> ServiceResult<Vec<PlaylistRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, title, video_ids_json, created_at FROM playlists \
         ORDER BY created_at DESC, rowid DESC LIMIT ?1 OFFSET ?2",
    )?;
    let mut rows = stmt.query(params![limit, offset])?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        records.push(row_to_playlist(row)?);
    }
    Ok(records)
}

pub fn count_playlists(conn: &Connection) -> ServiceResult<i64> {
    let mut stmt = conn.prepare("SELECT COUNT(*) FROM playlists")?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => Ok(row.get(0)?),
        None => Ok(0),
    }
}

pub fn get_comment(conn: &Connection, id: &str) -> ServiceResult<Option<CommentRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, video_id, user_id, comment_text, created_at FROM comments WHERE id = ?1",
    )?;
    let mut rows = stmt.query(params![id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_comment(row)?)),
        None => Ok(None),
    }
}

pub fn insert_comment(conn: &Connection, record: &CommentRecord) -> ServiceResult<()> {
    conn.execute(
        r#"
        INSERT INTO comments (id, video_id, user_id, comment_text, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            record.id,
            record.video_id,
            record.user_id,
            record.comment_text,
            record.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn update_comment_text(conn: &Connection, id: &str, text: &str) -> ServiceResult<()> {
    conn.execute(
        "UPDATE comments SET comment_text = ?2 WHERE id = ?1",
        params![id, text],
    )?;
    Ok(())
}

pub fn delete_comment(conn: &Connection, id: &str) -> ServiceResult<usize> {
    Ok(conn.execute("DELETE FROM comments WHERE id = ?1", params![id])?)
}

/// Comments for a video, oldest first, each with the authoring channel's
/// display subset joined in.
pub fn comments_for_video(conn: &Connection, video_id: &str) -> ServiceResult<Vec<CommentRecord>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.video_id, c.user_id, c.comment_text, c.created_at, \
                a.channel_name, a.logo_url, a.subscribers AS channel_subscribers \
         FROM comments c JOIN accounts a ON a.id = c.user_id \
         WHERE c.video_id = ?1 ORDER BY c.created_at ASC, c.rowid ASC",
    )?;
    let mut rows = stmt.query(params![video_id])?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let mut comment = row_to_comment(row)?;
        comment.author = Some(ChannelSummary {
            id: comment.user_id.clone(),
            channel_name: row.get("channel_name")?,
            logo_url: row.get("logo_url")?,
            subscribers: row.get("channel_subscribers")?,
        });
        records.push(comment);
    }
    Ok(records)
}

fn parse_timestamp(raw: &str) -> ServiceResult<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("parsing stored timestamp {raw}"))
        .map_err(crate::error::ServiceError::Internal)?;
    Ok(parsed.with_timezone(&Utc))
}

fn parse_id_list(raw: &str) -> ServiceResult<Vec<String>> {
    Ok(serde_json::from_str(raw)?)
}

fn row_to_account(row: &Row<'_>) -> ServiceResult<AccountRecord> {
    let subscribed_by_json: String = row.get("subscribed_by_json")?;
    let subscribed_channels_json: String = row.get("subscribed_channels_json")?;
    let created_at: String = row.get("created_at")?;
    Ok(AccountRecord {
        id: row.get("id")?,
        channel_name: row.get("channel_name")?,
        email: row.get("email")?,
        phone: row.get("phone")?,
        password_hash: row.get("password_hash")?,
        logo_url: row.get("logo_url")?,
        logo_id: row.get("logo_id")?,
        subscribers: row.get("subscribers")?,
        subscribed_by: parse_id_list(&subscribed_by_json)?,
        subscribed_channels: parse_id_list(&subscribed_channels_json)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn row_to_video(row: &Row<'_>) -> ServiceResult<VideoRecord> {
    let tags_json: String = row.get("tags_json")?;
    let liked_by_json: String = row.get("liked_by_json")?;
    let disliked_by_json: String = row.get("disliked_by_json")?;
    let created_at: String = row.get("created_at")?;
    Ok(VideoRecord {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        video_url: row.get("video_url")?,
        video_id: row.get("video_id")?,
        thumbnail_url: row.get("thumbnail_url")?,
        thumbnail_id: row.get("thumbnail_id")?,
        category: row.get("category")?,
        tags: serde_json::from_str(&tags_json)?,
        likes: row.get("likes")?,
        dislikes: row.get("dislikes")?,
        views: row.get("views")?,
        liked_by: parse_id_list(&liked_by_json)?,
        disliked_by: parse_id_list(&disliked_by_json)?,
        created_at: parse_timestamp(&created_at)?,
        channel: None,
    })
}

fn row_to_video_with_channel(row: &Row<'_>) -> ServiceResult<VideoRecord> {
    let mut video = row_to_video(row)?;
    video.channel = Some(ChannelSummary {
        id: video.user_id.clone(),
        channel_name: row.get("channel_name")?,
        logo_url: row.get("logo_url")?,
        subscribers: row.get("channel_subscribers")?,
    });
    Ok(video)
}

fn row_to_playlist(row: &Row<'_>) -> ServiceResult<PlaylistRecord> {
    let video_ids_json: String = row.get("video_ids_json")?;
    let created_at: String = row.get("created_at")?;
    Ok(PlaylistRecord {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        title: row.get("title")?,
        video_ids: parse_id_list(&video_ids_json)?,
        created_at: parse_timestamp(&created_at)?,
        videos: None,
    })
}

fn row_to_comment(row: &Row<'_>) -> ServiceResult<CommentRecord> {
    let created_at: String = row.get("created_at")?;
    Ok(CommentRecord {
        id: row.get("id")?,
        video_id: row.get("video_id")?,
        user_id: row.get("user_id")?,
        comment_text: row.get("comment_text")?,
        created_at: parse_timestamp(&created_at)?,
        author: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    fn sample_account(id: &str, email: &str) -> AccountRecord {
        AccountRecord {
            id: id.into(),
            channel_name: format!("channel {id}"),
            email: email.into(),
            phone: "5550000".into(),
            password_hash: "b3$x$y".into(),
            logo_url: "/media/logos/x.png".into(),
            logo_id: "logos/x.png".into(),
            subscribers: 0,
            subscribed_by: Vec::new(),
            subscribed_channels: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn account_round_trip_preserves_id_sets() {
        let (_dir, store) = temp_store();
        store
            .with_tx(|tx| {
                let mut account = sample_account("a1", "a1@example.com");
                account.subscribed_by = vec!["b1".into(), "c1".into()];
                account.subscribers = 2;
                insert_account(tx, &account)
            })
            .unwrap();

        let loaded = store
            .with_conn(|conn| get_account(conn, "a1"))
            .unwrap()
            .unwrap();
        assert_eq!(loaded.subscribers, 2);
        assert_eq!(loaded.subscribed_by, vec!["b1".to_string(), "c1".to_string()]);
        assert!(loaded.subscribed_channels.is_empty());
    }

    #[test]
    fn get_account_by_email_finds_record() {
        let (_dir, store) = temp_store();
        store
            .with_tx(|tx| insert_account(tx, &sample_account("a1", "a1@example.com")))
            .unwrap();
        let found = store
            .with_conn(|conn| get_account_by_email(conn, "a1@example.com"))
            .unwrap();
        assert!(found.is_some());
        let missing = store
            .with_conn(|conn| get_account_by_email(conn, "nobody@example.com"))
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn increment_views_missing_video_is_none() {
        let (_dir, store) = temp_store();
        let bumped = store.with_tx(|tx| increment_views(tx, "nope")).unwrap();
        assert!(bumped.is_none());
    }

    #[test]
    fn playlist_page_orders_newest_first() {
        let (_dir, store) = temp_store();
        store
            .with_tx(|tx| {
                insert_account(tx, &sample_account("a1", "a1@example.com"))?;
                for n in 0..3 {
                    insert_playlist(
                        tx,
                        &PlaylistRecord {
                            id: format!("p{n}"),
                            user_id: "a1".into(),
                            title: format!("playlist {n}"),
                            video_ids: Vec::new(),
                            created_at: Utc::now() + chrono::Duration::seconds(n),
                            videos: None,
                        },
                    )?;
                }
                Ok(())
            })
            .unwrap();

        let page = store
            .with_conn(|conn| list_playlists_page(conn, 2, 0))
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, "p2");
        assert_eq!(page[1].id, "p1");
        assert_eq!(store.with_conn(count_playlists).unwrap(), 3);
    }
}
