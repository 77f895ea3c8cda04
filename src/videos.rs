//! Video upload, metadata edits, queries, the view counter and the
//! like/dislike reaction state.
//!
//! Reaction state is denormalized as two id sets plus two counters on the
//! video record. The sets are mutually exclusive per account; every reaction
//! mutation rewrites sets and counters inside one transaction so they cannot
//! drift apart.

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::accounts::UploadedFile;
use crate::error::{ServiceError, ServiceResult};
use crate::media::{MediaKind, MediaStore};
use crate::store::{self, Store, VideoRecord};

/// Validated upload payload: metadata plus the two media assets.
#[derive(Debug)]
pub struct NewVideo {
    pub title: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub video: UploadedFile,
    pub thumbnail: UploadedFile,
}

/// Optional metadata edits for `update`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
}

pub fn upload(
    store: &Store,
    media: &MediaStore,
    caller_id: &str,
    new: NewVideo,
) -> ServiceResult<VideoRecord> {
    if new.title.trim().is_empty() {
        return Err(ServiceError::validation("title is required"));
    }

    store.with_tx(|tx| {
        if store::get_account(tx, caller_id)?.is_none() {
            return Err(ServiceError::not_found("account not found"));
        }
        let stored_video = media.store(MediaKind::Video, &new.video.file_name, &new.video.bytes)?;
        let stored_thumbnail = media.store(
            MediaKind::Thumbnail,
            &new.thumbnail.file_name,
            &new.thumbnail.bytes,
        )?;
        let record = VideoRecord {
            id: Uuid::new_v4().to_string(),
            user_id: caller_id.to_owned(),
            title: new.title.clone(),
            description: new.description.clone(),
            video_url: stored_video.url,
            video_id: stored_video.object_id,
            thumbnail_url: stored_thumbnail.url,
            thumbnail_id: stored_thumbnail.object_id,
            category: new.category.clone(),
            tags: new.tags.clone(),
            likes: 0,
            dislikes: 0,
            views: 0,
            liked_by: Vec::new(),
            disliked_by: Vec::new(),
            created_at: Utc::now(),
            channel: None,
        };
        store::insert_video(tx, &record)?;
        Ok(record)
    })
}

pub fn update(
    store: &Store,
    media: &MediaStore,
    caller_id: &str,
    video_id: &str,
    update: VideoUpdate,
    new_thumbnail: Option<UploadedFile>,
) -> ServiceResult<VideoRecord> {
    store.with_tx(|tx| {
        let mut video = store::get_video(tx, video_id)?
            .ok_or_else(|| ServiceError::not_found("video not found"))?;
        if video.user_id != caller_id {
            return Err(ServiceError::forbidden(
                "you are not authorized to update this video",
            ));
        }

        if let Some(thumbnail) = new_thumbnail {
            media.delete(&video.thumbnail_id)?;
            let stored = media.store(MediaKind::Thumbnail, &thumbnail.file_name, &thumbnail.bytes)?;
            video.thumbnail_url = stored.url;
            video.thumbnail_id = stored.object_id;
        }

        if let Some(title) = update.title {
            if title.trim().is_empty() {
                return Err(ServiceError::validation("title is required"));
            }
            video.title = title;
        }
        if let Some(description) = update.description {
            video.description = description;
        }
        if let Some(category) = update.category {
            video.category = category;
        }
        if let Some(tags) = update.tags {
            video.tags = tags;
        }

        store::update_video(tx, &video)?;
        Ok(video)
    })
}

/// Owner-gated delete; both stored media objects are purged with the record.
pub fn delete(
    store: &Store,
    media: &MediaStore,
    caller_id: &str,
    video_id: &str,
) -> ServiceResult<VideoRecord> {
    store.with_tx(|tx| {
        let video = store::get_video(tx, video_id)?
            .ok_or_else(|| ServiceError::not_found("video not found"))?;
        if video.user_id != caller_id {
            return Err(ServiceError::forbidden(
                "you are not authorized to delete this video",
            ));
        }
        media.delete(&video.video_id)?;
        media.delete(&video.thumbnail_id)?;
        store::delete_video(tx, video_id)?;
        Ok(video)
    })
}

/// Single video with its owning channel projected in.
pub fn get(store: &Store, video_id: &str) -> ServiceResult<VideoRecord> {
    store
        .with_conn(|conn| store::get_video_with_channel(conn, video_id))?
        .ok_or_else(|| ServiceError::not_found("video not found"))
}

pub fn own_videos(store: &Store, caller_id: &str) -> ServiceResult<Vec<VideoRecord>> {
    store.with_conn(|conn| store::list_videos_by_owner(conn, caller_id))
}

pub fn by_category(store: &Store, category: &str) -> ServiceResult<Vec<VideoRecord>> {
    store.with_conn(|conn| store::list_videos_by_category(conn, category))
}

/// A channel's uploads, newest first. An unknown channel and a channel with
/// no uploads both surface as `NotFound`.
pub fn channel_videos(store: &Store, channel_id: &str) -> ServiceResult<Vec<VideoRecord>> {
    let videos = store.with_conn(|conn| {
        if store::get_account(conn, channel_id)?.is_none() {
            return Err(ServiceError::not_found("channel not found"));
        }
        store::list_videos_by_owner(conn, channel_id)
    })?;
    if videos.is_empty() {
        return Err(ServiceError::not_found("no videos found for this channel"));
    }
    Ok(videos)
}

/// Uploads from every channel the caller follows, newest first.
pub fn subscribed_feed(store: &Store, caller_id: &str) -> ServiceResult<Vec<VideoRecord>> {
    store.with_conn(|conn| {
        let caller = store::get_account(conn, caller_id)?
            .ok_or_else(|| ServiceError::not_found("account not found"))?;
        store::list_videos_by_owners(conn, &caller.subscribed_channels)
    })
}

/// Marks the video liked by `account_id`. A standing dislike from the same
/// account is moved across in the same transaction. Liking twice is a
/// conflict, not a no-op.
pub fn like(store: &Store, account_id: &str, video_id: &str) -> ServiceResult<VideoRecord> {
    store.with_tx(|tx| {
        let mut video = store::get_video(tx, video_id)?
            .ok_or_else(|| ServiceError::not_found("video not found"))?;
        if video.liked_by.iter().any(|id| id == account_id) {
            return Err(ServiceError::conflict("you have already liked this video"));
        }
        if let Some(pos) = video.disliked_by.iter().position(|id| id == account_id) {
            video.disliked_by.remove(pos);
            video.dislikes -= 1;
        }
        video.likes += 1;
        video.liked_by.push(account_id.to_owned());
        store::update_video(tx, &video)?;
        Ok(video)
    })
}

/// Mirror of `like` with the two reaction kinds swapped.
pub fn dislike(store: &Store, account_id: &str, video_id: &str) -> ServiceResult<VideoRecord> {
    store.with_tx(|tx| {
        let mut video = store::get_video(tx, video_id)?
            .ok_or_else(|| ServiceError::not_found("video not found"))?;
        if video.disliked_by.iter().any(|id| id == account_id) {
            return Err(ServiceError::conflict(
                "you have already disliked this video",
            ));
        }
        if let Some(pos) = video.liked_by.iter().position(|id| id == account_id) {
            video.liked_by.remove(pos);
            video.likes -= 1;
        }
        video.dislikes += 1;
        video.disliked_by.push(account_id.to_owned());
        store::update_video(tx, &video)?;
        Ok(video)
    })
}

/// Unguarded monotonic view bump; every call counts, repeats included.
pub fn record_view(store: &Store, video_id: &str) -> ServiceResult<i64> {
    store
        .with_tx(|tx| store::increment_views(tx, video_id))?
        .ok_or_else(|| ServiceError::not_found("video not found"))
}
