//! Comments on videos: creation, per-video listing with the author's channel
//! projected in, and author-gated edit/delete.

use chrono::Utc;
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::store::{self, CommentRecord, Store};

pub fn create(
    store: &Store,
    caller_id: &str,
    video_id: &str,
    text: &str,
) -> ServiceResult<CommentRecord> {
    if text.trim().is_empty() {
        return Err(ServiceError::validation("comment text is required"));
    }

    store.with_tx(|tx| {
        if store::get_account(tx, caller_id)?.is_none() {
            return Err(ServiceError::not_found("account not found"));
        }
        if store::get_video(tx, video_id)?.is_none() {
            return Err(ServiceError::not_found("video not found"));
        }
        let record = CommentRecord {
            id: Uuid::new_v4().to_string(),
            video_id: video_id.to_owned(),
            user_id: caller_id.to_owned(),
            comment_text: text.to_owned(),
            created_at: Utc::now(),
            author: None,
        };
        store::insert_comment(tx, &record)?;
        Ok(record)
    })
}

/// Comments for a video, oldest first, each carrying the authoring channel.
pub fn for_video(store: &Store, video_id: &str) -> ServiceResult<Vec<CommentRecord>> {
    store.with_conn(|conn| {
        if store::get_video(conn, video_id)?.is_none() {
            return Err(ServiceError::not_found("video not found"));
        }
        store::comments_for_video(conn, video_id)
    })
}

pub fn update(
    store: &Store,
    caller_id: &str,
    comment_id: &str,
    text: &str,
) -> ServiceResult<CommentRecord> {
    if text.trim().is_empty() {
        return Err(ServiceError::validation("comment text is required"));
    }

    store.with_tx(|tx| {
        let mut comment = store::get_comment(tx, comment_id)?
            .ok_or_else(|| ServiceError::not_found("comment not found"))?;
        if comment.user_id != caller_id {
            return Err(ServiceError::forbidden(
                "you are not authorized to update this comment",
            ));
        }
        store::update_comment_text(tx, comment_id, text)?;
        comment.comment_text = text.to_owned();
        Ok(comment)
    })
}

pub fn delete(store: &Store, caller_id: &str, comment_id: &str) -> ServiceResult<()> {
    store.with_tx(|tx| {
        let comment = store::get_comment(tx, comment_id)?
            .ok_or_else(|| ServiceError::not_found("comment not found"))?;
        if comment.user_id != caller_id {
            return Err(ServiceError::forbidden(
                "you are not authorized to delete this comment",
            ));
        }
        store::delete_comment(tx, comment_id)?;
        Ok(())
    })
}
