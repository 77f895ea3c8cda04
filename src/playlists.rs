//! Playlist membership: creation seeded with one video, ownership-gated
//! title edits, duplicate-free membership, and a delete guard that only lets
//! empty playlists go.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::store::{self, PlaylistRecord, Store};

pub const DEFAULT_PAGE: i64 = 1;
/// Page size the listing falls back to. Small on purpose; the frontend lays
/// playlists out four to a row.
pub const DEFAULT_PAGE_SIZE: i64 = 4;

/// Optional edits for `add_video`: a replacement title, a new member, or
/// both in one call.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistEdit {
    pub title: Option<String>,
    pub video_id: Option<String>,
}

/// One page of the global playlist listing, newest first.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistPage {
    pub playlists: Vec<PlaylistRecord>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub has_more: bool,
}

pub fn create_with_video(
    store: &Store,
    owner_id: &str,
    video_id: &str,
    title: &str,
) -> ServiceResult<PlaylistRecord> {
    if title.trim().is_empty() {
        return Err(ServiceError::validation("playlist title is required"));
    }

    store.with_tx(|tx| {
        if store::get_account(tx, owner_id)?.is_none() {
            return Err(ServiceError::not_found("account not found"));
        }
        if store::get_video(tx, video_id)?.is_none() {
            return Err(ServiceError::not_found("video not found"));
        }
        let record = PlaylistRecord {
            id: Uuid::new_v4().to_string(),
            user_id: owner_id.to_owned(),
            title: title.to_owned(),
            video_ids: vec![video_id.to_owned()],
            created_at: Utc::now(),
            videos: None,
        };
        store::insert_playlist(tx, &record)?;
        Ok(record)
    })
}

/// Read-only projection with member video summaries in playlist order.
pub fn get_playlist(store: &Store, playlist_id: &str) -> ServiceResult<PlaylistRecord> {
    store.with_conn(|conn| {
        let mut playlist = store::get_playlist(conn, playlist_id)?
            .ok_or_else(|| ServiceError::not_found("playlist not found"))?;
        playlist.videos = Some(store::video_summaries(conn, &playlist.video_ids)?);
        Ok(playlist)
    })
}

pub fn list_page(
    store: &Store,
    page: Option<i64>,
    limit: Option<i64>,
) -> ServiceResult<PlaylistPage> {
    let page = page.unwrap_or(DEFAULT_PAGE).max(1);
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).max(1);
    let offset = (page - 1) * limit;

    store.with_conn(|conn| {
        let playlists = store::list_playlists_page(conn, limit, offset)?;
        let total = store::count_playlists(conn)?;
        Ok(PlaylistPage {
            playlists,
            page,
            limit,
            total,
            has_more: page * limit < total,
        })
    })
}

/// Applies a title replacement and/or appends a new member. Appending an id
/// that is already a member is a conflict; the membership sequence never
/// carries a duplicate.
pub fn add_video(
    store: &Store,
    caller_id: &str,
    playlist_id: &str,
    edit: PlaylistEdit,
) -> ServiceResult<PlaylistRecord> {
    store.with_tx(|tx| {
        let mut playlist = store::get_playlist(tx, playlist_id)?
            .ok_or_else(|| ServiceError::not_found("playlist not found"))?;
        if playlist.user_id != caller_id {
            return Err(ServiceError::forbidden(
                "you are not authorized to update this playlist",
            ));
        }

        if let Some(title) = edit.title {
            if title.trim().is_empty() {
                return Err(ServiceError::validation("playlist title is required"));
            }
            playlist.title = title;
        }

        if let Some(video_id) = edit.video_id {
            if store::get_video(tx, &video_id)?.is_none() {
                return Err(ServiceError::not_found("video not found"));
            }
            if playlist.video_ids.iter().any(|id| id == &video_id) {
                return Err(ServiceError::conflict("video already exists in playlist"));
            }
            playlist.video_ids.push(video_id);
        }

        store::update_playlist(tx, &playlist)?;
        Ok(playlist)
    })
}

pub fn remove_video(
    store: &Store,
    caller_id: &str,
    playlist_id: &str,
    video_id: Option<&str>,
) -> ServiceResult<PlaylistRecord> {
    let video_id = video_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ServiceError::validation("video id is required"))?;

    store.with_tx(|tx| {
        let mut playlist = store::get_playlist(tx, playlist_id)?
            .ok_or_else(|| ServiceError::not_found("playlist not found"))?;
        if playlist.user_id != caller_id {
            return Err(ServiceError::forbidden(
                "you are not authorized to update this playlist",
            ));
        }
        if !playlist.video_ids.iter().any(|id| id == video_id) {
            return Err(ServiceError::not_found("video not found in playlist"));
        }

        playlist.video_ids.retain(|id| id != video_id);
        store::update_playlist(tx, &playlist)?;
        Ok(playlist)
    })
}

/// Owner-gated delete, only permitted once the membership is empty.
pub fn delete_playlist(store: &Store, caller_id: &str, playlist_id: &str) -> ServiceResult<()> {
    store.with_tx(|tx| {
        let playlist = store::get_playlist(tx, playlist_id)?
            .ok_or_else(|| ServiceError::not_found("playlist not found"))?;
        if playlist.user_id != caller_id {
            return Err(ServiceError::forbidden(
                "you are not authorized to update this playlist",
            ));
        }
        if !playlist.video_ids.is_empty() {
            return Err(ServiceError::conflict("this playlist is not empty"));
        }
        store::delete_playlist(tx, playlist_id)?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{self, NewSignup, UploadedFile};
    use crate::media::MediaStore;
    use crate::store::{AccountRecord, VideoRecord};
    use crate::videos::{self, NewVideo};
    use tempfile::tempdir;

    fn temp_backend() -> (tempfile::TempDir, Store, MediaStore) {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("test.db")).unwrap();
        let media = MediaStore::open(dir.path().join("media")).unwrap();
        (dir, store, media)
    }

    fn register(store: &Store, media: &MediaStore, name: &str, email: &str) -> AccountRecord {
        accounts::signup(
            store,
            media,
            NewSignup {
                channel_name: name.into(),
                email: email.into(),
                phone: String::new(),
                password: "hunter2".into(),
                logo: UploadedFile {
                    file_name: "logo.png".into(),
                    bytes: b"png".to_vec(),
                },
            },
        )
        .unwrap()
    }

    fn upload_sample(store: &Store, media: &MediaStore, owner: &str, title: &str) -> VideoRecord {
        videos::upload(
            store,
            media,
            owner,
            NewVideo {
                title: title.into(),
                description: String::new(),
                category: "tech".into(),
                tags: Vec::new(),
                video: UploadedFile {
                    file_name: "clip.mp4".into(),
                    bytes: b"mp4".to_vec(),
                },
                thumbnail: UploadedFile {
                    file_name: "cover.jpg".into(),
                    bytes: b"jpg".to_vec(),
                },
            },
        )
        .unwrap()
    }

    #[test]
    fn create_requires_title_and_existing_video() {
        let (_dir, store, media) = temp_backend();
        let owner = register(&store, &media, "Owner", "o@example.com");
        let video = upload_sample(&store, &media, &owner.id, "Clip");

        assert!(matches!(
            create_with_video(&store, &owner.id, &video.id, "  "),
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            create_with_video(&store, &owner.id, "ghost", "Mix"),
            Err(ServiceError::NotFound(_))
        ));

        let playlist = create_with_video(&store, &owner.id, &video.id, "Mix").unwrap();
        assert_eq!(playlist.video_ids, vec![video.id.clone()]);
    }

    #[test]
    fn add_video_appends_and_rejects_duplicates() {
        let (_dir, store, media) = temp_backend();
        let owner = register(&store, &media, "Owner", "o@example.com");
        let first = upload_sample(&store, &media, &owner.id, "One");
        let second = upload_sample(&store, &media, &owner.id, "Two");
        let playlist = create_with_video(&store, &owner.id, &first.id, "Mix").unwrap();

        let updated = add_video(
            &store,
            &owner.id,
            &playlist.id,
            PlaylistEdit {
                video_id: Some(second.id.clone()),
                ..PlaylistEdit::default()
            },
        )
        .unwrap();
        assert_eq!(updated.video_ids, vec![first.id.clone(), second.id.clone()]);

        let duplicate = add_video(
            &store,
            &owner.id,
            &playlist.id,
            PlaylistEdit {
                video_id: Some(second.id.clone()),
                ..PlaylistEdit::default()
            },
        );
        assert!(matches!(duplicate, Err(ServiceError::Conflict(_))));

        let reloaded = get_playlist(&store, &playlist.id).unwrap();
        let mut unique = reloaded.video_ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), reloaded.video_ids.len());
    }

    #[test]
    fn add_video_renames_but_rejects_empty_title() {
        let (_dir, store, media) = temp_backend();
        let owner = register(&store, &media, "Owner", "o@example.com");
        let video = upload_sample(&store, &media, &owner.id, "One");
        let playlist = create_with_video(&store, &owner.id, &video.id, "Mix").unwrap();

        let renamed = add_video(
            &store,
            &owner.id,
            &playlist.id,
            PlaylistEdit {
                title: Some("Better Mix".into()),
                ..PlaylistEdit::default()
            },
        )
        .unwrap();
        assert_eq!(renamed.title, "Better Mix");

        let rejected = add_video(
            &store,
            &owner.id,
            &playlist.id,
            PlaylistEdit {
                title: Some("".into()),
                ..PlaylistEdit::default()
            },
        );
        assert!(matches!(rejected, Err(ServiceError::Validation(_))));
    }

    #[test]
    fn membership_edits_are_owner_gated() {
        let (_dir, store, media) = temp_backend();
        let owner = register(&store, &media, "Owner", "o@example.com");
        let other = register(&store, &media, "Other", "x@example.com");
        let video = upload_sample(&store, &media, &owner.id, "One");
        let playlist = create_with_video(&store, &owner.id, &video.id, "Mix").unwrap();

        let add = add_video(
            &store,
            &other.id,
            &playlist.id,
            PlaylistEdit {
                title: Some("Hijack".into()),
                ..PlaylistEdit::default()
            },
        );
        assert!(matches!(add, Err(ServiceError::Forbidden(_))));

        let remove = remove_video(&store, &other.id, &playlist.id, Some(&video.id));
        assert!(matches!(remove, Err(ServiceError::Forbidden(_))));

        let delete = delete_playlist(&store, &other.id, &playlist.id);
        assert!(matches!(delete, Err(ServiceError::Forbidden(_))));
    }

    #[test]
    fn remove_video_validates_input_and_membership() {
        let (_dir, store, media) = temp_backend();
        let owner = register(&store, &media, "Owner", "o@example.com");
        let video = upload_sample(&store, &media, &owner.id, "One");
        let playlist = create_with_video(&store, &owner.id, &video.id, "Mix").unwrap();

        assert!(matches!(
            remove_video(&store, &owner.id, &playlist.id, None),
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            remove_video(&store, &owner.id, &playlist.id, Some("ghost")),
            Err(ServiceError::NotFound(_))
        ));

        let removed = remove_video(&store, &owner.id, &playlist.id, Some(&video.id)).unwrap();
        assert!(removed.video_ids.is_empty());
    }

    #[test]
    fn delete_guard_requires_empty_membership() {
        let (_dir, store, media) = temp_backend();
        let owner = register(&store, &media, "Owner", "o@example.com");
        let video = upload_sample(&store, &media, &owner.id, "One");
        let playlist = create_with_video(&store, &owner.id, &video.id, "Mix").unwrap();

        assert!(matches!(
            delete_playlist(&store, &owner.id, &playlist.id),
            Err(ServiceError::Conflict(_))
        ));

        remove_video(&store, &owner.id, &playlist.id, Some(&video.id)).unwrap();
        delete_playlist(&store, &owner.id, &playlist.id).unwrap();

        assert!(matches!(
            get_playlist(&store, &playlist.id),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn listing_defaults_to_first_page_of_four_newest() {
        let (_dir, store, media) = temp_backend();
        let owner = register(&store, &media, "Owner", "o@example.com");
        let video = upload_sample(&store, &media, &owner.id, "One");
        for n in 0..5 {
            create_with_video(&store, &owner.id, &video.id, &format!("Mix {n}")).unwrap();
        }

        let page = list_page(&store, None, None).unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(page.playlists.len(), 4);
        assert_eq!(page.total, 5);
        assert!(page.has_more);
        assert_eq!(page.playlists[0].title, "Mix 4");

        let rest = list_page(&store, Some(2), None).unwrap();
        assert_eq!(rest.playlists.len(), 1);
        assert!(!rest.has_more);
    }

    #[test]
    fn get_playlist_projects_member_summaries() {
        let (_dir, store, media) = temp_backend();
        let owner = register(&store, &media, "Owner", "o@example.com");
        let first = upload_sample(&store, &media, &owner.id, "One");
        let second = upload_sample(&store, &media, &owner.id, "Two");
        let playlist = create_with_video(&store, &owner.id, &first.id, "Mix").unwrap();
        add_video(
            &store,
            &owner.id,
            &playlist.id,
            PlaylistEdit {
                video_id: Some(second.id.clone()),
                ..PlaylistEdit::default()
            },
        )
        .unwrap();

        let projected = get_playlist(&store, &playlist.id).unwrap();
        let summaries = projected.videos.expect("summaries projected");
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].title, "One");
        assert_eq!(summaries[1].title, "Two");
    }

    /// The full platform walk: subscribe, react both ways, empty the
    /// playlist, then delete it.
    #[test]
    fn full_flow_subscribe_react_and_delete_emptied_playlist() {
        let (_dir, store, media) = temp_backend();
        let a = register(&store, &media, "A", "a@example.com");
        let b = register(&store, &media, "B", "b@example.com");
        let video = upload_sample(&store, &media, &b.id, "Clip");

        accounts::subscribe(&store, &a.id, &b.id).unwrap();
        assert_eq!(accounts::get_account(&store, &b.id).unwrap().subscribers, 1);

        videos::like(&store, &a.id, &video.id).unwrap();
        let liked = videos::get(&store, &video.id).unwrap();
        assert_eq!((liked.likes, liked.dislikes), (1, 0));

        videos::dislike(&store, &a.id, &video.id).unwrap();
        let disliked = videos::get(&store, &video.id).unwrap();
        assert_eq!((disliked.likes, disliked.dislikes), (0, 1));

        let playlist = create_with_video(&store, &a.id, &video.id, "Watch Later").unwrap();
        let emptied = remove_video(&store, &a.id, &playlist.id, Some(&video.id)).unwrap();
        assert!(emptied.video_ids.is_empty());

        delete_playlist(&store, &a.id, &playlist.id).unwrap();
        assert!(matches!(
            get_playlist(&store, &playlist.id),
            Err(ServiceError::NotFound(_))
        ));
    }
}
