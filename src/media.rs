//! Local object storage for uploaded media.
//!
//! Accepts raw media bytes, files them under the media root and hands back a
//! durable URL plus a deletion handle (the root-relative path). The HTTP
//! layer streams stored files back from the same handle space.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};

pub const VIDEOS_SUBDIR: &str = "videos";
pub const THUMBNAILS_SUBDIR: &str = "thumbnails";
pub const LOGOS_SUBDIR: &str = "logos";

/// URL prefix the backend serves stored objects under.
pub const PUBLIC_PREFIX: &str = "/media";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Thumbnail,
    Logo,
}

impl MediaKind {
    fn subdir(self) -> &'static str {
        match self {
            MediaKind::Video => VIDEOS_SUBDIR,
            MediaKind::Thumbnail => THUMBNAILS_SUBDIR,
            MediaKind::Logo => LOGOS_SUBDIR,
        }
    }
}

/// Result of storing an object: the URL clients fetch it from and the handle
/// used to delete it later.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredObject {
    pub url: String,
    pub object_id: String,
}

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    /// Creates the media root and its per-kind subdirectories if missing.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        for subdir in [VIDEOS_SUBDIR, THUMBNAILS_SUBDIR, LOGOS_SUBDIR] {
            let dir = root.join(subdir);
            fs::create_dir_all(&dir)
                .with_context(|| format!("creating media directory {}", dir.display()))?;
        }
        Ok(Self { root })
    }

    /// Files `bytes` under a fresh name, keeping the original extension so
    /// mime sniffing on the way back out stays accurate.
    pub fn store(
        &self,
        kind: MediaKind,
        original_name: &str,
        bytes: &[u8],
    ) -> ServiceResult<StoredObject> {
        let extension = Path::new(original_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("bin");
        let file_name = format!("{}.{}", Uuid::new_v4(), extension);
        let object_id = format!("{}/{}", kind.subdir(), file_name);
        let path = self.root.join(kind.subdir()).join(&file_name);
        fs::write(&path, bytes)
            .with_context(|| format!("writing media object {}", path.display()))
            .map_err(ServiceError::Internal)?;
        Ok(StoredObject {
            url: format!("{PUBLIC_PREFIX}/{object_id}"),
            object_id,
        })
    }

    /// Removes a previously stored object. A handle that no longer resolves
    /// is logged and ignored so record cleanup can proceed.
    pub fn delete(&self, object_id: &str) -> ServiceResult<()> {
        let path = self.resolve_object(object_id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(object_id, "media object already gone");
                Ok(())
            }
            Err(err) => Err(ServiceError::Internal(anyhow::Error::new(err).context(
                format!("deleting media object {}", path.display()),
            ))),
        }
    }

    /// Maps a `{category}/{file}` pair from the serving route to an on-disk
    /// path, rejecting anything that could escape the media root.
    pub fn resolve(&self, category: &str, file: &str) -> ServiceResult<PathBuf> {
        if ![VIDEOS_SUBDIR, THUMBNAILS_SUBDIR, LOGOS_SUBDIR].contains(&category) {
            return Err(ServiceError::not_found("unknown media category"));
        }
        if file.is_empty()
            || file.contains('/')
            || file.contains('\\')
            || file.contains("..")
        {
            return Err(ServiceError::not_found("media object not found"));
        }
        Ok(self.root.join(category).join(file))
    }

    fn resolve_object(&self, object_id: &str) -> ServiceResult<PathBuf> {
        let (category, file) = object_id
            .split_once('/')
            .ok_or_else(|| ServiceError::not_found("malformed media handle"))?;
        self.resolve(category, file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn store_writes_object_and_reports_url() {
        let dir = tempdir().unwrap();
        let media = MediaStore::open(dir.path()).unwrap();
        let stored = media
            .store(MediaKind::Thumbnail, "cover.png", b"png-bytes")
            .unwrap();

        assert!(stored.url.starts_with("/media/thumbnails/"));
        assert!(stored.object_id.starts_with("thumbnails/"));
        assert!(stored.object_id.ends_with(".png"));

        let (category, file) = stored.object_id.split_once('/').unwrap();
        let on_disk = media.resolve(category, file).unwrap();
        assert_eq!(fs::read(on_disk).unwrap(), b"png-bytes");
    }

    #[test]
    fn store_defaults_missing_extension() {
        let dir = tempdir().unwrap();
        let media = MediaStore::open(dir.path()).unwrap();
        let stored = media.store(MediaKind::Video, "clip", b"data").unwrap();
        assert!(stored.object_id.ends_with(".bin"));
    }

    #[test]
    fn delete_removes_object_and_tolerates_repeats() {
        let dir = tempdir().unwrap();
        let media = MediaStore::open(dir.path()).unwrap();
        let stored = media.store(MediaKind::Logo, "logo.jpg", b"jpg").unwrap();

        media.delete(&stored.object_id).unwrap();
        let (category, file) = stored.object_id.split_once('/').unwrap();
        assert!(!media.resolve(category, file).unwrap().exists());

        media.delete(&stored.object_id).unwrap();
    }

    #[test]
    fn resolve_rejects_traversal() {
        let dir = tempdir().unwrap();
        let media = MediaStore::open(dir.path()).unwrap();
        assert!(media.resolve("videos", "../secret").is_err());
        assert!(media.resolve("videos", "a/b.mp4").is_err());
        assert!(media.resolve("elsewhere", "a.mp4").is_err());
    }
}
