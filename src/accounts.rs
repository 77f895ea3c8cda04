//! Account registration, credentials, profile edits and the channel
//! subscription graph.
//!
//! The subscription graph is denormalized across the two owning records:
//! the target channel keeps `subscribers` + `subscribed_by`, the caller keeps
//! `subscribed_channels`. Both sides are edited inside one transaction so the
//! symmetric invariant cannot be half-applied.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{self, Claims, TokenKey};
use crate::error::{ServiceError, ServiceResult};
use crate::media::{MediaKind, MediaStore};
use crate::store::{self, AccountRecord, Store};

/// An uploaded file as it arrives from the multipart layer.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Validated registration payload. The avatar is mandatory, matching the
/// signup form.
#[derive(Debug)]
pub struct NewSignup {
    pub channel_name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub logo: UploadedFile,
}

/// Optional field edits for `update_profile`. A password change must carry
/// the old password.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub channel_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
    pub old_password: Option<String>,
}

/// Login result: the public profile plus a fresh bearer token and the
/// caller's side of the subscription graph.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub id: String,
    pub channel_name: String,
    pub email: String,
    pub phone: String,
    pub logo_id: String,
    pub logo_url: String,
    pub token: String,
    pub subscribers: i64,
    pub subscribed_channels: Vec<String>,
}

pub fn signup(store: &Store, media: &MediaStore, signup: NewSignup) -> ServiceResult<AccountRecord> {
    if signup.channel_name.trim().is_empty() {
        return Err(ServiceError::validation("channel name is required"));
    }
    if signup.email.trim().is_empty() {
        return Err(ServiceError::validation("email is required"));
    }
    if signup.password.is_empty() {
        return Err(ServiceError::validation("password is required"));
    }

    store.with_tx(|tx| {
        if store::get_account_by_email(tx, &signup.email)?.is_some() {
            return Err(ServiceError::conflict("email already exists"));
        }
        let logo = media.store(MediaKind::Logo, &signup.logo.file_name, &signup.logo.bytes)?;
        let record = AccountRecord {
            id: Uuid::new_v4().to_string(),
            channel_name: signup.channel_name.clone(),
            email: signup.email.clone(),
            phone: signup.phone.clone(),
            password_hash: auth::hash_password(&signup.password),
            logo_url: logo.url,
            logo_id: logo.object_id,
            subscribers: 0,
            subscribed_by: Vec::new(),
            subscribed_channels: Vec::new(),
            created_at: Utc::now(),
        };
        store::insert_account(tx, &record)?;
        Ok(record)
    })
}

pub fn login(
    store: &Store,
    tokens: &TokenKey,
    email: &str,
    password: &str,
) -> ServiceResult<LoginResponse> {
    let account = store
        .with_conn(|conn| store::get_account_by_email(conn, email))?
        .ok_or_else(|| ServiceError::validation("email is not registered"))?;
    if !auth::verify_password(password, &account.password_hash) {
        return Err(ServiceError::validation("invalid password"));
    }

    let claims = Claims::new(
        &account.id,
        &account.channel_name,
        &account.email,
        &account.phone,
        &account.logo_id,
    );
    let token = tokens.issue(&claims)?;
    Ok(LoginResponse {
        id: account.id,
        channel_name: account.channel_name,
        email: account.email,
        phone: account.phone,
        logo_id: account.logo_id,
        logo_url: account.logo_url,
        token,
        subscribers: account.subscribers,
        subscribed_channels: account.subscribed_channels,
    })
}

/// Public projection of an account. The credential hash is never serialized.
pub fn get_account(store: &Store, user_id: &str) -> ServiceResult<AccountRecord> {
    store
        .with_conn(|conn| store::get_account(conn, user_id))?
        .ok_or_else(|| ServiceError::not_found("channel not found"))
}

pub fn update_profile(
    store: &Store,
    media: &MediaStore,
    caller: &Claims,
    user_id: &str,
    update: ProfileUpdate,
    new_logo: Option<UploadedFile>,
) -> ServiceResult<AccountRecord> {
    if caller.sub != user_id {
        return Err(ServiceError::forbidden(
            "you are not authorized to update this channel",
        ));
    }

    store.with_tx(|tx| {
        let mut account = store::get_account(tx, user_id)?
            .ok_or_else(|| ServiceError::not_found("channel not found"))?;

        if let Some(password) = &update.password {
            let old = update
                .old_password
                .as_deref()
                .ok_or_else(|| ServiceError::validation("old password is required"))?;
            if !auth::verify_password(old, &account.password_hash) {
                return Err(ServiceError::validation("invalid password"));
            }
            if password.is_empty() {
                return Err(ServiceError::validation("password is required"));
            }
            account.password_hash = auth::hash_password(password);
        }

        if let Some(logo) = new_logo {
            media.delete(&account.logo_id)?;
            let stored = media.store(MediaKind::Logo, &logo.file_name, &logo.bytes)?;
            account.logo_url = stored.url;
            account.logo_id = stored.object_id;
        }

        if let Some(channel_name) = update.channel_name {
            if channel_name.trim().is_empty() {
                return Err(ServiceError::validation("channel name is required"));
            }
            account.channel_name = channel_name;
        }
        if let Some(email) = update.email {
            if email.trim().is_empty() {
                return Err(ServiceError::validation("email is required"));
            }
            if let Some(other) = store::get_account_by_email(tx, &email)? {
                if other.id != account.id {
                    return Err(ServiceError::conflict("email already exists"));
                }
            }
            account.email = email;
        }
        if let Some(phone) = update.phone {
            account.phone = phone;
        }

        store::update_account(tx, &account)?;
        Ok(account)
    })
}

/// Adds `caller_id` as a subscriber of `target_id`, updating the counter and
/// both denormalized id sets in one transaction.
pub fn subscribe(store: &Store, caller_id: &str, target_id: &str) -> ServiceResult<()> {
    if caller_id == target_id {
        return Err(ServiceError::validation(
            "you cannot subscribe to your own channel",
        ));
    }

    store.with_tx(|tx| {
        let mut target = store::get_account(tx, target_id)?
            .ok_or_else(|| ServiceError::not_found("channel not found"))?;
        if target.subscribed_by.iter().any(|id| id == caller_id) {
            return Err(ServiceError::conflict(
                "you are already subscribed to this channel",
            ));
        }
        let mut caller = store::get_account(tx, caller_id)?
            .ok_or_else(|| ServiceError::not_found("account not found"))?;

        target.subscribers += 1;
        target.subscribed_by.push(caller_id.to_owned());
        caller.subscribed_channels.push(target_id.to_owned());

        store::update_account(tx, &target)?;
        store::update_account(tx, &caller)?;
        Ok(())
    })
}

/// Reverse of `subscribe`; rejects when no subscription exists.
pub fn unsubscribe(store: &Store, caller_id: &str, target_id: &str) -> ServiceResult<()> {
    store.with_tx(|tx| {
        let mut target = store::get_account(tx, target_id)?
            .ok_or_else(|| ServiceError::not_found("channel not found"))?;
        if !target.subscribed_by.iter().any(|id| id == caller_id) {
            return Err(ServiceError::conflict(
                "you are not subscribed to this channel",
            ));
        }
        let mut caller = store::get_account(tx, caller_id)?
            .ok_or_else(|| ServiceError::not_found("account not found"))?;

        target.subscribers -= 1;
        target.subscribed_by.retain(|id| id != caller_id);
        caller.subscribed_channels.retain(|id| id != target_id);

        store::update_account(tx, &target)?;
        store::update_account(tx, &caller)?;
        Ok(())
    })
}

/// The channels `caller_id` follows, newest account first.
pub fn subscribed_channels(store: &Store, caller_id: &str) -> ServiceResult<Vec<AccountRecord>> {
    let caller = get_account(store, caller_id)?;
    store.with_conn(|conn| store::list_accounts_by_ids(conn, &caller.subscribed_channels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn temp_backend() -> (tempfile::TempDir, Store, MediaStore) {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("test.db")).unwrap();
        let media = MediaStore::open(dir.path().join("media")).unwrap();
        (dir, store, media)
    }

    fn register(store: &Store, media: &MediaStore, name: &str, email: &str) -> AccountRecord {
        signup(
            store,
            media,
            NewSignup {
                channel_name: name.into(),
                email: email.into(),
                phone: "5550000".into(),
                password: "hunter2".into(),
                logo: UploadedFile {
                    file_name: "logo.png".into(),
                    bytes: b"png".to_vec(),
                },
            },
        )
        .unwrap()
    }

    #[test]
    fn signup_rejects_duplicate_email() {
        let (_dir, store, media) = temp_backend();
        register(&store, &media, "Alpha", "dup@example.com");
        let second = signup(
            &store,
            &media,
            NewSignup {
                channel_name: "Beta".into(),
                email: "dup@example.com".into(),
                phone: String::new(),
                password: "pw".into(),
                logo: UploadedFile {
                    file_name: "b.png".into(),
                    bytes: b"png".to_vec(),
                },
            },
        );
        assert!(matches!(second, Err(ServiceError::Conflict(_))));
    }

    #[test]
    fn login_issues_verifiable_token() {
        let (_dir, store, media) = temp_backend();
        let account = register(&store, &media, "Alpha", "a@example.com");
        let tokens = TokenKey::from_secret("test-secret");

        let response = login(&store, &tokens, "a@example.com", "hunter2").unwrap();
        assert_eq!(response.id, account.id);
        let claims = tokens.verify(&response.token).unwrap();
        assert_eq!(claims.sub, account.id);
        assert_eq!(claims.channel_name, "Alpha");
    }

    #[test]
    fn login_rejects_bad_credentials() {
        let (_dir, store, media) = temp_backend();
        register(&store, &media, "Alpha", "a@example.com");
        let tokens = TokenKey::from_secret("test-secret");

        assert!(matches!(
            login(&store, &tokens, "a@example.com", "wrong"),
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            login(&store, &tokens, "nobody@example.com", "hunter2"),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn subscribe_updates_both_sides_and_counter() {
        let (_dir, store, media) = temp_backend();
        let a = register(&store, &media, "A", "a@example.com");
        let b = register(&store, &media, "B", "b@example.com");

        subscribe(&store, &a.id, &b.id).unwrap();

        let b_after = get_account(&store, &b.id).unwrap();
        let a_after = get_account(&store, &a.id).unwrap();
        assert_eq!(b_after.subscribers, 1);
        assert_eq!(b_after.subscribed_by, vec![a.id.clone()]);
        assert_eq!(a_after.subscribed_channels, vec![b.id.clone()]);
        assert_eq!(b_after.subscribers as usize, b_after.subscribed_by.len());
    }

    #[test]
    fn duplicate_subscribe_is_rejected() {
        let (_dir, store, media) = temp_backend();
        let a = register(&store, &media, "A", "a@example.com");
        let b = register(&store, &media, "B", "b@example.com");

        subscribe(&store, &a.id, &b.id).unwrap();
        assert!(matches!(
            subscribe(&store, &a.id, &b.id),
            Err(ServiceError::Conflict(_))
        ));

        let b_after = get_account(&store, &b.id).unwrap();
        assert_eq!(b_after.subscribers, 1);
    }

    #[test]
    fn unsubscribe_reverses_subscription() {
        let (_dir, store, media) = temp_backend();
        let a = register(&store, &media, "A", "a@example.com");
        let b = register(&store, &media, "B", "b@example.com");

        subscribe(&store, &a.id, &b.id).unwrap();
        unsubscribe(&store, &a.id, &b.id).unwrap();

        let b_after = get_account(&store, &b.id).unwrap();
        let a_after = get_account(&store, &a.id).unwrap();
        assert_eq!(b_after.subscribers, 0);
        assert!(b_after.subscribed_by.is_empty());
        assert!(a_after.subscribed_channels.is_empty());
    }

    #[test]
    fn unsubscribe_without_subscription_is_rejected() {
        let (_dir, store, media) = temp_backend();
        let a = register(&store, &media, "A", "a@example.com");
        let b = register(&store, &media, "B", "b@example.com");

        assert!(matches!(
            unsubscribe(&store, &a.id, &b.id),
            Err(ServiceError::Conflict(_))
        ));
    }

    #[test]
    fn self_subscribe_is_rejected() {
        let (_dir, store, media) = temp_backend();
        let a = register(&store, &media, "A", "a@example.com");
        assert!(matches!(
            subscribe(&store, &a.id, &a.id),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn subscribe_to_missing_channel_is_not_found() {
        let (_dir, store, media) = temp_backend();
        let a = register(&store, &media, "A", "a@example.com");
        assert!(matches!(
            subscribe(&store, &a.id, "ghost"),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn update_profile_requires_owner() {
        let (_dir, store, media) = temp_backend();
        let a = register(&store, &media, "A", "a@example.com");
        let b = register(&store, &media, "B", "b@example.com");
        let claims = Claims::new(&a.id, "A", "a@example.com", "", "");

        let result = update_profile(
            &store,
            &media,
            &claims,
            &b.id,
            ProfileUpdate::default(),
            None,
        );
        assert!(matches!(result, Err(ServiceError::Forbidden(_))));
    }

    #[test]
    fn update_profile_changes_password_with_old_password() {
        let (_dir, store, media) = temp_backend();
        let a = register(&store, &media, "A", "a@example.com");
        let claims = Claims::new(&a.id, "A", "a@example.com", "", "");
        let tokens = TokenKey::from_secret("test-secret");

        update_profile(
            &store,
            &media,
            &claims,
            &a.id,
            ProfileUpdate {
                password: Some("new-pass".into()),
                old_password: Some("hunter2".into()),
                ..ProfileUpdate::default()
            },
            None,
        )
        .unwrap();

        assert!(login(&store, &tokens, "a@example.com", "new-pass").is_ok());
        assert!(login(&store, &tokens, "a@example.com", "hunter2").is_err());
    }

    #[test]
    fn update_profile_replaces_logo() {
        let (_dir, store, media) = temp_backend();
        let a = register(&store, &media, "A", "a@example.com");
        let claims = Claims::new(&a.id, "A", "a@example.com", "", "");

        let updated = update_profile(
            &store,
            &media,
            &claims,
            &a.id,
            ProfileUpdate::default(),
            Some(UploadedFile {
                file_name: "fresh.jpg".into(),
                bytes: b"jpg".to_vec(),
            }),
        )
        .unwrap();

        assert_ne!(updated.logo_id, a.logo_id);
        assert!(updated.logo_id.ends_with(".jpg"));
    }

    #[test]
    fn subscribed_channels_lists_followed_accounts() {
        let (_dir, store, media) = temp_backend();
        let a = register(&store, &media, "A", "a@example.com");
        let b = register(&store, &media, "B", "b@example.com");
        let c = register(&store, &media, "C", "c@example.com");

        subscribe(&store, &a.id, &b.id).unwrap();
        subscribe(&store, &a.id, &c.id).unwrap();

        let channels = subscribed_channels(&store, &a.id).unwrap();
        let ids: Vec<&str> = channels.iter().map(|account| account.id.as_str()).collect();
        assert_eq!(channels.len(), 2);
        assert!(ids.contains(&b.id.as_str()));
        assert!(ids.contains(&c.id.as_str()));
    }
}
