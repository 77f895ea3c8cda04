//! Credential issuance and verification.
//!
//! Bearer tokens are a base64url-encoded JSON claims payload plus an Ed25519
//! signature over those payload bytes, signed with a key derived from the
//! configured server secret. The claims embed a snapshot of the profile at
//! issuance time; callers that need current state must re-fetch the account
//! record.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{Duration, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};

const TOKEN_TTL_DAYS: i64 = 365;
const TOKEN_KEY_CONTEXT: &str = "tubecast 2025-11-02 token signing";
const PASSWORD_KEY_CONTEXT: &str = "tubecast 2025-11-02 credential hash";
const SALT_LEN: usize = 16;

/// Verified identity claim carried inside a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub sub: String,
    pub channel_name: String,
    pub email: String,
    pub phone: String,
    pub logo_id: String,
    pub exp: i64,
}

impl Claims {
    /// Claims expiring `TOKEN_TTL_DAYS` from now.
    pub fn new(
        sub: impl Into<String>,
        channel_name: impl Into<String>,
        email: impl Into<String>,
        phone: impl Into<String>,
        logo_id: impl Into<String>,
    ) -> Self {
        Self {
            sub: sub.into(),
            channel_name: channel_name.into(),
            email: email.into(),
            phone: phone.into(),
            logo_id: logo_id.into(),
            exp: (Utc::now() + Duration::days(TOKEN_TTL_DAYS)).timestamp(),
        }
    }
}

/// Signing/verification key pair derived deterministically from the server
/// secret, so every process with the same config accepts the same tokens.
pub struct TokenKey {
    signing: SigningKey,
}

impl TokenKey {
    pub fn from_secret(secret: &str) -> Self {
        let seed = blake3::derive_key(TOKEN_KEY_CONTEXT, secret.as_bytes());
        Self {
            signing: SigningKey::from_bytes(&seed),
        }
    }

    /// Serializes and signs `claims` into an opaque bearer token.
    pub fn issue(&self, claims: &Claims) -> ServiceResult<String> {
        let payload = serde_json::to_vec(claims)?;
        let signature = self.signing.sign(&payload);
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        ))
    }

    /// Decodes a bearer token, checks the signature and expiry, and returns
    /// the embedded claims. Every failure mode collapses to `Unauthenticated`;
    /// callers do not distinguish sub-causes.
    pub fn verify(&self, token: &str) -> ServiceResult<Claims> {
        let (payload_b64, signature_b64) = token
            .split_once('.')
            .ok_or_else(|| ServiceError::unauthenticated("malformed credential"))?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| ServiceError::unauthenticated("malformed credential"))?;
        let signature_bytes = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| ServiceError::unauthenticated("malformed credential"))?;
        let signature = Signature::from_slice(&signature_bytes)
            .map_err(|_| ServiceError::unauthenticated("malformed credential"))?;

        self.signing
            .verifying_key()
            .verify(&payload, &signature)
            .map_err(|_| ServiceError::unauthenticated("invalid credential signature"))?;

        let claims: Claims = serde_json::from_slice(&payload)
            .map_err(|_| ServiceError::unauthenticated("malformed credential"))?;
        if claims.exp <= Utc::now().timestamp() {
            return Err(ServiceError::unauthenticated("credential expired"));
        }
        Ok(claims)
    }
}

/// Hashes a password with a fresh random salt. Stored as
/// `b3$<salt>$<digest>`, both parts base64url without padding.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let digest = derive_digest(&salt, password);
    format!(
        "b3${}${}",
        URL_SAFE_NO_PAD.encode(salt),
        URL_SAFE_NO_PAD.encode(digest)
    )
}

/// Recomputes the digest for `password` against the stored salt. Comparison
/// goes through `blake3::Hash` to stay constant time.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    if parts.next() != Some("b3") {
        return false;
    }
    let (Some(salt_b64), Some(digest_b64), None) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let Ok(salt) = URL_SAFE_NO_PAD.decode(salt_b64) else {
        return false;
    };
    let Ok(digest) = URL_SAFE_NO_PAD.decode(digest_b64) else {
        return false;
    };
    let expected: [u8; 32] = match digest.try_into() {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    blake3::Hash::from(derive_digest(&salt, password)) == blake3::Hash::from(expected)
}

fn derive_digest(salt: &[u8], password: &str) -> [u8; 32] {
    let mut material = Vec::with_capacity(salt.len() + password.len());
    material.extend_from_slice(salt);
    material.extend_from_slice(password.as_bytes());
    blake3::derive_key(PASSWORD_KEY_CONTEXT, &material)
}
