//! Encrypted envelopes around signed tokens.
//!
//! Compact form, five segments:
//! `header . encrypted_key . iv . ciphertext . tag`. The base64url protected
//! header is the additional authenticated data of the content encryption.

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use serde_json::Value;
use tracing::debug;
use zeroize::Zeroizing;

use crate::algorithm::{ContentEncryptionAlgorithm, KeyEncryptionAlgorithm};
use crate::checker::{self, CheckContext, ClaimSet};
use crate::error::Rejection;
use crate::jws::decode_json_segment;
use crate::keys::{Key, KeyRequest};
use crate::policy::{DecryptionPolicy, EncryptionSettings};
use crate::{Error, Result};

/// Number of segments of a compact encrypted token.
pub const JWE_SEGMENTS: usize = 5;

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Outcome of the decryption stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decrypted {
    /// The nested signed token.
    Inner(String),
    /// The envelope could not be opened and policy allows treating the raw
    /// value as a plain signed token.
    PassThrough,
}

/// Open an encrypted envelope.
///
/// Any failure becomes [`Decrypted::PassThrough`] when the policy continues on
/// decryption failure, otherwise it is returned as the rejection.
pub fn decrypt(
    token: &str,
    policy: &DecryptionPolicy,
    ctx: &CheckContext,
) -> std::result::Result<Decrypted, Rejection> {
    match open(token, policy, ctx) {
        Ok(inner) => Ok(Decrypted::Inner(inner)),
        Err(rejection) if policy.continue_on_decryption_failure => {
            debug!(reason = rejection.tag(), "decryption failed, passing through");
            Ok(Decrypted::PassThrough)
        }
        Err(rejection) => Err(rejection),
    }
}

fn open(
    token: &str,
    policy: &DecryptionPolicy,
    ctx: &CheckContext,
) -> std::result::Result<String, Rejection> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != JWE_SEGMENTS {
        return Err(Rejection::DecryptionFailed);
    }
    let header = decode_json_segment(segments[0]).ok_or(Rejection::DecryptionFailed)?;

    let kea = header_str(&header, "alg")?
        .parse::<KeyEncryptionAlgorithm>()
        .map_err(|_| Rejection::AlgorithmNotAllowed)?;
    let cea = header_str(&header, "enc")?
        .parse::<ContentEncryptionAlgorithm>()
        .map_err(|_| Rejection::AlgorithmNotAllowed)?;
    if !policy.allowed_key_encryption.contains(&kea)
        || !policy.allowed_content_encryption.contains(&cea)
    {
        return Err(Rejection::AlgorithmNotAllowed);
    }
    if header.contains_key("zip") {
        return Err(Rejection::DecryptionFailed);
    }

    let encrypted_key = b64(segments[1])?;
    let iv = b64(segments[2])?;
    let ciphertext = b64(segments[3])?;
    let tag = b64(segments[4])?;

    let kid = header.get("kid").and_then(Value::as_str);
    let plaintext = policy
        .keyset
        .resolve(KeyRequest::Encryption(kea, cea), kid)
        .into_iter()
        .find_map(|key| {
            let cek = unwrap_cek(key, kea, cea, &header, &encrypted_key)?;
            let plaintext = gcm_open(&cek, &iv, &ciphertext, &tag, segments[0].as_bytes())?;
            debug!(kid = ?key.id(), "envelope decrypted");
            Some(plaintext)
        })
        .ok_or(Rejection::DecryptionFailed)?;

    checker::run(&policy.header_checkers, &header, ctx).map_err(|v| {
        Rejection::HeaderCheckFailed {
            checker: v.checker().to_string(),
        }
    })?;

    String::from_utf8(plaintext).map_err(|_| Rejection::DecryptionFailed)
}

fn header_str<'a>(header: &'a ClaimSet, name: &str) -> std::result::Result<&'a str, Rejection> {
    header
        .get(name)
        .and_then(Value::as_str)
        .ok_or(Rejection::DecryptionFailed)
}

fn b64(segment: &str) -> std::result::Result<Vec<u8>, Rejection> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| Rejection::DecryptionFailed)
}

fn unwrap_cek(
    key: &Key,
    kea: KeyEncryptionAlgorithm,
    cea: ContentEncryptionAlgorithm,
    header: &ClaimSet,
    encrypted_key: &[u8],
) -> Option<Zeroizing<Vec<u8>>> {
    let secret = key.secret_bytes()?;
    let cek = match kea {
        KeyEncryptionAlgorithm::Dir => {
            if !encrypted_key.is_empty() {
                return None;
            }
            Zeroizing::new(secret.to_vec())
        }
        KeyEncryptionAlgorithm::A128GcmKw | KeyEncryptionAlgorithm::A256GcmKw => {
            let iv = URL_SAFE_NO_PAD
                .decode(header.get("iv")?.as_str()?)
                .ok()?;
            let tag = URL_SAFE_NO_PAD
                .decode(header.get("tag")?.as_str()?)
                .ok()?;
            Zeroizing::new(gcm_open(secret, &iv, encrypted_key, &tag, &[])?)
        }
    };
    (cek.len() == cea.key_len()).then_some(cek)
}

/// Wrap a signed token into an encrypted envelope.
///
/// `extra_header` members (e.g. replicated `exp`) are added to the protected
/// header.
pub(crate) fn encrypt(
    plaintext: &str,
    settings: &EncryptionSettings,
    extra_header: &ClaimSet,
) -> Result<String> {
    let kea = settings.key_encryption_algorithm;
    let cea = settings.content_encryption_algorithm;
    let secret = settings
        .key
        .secret_bytes()
        .ok_or_else(|| Error::Key("encryption key must be a symmetric key".to_string()))?;

    let mut header = extra_header.clone();
    header.insert("alg".to_string(), Value::from(kea.as_str()));
    header.insert("enc".to_string(), Value::from(cea.as_str()));
    header.insert("cty".to_string(), Value::from("JWT"));
    if let Some(kid) = settings.key.id() {
        header.insert("kid".to_string(), Value::from(kid));
    }

    let (cek, encrypted_key) = match kea {
        KeyEncryptionAlgorithm::Dir => {
            if secret.len() != cea.key_len() {
                return Err(Error::Key(format!(
                    "dir with {cea} needs a {}-byte key",
                    cea.key_len()
                )));
            }
            (Zeroizing::new(secret.to_vec()), Vec::new())
        }
        KeyEncryptionAlgorithm::A128GcmKw | KeyEncryptionAlgorithm::A256GcmKw => {
            let mut cek = Zeroizing::new(vec![0u8; cea.key_len()]);
            rand::rng().fill_bytes(&mut cek);
            let wrap_iv = random_iv();
            let (wrapped, wrap_tag) = gcm_seal(secret, &wrap_iv, &cek, &[])
                .ok_or_else(|| Error::Key(format!("{kea} needs a {}-byte key", secret.len())))?;
            header.insert("iv".to_string(), Value::from(URL_SAFE_NO_PAD.encode(wrap_iv)));
            header.insert("tag".to_string(), Value::from(URL_SAFE_NO_PAD.encode(wrap_tag)));
            (cek, wrapped)
        }
    };

    let protected = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&Value::Object(header))?);
    let iv = random_iv();
    let (ciphertext, tag) = gcm_seal(&cek, &iv, plaintext.as_bytes(), protected.as_bytes())
        .ok_or_else(|| Error::Encoding("content encryption failed".to_string()))?;

    Ok([
        protected,
        URL_SAFE_NO_PAD.encode(encrypted_key),
        URL_SAFE_NO_PAD.encode(iv),
        URL_SAFE_NO_PAD.encode(ciphertext),
        URL_SAFE_NO_PAD.encode(tag),
    ]
    .join("."))
}

fn random_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    rand::rng().fill_bytes(&mut iv);
    iv
}

/// AES-GCM with the key size picked from `key`. Returns `(ciphertext, tag)`.
fn gcm_seal(key: &[u8], iv: &[u8], msg: &[u8], aad: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
    let mut sealed = match key.len() {
        16 => seal::<Aes128Gcm>(key, iv, msg, aad),
        32 => seal::<Aes256Gcm>(key, iv, msg, aad),
        _ => None,
    }?;
    let tag = sealed.split_off(sealed.len().checked_sub(TAG_LEN)?);
    Some((sealed, tag))
}

fn gcm_open(key: &[u8], iv: &[u8], ciphertext: &[u8], tag: &[u8], aad: &[u8]) -> Option<Vec<u8>> {
    if tag.len() != TAG_LEN {
        return None;
    }
    let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_LEN);
    sealed.extend_from_slice(ciphertext);
    sealed.extend_from_slice(tag);
    match key.len() {
        16 => open_with::<Aes128Gcm>(key, iv, &sealed, aad),
        32 => open_with::<Aes256Gcm>(key, iv, &sealed, aad),
        _ => None,
    }
}

fn seal<C: Aead + KeyInit>(key: &[u8], iv: &[u8], msg: &[u8], aad: &[u8]) -> Option<Vec<u8>> {
    if iv.len() != IV_LEN {
        return None;
    }
    let cipher = C::new_from_slice(key).ok()?;
    cipher
        .encrypt(GenericArray::from_slice(iv), Payload { msg, aad })
        .ok()
}

fn open_with<C: Aead + KeyInit>(key: &[u8], iv: &[u8], sealed: &[u8], aad: &[u8]) -> Option<Vec<u8>> {
    if iv.len() != IV_LEN {
        return None;
    }
    let cipher = C::new_from_slice(key).ok()?;
    cipher
        .decrypt(GenericArray::from_slice(iv), Payload { msg: sealed, aad })
        .ok()
}
