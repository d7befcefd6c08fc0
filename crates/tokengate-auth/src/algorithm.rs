//! Algorithm identifiers and families.

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

pub use jsonwebtoken::Algorithm as SignatureAlgorithm;

/// The cryptographic role an algorithm plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    /// JWS signature algorithms.
    Signature,
    /// JWE key management algorithms (`alg` of an encrypted token).
    KeyEncryption,
    /// JWE content encryption algorithms (`enc`).
    ContentEncryption,
}

impl Family {
    /// Family of a supported JOSE algorithm name.
    pub fn of(name: &str) -> Option<Family> {
        if parse_signature_algorithm(name).is_ok() {
            Some(Family::Signature)
        } else if name.parse::<KeyEncryptionAlgorithm>().is_ok() {
            Some(Family::KeyEncryption)
        } else if name.parse::<ContentEncryptionAlgorithm>().is_ok() {
            Some(Family::ContentEncryption)
        } else {
            None
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Family::Signature => "signature",
            Family::KeyEncryption => "key encryption",
            Family::ContentEncryption => "content encryption",
        })
    }
}

/// Key type a signature algorithm needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SignatureKind {
    Hmac,
    Rsa,
    Ec,
    Ed,
}

pub(crate) fn signature_kind(alg: SignatureAlgorithm) -> SignatureKind {
    use SignatureAlgorithm as A;
    match alg {
        A::HS256 | A::HS384 | A::HS512 => SignatureKind::Hmac,
        A::RS256 | A::RS384 | A::RS512 | A::PS256 | A::PS384 | A::PS512 => SignatureKind::Rsa,
        A::ES256 | A::ES384 => SignatureKind::Ec,
        A::EdDSA => SignatureKind::Ed,
    }
}

/// Curve an EC signature algorithm is bound to.
pub(crate) fn ec_curve(alg: SignatureAlgorithm) -> Option<&'static str> {
    match alg {
        SignatureAlgorithm::ES256 => Some("P-256"),
        SignatureAlgorithm::ES384 => Some("P-384"),
        _ => None,
    }
}

/// JOSE name of a signature algorithm.
pub fn signature_algorithm_name(alg: SignatureAlgorithm) -> &'static str {
    use SignatureAlgorithm as A;
    match alg {
        A::HS256 => "HS256",
        A::HS384 => "HS384",
        A::HS512 => "HS512",
        A::ES256 => "ES256",
        A::ES384 => "ES384",
        A::RS256 => "RS256",
        A::RS384 => "RS384",
        A::RS512 => "RS512",
        A::PS256 => "PS256",
        A::PS384 => "PS384",
        A::PS512 => "PS512",
        A::EdDSA => "EdDSA",
    }
}

/// Parse a JOSE signature algorithm name. `none` is never accepted.
pub fn parse_signature_algorithm(name: &str) -> Result<SignatureAlgorithm> {
    SignatureAlgorithm::from_str(name)
        .map_err(|_| Error::UnsupportedAlgorithm(format!("signature algorithm {name:?}")))
}

/// Key management algorithms for encrypted tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyEncryptionAlgorithm {
    /// Direct use of a shared symmetric key as the content encryption key.
    Dir,
    /// AES-GCM key wrap with a 128-bit key.
    A128GcmKw,
    /// AES-GCM key wrap with a 256-bit key.
    A256GcmKw,
}

impl KeyEncryptionAlgorithm {
    /// JOSE name (`alg` header value).
    pub fn as_str(self) -> &'static str {
        match self {
            KeyEncryptionAlgorithm::Dir => "dir",
            KeyEncryptionAlgorithm::A128GcmKw => "A128GCMKW",
            KeyEncryptionAlgorithm::A256GcmKw => "A256GCMKW",
        }
    }

    /// Required key-encryption key length, `None` for `dir`.
    pub(crate) fn wrap_key_len(self) -> Option<usize> {
        match self {
            KeyEncryptionAlgorithm::Dir => None,
            KeyEncryptionAlgorithm::A128GcmKw => Some(16),
            KeyEncryptionAlgorithm::A256GcmKw => Some(32),
        }
    }
}

impl FromStr for KeyEncryptionAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dir" => Ok(KeyEncryptionAlgorithm::Dir),
            "A128GCMKW" => Ok(KeyEncryptionAlgorithm::A128GcmKw),
            "A256GCMKW" => Ok(KeyEncryptionAlgorithm::A256GcmKw),
            other => Err(Error::UnsupportedAlgorithm(format!(
                "key encryption algorithm {other:?}"
            ))),
        }
    }
}

impl fmt::Display for KeyEncryptionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content encryption algorithms for encrypted tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentEncryptionAlgorithm {
    /// AES-GCM with a 128-bit key.
    A128Gcm,
    /// AES-GCM with a 256-bit key.
    A256Gcm,
}

impl ContentEncryptionAlgorithm {
    /// JOSE name (`enc` header value).
    pub fn as_str(self) -> &'static str {
        match self {
            ContentEncryptionAlgorithm::A128Gcm => "A128GCM",
            ContentEncryptionAlgorithm::A256Gcm => "A256GCM",
        }
    }

    /// Content encryption key length in bytes.
    pub fn key_len(self) -> usize {
        match self {
            ContentEncryptionAlgorithm::A128Gcm => 16,
            ContentEncryptionAlgorithm::A256Gcm => 32,
        }
    }
}

impl FromStr for ContentEncryptionAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "A128GCM" => Ok(ContentEncryptionAlgorithm::A128Gcm),
            "A256GCM" => Ok(ContentEncryptionAlgorithm::A256Gcm),
            other => Err(Error::UnsupportedAlgorithm(format!(
                "content encryption algorithm {other:?}"
            ))),
        }
    }
}

impl fmt::Display for ContentEncryptionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
