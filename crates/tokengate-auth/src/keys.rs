//! Key material, key sets and key resolution.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{DecodingKey, EncodingKey};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::algorithm::{
    ContentEncryptionAlgorithm, KeyEncryptionAlgorithm, SignatureAlgorithm, SignatureKind,
    ec_curve, signature_algorithm_name, signature_kind,
};
use crate::{Error, Result};

/// A JWKS (JSON Web Key Set).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JwkSet {
    /// Keys.
    pub keys: Vec<Jwk>,
}

/// Minimal JWK structure for oct/RSA/EC/OKP keys.
#[derive(Clone, Default, Deserialize, Serialize)]
pub struct Jwk {
    /// Key type ("oct", "RSA", "EC", "OKP").
    pub kty: String,

    /// Key id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Public key use ("sig" or "enc").
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,

    /// Algorithm the key is restricted to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    // RSA
    /// RSA modulus.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    /// RSA exponent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    // EC / OKP
    /// Curve name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    /// EC x coordinate, or the OKP public key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    /// EC y coordinate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,

    // oct
    /// Symmetric key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<String>,
}

impl fmt::Debug for Jwk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jwk")
            .field("kty", &self.kty)
            .field("kid", &self.kid)
            .field("use", &self.use_)
            .field("alg", &self.alg)
            .field("crv", &self.crv)
            .field("k", &self.k.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

/// What a key may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUse {
    /// Signing and signature verification.
    Signature,
    /// Key encryption / decryption.
    Encryption,
}

impl KeyUse {
    fn from_jwk(value: &str) -> Result<Self> {
        match value {
            "sig" => Ok(KeyUse::Signature),
            "enc" => Ok(KeyUse::Encryption),
            other => Err(Error::Key(format!("unknown JWK use: {other}"))),
        }
    }
}

/// Concrete key material.
#[derive(Clone)]
pub enum KeyMaterial {
    /// Raw symmetric secret.
    Secret(Zeroizing<Vec<u8>>),
    /// PEM-encoded key: public for verification, private for signing.
    Pem(String),
    /// Public JWK (RSA, EC or OKP).
    Jwk(Jwk),
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMaterial::Secret(s) => write!(f, "Secret(<{} bytes>)", s.len()),
            KeyMaterial::Pem(_) => f.write_str("Pem(..)"),
            KeyMaterial::Jwk(jwk) => f.debug_tuple("Jwk").field(jwk).finish(),
        }
    }
}

/// Which cryptographic operation a key is being resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRequest {
    /// Signing or verifying with a signature algorithm.
    Signature(SignatureAlgorithm),
    /// Wrapping or unwrapping a content key.
    Encryption(KeyEncryptionAlgorithm, ContentEncryptionAlgorithm),
}

/// A single key entry of a [`KeySet`].
#[derive(Debug, Clone)]
pub struct Key {
    id: Option<String>,
    usage: Option<KeyUse>,
    alg: Option<String>,
    material: KeyMaterial,
}

impl Key {
    /// A raw symmetric secret.
    pub fn secret(bytes: impl Into<Vec<u8>>) -> Self {
        Self::with_material(KeyMaterial::Secret(Zeroizing::new(bytes.into())))
    }

    /// A PEM-encoded key.
    pub fn pem(pem: impl Into<String>) -> Self {
        Self::with_material(KeyMaterial::Pem(pem.into()))
    }

    /// Build a key from a JWK. `oct` keys become raw secrets.
    pub fn from_jwk(jwk: Jwk) -> Result<Self> {
        let usage = jwk.use_.as_deref().map(KeyUse::from_jwk).transpose()?;
        let id = jwk.kid.clone();
        let alg = jwk.alg.clone();

        let material = match jwk.kty.as_str() {
            "oct" => {
                let k = jwk
                    .k
                    .as_deref()
                    .ok_or_else(|| Error::Key("oct JWK missing k".to_string()))?;
                let bytes = URL_SAFE_NO_PAD
                    .decode(k)
                    .map_err(|e| Error::Key(format!("invalid oct k: {e}")))?;
                KeyMaterial::Secret(Zeroizing::new(bytes))
            }
            "RSA" | "EC" | "OKP" => KeyMaterial::Jwk(jwk),
            other => return Err(Error::Key(format!("unsupported kty: {other}"))),
        };

        Ok(Self {
            id,
            usage,
            alg,
            material,
        })
    }

    /// Parse a single JWK from JSON.
    pub fn from_jwk_json(json: &str) -> Result<Self> {
        Self::from_jwk(serde_json::from_str(json)?)
    }

    fn with_material(material: KeyMaterial) -> Self {
        Self {
            id: None,
            usage: None,
            alg: None,
            material,
        }
    }

    /// Set the key id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Restrict the key to one use.
    #[must_use]
    pub fn with_use(mut self, usage: KeyUse) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Restrict the key to one algorithm (JOSE name).
    #[must_use]
    pub fn with_algorithm(mut self, alg: impl Into<String>) -> Self {
        self.alg = Some(alg.into());
        self
    }

    /// Key id, if any.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// The key material.
    pub fn material(&self) -> &KeyMaterial {
        &self.material
    }

    /// True if the key is usable for `request`. Only filters, never verifies.
    pub fn supports(&self, request: KeyRequest) -> bool {
        let (wanted_use, alg_name) = match request {
            KeyRequest::Signature(alg) => (KeyUse::Signature, signature_algorithm_name(alg)),
            KeyRequest::Encryption(kea, _) => (KeyUse::Encryption, kea.as_str()),
        };
        if self.usage.is_some_and(|u| u != wanted_use) {
            return false;
        }
        if self.alg.as_deref().is_some_and(|a| a != alg_name) {
            return false;
        }

        match request {
            KeyRequest::Signature(alg) => self.supports_signature(alg),
            KeyRequest::Encryption(kea, cea) => match (&self.material, kea.wrap_key_len()) {
                (KeyMaterial::Secret(s), Some(len)) => s.len() == len,
                (KeyMaterial::Secret(s), None) => s.len() == cea.key_len(),
                _ => false,
            },
        }
    }

    fn supports_signature(&self, alg: SignatureAlgorithm) -> bool {
        let kind = signature_kind(alg);
        match &self.material {
            // HMAC is only ever keyed by a raw secret; a public key is never an HMAC secret.
            KeyMaterial::Secret(_) => kind == SignatureKind::Hmac,
            KeyMaterial::Pem(_) => kind != SignatureKind::Hmac,
            KeyMaterial::Jwk(jwk) => match (jwk.kty.as_str(), kind) {
                ("RSA", SignatureKind::Rsa) => true,
                ("EC", SignatureKind::Ec) => jwk.crv.as_deref() == ec_curve(alg),
                ("OKP", SignatureKind::Ed) => jwk.crv.as_deref() == Some("Ed25519"),
                _ => false,
            },
        }
    }

    /// Raw symmetric bytes, for encryption keys.
    pub(crate) fn secret_bytes(&self) -> Option<&[u8]> {
        match &self.material {
            KeyMaterial::Secret(s) => Some(s.as_slice()),
            _ => None,
        }
    }

    pub(crate) fn decoding_key(&self, alg: SignatureAlgorithm) -> Result<DecodingKey> {
        match &self.material {
            KeyMaterial::Secret(s) => Ok(DecodingKey::from_secret(s)),
            KeyMaterial::Pem(pem) => Ok(match signature_kind(alg) {
                SignatureKind::Rsa => DecodingKey::from_rsa_pem(pem.as_bytes())?,
                SignatureKind::Ec => DecodingKey::from_ec_pem(pem.as_bytes())?,
                SignatureKind::Ed => DecodingKey::from_ed_pem(pem.as_bytes())?,
                SignatureKind::Hmac => {
                    return Err(Error::Key("PEM keys cannot be used for HMAC".to_string()));
                }
            }),
            KeyMaterial::Jwk(jwk) => decoding_key_from_jwk(jwk),
        }
    }

    pub(crate) fn encoding_key(&self, alg: SignatureAlgorithm) -> Result<EncodingKey> {
        match &self.material {
            KeyMaterial::Secret(s) => Ok(EncodingKey::from_secret(s)),
            KeyMaterial::Pem(pem) => Ok(match signature_kind(alg) {
                SignatureKind::Rsa => EncodingKey::from_rsa_pem(pem.as_bytes())?,
                SignatureKind::Ec => EncodingKey::from_ec_pem(pem.as_bytes())?,
                SignatureKind::Ed => EncodingKey::from_ed_pem(pem.as_bytes())?,
                SignatureKind::Hmac => {
                    return Err(Error::Key("PEM keys cannot be used for HMAC".to_string()));
                }
            }),
            KeyMaterial::Jwk(_) => Err(Error::Key(
                "public JWKs cannot sign; use a PEM private key".to_string(),
            )),
        }
    }
}

fn decoding_key_from_jwk(jwk: &Jwk) -> Result<DecodingKey> {
    match jwk.kty.as_str() {
        "RSA" => {
            let n = jwk
                .n
                .as_deref()
                .ok_or_else(|| Error::Key("RSA JWK missing n".to_string()))?;
            let e = jwk
                .e
                .as_deref()
                .ok_or_else(|| Error::Key("RSA JWK missing e".to_string()))?;
            Ok(DecodingKey::from_rsa_components(n, e)?)
        }
        "EC" => {
            let x = jwk
                .x
                .as_deref()
                .ok_or_else(|| Error::Key("EC JWK missing x".to_string()))?;
            let y = jwk
                .y
                .as_deref()
                .ok_or_else(|| Error::Key("EC JWK missing y".to_string()))?;
            Ok(DecodingKey::from_ec_components(x, y)?)
        }
        "OKP" => {
            let x = jwk
                .x
                .as_deref()
                .ok_or_else(|| Error::Key("OKP JWK missing x".to_string()))?;
            Ok(DecodingKey::from_ed_components(x)?)
        }
        other => Err(Error::Key(format!("unsupported kty: {other}"))),
    }
}

/// Ordered collection of candidate keys for one cryptographic role.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    keys: Vec<Key>,
}

impl KeySet {
    /// Build a key set from keys, preserving order.
    pub fn new(keys: Vec<Key>) -> Self {
        Self { keys }
    }

    /// Parse a JWKSet JSON document.
    pub fn from_jwks_json(json: &str) -> Result<Self> {
        let set: JwkSet = serde_json::from_str(json)?;
        Self::from_jwks(set)
    }

    /// Convert a parsed JWKSet.
    pub fn from_jwks(set: JwkSet) -> Result<Self> {
        let keys = set
            .keys
            .into_iter()
            .map(Key::from_jwk)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { keys })
    }

    /// Append a key at the end (lowest precedence).
    pub fn push(&mut self, key: Key) {
        self.keys.push(key);
    }

    /// All keys in order.
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True if there are no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Candidate keys for `request`, in set order.
    ///
    /// When `hint` names a key id and a usable key carries that id, only the
    /// matching keys are returned. Otherwise every usable key is returned. An
    /// empty result means no key can possibly work.
    pub fn resolve(&self, request: KeyRequest, hint: Option<&str>) -> Vec<&Key> {
        let usable: Vec<&Key> = self.keys.iter().filter(|k| k.supports(request)).collect();

        if let Some(kid) = hint {
            let matching: Vec<&Key> = usable
                .iter()
                .copied()
                .filter(|k| k.id() == Some(kid))
                .collect();
            if !matching.is_empty() {
                return matching;
            }
        }

        usable
    }
}
