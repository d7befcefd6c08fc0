//! Token issuance: sign, then optionally encrypt.

use std::fmt;

use jsonwebtoken::EncodingKey;
use serde_json::Value;
use tracing::debug;

use crate::algorithm::{SignatureAlgorithm, signature_algorithm_name};
use crate::checker::ClaimSet;
use crate::keys::KeyRequest;
use crate::policy::{EncryptionSettings, IssuancePolicy};
use crate::{Error, Result, jwe, jws, unix_now};

/// Time claims copied into the protected header of an encrypted envelope.
const REPLICATED_CLAIMS: [&str; 3] = ["iat", "nbf", "exp"];

/// Issues tokens for one [`IssuancePolicy`].
///
/// Keys are parsed when the issuer is built, so a bad signing or encryption
/// key is reported at startup rather than on the first request.
#[derive(Clone)]
pub struct TokenIssuer {
    algorithm: SignatureAlgorithm,
    encoding_key: EncodingKey,
    kid: Option<String>,
    encryption: Option<EncryptionSettings>,
    token_ttl: Option<u64>,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("algorithm", &self.algorithm)
            .field("kid", &self.kid)
            .field("encrypted", &self.encryption.is_some())
            .field("token_ttl", &self.token_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Validate `policy` and prepare its keys.
    pub fn new(policy: IssuancePolicy) -> Result<Self> {
        let alg = policy.signature_algorithm;
        if !policy.signing_key.supports(KeyRequest::Signature(alg)) {
            return Err(Error::Key(format!(
                "signing key cannot be used with {}",
                signature_algorithm_name(alg)
            )));
        }
        let encoding_key = policy.signing_key.encoding_key(alg)?;

        if let Some(enc) = &policy.encryption {
            let request = KeyRequest::Encryption(
                enc.key_encryption_algorithm,
                enc.content_encryption_algorithm,
            );
            if !enc.key.supports(request) {
                return Err(Error::Key(format!(
                    "encryption key cannot be used with {}/{}",
                    enc.key_encryption_algorithm, enc.content_encryption_algorithm
                )));
            }
        }

        Ok(Self {
            algorithm: alg,
            encoding_key,
            kid: policy.signing_key.id().map(ToString::to_string),
            encryption: policy.encryption,
            token_ttl: policy.token_ttl,
        })
    }

    /// Lifetime applied to `exp`, if any.
    pub fn token_ttl(&self) -> Option<u64> {
        self.token_ttl
    }

    /// True when issued tokens are encrypted.
    pub fn encrypts(&self) -> bool {
        self.encryption.is_some()
    }

    /// Issue a token at the current time.
    pub fn issue(&self, claims: ClaimSet) -> Result<String> {
        self.issue_at(claims, unix_now())
    }

    /// Issue a token as of `now` (unix seconds).
    ///
    /// `iat` and `exp` are added when absent; explicit values are kept.
    pub fn issue_at(&self, mut claims: ClaimSet, now: u64) -> Result<String> {
        claims.entry("iat").or_insert_with(|| Value::from(now));
        if let Some(ttl) = self.token_ttl {
            claims
                .entry("exp")
                .or_insert_with(|| Value::from(now.saturating_add(ttl)));
        }

        let signed = jws::sign(&claims, self.algorithm, &self.encoding_key, self.kid.as_deref())?;
        let Some(encryption) = &self.encryption else {
            debug!(alg = signature_algorithm_name(self.algorithm), "token issued");
            return Ok(signed);
        };

        let replicated: ClaimSet = REPLICATED_CLAIMS
            .iter()
            .filter_map(|name| claims.get(*name).map(|v| ((*name).to_string(), v.clone())))
            .collect();
        let token = jwe::encrypt(&signed, encryption, &replicated)?;
        debug!(
            alg = signature_algorithm_name(self.algorithm),
            enc = %encryption.content_encryption_algorithm,
            "encrypted token issued"
        );
        Ok(token)
    }
}
