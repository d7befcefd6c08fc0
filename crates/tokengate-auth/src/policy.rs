//! Immutable verification and issuance policies.
//!
//! Policies are built once at startup. Every name (algorithm, checker) is
//! resolved and validated in `build`, so nothing on the request path looks at
//! configuration again.

use std::fmt;
use std::sync::Arc;

use crate::algorithm::{ContentEncryptionAlgorithm, KeyEncryptionAlgorithm, SignatureAlgorithm};
use crate::checker::{Check, Checker, CheckerRegistry};
use crate::keys::{Key, KeyRequest, KeySet};
use crate::{Error, Result};

/// Default claim checkers of the signature stage.
pub const DEFAULT_CLAIM_CHECKERS: [&str; 3] = [
    Checker::EXPIRATION,
    Checker::ISSUED_AT,
    Checker::NOT_BEFORE,
];

/// Default header checkers of the encrypted envelope.
pub const DEFAULT_ENVELOPE_HEADER_CHECKERS: [&str; 3] = [
    Checker::ISSUED_AT,
    Checker::NOT_BEFORE,
    Checker::EXPIRATION,
];

/// Default claim holding the user identifier.
pub const DEFAULT_USER_ID_CLAIM: &str = "username";

/// Default token lifetime in seconds.
pub const DEFAULT_TOKEN_TTL: u64 = 3600;

/// Decryption settings, as configured.
#[derive(Debug, Clone)]
pub struct DecryptionSettings {
    /// Keys that may open an envelope.
    pub keyset: KeySet,
    /// Allowed `alg` values of the envelope.
    pub allowed_key_encryption_algorithms: Vec<KeyEncryptionAlgorithm>,
    /// Allowed `enc` values of the envelope.
    pub allowed_content_encryption_algorithms: Vec<ContentEncryptionAlgorithm>,
    /// Checker names applied to the envelope's protected header.
    pub header_checkers: Vec<String>,
    /// Fall back to plain signature verification when the envelope cannot be opened.
    pub continue_on_decryption_failure: bool,
}

impl DecryptionSettings {
    /// Settings with the default envelope header checkers and empty allow-lists.
    pub fn new(keyset: KeySet) -> Self {
        Self {
            keyset,
            allowed_key_encryption_algorithms: Vec::new(),
            allowed_content_encryption_algorithms: Vec::new(),
            header_checkers: DEFAULT_ENVELOPE_HEADER_CHECKERS
                .iter()
                .map(ToString::to_string)
                .collect(),
            continue_on_decryption_failure: false,
        }
    }
}

/// Resolved decryption stage configuration.
#[derive(Debug, Clone)]
pub struct DecryptionPolicy {
    pub(crate) keyset: KeySet,
    pub(crate) allowed_key_encryption: Vec<KeyEncryptionAlgorithm>,
    pub(crate) allowed_content_encryption: Vec<ContentEncryptionAlgorithm>,
    pub(crate) header_checkers: Vec<Checker>,
    pub(crate) continue_on_decryption_failure: bool,
}

impl DecryptionPolicy {
    /// Whether failures fall through to plain verification.
    pub fn continue_on_decryption_failure(&self) -> bool {
        self.continue_on_decryption_failure
    }
}

/// Everything the verification pipeline needs, resolved.
#[derive(Debug, Clone)]
pub struct VerificationPolicy {
    pub(crate) allowed_algorithms: Vec<SignatureAlgorithm>,
    pub(crate) header_checkers: Vec<Checker>,
    pub(crate) claim_checkers: Vec<Checker>,
    pub(crate) keyset: KeySet,
    pub(crate) decryption: Option<DecryptionPolicy>,
    pub(crate) clock_skew: u64,
    pub(crate) user_id_claim: String,
}

impl VerificationPolicy {
    /// Start building a policy verifying against `keyset`.
    pub fn builder(keyset: KeySet) -> VerificationPolicyBuilder {
        VerificationPolicyBuilder::new(keyset)
    }

    /// Allowed signature algorithms.
    pub fn allowed_algorithms(&self) -> &[SignatureAlgorithm] {
        &self.allowed_algorithms
    }

    /// Decryption stage, when encryption is enabled.
    pub fn decryption(&self) -> Option<&DecryptionPolicy> {
        self.decryption.as_ref()
    }

    /// Clock skew tolerance, seconds.
    pub fn clock_skew(&self) -> u64 {
        self.clock_skew
    }

    /// Claim naming the authenticated user.
    pub fn user_id_claim(&self) -> &str {
        &self.user_id_claim
    }
}

/// Builder for [`VerificationPolicy`].
pub struct VerificationPolicyBuilder {
    keyset: KeySet,
    allowed_algorithms: Vec<SignatureAlgorithm>,
    header_checkers: Vec<String>,
    claim_checkers: Vec<String>,
    mandatory_claims: Vec<String>,
    custom_checkers: Vec<(String, Arc<dyn Check>)>,
    decryption: Option<DecryptionSettings>,
    clock_skew: u64,
    allow_no_expiration: bool,
    user_id_claim: String,
}

impl fmt::Debug for VerificationPolicyBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationPolicyBuilder")
            .field("allowed_algorithms", &self.allowed_algorithms)
            .field("header_checkers", &self.header_checkers)
            .field("claim_checkers", &self.claim_checkers)
            .field("mandatory_claims", &self.mandatory_claims)
            .field("decryption", &self.decryption.is_some())
            .finish_non_exhaustive()
    }
}

impl VerificationPolicyBuilder {
    fn new(keyset: KeySet) -> Self {
        Self {
            keyset,
            allowed_algorithms: Vec::new(),
            header_checkers: Vec::new(),
            claim_checkers: DEFAULT_CLAIM_CHECKERS.iter().map(ToString::to_string).collect(),
            mandatory_claims: Vec::new(),
            custom_checkers: Vec::new(),
            decryption: None,
            clock_skew: 0,
            allow_no_expiration: false,
            user_id_claim: DEFAULT_USER_ID_CLAIM.to_string(),
        }
    }

    /// Signature algorithms that may verify. Required.
    #[must_use]
    pub fn allowed_algorithms(mut self, algs: impl IntoIterator<Item = SignatureAlgorithm>) -> Self {
        self.allowed_algorithms = algs.into_iter().collect();
        self
    }

    /// Checker names applied to the verified protected header.
    #[must_use]
    pub fn header_checkers<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.header_checkers = names.into_iter().map(Into::into).collect();
        self
    }

    /// Checker names applied to the verified claims.
    #[must_use]
    pub fn claim_checkers<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.claim_checkers = names.into_iter().map(Into::into).collect();
        self
    }

    /// Claims that must be present.
    #[must_use]
    pub fn mandatory_claims<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.mandatory_claims = names.into_iter().map(Into::into).collect();
        self
    }

    /// Make a custom checker available under `name`.
    #[must_use]
    pub fn register_checker(mut self, name: impl Into<String>, check: Arc<dyn Check>) -> Self {
        self.custom_checkers.push((name.into(), check));
        self
    }

    /// Enable the decryption stage.
    #[must_use]
    pub fn decryption(mut self, settings: DecryptionSettings) -> Self {
        self.decryption = Some(settings);
        self
    }

    /// Clock skew tolerance in seconds.
    #[must_use]
    pub fn clock_skew(mut self, seconds: u64) -> Self {
        self.clock_skew = seconds;
        self
    }

    /// Accept tokens without `exp`.
    #[must_use]
    pub fn allow_no_expiration(mut self, allow: bool) -> Self {
        self.allow_no_expiration = allow;
        self
    }

    /// Claim naming the authenticated user.
    #[must_use]
    pub fn user_id_claim(mut self, claim: impl Into<String>) -> Self {
        self.user_id_claim = claim.into();
        self
    }

    /// Resolve and validate.
    pub fn build(self) -> Result<VerificationPolicy> {
        if self.allowed_algorithms.is_empty() {
            return Err(Error::Config(
                "at least one signature algorithm must be allowed".to_string(),
            ));
        }
        if self.keyset.is_empty() {
            return Err(Error::Config("verification keyset is empty".to_string()));
        }
        if !self
            .allowed_algorithms
            .iter()
            .any(|alg| !self.keyset.resolve(KeyRequest::Signature(*alg), None).is_empty())
        {
            return Err(Error::Config(
                "no verification key is usable with the allowed algorithms".to_string(),
            ));
        }
        if self.user_id_claim.is_empty() {
            return Err(Error::Config("user id claim cannot be empty".to_string()));
        }

        let mut registry = CheckerRegistry::with_builtins(self.allow_no_expiration);
        for (name, check) in self.custom_checkers {
            registry.register(name, check);
        }

        let header_checkers = registry.resolve(&self.header_checkers)?;
        let mut claim_checkers = registry.resolve(&self.claim_checkers)?;
        // Missing claims are reported before any time-bound check fails.
        if !self.mandatory_claims.is_empty() {
            claim_checkers.insert(0, Checker::MandatoryClaims(self.mandatory_claims));
        }

        let decryption = self
            .decryption
            .map(|settings| {
                if settings.allowed_key_encryption_algorithms.is_empty()
                    || settings.allowed_content_encryption_algorithms.is_empty()
                {
                    return Err(Error::Config(
                        "encryption requires allowed key and content encryption algorithms"
                            .to_string(),
                    ));
                }
                if settings.keyset.is_empty() {
                    return Err(Error::Config("encryption keyset is empty".to_string()));
                }
                Ok(DecryptionPolicy {
                    header_checkers: registry.resolve(&settings.header_checkers)?,
                    keyset: settings.keyset,
                    allowed_key_encryption: settings.allowed_key_encryption_algorithms,
                    allowed_content_encryption: settings.allowed_content_encryption_algorithms,
                    continue_on_decryption_failure: settings.continue_on_decryption_failure,
                })
            })
            .transpose()?;

        Ok(VerificationPolicy {
            allowed_algorithms: self.allowed_algorithms,
            header_checkers,
            claim_checkers,
            keyset: self.keyset,
            decryption,
            clock_skew: self.clock_skew,
            user_id_claim: self.user_id_claim,
        })
    }
}

/// Encryption applied to issued tokens.
#[derive(Debug, Clone)]
pub struct EncryptionSettings {
    /// `alg` of the envelope.
    pub key_encryption_algorithm: KeyEncryptionAlgorithm,
    /// `enc` of the envelope.
    pub content_encryption_algorithm: ContentEncryptionAlgorithm,
    /// Key-encryption key (or the content key itself for `dir`).
    pub key: Key,
}

/// How tokens are issued.
#[derive(Debug, Clone)]
pub struct IssuancePolicy {
    /// Signature algorithm.
    pub signature_algorithm: SignatureAlgorithm,
    /// Signing key.
    pub signing_key: Key,
    /// Optional nested encryption.
    pub encryption: Option<EncryptionSettings>,
    /// Lifetime used for `exp` when the claims carry none. `None` adds no `exp`.
    pub token_ttl: Option<u64>,
}

impl IssuancePolicy {
    /// Sign with `signing_key`, default TTL, no encryption.
    pub fn new(signature_algorithm: SignatureAlgorithm, signing_key: Key) -> Self {
        Self {
            signature_algorithm,
            signing_key,
            encryption: None,
            token_ttl: Some(DEFAULT_TOKEN_TTL),
        }
    }

    /// Encrypt issued tokens.
    #[must_use]
    pub fn with_encryption(mut self, encryption: EncryptionSettings) -> Self {
        self.encryption = Some(encryption);
        self
    }

    /// Override the token lifetime.
    #[must_use]
    pub fn with_token_ttl(mut self, ttl: Option<u64>) -> Self {
        self.token_ttl = ttl;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hmac_keys() -> KeySet {
        KeySet::new(vec![Key::secret(b"0123456789abcdef0123456789abcdef".to_vec())])
    }

    #[test]
    fn defaults_resolve() {
        let policy = VerificationPolicy::builder(hmac_keys())
            .allowed_algorithms([SignatureAlgorithm::HS256])
            .mandatory_claims(["sub"])
            .build()
            .unwrap();

        let names: Vec<_> = policy.claim_checkers.iter().map(Checker::name).collect();
        assert_eq!(
            names,
            vec![
                "mandatory_claims",
                "exp_with_clock_skew",
                "iat_with_clock_skew",
                "nbf_with_clock_skew"
            ]
        );
        assert!(policy.header_checkers.is_empty());
        assert_eq!(policy.user_id_claim(), "username");
        assert!(policy.decryption().is_none());
    }

    #[test]
    fn empty_allow_list_fails_fast() {
        let err = VerificationPolicy::builder(hmac_keys()).build().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn unusable_keyset_fails_fast() {
        let err = VerificationPolicy::builder(hmac_keys())
            .allowed_algorithms([SignatureAlgorithm::ES256])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("no verification key"));
    }

    #[test]
    fn unknown_checker_fails_fast() {
        let err = VerificationPolicy::builder(hmac_keys())
            .allowed_algorithms([SignatureAlgorithm::HS256])
            .header_checkers(["crit_checker"])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("unknown checker: crit_checker"));
    }

    #[test]
    fn decryption_requires_allow_lists() {
        let settings = DecryptionSettings::new(KeySet::new(vec![Key::secret(vec![0u8; 32])]));
        let err = VerificationPolicy::builder(hmac_keys())
            .allowed_algorithms([SignatureAlgorithm::HS256])
            .decryption(settings)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn decryption_defaults() {
        let mut settings = DecryptionSettings::new(KeySet::new(vec![Key::secret(vec![0u8; 32])]));
        settings.allowed_key_encryption_algorithms = vec![KeyEncryptionAlgorithm::Dir];
        settings.allowed_content_encryption_algorithms = vec![ContentEncryptionAlgorithm::A256Gcm];

        let policy = VerificationPolicy::builder(hmac_keys())
            .allowed_algorithms([SignatureAlgorithm::HS256])
            .decryption(settings)
            .build()
            .unwrap();
        let dec = policy.decryption().unwrap();
        assert!(!dec.continue_on_decryption_failure());
        assert_eq!(dec.header_checkers.len(), 3);
    }
}
