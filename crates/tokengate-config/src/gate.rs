//! Settings → policies.

use std::str::FromStr;

use tokengate_auth::{
    Authenticator, ContentEncryptionAlgorithm, CookieSpec, DecryptionSettings,
    EncryptionSettings, Extractor, ExtractorChain, Family, IssuancePolicy, Key,
    KeyEncryptionAlgorithm, KeySet, SameSite, SignatureAlgorithm, TokenIssuer, TokenResponder,
    VerificationPolicy,
};
use tracing::{debug, warn};

use crate::ConfigError;
use crate::material::{is_pem, jwk, jwk_or_pem, keyset, read_value};
use crate::settings::{ExtractorKind, Settings};

/// Everything a service needs to authenticate requests and issue tokens.
#[derive(Debug, Clone)]
pub struct TokenGate {
    /// Extractor chain and verification policy.
    pub authenticator: Authenticator,
    /// `None` when no signing key is configured (verify-only deployments).
    pub issuer: Option<TokenIssuer>,
    /// Cookie emission for issued tokens.
    pub responder: TokenResponder,
}

impl TokenGate {
    /// Build and validate every part of the gate from loaded settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let authenticator = Authenticator::new(
            extractor_chain(settings)?,
            verification_policy(settings)?,
        );
        let issuer = issuance_policy(settings)?
            .map(TokenIssuer::new)
            .transpose()?;
        let responder = token_responder(settings)?;
        Ok(Self {
            authenticator,
            issuer,
            responder,
        })
    }
}

fn token_ttl(settings: &Settings) -> Option<u64> {
    (settings.token_ttl > 0).then_some(settings.token_ttl)
}

fn is_hmac(alg: SignatureAlgorithm) -> bool {
    matches!(
        alg,
        SignatureAlgorithm::HS256 | SignatureAlgorithm::HS384 | SignatureAlgorithm::HS512
    )
}

fn parse_algorithm<T: FromStr>(name: &str, setting: &str, expected: Family) -> Result<T, ConfigError> {
    name.parse::<T>().map_err(|_| {
        let message = match Family::of(name) {
            Some(family) if family != expected => {
                format!("{name} is a {family} algorithm, expected {expected}")
            }
            _ => format!("unsupported {expected} algorithm {name:?}"),
        };
        ConfigError::invalid(setting, message)
    })
}

fn parse_algorithms<T: FromStr>(
    names: &[String],
    setting: &str,
    expected: Family,
) -> Result<Vec<T>, ConfigError> {
    if names.is_empty() {
        return Err(ConfigError::invalid(setting, "at least one algorithm is required"));
    }
    names
        .iter()
        .map(|n| parse_algorithm(n, setting, expected))
        .collect()
}

fn check_pass_phrase(settings: &Settings) -> Result<(), ConfigError> {
    if settings.pass_phrase.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            "pass_phrase",
            "encrypted private keys are not supported",
        ))
    }
}

/// Build the verification policy, from `access_token_verification` when
/// enabled, otherwise from the legacy key settings.
pub fn verification_policy(settings: &Settings) -> Result<VerificationPolicy, ConfigError> {
    check_pass_phrase(settings)?;
    let base = settings.base_dir.as_deref();
    let verification = &settings.access_token_verification;

    let builder = if verification.enabled {
        let signature = verification.signature.as_ref().ok_or_else(|| {
            ConfigError::invalid(
                "access_token_verification.signature",
                "required when verification is enabled",
            )
        })?;
        let algorithms: Vec<SignatureAlgorithm> = parse_algorithms(
            &signature.allowed_algorithms,
            "access_token_verification.signature.allowed_algorithms",
            Family::Signature,
        )?;
        let keys = keyset(
            &read_value(&signature.keyset, base)?,
            "access_token_verification.signature.keyset",
        )?;

        let mut builder = VerificationPolicy::builder(keys)
            .allowed_algorithms(algorithms)
            .header_checkers(signature.header_checkers.iter().cloned())
            .claim_checkers(signature.claim_checkers.iter().cloned())
            .mandatory_claims(signature.mandatory_claims.iter().cloned());

        if verification.encryption.enabled {
            builder = builder.decryption(decryption_settings(settings)?);
        }
        builder
    } else {
        let alg: SignatureAlgorithm = parse_algorithm(
            &settings.encoder.signature_algorithm,
            "encoder.signature_algorithm",
            Family::Signature,
        )?;
        VerificationPolicy::builder(legacy_verification_keys(settings, alg)?)
            .allowed_algorithms([alg])
    };

    if settings.allow_no_expiration {
        warn!("tokens without an exp claim are accepted");
    }

    Ok(builder
        .clock_skew(settings.clock_skew)
        .allow_no_expiration(settings.allow_no_expiration)
        .user_id_claim(settings.user_id_claim.clone())
        .build()?)
}

fn decryption_settings(settings: &Settings) -> Result<DecryptionSettings, ConfigError> {
    let encryption = &settings.access_token_verification.encryption;
    let value = encryption.keyset.as_deref().ok_or_else(|| {
        ConfigError::invalid(
            "access_token_verification.encryption.keyset",
            "required when encryption is enabled",
        )
    })?;
    let keys = keyset(
        &read_value(value, settings.base_dir.as_deref())?,
        "access_token_verification.encryption.keyset",
    )?;

    let mut decryption = DecryptionSettings::new(keys);
    decryption.allowed_key_encryption_algorithms = parse_algorithms::<KeyEncryptionAlgorithm>(
        &encryption.allowed_key_encryption_algorithms,
        "access_token_verification.encryption.allowed_key_encryption_algorithms",
        Family::KeyEncryption,
    )?;
    decryption.allowed_content_encryption_algorithms =
        parse_algorithms::<ContentEncryptionAlgorithm>(
            &encryption.allowed_content_encryption_algorithms,
            "access_token_verification.encryption.allowed_content_encryption_algorithms",
            Family::ContentEncryption,
        )?;
    decryption.header_checkers.clone_from(&encryption.header_checkers);
    decryption.continue_on_decryption_failure = encryption.continue_on_decryption_failure;

    if decryption.continue_on_decryption_failure {
        warn!("unencrypted tokens are accepted alongside encrypted ones");
    }
    Ok(decryption)
}

fn legacy_verification_keys(
    settings: &Settings,
    alg: SignatureAlgorithm,
) -> Result<KeySet, ConfigError> {
    let base = settings.base_dir.as_deref();

    if is_hmac(alg) {
        let secret = settings.secret_key.as_deref().ok_or_else(|| {
            ConfigError::invalid("secret_key", "required to verify HMAC-signed tokens")
        })?;
        let secret = read_value(secret, base)?;
        if is_pem(&secret) {
            return Err(ConfigError::invalid(
                "secret_key",
                "HMAC algorithms need a raw secret, not a PEM key",
            ));
        }
        return Ok(KeySet::new(vec![Key::secret(secret.into_bytes())]));
    }

    let mut keys = KeySet::default();
    for (setting, value) in settings
        .public_key
        .iter()
        .map(|v| ("public_key", v))
        .chain(
            settings
                .additional_public_keys
                .iter()
                .map(|v| ("additional_public_keys", v)),
        )
    {
        let pem = read_value(value, base)?;
        if !is_pem(&pem) {
            return Err(ConfigError::invalid(setting, "expected a PEM public key"));
        }
        keys.push(Key::pem(pem.trim()));
    }
    if keys.is_empty() {
        return Err(ConfigError::invalid(
            "public_key",
            "required to verify asymmetrically signed tokens",
        ));
    }
    debug!(keys = keys.len(), "legacy verification keys loaded");
    Ok(keys)
}

/// Build the issuance policy, from `access_token_issuance` when enabled,
/// otherwise from `secret_key`. `None` when no signing key is configured.
pub fn issuance_policy(settings: &Settings) -> Result<Option<IssuancePolicy>, ConfigError> {
    check_pass_phrase(settings)?;
    let base = settings.base_dir.as_deref();
    let issuance = &settings.access_token_issuance;

    let policy = if issuance.enabled {
        let signature = issuance.signature.as_ref().ok_or_else(|| {
            ConfigError::invalid(
                "access_token_issuance.signature",
                "required when issuance is enabled",
            )
        })?;
        let alg: SignatureAlgorithm = parse_algorithm(
            &signature.algorithm,
            "access_token_issuance.signature.algorithm",
            Family::Signature,
        )?;
        let key = jwk_or_pem(
            &read_value(&signature.key, base)?,
            "access_token_issuance.signature.key",
        )?;
        let mut policy = IssuancePolicy::new(alg, key);
        if issuance.encryption.enabled {
            policy = policy.with_encryption(encryption_settings(settings)?);
        }
        policy
    } else {
        let Some(secret) = settings.secret_key.as_deref() else {
            return Ok(None);
        };
        let alg: SignatureAlgorithm = parse_algorithm(
            &settings.encoder.signature_algorithm,
            "encoder.signature_algorithm",
            Family::Signature,
        )?;
        let secret = read_value(secret, base)?;
        let key = if is_hmac(alg) {
            Key::secret(secret.into_bytes())
        } else if is_pem(&secret) {
            Key::pem(secret.trim())
        } else {
            return Err(ConfigError::invalid(
                "secret_key",
                "asymmetric algorithms need a PEM private key",
            ));
        };
        IssuancePolicy::new(alg, key)
    };

    Ok(Some(policy.with_token_ttl(token_ttl(settings))))
}

fn encryption_settings(settings: &Settings) -> Result<EncryptionSettings, ConfigError> {
    let encryption = &settings.access_token_issuance.encryption;
    let required = |value: &Option<String>, setting: &str| {
        value.clone().ok_or_else(|| {
            ConfigError::invalid(
                format!("access_token_issuance.encryption.{setting}"),
                "required when encryption is enabled",
            )
        })
    };

    let kea = required(&encryption.key_encryption_algorithm, "key_encryption_algorithm")?;
    let cea = required(
        &encryption.content_encryption_algorithm,
        "content_encryption_algorithm",
    )?;
    let key = required(&encryption.key, "key")?;

    Ok(EncryptionSettings {
        key_encryption_algorithm: parse_algorithm(
            &kea,
            "access_token_issuance.encryption.key_encryption_algorithm",
            Family::KeyEncryption,
        )?,
        content_encryption_algorithm: parse_algorithm(
            &cea,
            "access_token_issuance.encryption.content_encryption_algorithm",
            Family::ContentEncryption,
        )?,
        key: jwk(
            &read_value(&key, settings.base_dir.as_deref())?,
            "access_token_issuance.encryption.key",
        )?,
    })
}

/// Build the extractor chain in `token_extractors.order`.
pub fn extractor_chain(settings: &Settings) -> Result<ExtractorChain, ConfigError> {
    let config = &settings.token_extractors;
    let enabled = [
        (ExtractorKind::AuthorizationHeader, config.authorization_header.enabled),
        (ExtractorKind::Cookie, config.cookie.enabled),
        (ExtractorKind::QueryParameter, config.query_parameter.enabled),
        (ExtractorKind::SplitCookie, config.split_cookie.enabled),
    ];

    for (i, kind) in config.order.iter().enumerate() {
        if config.order[..i].contains(kind) {
            return Err(ConfigError::invalid(
                "token_extractors.order",
                format!("{} is listed twice", kind.as_str()),
            ));
        }
    }
    if let Some((kind, _)) = enabled
        .iter()
        .find(|(kind, on)| *on && !config.order.contains(kind))
    {
        return Err(ConfigError::invalid(
            "token_extractors.order",
            format!("enabled extractor {} is missing", kind.as_str()),
        ));
    }

    let mut extractors = Vec::new();
    for kind in &config.order {
        let extractor = match kind {
            ExtractorKind::AuthorizationHeader if config.authorization_header.enabled => {
                Extractor::AuthorizationHeader {
                    name: config.authorization_header.name.clone(),
                    prefix: config.authorization_header.prefix.clone(),
                }
            }
            ExtractorKind::Cookie if config.cookie.enabled => Extractor::Cookie {
                name: config.cookie.name.clone(),
            },
            ExtractorKind::QueryParameter if config.query_parameter.enabled => {
                Extractor::QueryParameter {
                    name: config.query_parameter.name.clone(),
                }
            }
            ExtractorKind::SplitCookie if config.split_cookie.enabled => {
                if config.split_cookie.cookies.is_empty() {
                    return Err(ConfigError::invalid(
                        "token_extractors.split_cookie.cookies",
                        "at least one cookie name is required",
                    ));
                }
                Extractor::split_cookie(config.split_cookie.cookies.iter().cloned())
            }
            _ => continue,
        };
        extractors.push(extractor);
    }

    if extractors.is_empty() {
        return Err(ConfigError::invalid(
            "token_extractors",
            "no token extractor is enabled",
        ));
    }
    Ok(ExtractorChain::new(extractors))
}

/// Cookie specs of `set_cookies`, by name.
pub fn cookie_specs(settings: &Settings) -> Result<Vec<CookieSpec>, ConfigError> {
    settings
        .set_cookies
        .iter()
        .map(|(name, cookie)| {
            let setting = |field: &str| format!("set_cookies.{name}.{field}");
            if cookie.path.is_empty() {
                return Err(ConfigError::invalid(setting("path"), "cannot be empty"));
            }
            let same_site = cookie
                .samesite
                .parse::<SameSite>()
                .map_err(|e| ConfigError::invalid(setting("samesite"), e.to_string()))?;
            Ok(CookieSpec {
                name: name.clone(),
                lifetime: cookie.lifetime,
                path: cookie.path.clone(),
                domain: cookie.domain.clone(),
                secure: cookie.secure,
                http_only: cookie.http_only,
                partitioned: cookie.partitioned,
                same_site,
                split: cookie.split.clone(),
            })
        })
        .collect()
}

/// Responder writing the configured cookies.
pub fn token_responder(settings: &Settings) -> Result<TokenResponder, ConfigError> {
    Ok(TokenResponder::new(cookie_specs(settings)?, token_ttl(settings))
        .remove_token_from_body_when_cookies_used(
            settings.remove_token_from_body_when_cookies_used,
        ))
}
