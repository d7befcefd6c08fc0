//! The TOML document, as deserialized. Every key is optional.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokengate_auth::{DEFAULT_CLAIM_CHECKERS, DEFAULT_ENVELOPE_HEADER_CHECKERS};

/// The whole configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// PEM public key used for verification in legacy key mode.
    pub public_key: Option<String>,
    /// More PEM public keys, tried in order after `public_key`.
    pub additional_public_keys: Vec<String>,
    /// HMAC secret or PEM private key used for signing in legacy key mode.
    pub secret_key: Option<String>,
    /// Passphrase of an encrypted private key. Not supported; must stay empty.
    pub pass_phrase: String,
    /// Token lifetime in seconds. `0` issues tokens without `exp`.
    pub token_ttl: u64,
    pub allow_no_expiration: bool,
    pub clock_skew: u64,
    pub encoder: EncoderSettings,
    pub user_id_claim: String,
    pub token_extractors: TokenExtractorSettings,
    pub remove_token_from_body_when_cookies_used: bool,
    pub set_cookies: BTreeMap<String, CookieSettings>,
    pub access_token_issuance: IssuanceSettings,
    pub access_token_verification: VerificationSettings,

    /// Directory `file:` paths are resolved against.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            public_key: None,
            additional_public_keys: Vec::new(),
            secret_key: None,
            pass_phrase: String::new(),
            token_ttl: 3600,
            allow_no_expiration: false,
            clock_skew: 0,
            encoder: EncoderSettings::default(),
            user_id_claim: "username".to_string(),
            token_extractors: TokenExtractorSettings::default(),
            remove_token_from_body_when_cookies_used: true,
            set_cookies: BTreeMap::new(),
            access_token_issuance: IssuanceSettings::default(),
            access_token_verification: VerificationSettings::default(),
            base_dir: None,
        }
    }
}

/// `[encoder]`: legacy key mode algorithm.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    pub signature_algorithm: String,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            signature_algorithm: "RS256".to_string(),
        }
    }
}

/// Extractor names, as used in `token_extractors.order`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    AuthorizationHeader,
    Cookie,
    QueryParameter,
    SplitCookie,
}

impl ExtractorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ExtractorKind::AuthorizationHeader => "authorization_header",
            ExtractorKind::Cookie => "cookie",
            ExtractorKind::QueryParameter => "query_parameter",
            ExtractorKind::SplitCookie => "split_cookie",
        }
    }
}

/// `[token_extractors]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenExtractorSettings {
    pub authorization_header: AuthorizationHeaderSettings,
    pub cookie: CookieExtractorSettings,
    pub query_parameter: QueryParameterSettings,
    pub split_cookie: SplitCookieSettings,
    /// Precedence of the enabled extractors.
    pub order: Vec<ExtractorKind>,
}

impl Default for TokenExtractorSettings {
    fn default() -> Self {
        Self {
            authorization_header: AuthorizationHeaderSettings::default(),
            cookie: CookieExtractorSettings::default(),
            query_parameter: QueryParameterSettings::default(),
            split_cookie: SplitCookieSettings::default(),
            order: vec![
                ExtractorKind::AuthorizationHeader,
                ExtractorKind::Cookie,
                ExtractorKind::QueryParameter,
                ExtractorKind::SplitCookie,
            ],
        }
    }
}

/// `[token_extractors.authorization_header]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizationHeaderSettings {
    pub enabled: bool,
    pub prefix: String,
    pub name: String,
}

impl Default for AuthorizationHeaderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: "Bearer".to_string(),
            name: "Authorization".to_string(),
        }
    }
}

/// `[token_extractors.cookie]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieExtractorSettings {
    pub enabled: bool,
    pub name: String,
}

impl Default for CookieExtractorSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            name: "BEARER".to_string(),
        }
    }
}

/// `[token_extractors.query_parameter]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryParameterSettings {
    pub enabled: bool,
    pub name: String,
}

impl Default for QueryParameterSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            name: "bearer".to_string(),
        }
    }
}

/// `[token_extractors.split_cookie]`: fragment cookie names in reassembly order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitCookieSettings {
    pub enabled: bool,
    pub cookies: Vec<String>,
}

/// `[set_cookies.<NAME>]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieSettings {
    /// `None` uses `token_ttl`; `0` makes a session cookie.
    pub lifetime: Option<u64>,
    pub samesite: String,
    pub path: String,
    pub domain: Option<String>,
    pub secure: bool,
    #[serde(alias = "httpOnly")]
    pub http_only: bool,
    pub partitioned: bool,
    pub split: Vec<String>,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            lifetime: None,
            samesite: "lax".to_string(),
            path: "/".to_string(),
            domain: None,
            secure: true,
            http_only: true,
            partitioned: false,
            split: Vec::new(),
        }
    }
}

/// `[access_token_issuance]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuanceSettings {
    pub enabled: bool,
    pub signature: Option<SignatureIssuanceSettings>,
    pub encryption: IssuanceEncryptionSettings,
}

/// `[access_token_issuance.signature]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureIssuanceSettings {
    pub algorithm: String,
    /// JWK JSON, or a PEM private key for asymmetric algorithms.
    pub key: String,
}

/// `[access_token_issuance.encryption]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuanceEncryptionSettings {
    pub enabled: bool,
    pub key_encryption_algorithm: Option<String>,
    pub content_encryption_algorithm: Option<String>,
    /// JWK JSON (`oct`).
    pub key: Option<String>,
}

/// `[access_token_verification]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationSettings {
    pub enabled: bool,
    pub signature: Option<SignatureVerificationSettings>,
    pub encryption: VerificationEncryptionSettings,
}

/// `[access_token_verification.signature]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureVerificationSettings {
    #[serde(default)]
    pub header_checkers: Vec<String>,
    #[serde(default = "default_claim_checkers")]
    pub claim_checkers: Vec<String>,
    #[serde(default)]
    pub mandatory_claims: Vec<String>,
    #[serde(default)]
    pub allowed_algorithms: Vec<String>,
    /// JWKSet JSON.
    pub keyset: String,
}

/// `[access_token_verification.encryption]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationEncryptionSettings {
    pub enabled: bool,
    pub continue_on_decryption_failure: bool,
    pub header_checkers: Vec<String>,
    pub allowed_key_encryption_algorithms: Vec<String>,
    pub allowed_content_encryption_algorithms: Vec<String>,
    /// JWKSet JSON.
    pub keyset: Option<String>,
}

impl Default for VerificationEncryptionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            continue_on_decryption_failure: false,
            header_checkers: DEFAULT_ENVELOPE_HEADER_CHECKERS
                .iter()
                .map(ToString::to_string)
                .collect(),
            allowed_key_encryption_algorithms: Vec::new(),
            allowed_content_encryption_algorithms: Vec::new(),
            keyset: None,
        }
    }
}

fn default_claim_checkers() -> Vec<String> {
    DEFAULT_CLAIM_CHECKERS.iter().map(ToString::to_string).collect()
}
