//! tokengate-auth
//!
//! Stateless bearer-token authentication for HTTP services.
//! It covers both directions of the token lifecycle:
//!
//! - **Verifying** a request: ordered token extraction (header, cookie, query,
//!   split cookies), optional decryption of an encrypted envelope, signature
//!   verification against an allow-listed key set, then header/claim checkers
//!   with clock-skew tolerance.
//! - **Issuing** a token: sign a claim set, optionally encrypt it, and write it
//!   to the response body and/or one or more `Set-Cookie` values.
//!
//! Policies ([`VerificationPolicy`], [`IssuancePolicy`]) are built once and
//! validated eagerly; verification then never fails with a configuration
//! error, only with a [`Rejection`].
//!
//! ## Quick start
//! ```no_run
//! use tokengate_auth::{
//!     Authenticator, ExtractorChain, IssuancePolicy, Key, KeySet, RequestParts,
//!     SignatureAlgorithm, TokenIssuer, VerificationPolicy,
//! };
//!
//! # fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let secret = b"a-32-byte-secret-for-hs256-demo!".to_vec();
//!
//! let issuer = TokenIssuer::new(IssuancePolicy::new(
//!     SignatureAlgorithm::HS256,
//!     Key::secret(secret.clone()),
//! ))?;
//! let mut claims = serde_json::Map::new();
//! claims.insert("username".into(), "alice".into());
//! let token = issuer.issue(claims)?;
//!
//! let policy = VerificationPolicy::builder(KeySet::new(vec![Key::secret(secret)]))
//!     .allowed_algorithms([SignatureAlgorithm::HS256])
//!     .build()?;
//! let auth = Authenticator::new(ExtractorChain::default(), policy);
//!
//! let request = RequestParts::new().with_header("Authorization", format!("Bearer {token}"));
//! let identity = auth.verify(&request)?;
//! println!("user={:?}", identity.user_id());
//! # Ok(()) }
//! ```

#![forbid(unsafe_code)]

mod algorithm;
mod checker;
mod cookie;
mod error;
mod extract;
mod issuer;
mod jwe;
mod jws;
mod keys;
mod pipeline;
mod policy;

use std::time::{SystemTime, UNIX_EPOCH};

pub use algorithm::{
    ContentEncryptionAlgorithm, Family, KeyEncryptionAlgorithm, SignatureAlgorithm,
    parse_signature_algorithm, signature_algorithm_name,
};
pub use checker::{Check, CheckContext, Checker, CheckerRegistry, ClaimSet, Violation};
pub use cookie::{CookieSpec, SameSite, build_clear_cookies, build_set_cookies, split_token};
pub use error::{Error, Rejection, Result};
pub use extract::{Extractor, ExtractorChain, RawToken, RequestParts, TokenRequest, TokenSource};
pub use issuer::TokenIssuer;
pub use jwe::{Decrypted, JWE_SEGMENTS, decrypt};
pub use jws::{JWS_SEGMENTS, VerifiedToken, verify as verify_signature};
pub use keys::{Jwk, JwkSet, Key, KeyMaterial, KeyRequest, KeySet, KeyUse};
pub use pipeline::{AuthenticationResponse, Authenticator, Identity, TokenResponder};
pub use policy::{
    DEFAULT_CLAIM_CHECKERS, DEFAULT_ENVELOPE_HEADER_CHECKERS, DEFAULT_TOKEN_TTL,
    DEFAULT_USER_ID_CLAIM, DecryptionPolicy, DecryptionSettings, EncryptionSettings,
    IssuancePolicy, VerificationPolicy, VerificationPolicyBuilder,
};

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}
