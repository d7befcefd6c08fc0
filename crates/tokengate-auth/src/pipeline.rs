//! End-to-end request authentication and token responses.

use std::borrow::Cow;

use serde_json::Value;
use tracing::{debug, warn};

use crate::checker::{self, CheckContext, ClaimSet, Violation};
use crate::cookie::{CookieSpec, build_clear_cookies, build_set_cookies};
use crate::error::Rejection;
use crate::extract::{ExtractorChain, TokenRequest, TokenSource};
use crate::jwe::{self, Decrypted, JWE_SEGMENTS};
use crate::jws::{self, JWS_SEGMENTS, segment_count};
use crate::policy::VerificationPolicy;
use crate::{Result, unix_now};

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    claims: ClaimSet,
    user_id_claim: String,
    source: Option<TokenSource>,
    key_id: Option<String>,
}

impl Identity {
    /// Verified claims.
    pub fn claims(&self) -> &ClaimSet {
        &self.claims
    }

    /// A single claim.
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    /// The user identifier, when the configured claim holds a string.
    pub fn user_id(&self) -> Option<&str> {
        self.claims.get(&self.user_id_claim).and_then(Value::as_str)
    }

    /// Where the token was found. `None` for tokens verified directly.
    pub fn source(&self) -> Option<TokenSource> {
        self.source
    }

    /// Id of the key that verified the signature.
    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    /// Consume into the claims.
    pub fn into_claims(self) -> ClaimSet {
        self.claims
    }
}

/// Extract, decrypt, verify and check a request's token.
#[derive(Debug, Clone)]
pub struct Authenticator {
    extractors: ExtractorChain,
    policy: VerificationPolicy,
}

impl Authenticator {
    /// Authenticator over `extractors` and `policy`.
    pub fn new(extractors: ExtractorChain, policy: VerificationPolicy) -> Self {
        Self { extractors, policy }
    }

    /// The verification policy.
    pub fn policy(&self) -> &VerificationPolicy {
        &self.policy
    }

    /// The extractor chain.
    pub fn extractors(&self) -> &ExtractorChain {
        &self.extractors
    }

    /// Authenticate `request` at the current time.
    pub fn verify<R: TokenRequest + ?Sized>(&self, request: &R) -> std::result::Result<Identity, Rejection> {
        self.verify_at(request, unix_now())
    }

    /// Authenticate `request` as of `now` (unix seconds).
    pub fn verify_at<R: TokenRequest + ?Sized>(
        &self,
        request: &R,
        now: u64,
    ) -> std::result::Result<Identity, Rejection> {
        let Some(raw) = self.extractors.extract(request) else {
            debug!("no token on request");
            return Err(Rejection::NoToken);
        };
        let mut identity = self.verify_token_at(raw.as_str(), now)?;
        identity.source = Some(raw.source());
        Ok(identity)
    }

    /// Verify a compact token at the current time.
    pub fn verify_token(&self, token: &str) -> std::result::Result<Identity, Rejection> {
        self.verify_token_at(token, unix_now())
    }

    /// Verify a compact token as of `now`.
    pub fn verify_token_at(&self, token: &str, now: u64) -> std::result::Result<Identity, Rejection> {
        self.run(token, now).inspect_err(|rejection| {
            warn!(reason = rejection.tag(), "token rejected");
        })
    }

    fn run(&self, token: &str, now: u64) -> std::result::Result<Identity, Rejection> {
        let segments = segment_count(token);
        if segments != JWS_SEGMENTS && segments != JWE_SEGMENTS {
            return Err(Rejection::Malformed);
        }
        let ctx = CheckContext {
            now,
            clock_skew: self.policy.clock_skew,
        };

        // Only a five-segment envelope reaches the decryption stage.
        let signed = match &self.policy.decryption {
            Some(decryption) if segments == JWE_SEGMENTS => {
                match jwe::decrypt(token, decryption, &ctx)? {
                    Decrypted::Inner(inner) => Cow::Owned(inner),
                    Decrypted::PassThrough => Cow::Borrowed(token),
                }
            }
            _ => Cow::Borrowed(token),
        };

        let verified = jws::verify(&signed, &self.policy, now)?;

        checker::run(&self.policy.claim_checkers, &verified.claims, &ctx).map_err(|v| match v {
            Violation::Missing { claim, .. } => Rejection::MandatoryClaimMissing { claim },
            Violation::Failed { checker } => Rejection::ClaimCheckFailed { checker },
        })?;

        let user_id_claim = self.policy.user_id_claim.clone();
        if !verified.claims.contains_key(&user_id_claim) {
            return Err(Rejection::MandatoryClaimMissing {
                claim: user_id_claim,
            });
        }

        Ok(Identity {
            claims: verified.claims,
            user_id_claim,
            source: None,
            key_id: verified.key_id,
        })
    }
}

/// What an issuance endpoint sends back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationResponse {
    /// Token for the response body. `None` when it travels only in cookies.
    pub token: Option<String>,
    /// `Set-Cookie` header values.
    pub set_cookies: Vec<String>,
}

/// Turns an issued token into an [`AuthenticationResponse`].
#[derive(Debug, Clone)]
pub struct TokenResponder {
    cookies: Vec<CookieSpec>,
    remove_token_from_body_when_cookies_used: bool,
    token_ttl: Option<u64>,
}

impl TokenResponder {
    /// Responder writing `cookies`. `token_ttl` is the fallback cookie lifetime.
    pub fn new(cookies: Vec<CookieSpec>, token_ttl: Option<u64>) -> Self {
        Self {
            cookies,
            remove_token_from_body_when_cookies_used: true,
            token_ttl,
        }
    }

    /// Keep the token in the body even when cookies carry it.
    #[must_use]
    pub fn remove_token_from_body_when_cookies_used(mut self, remove: bool) -> Self {
        self.remove_token_from_body_when_cookies_used = remove;
        self
    }

    /// Configured cookies.
    pub fn cookies(&self) -> &[CookieSpec] {
        &self.cookies
    }

    /// Build the response for `token`, issued at `issued_at`.
    pub fn respond(&self, token: String, issued_at: u64) -> Result<AuthenticationResponse> {
        let mut set_cookies = Vec::new();
        for spec in &self.cookies {
            set_cookies.extend(build_set_cookies(&token, spec, self.token_ttl, issued_at)?);
        }
        let token = if !set_cookies.is_empty() && self.remove_token_from_body_when_cookies_used {
            None
        } else {
            Some(token)
        };
        Ok(AuthenticationResponse { token, set_cookies })
    }

    /// `Set-Cookie` values that remove every configured cookie.
    pub fn clear_cookies(&self) -> Vec<String> {
        self.cookies.iter().flat_map(build_clear_cookies).collect()
    }
}
