//! Signed tokens: compact parsing, signature verification and signing.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{EncodingKey, Header, Validation};
use serde_json::Value;
use tracing::debug;

use crate::Result;
use crate::algorithm::{SignatureAlgorithm, parse_signature_algorithm};
use crate::checker::{self, CheckContext, ClaimSet};
use crate::error::Rejection;
use crate::keys::KeyRequest;
use crate::policy::VerificationPolicy;

/// Number of segments of a compact signed token.
pub const JWS_SEGMENTS: usize = 3;

/// A token whose signature verified.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedToken {
    /// Protected header.
    pub header: ClaimSet,
    /// Claims. Only readable after the signature verified.
    pub claims: ClaimSet,
    /// Id of the key that verified, when it has one.
    pub key_id: Option<String>,
}

pub(crate) fn segment_count(token: &str) -> usize {
    token.split('.').count()
}

/// Decode a base64url segment holding a JSON object.
pub(crate) fn decode_json_segment(segment: &str) -> Option<ClaimSet> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).ok()?;
    match serde_json::from_slice(&bytes).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Verify the signature of `token` and run the header checkers.
///
/// The declared `alg` must be allow-listed before any key is tried. Keys are
/// tried in resolver order and the first that verifies wins. Claims are
/// decoded only by a successful verification.
pub fn verify(
    token: &str,
    policy: &VerificationPolicy,
    now: u64,
) -> std::result::Result<VerifiedToken, Rejection> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != JWS_SEGMENTS || segments[..2].iter().any(|s| s.is_empty()) {
        return Err(Rejection::Malformed);
    }
    let header = decode_json_segment(segments[0]).ok_or(Rejection::Malformed)?;

    let alg_name = header
        .get("alg")
        .and_then(Value::as_str)
        .ok_or(Rejection::Malformed)?;
    let alg = parse_signature_algorithm(alg_name).map_err(|_| Rejection::AlgorithmNotAllowed)?;
    if !policy.allowed_algorithms.contains(&alg) {
        return Err(Rejection::AlgorithmNotAllowed);
    }

    let kid = header.get("kid").and_then(Value::as_str);
    let claims_and_key = verify_with_candidates(token, alg, kid, policy)?;
    let (claims, key_id) = claims_and_key.ok_or(Rejection::BadSignature)?;

    let ctx = CheckContext {
        now,
        clock_skew: policy.clock_skew,
    };
    checker::run(&policy.header_checkers, &header, &ctx).map_err(|v| {
        Rejection::HeaderCheckFailed {
            checker: v.checker().to_string(),
        }
    })?;

    Ok(VerifiedToken {
        header,
        claims,
        key_id,
    })
}

/// `Ok(None)` when no candidate verified.
fn verify_with_candidates(
    token: &str,
    alg: SignatureAlgorithm,
    kid: Option<&str>,
    policy: &VerificationPolicy,
) -> std::result::Result<Option<(ClaimSet, Option<String>)>, Rejection> {
    let validation = signature_only_validation(alg);

    for key in policy.keyset.resolve(KeyRequest::Signature(alg), kid) {
        let Ok(decoding_key) = key.decoding_key(alg) else {
            continue;
        };
        match jsonwebtoken::decode::<ClaimSet>(token, &decoding_key, &validation) {
            Ok(data) => {
                debug!(kid = ?key.id(), "signature verified");
                return Ok(Some((data.claims, key.id().map(ToString::to_string))));
            }
            Err(e) => match e.kind() {
                ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
                    return Err(Rejection::Malformed);
                }
                _ => {}
            },
        }
    }

    Ok(None)
}

/// Validation that checks the signature and nothing else; claims go through
/// the configured checkers instead.
fn signature_only_validation(alg: SignatureAlgorithm) -> Validation {
    let mut validation = Validation::new(alg);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    validation.leeway = 0;
    validation
}

/// Sign `claims` into a compact token.
pub(crate) fn sign(
    claims: &ClaimSet,
    alg: SignatureAlgorithm,
    key: &EncodingKey,
    kid: Option<&str>,
) -> Result<String> {
    let mut header = Header::new(alg);
    header.typ = Some("JWT".to_string());
    header.kid = kid.map(ToString::to_string);
    Ok(jsonwebtoken::encode(&header, claims, key)?)
}
