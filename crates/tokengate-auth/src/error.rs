//! Error types.

use thiserror::Error;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Configuration and issuance errors.
///
/// These surface while building policies, key sets or the issuer, i.e. before
/// any request is served. Per-request verification failures are [`Rejection`]s.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration is inconsistent or incomplete.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Key material could not be parsed or used.
    #[error("invalid key: {0}")]
    Key(String),

    /// Algorithm name is not supported by this crate.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Token could not be assembled.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// JSON serialization error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// jsonwebtoken error.
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// Why a request was not authenticated.
///
/// Only the tag and, for checker failures, the checker or claim name are
/// exposed. Underlying cryptographic errors are never carried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// No extractor found a token on the request.
    #[error("no token found")]
    NoToken,

    /// The compact serialization is structurally invalid.
    #[error("malformed token")]
    Malformed,

    /// The declared algorithm is not allow-listed.
    #[error("algorithm not allowed")]
    AlgorithmNotAllowed,

    /// No candidate key verified the signature.
    #[error("bad signature")]
    BadSignature,

    /// A header checker rejected the token.
    #[error("header check failed: {checker}")]
    HeaderCheckFailed {
        /// Name of the failing checker.
        checker: String,
    },

    /// The encrypted envelope could not be opened.
    #[error("decryption failed")]
    DecryptionFailed,

    /// A claim checker rejected the token.
    #[error("claim check failed: {checker}")]
    ClaimCheckFailed {
        /// Name of the failing checker.
        checker: String,
    },

    /// A mandatory claim is absent.
    #[error("mandatory claim missing: {claim}")]
    MandatoryClaimMissing {
        /// Name of the missing claim.
        claim: String,
    },
}

impl Rejection {
    /// Short machine-readable tag.
    pub fn tag(&self) -> &'static str {
        match self {
            Rejection::NoToken => "no_token",
            Rejection::Malformed => "malformed",
            Rejection::AlgorithmNotAllowed => "algorithm_not_allowed",
            Rejection::BadSignature => "bad_signature",
            Rejection::HeaderCheckFailed { .. } => "header_check_failed",
            Rejection::DecryptionFailed => "decryption_failed",
            Rejection::ClaimCheckFailed { .. } => "claim_check_failed",
            Rejection::MandatoryClaimMissing { .. } => "mandatory_claim_missing",
        }
    }

    /// True when the request simply carried no token.
    ///
    /// Callers usually treat this as "anonymous" rather than as a failed login.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Rejection::NoToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_display_carries_no_crypto_detail() {
        let r = Rejection::ClaimCheckFailed {
            checker: "exp_with_clock_skew".to_string(),
        };
        assert_eq!(r.to_string(), "claim check failed: exp_with_clock_skew");
        assert_eq!(r.tag(), "claim_check_failed");
        assert_eq!(Rejection::BadSignature.to_string(), "bad signature");
    }

    #[test]
    fn only_no_token_is_unauthenticated() {
        assert!(Rejection::NoToken.is_unauthenticated());
        assert!(!Rejection::Malformed.is_unauthenticated());
        assert!(!Rejection::DecryptionFailed.is_unauthenticated());
    }
}
