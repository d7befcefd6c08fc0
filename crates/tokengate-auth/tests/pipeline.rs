//! End-to-end verification and issuance through the public API.

use serde_json::{Value, json};
use tokengate_auth::{
    Authenticator, ClaimSet, ContentEncryptionAlgorithm, DecryptionSettings, EncryptionSettings,
    Extractor, ExtractorChain, IssuancePolicy, Key, KeyEncryptionAlgorithm, KeySet,
    Rejection, RequestParts, SignatureAlgorithm, TokenIssuer, TokenSource,
    VerificationPolicy,
};

const HMAC_SECRET: &[u8] = b"integration-secret-of-32-bytes!!";
const ENC_KEY: [u8; 32] = [0x42; 32];

const EC_A_PRIVATE: &str = include_str!("fixtures/ec_a_private.pem");
const EC_A_PUBLIC: &str = include_str!("fixtures/ec_a_public.pem");
const EC_B_PRIVATE: &str = include_str!("fixtures/ec_b_private.pem");
const EC_B_PUBLIC: &str = include_str!("fixtures/ec_b_public.pem");

const EC_A_JWK: &str = r#"{
    "kty": "EC",
    "kid": "ec-a",
    "use": "sig",
    "crv": "P-256",
    "x": "8i8Gp3lEPmw-HpWtu0hM4wGAYaDY2eEGRjf37-MspSo",
    "y": "j8f9Q-zH5wWV-D9-QwJGY8Ee0g4p7qQmIh1ULdtuUfw"
}"#;

const NOW: u64 = 1_700_000_000;

fn claims(v: Value) -> ClaimSet {
    match v {
        Value::Object(m) => m,
        _ => panic!("not an object"),
    }
}

fn hmac_issuer() -> TokenIssuer {
    TokenIssuer::new(IssuancePolicy::new(
        SignatureAlgorithm::HS256,
        Key::secret(HMAC_SECRET.to_vec()).with_id("hmac"),
    ))
    .unwrap()
}

fn hmac_policy() -> VerificationPolicy {
    VerificationPolicy::builder(KeySet::new(vec![
        Key::secret(HMAC_SECRET.to_vec()).with_id("hmac"),
    ]))
    .allowed_algorithms([SignatureAlgorithm::HS256])
    .build()
    .unwrap()
}

fn encryption_settings() -> EncryptionSettings {
    EncryptionSettings {
        key_encryption_algorithm: KeyEncryptionAlgorithm::A256GcmKw,
        content_encryption_algorithm: ContentEncryptionAlgorithm::A256Gcm,
        key: Key::secret(ENC_KEY.to_vec()).with_id("enc"),
    }
}

fn decrypting_policy(continue_on_failure: bool) -> VerificationPolicy {
    let mut settings = DecryptionSettings::new(KeySet::new(vec![
        Key::secret(ENC_KEY.to_vec()).with_id("enc"),
    ]));
    settings.allowed_key_encryption_algorithms = vec![KeyEncryptionAlgorithm::A256GcmKw];
    settings.allowed_content_encryption_algorithms = vec![ContentEncryptionAlgorithm::A256Gcm];
    settings.continue_on_decryption_failure = continue_on_failure;

    VerificationPolicy::builder(KeySet::new(vec![Key::secret(HMAC_SECRET.to_vec())]))
        .allowed_algorithms([SignatureAlgorithm::HS256])
        .decryption(settings)
        .build()
        .unwrap()
}

fn bearer(token: &str) -> RequestParts {
    RequestParts::new().with_header("Authorization", format!("Bearer {token}"))
}

#[test]
fn signed_round_trip_recovers_claims() {
    let original = claims(json!({
        "username": "alice",
        "roles": ["admin", "ops"],
        "iat": NOW,
        "exp": NOW + 60,
        "meta": { "tenant": "acme" }
    }));
    let token = hmac_issuer().issue_at(original.clone(), NOW).unwrap();

    let auth = Authenticator::new(ExtractorChain::default(), hmac_policy());
    let identity = auth.verify_at(&bearer(&token), NOW).unwrap();
    assert_eq!(identity.claims(), &original);
    assert_eq!(identity.user_id(), Some("alice"));
    assert_eq!(identity.key_id(), Some("hmac"));
}

#[test]
fn encrypted_round_trip_recovers_claims() {
    let issuer = TokenIssuer::new(
        IssuancePolicy::new(SignatureAlgorithm::HS256, Key::secret(HMAC_SECRET.to_vec()))
            .with_encryption(encryption_settings()),
    )
    .unwrap();
    let token = issuer
        .issue_at(claims(json!({ "username": "alice" })), NOW)
        .unwrap();
    assert_eq!(token.split('.').count(), 5);

    let auth = Authenticator::new(ExtractorChain::default(), decrypting_policy(false));
    let identity = auth.verify_at(&bearer(&token), NOW).unwrap();
    assert_eq!(identity.user_id(), Some("alice"));
    assert_eq!(identity.claim("exp"), Some(&json!(NOW + 3600)));
}

#[test]
fn expired_envelope_fails_header_check() {
    let issuer = TokenIssuer::new(
        IssuancePolicy::new(SignatureAlgorithm::HS256, Key::secret(HMAC_SECRET.to_vec()))
            .with_encryption(encryption_settings()),
    )
    .unwrap();
    let token = issuer
        .issue_at(claims(json!({ "username": "alice" })), NOW)
        .unwrap();

    let auth = Authenticator::new(ExtractorChain::default(), decrypting_policy(false));
    assert_eq!(
        auth.verify_token_at(&token, NOW + 3601),
        Err(Rejection::HeaderCheckFailed {
            checker: "exp_with_clock_skew".to_string()
        })
    );
}

#[test]
fn plain_signed_token_skips_decryption() {
    let token = hmac_issuer()
        .issue_at(claims(json!({ "username": "alice" })), NOW)
        .unwrap();
    assert_eq!(token.split('.').count(), 3);

    for continue_on_failure in [false, true] {
        let auth = Authenticator::new(
            ExtractorChain::default(),
            decrypting_policy(continue_on_failure),
        );
        let identity = auth.verify_token_at(&token, NOW).unwrap();
        assert_eq!(identity.user_id(), Some("alice"));
    }

    // a plain token still goes through every signature-stage check
    let strict = Authenticator::new(ExtractorChain::default(), decrypting_policy(false));
    assert_eq!(
        strict.verify_token_at(&token, NOW + 3601),
        Err(Rejection::ClaimCheckFailed {
            checker: "exp_with_clock_skew".to_string()
        })
    );
}

#[test]
fn undecryptable_envelope_never_verifies() {
    let mut settings = encryption_settings();
    settings.key = Key::secret(vec![0x13; 32]).with_id("enc");
    let issuer = TokenIssuer::new(
        IssuancePolicy::new(SignatureAlgorithm::HS256, Key::secret(HMAC_SECRET.to_vec()))
            .with_encryption(settings),
    )
    .unwrap();
    let token = issuer
        .issue_at(claims(json!({ "username": "mallory" })), NOW)
        .unwrap();

    let strict = Authenticator::new(ExtractorChain::default(), decrypting_policy(false));
    assert_eq!(
        strict.verify_token_at(&token, NOW),
        Err(Rejection::DecryptionFailed)
    );

    // passing through hands the envelope itself to the signature stage
    let lenient = Authenticator::new(ExtractorChain::default(), decrypting_policy(true));
    assert_eq!(lenient.verify_token_at(&token, NOW), Err(Rejection::Malformed));
}

#[test]
fn public_key_is_never_an_hmac_secret() {
    let policy = VerificationPolicy::builder(KeySet::new(vec![Key::pem(EC_B_PUBLIC)]))
        .allowed_algorithms([SignatureAlgorithm::ES256, SignatureAlgorithm::HS256])
        .build()
        .unwrap();
    let auth = Authenticator::new(ExtractorChain::default(), policy);

    // forge an HS256 token keyed with the PEM text of the public key
    let forger = TokenIssuer::new(IssuancePolicy::new(
        SignatureAlgorithm::HS256,
        Key::secret(EC_B_PUBLIC.as_bytes().to_vec()),
    ))
    .unwrap();
    let forged = forger
        .issue_at(claims(json!({ "username": "admin" })), NOW)
        .unwrap();
    assert_eq!(auth.verify_token_at(&forged, NOW), Err(Rejection::BadSignature));
}

#[test]
fn expiration_boundary_with_clock_skew() {
    let token = hmac_issuer()
        .issue_at(claims(json!({ "username": "alice" })), NOW)
        .unwrap();
    let exp = NOW + 3600;

    let auth = Authenticator::new(ExtractorChain::default(), hmac_policy());
    assert!(auth.verify_token_at(&token, exp).is_ok());
    assert_eq!(
        auth.verify_token_at(&token, exp + 1),
        Err(Rejection::ClaimCheckFailed {
            checker: "exp_with_clock_skew".to_string()
        })
    );

    let skewed = VerificationPolicy::builder(KeySet::new(vec![Key::secret(HMAC_SECRET.to_vec())]))
        .allowed_algorithms([SignatureAlgorithm::HS256])
        .clock_skew(30)
        .build()
        .unwrap();
    let auth = Authenticator::new(ExtractorChain::default(), skewed);
    assert!(auth.verify_token_at(&token, exp + 30).is_ok());
    assert!(auth.verify_token_at(&token, exp + 31).is_err());
}

#[test]
fn token_without_exp_needs_allow_no_expiration() {
    let issuer = TokenIssuer::new(
        IssuancePolicy::new(SignatureAlgorithm::HS256, Key::secret(HMAC_SECRET.to_vec()))
            .with_token_ttl(None),
    )
    .unwrap();
    let token = issuer
        .issue_at(claims(json!({ "username": "alice" })), NOW)
        .unwrap();

    let strict = Authenticator::new(ExtractorChain::default(), hmac_policy());
    assert!(strict.verify_token_at(&token, NOW).is_err());

    let lenient = VerificationPolicy::builder(KeySet::new(vec![Key::secret(HMAC_SECRET.to_vec())]))
        .allowed_algorithms([SignatureAlgorithm::HS256])
        .allow_no_expiration(true)
        .build()
        .unwrap();
    let auth = Authenticator::new(ExtractorChain::default(), lenient);
    assert!(auth.verify_token_at(&token, NOW).is_ok());
}

#[test]
fn header_extractor_takes_precedence_when_listed_first() {
    let issuer = hmac_issuer();
    let alice = issuer
        .issue_at(claims(json!({ "username": "alice" })), NOW)
        .unwrap();
    let bob = issuer
        .issue_at(claims(json!({ "username": "bob" })), NOW)
        .unwrap();
    let request = bearer(&alice).with_cookie("BEARER", bob);

    let header_first = Authenticator::new(
        ExtractorChain::new(vec![Extractor::authorization_header(), Extractor::cookie()]),
        hmac_policy(),
    );
    let id = header_first.verify_at(&request, NOW).unwrap();
    assert_eq!(id.user_id(), Some("alice"));
    assert_eq!(id.source(), Some(TokenSource::Header));

    let cookie_first = Authenticator::new(
        ExtractorChain::new(vec![Extractor::cookie(), Extractor::authorization_header()]),
        hmac_policy(),
    );
    assert_eq!(
        cookie_first.verify_at(&request, NOW).unwrap().user_id(),
        Some("bob")
    );
}

#[test]
fn query_parameter_extraction() {
    let token = hmac_issuer()
        .issue_at(claims(json!({ "username": "dave" })), NOW)
        .unwrap();
    let auth = Authenticator::new(
        ExtractorChain::new(vec![Extractor::query_parameter()]),
        hmac_policy(),
    );
    let request = RequestParts::new().with_query_string(&format!("foo=1&bearer={token}"));
    let id = auth.verify_at(&request, NOW).unwrap();
    assert_eq!(id.source(), Some(TokenSource::Query));
}

#[test]
fn mandatory_claims_are_enforced() {
    let policy = VerificationPolicy::builder(KeySet::new(vec![Key::secret(HMAC_SECRET.to_vec())]))
        .allowed_algorithms([SignatureAlgorithm::HS256])
        .mandatory_claims(["username", "roles"])
        .build()
        .unwrap();
    let auth = Authenticator::new(ExtractorChain::default(), policy);

    let token = hmac_issuer()
        .issue_at(claims(json!({ "username": "alice" })), NOW)
        .unwrap();
    assert_eq!(
        auth.verify_token_at(&token, NOW),
        Err(Rejection::MandatoryClaimMissing {
            claim: "roles".to_string()
        })
    );

    let token = hmac_issuer()
        .issue_at(claims(json!({ "username": "alice", "roles": [] })), NOW)
        .unwrap();
    assert!(auth.verify_token_at(&token, NOW).is_ok());
}

#[test]
fn missing_mandatory_claim_wins_over_time_checks() {
    let policy = VerificationPolicy::builder(KeySet::new(vec![Key::secret(HMAC_SECRET.to_vec())]))
        .allowed_algorithms([SignatureAlgorithm::HS256])
        .mandatory_claims(["tenant"])
        .build()
        .unwrap();
    let auth = Authenticator::new(ExtractorChain::default(), policy);
    let missing = Err(Rejection::MandatoryClaimMissing {
        claim: "tenant".to_string(),
    });

    let expired = hmac_issuer()
        .issue_at(claims(json!({ "username": "alice" })), NOW)
        .unwrap();
    assert_eq!(auth.verify_token_at(&expired, NOW + 3601), missing);

    let no_exp = TokenIssuer::new(
        IssuancePolicy::new(SignatureAlgorithm::HS256, Key::secret(HMAC_SECRET.to_vec()))
            .with_token_ttl(None),
    )
    .unwrap()
    .issue_at(claims(json!({ "username": "alice" })), NOW)
    .unwrap();
    assert_eq!(auth.verify_token_at(&no_exp, NOW), missing);
}

#[test]
fn es256_with_several_candidate_keys() {
    let keyset = KeySet::new(vec![
        Key::from_jwk_json(EC_A_JWK).unwrap(),
        Key::pem(EC_B_PUBLIC).with_id("ec-b"),
    ]);
    let policy = VerificationPolicy::builder(keyset)
        .allowed_algorithms([SignatureAlgorithm::ES256])
        .build()
        .unwrap();
    let auth = Authenticator::new(ExtractorChain::default(), policy);

    let issue = |pem: &str, kid: Option<&str>| {
        let mut key = Key::pem(pem);
        if let Some(kid) = kid {
            key = key.with_id(kid);
        }
        TokenIssuer::new(IssuancePolicy::new(SignatureAlgorithm::ES256, key))
            .unwrap()
            .issue_at(claims(json!({ "username": "erin" })), NOW)
            .unwrap()
    };

    // kid hint selects the JWK
    let id = auth.verify_token_at(&issue(EC_A_PRIVATE, Some("ec-a")), NOW).unwrap();
    assert_eq!(id.key_id(), Some("ec-a"));

    // no kid: every candidate is tried until one verifies
    let id = auth.verify_token_at(&issue(EC_B_PRIVATE, None), NOW).unwrap();
    assert_eq!(id.key_id(), Some("ec-b"));

    // unknown kid falls back to all candidates
    let id = auth.verify_token_at(&issue(EC_A_PRIVATE, Some("rotated")), NOW).unwrap();
    assert_eq!(id.key_id(), Some("ec-a"));

    // a kid naming the wrong key is not rescued by the other one
    assert_eq!(
        auth.verify_token_at(&issue(EC_A_PRIVATE, Some("ec-b")), NOW),
        Err(Rejection::BadSignature)
    );
}

#[test]
fn es256_public_pem_alone_verifies() {
    let policy = VerificationPolicy::builder(KeySet::new(vec![Key::pem(EC_A_PUBLIC)]))
        .allowed_algorithms([SignatureAlgorithm::ES256])
        .build()
        .unwrap();
    let auth = Authenticator::new(ExtractorChain::default(), policy);
    let token = TokenIssuer::new(IssuancePolicy::new(
        SignatureAlgorithm::ES256,
        Key::pem(EC_B_PRIVATE),
    ))
    .unwrap()
    .issue_at(claims(json!({ "username": "erin" })), NOW)
    .unwrap();
    assert_eq!(auth.verify_token_at(&token, NOW), Err(Rejection::BadSignature));
}
