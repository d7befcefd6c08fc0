//! Tokens written across several cookies come back byte-for-byte.

use proptest::prelude::*;
use serde_json::{Value, json};
use tokengate_auth::{
    Authenticator, CookieSpec, Extractor, ExtractorChain, IssuancePolicy, Key, KeySet,
    RequestParts, SignatureAlgorithm, TokenIssuer, TokenResponder, TokenSource,
    VerificationPolicy, build_set_cookies,
};

const SECRET: &[u8] = b"split-cookie-secret-32-bytes-long";

/// Turn `Set-Cookie` values into the request a browser would send back.
fn replay(set_cookies: &[String]) -> RequestParts {
    let pairs: Vec<&str> = set_cookies
        .iter()
        .map(|sc| sc.split(';').next().unwrap_or_default())
        .collect();
    RequestParts::new().with_header("Cookie", pairs.join("; "))
}

fn suffixes(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("_{i}")).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: any token that fills every fragment reassembles exactly
    #[test]
    fn prop_split_round_trip(token in "[A-Za-z0-9_.-]{8,400}", n in 1usize..=8) {
        prop_assume!(token.len().div_ceil(token.len().div_ceil(n)) == n);
        let mut spec = CookieSpec::new("jwt");
        spec.split = suffixes(n);

        let set_cookies = build_set_cookies(&token, &spec, Some(60), 0).unwrap();
        prop_assert_eq!(set_cookies.len(), n);

        let extractor = Extractor::split_cookie(spec.cookie_names());
        let raw = extractor.extract(&replay(&set_cookies)).unwrap();
        prop_assert_eq!(raw.as_str(), token.as_str());
        prop_assert_eq!(raw.source(), TokenSource::SplitCookie);
    }

    /// Property: dropping any one fragment makes the extractor find nothing
    #[test]
    fn prop_missing_fragment_is_not_found(n in 2usize..=6, dropped in 0usize..6) {
        prop_assume!(dropped < n);
        let mut spec = CookieSpec::new("jwt");
        spec.split = suffixes(n);

        let mut set_cookies = build_set_cookies("header.payload.signature", &spec, None, 0).unwrap();
        set_cookies.remove(dropped);

        let extractor = Extractor::split_cookie(spec.cookie_names());
        prop_assert!(extractor.extract(&replay(&set_cookies)).is_none());
    }
}

#[test]
fn issued_split_token_authenticates() {
    let issuer = TokenIssuer::new(IssuancePolicy::new(
        SignatureAlgorithm::HS256,
        Key::secret(SECRET.to_vec()),
    ))
    .unwrap();
    let mut claims = serde_json::Map::new();
    claims.insert("username".to_string(), Value::from("alice"));
    let token = issuer.issue_at(claims, 1_000).unwrap();

    let mut spec = CookieSpec::new("jwt");
    spec.split = vec!["_hp".to_string(), "_s".to_string()];
    let responder = TokenResponder::new(vec![spec.clone()], issuer.token_ttl());
    let response = responder.respond(token, 1_000).unwrap();
    assert_eq!(response.token, None);
    assert_eq!(response.set_cookies.len(), 2);

    let policy = VerificationPolicy::builder(KeySet::new(vec![Key::secret(SECRET.to_vec())]))
        .allowed_algorithms([SignatureAlgorithm::HS256])
        .build()
        .unwrap();
    let auth = Authenticator::new(
        ExtractorChain::new(vec![
            Extractor::authorization_header(),
            Extractor::split_cookie(spec.cookie_names()),
        ]),
        policy,
    );
    let identity = auth.verify_at(&replay(&response.set_cookies), 1_000).unwrap();
    assert_eq!(identity.claim("username"), Some(&json!("alice")));
    assert_eq!(identity.source(), Some(TokenSource::SplitCookie));
}
