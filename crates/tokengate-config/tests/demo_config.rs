use std::path::PathBuf;

use serde_json::json;
use tokengate_auth::{ClaimSet, RequestParts, TokenSource};
use tokengate_config::{TokenGate, load_settings_from_file};

fn demo_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../demos/tokengate.toml")
}

#[test]
fn demo_config_issues_cookie_and_verifies_it() {
    let settings = load_settings_from_file(&demo_path()).unwrap();
    let gate = TokenGate::from_settings(&settings).unwrap();
    let issuer = gate.issuer.as_ref().unwrap();

    let mut claims = ClaimSet::new();
    claims.insert("username".to_string(), json!("alice"));
    let token = issuer.issue_at(claims, 10_000).unwrap();

    let response = gate.responder.respond(token.clone(), 10_000).unwrap();
    assert!(response.token.is_none());
    assert_eq!(response.set_cookies.len(), 1);
    assert!(response.set_cookies[0].starts_with(&format!("BEARER={token}; ")));

    let request = RequestParts::new().with_cookie("BEARER", token);
    let identity = gate.authenticator.verify_at(&request, 10_100).unwrap();
    assert_eq!(identity.user_id(), Some("alice"));
    assert_eq!(identity.source(), Some(TokenSource::Cookie));

    // exp = 13_600, skew 30
    assert!(gate.authenticator.verify_at(&request, 13_630).is_ok());
    assert!(gate.authenticator.verify_at(&request, 13_631).is_err());
}
