use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tokengate_auth::{ClaimSet, Extractor, RequestParts, TokenSource, unix_now};
use tokengate_config::{TokenGate, load_settings_from_file};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "tokengate", about = "Issue and verify bearer tokens from a tokengate config")]
struct Cli {
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file.
    #[arg(long, global = true, default_value = "tokengate.toml")]
    config: PathBuf,

    /// Debug logging (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Load the configuration and report what it enables
    CheckConfig,
    /// Issue a token for the given claims
    Issue {
        /// Claim as KEY=VALUE; VALUE is parsed as JSON when possible
        #[arg(long = "claim", value_parser = parse_key_val)]
        claims: Vec<(String, String)>,
        /// Claims as one JSON object, merged before --claim values
        #[arg(long)]
        claims_json: Option<String>,
        /// Issue as of this unix time instead of now
        #[arg(long)]
        now: Option<u64>,
    },
    /// Verify a token, or a request assembled from headers/cookies/query
    Verify {
        /// Compact token; bypasses the extractors
        token: Option<String>,
        /// Request header as NAME=VALUE
        #[arg(long = "header", value_parser = parse_key_val)]
        headers: Vec<(String, String)>,
        /// Request cookie as NAME=VALUE
        #[arg(long = "cookie", value_parser = parse_key_val)]
        cookies: Vec<(String, String)>,
        /// Raw query string
        #[arg(long)]
        query: Option<String>,
        /// Verify as of this unix time instead of now
        #[arg(long)]
        now: Option<u64>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = load_settings_from_file(&cli.config)?;
    let gate = TokenGate::from_settings(&settings)
        .with_context(|| format!("invalid configuration in {}", cli.config.display()))?;
    debug!(config = %cli.config.display(), "token gate ready");

    match cli.command {
        Commands::CheckConfig => {
            let summary = summarize(&gate);
            pout(cli.json, summary, "Configuration OK")?;
        }
        Commands::Issue {
            claims,
            claims_json,
            now,
        } => {
            let issuer = gate
                .issuer
                .as_ref()
                .context("no signing key configured; set secret_key or enable access_token_issuance")?;
            let claims = build_claims(claims_json.as_deref(), claims)?;
            let now = now.unwrap_or_else(unix_now);

            let token = issuer.issue_at(claims, now)?;
            let response = gate.responder.respond(token, now)?;
            let text = response
                .token
                .iter()
                .cloned()
                .chain(response.set_cookies.iter().map(|c| format!("Set-Cookie: {c}")))
                .collect::<Vec<_>>()
                .join("\n");
            pout(
                cli.json,
                json!({ "token": response.token, "set_cookies": response.set_cookies }),
                &text,
            )?;
        }
        Commands::Verify {
            token,
            headers,
            cookies,
            query,
            now,
        } => {
            let now = now.unwrap_or_else(unix_now);
            let result = match token {
                Some(token) => gate.authenticator.verify_token_at(&token, now),
                None => {
                    let mut request = RequestParts::new();
                    for (name, value) in headers {
                        request = request.with_header(&name, value);
                    }
                    for (name, value) in cookies {
                        request = request.with_cookie(name, value);
                    }
                    if let Some(query) = query {
                        request = request.with_query_string(&query);
                    }
                    gate.authenticator.verify_at(&request, now)
                }
            };

            match result {
                Ok(identity) => {
                    let text = format!(
                        "Token valid (user: {})",
                        identity.user_id().unwrap_or("<not a string>")
                    );
                    pout(
                        cli.json,
                        json!({
                            "ok": true,
                            "user_id": identity.user_id(),
                            "source": identity.source().map(source_name),
                            "key_id": identity.key_id(),
                            "claims": identity.claims(),
                        }),
                        &text,
                    )?;
                }
                Err(rejection) => {
                    if cli.json {
                        pout(true, json!({ "ok": false, "reason": rejection.tag() }), "")?;
                    }
                    anyhow::bail!("token rejected: {rejection}");
                }
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn summarize(gate: &TokenGate) -> Value {
    let policy = gate.authenticator.policy();
    let extractors: Vec<&str> = gate
        .authenticator
        .extractors()
        .extractors()
        .iter()
        .map(extractor_name)
        .collect();
    let algorithms: Vec<&str> = policy
        .allowed_algorithms()
        .iter()
        .map(|a| tokengate_auth::signature_algorithm_name(*a))
        .collect();
    let cookies: Vec<Vec<String>> = gate
        .responder
        .cookies()
        .iter()
        .map(tokengate_auth::CookieSpec::cookie_names)
        .collect();

    json!({
        "extractors": extractors,
        "allowed_algorithms": algorithms,
        "clock_skew": policy.clock_skew(),
        "user_id_claim": policy.user_id_claim(),
        "decryption": policy.decryption().map(|d| json!({
            "continue_on_decryption_failure": d.continue_on_decryption_failure(),
        })),
        "issuer": gate.issuer.as_ref().map(|i| json!({
            "encrypts": i.encrypts(),
            "token_ttl": i.token_ttl(),
        })),
        "cookies": cookies,
    })
}

fn extractor_name(extractor: &Extractor) -> &'static str {
    match extractor {
        Extractor::AuthorizationHeader { .. } => "authorization_header",
        Extractor::Cookie { .. } => "cookie",
        Extractor::QueryParameter { .. } => "query_parameter",
        Extractor::SplitCookie { .. } => "split_cookie",
    }
}

fn source_name(source: TokenSource) -> &'static str {
    match source {
        TokenSource::Header => "header",
        TokenSource::Cookie => "cookie",
        TokenSource::Query => "query",
        TokenSource::SplitCookie => "split_cookie",
    }
}

fn build_claims(claims_json: Option<&str>, pairs: Vec<(String, String)>) -> anyhow::Result<ClaimSet> {
    let mut claims = match claims_json {
        Some(raw) => match serde_json::from_str(raw).context("--claims-json is not valid JSON")? {
            Value::Object(map) => map,
            _ => anyhow::bail!("--claims-json must be a JSON object"),
        },
        None => ClaimSet::new(),
    };
    for (key, value) in pairs {
        let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
        claims.insert(key, value);
    }
    Ok(claims)
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s.find('=').ok_or_else(|| "must be KEY=VALUE".to_string())?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn pout(json_mode: bool, value: Value, text: &str) -> anyhow::Result<()> {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{text}");
    }
    Ok(())
}
