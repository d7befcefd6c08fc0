//! `Set-Cookie` emission, including tokens split across several cookies.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, UNIX_EPOCH};

use httpdate::fmt_http_date;

use crate::{Error, Result};

/// SameSite attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    /// SameSite=Strict
    Strict,
    /// SameSite=Lax
    #[default]
    Lax,
    /// SameSite=None
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SameSite {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(SameSite::Strict),
            "lax" => Ok(SameSite::Lax),
            "none" => Ok(SameSite::None),
            other => Err(Error::Config(format!("invalid samesite value: {other}"))),
        }
    }
}

/// How an issued token is written to cookies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieSpec {
    /// Base cookie name. Split fragments append their suffix to it.
    pub name: String,
    /// Lifetime in seconds. `None` uses the token TTL, `Some(0)` makes a session cookie.
    pub lifetime: Option<u64>,
    /// Cookie path.
    pub path: String,
    /// Optional cookie domain.
    pub domain: Option<String>,
    /// Send on HTTPS only.
    pub secure: bool,
    /// Not accessible to JS.
    pub http_only: bool,
    /// CHIPS partitioned cookie.
    pub partitioned: bool,
    /// SameSite attribute.
    pub same_site: SameSite,
    /// Name suffixes of the fragments. Empty emits one cookie.
    pub split: Vec<String>,
}

impl CookieSpec {
    /// Cookie with the default attributes: path `/`, secure, http-only, lax.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lifetime: None,
            path: "/".to_string(),
            domain: None,
            secure: true,
            http_only: true,
            partitioned: false,
            same_site: SameSite::Lax,
            split: Vec::new(),
        }
    }

    /// Names of the cookies written for this token, in reassembly order.
    pub fn cookie_names(&self) -> Vec<String> {
        if self.split.is_empty() {
            vec![self.name.clone()]
        } else {
            self.split
                .iter()
                .map(|suffix| format!("{}{suffix}", self.name))
                .collect()
        }
    }

    fn attributes(&self, parts: &mut Vec<String>) {
        parts.push(format!("Path={}", self.path));
        if let Some(domain) = &self.domain {
            parts.push(format!("Domain={domain}"));
        }
        if self.secure {
            parts.push("Secure".to_string());
        }
        if self.http_only {
            parts.push("HttpOnly".to_string());
        }
        parts.push(format!("SameSite={}", self.same_site));
        if self.partitioned {
            parts.push("Partitioned".to_string());
        }
    }
}

/// Partition `token` into `n` contiguous, non-empty fragments of
/// `ceil(len / n)` characters (the last one may be shorter).
pub fn split_token(token: &str, n: usize) -> Result<Vec<String>> {
    let chars: Vec<char> = token.chars().collect();
    if n == 0 || chars.len() < n {
        return Err(Error::Encoding(format!(
            "token of {} characters cannot be split into {n} cookies",
            chars.len()
        )));
    }
    let size = chars.len().div_ceil(n);
    let fragments: Vec<String> = chars
        .chunks(size)
        .map(|chunk| chunk.iter().collect())
        .collect();
    if fragments.len() != n {
        return Err(Error::Encoding(format!(
            "token of {} characters cannot be split into {n} cookies",
            chars.len()
        )));
    }
    Ok(fragments)
}

/// Build the `Set-Cookie` values carrying `token`.
///
/// `issued_at` (unix seconds) anchors `Expires`. `token_ttl` is the fallback
/// lifetime when the cookie has none; if both are absent the cookie is a
/// session cookie.
pub fn build_set_cookies(
    token: &str,
    spec: &CookieSpec,
    token_ttl: Option<u64>,
    issued_at: u64,
) -> Result<Vec<String>> {
    let values = if spec.split.is_empty() {
        vec![token.to_string()]
    } else {
        split_token(token, spec.split.len())?
    };

    let lifetime = spec.lifetime.or(token_ttl).filter(|l| *l > 0);

    Ok(spec
        .cookie_names()
        .into_iter()
        .zip(values)
        .map(|(name, value)| {
            let mut parts = vec![format!("{name}={value}")];
            spec.attributes(&mut parts);
            if let Some(max_age) = lifetime {
                parts.push(format!("Max-Age={max_age}"));
                // Expires for older clients.
                let expires = UNIX_EPOCH + Duration::from_secs(issued_at.saturating_add(max_age));
                parts.push(format!("Expires={}", fmt_http_date(expires)));
            }
            parts.join("; ")
        })
        .collect())
}

/// Build `Set-Cookie` values that clear every cookie of `spec`.
pub fn build_clear_cookies(spec: &CookieSpec) -> Vec<String> {
    spec.cookie_names()
        .into_iter()
        .map(|name| {
            let mut parts = vec![format!("{name}=")];
            spec.attributes(&mut parts);
            parts.push("Max-Age=0".to_string());
            parts.push(format!("Expires={}", fmt_http_date(UNIX_EPOCH)));
            parts.join("; ")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_cookie_with_ttl_fallback() {
        let spec = CookieSpec::new("BEARER");
        let sc = build_set_cookies("a.b.c", &spec, Some(3600), 0).unwrap();
        assert_eq!(sc.len(), 1);
        assert_eq!(
            sc[0],
            "BEARER=a.b.c; Path=/; Secure; HttpOnly; SameSite=Lax; Max-Age=3600; \
             Expires=Thu, 01 Jan 1970 01:00:00 GMT"
        );
    }

    #[test]
    fn zero_lifetime_is_session_cookie() {
        let mut spec = CookieSpec::new("BEARER");
        spec.lifetime = Some(0);
        let sc = build_set_cookies("a.b.c", &spec, Some(3600), 0).unwrap();
        assert!(!sc[0].contains("Max-Age"));
        assert!(!sc[0].contains("Expires"));
    }

    #[test]
    fn attributes_follow_cookie_settings() {
        let mut spec = CookieSpec::new("jwt");
        spec.domain = Some("example.com".to_string());
        spec.secure = false;
        spec.http_only = false;
        spec.partitioned = true;
        spec.same_site = SameSite::None;
        spec.lifetime = Some(60);
        let sc = build_set_cookies("tok", &spec, None, 100).unwrap();
        assert!(sc[0].starts_with("jwt=tok; Path=/; Domain=example.com; SameSite=None; Partitioned"));
        assert!(sc[0].contains("Max-Age=60"));
        assert!(!sc[0].contains("Secure"));
        assert!(!sc[0].contains("HttpOnly"));
    }

    #[test]
    fn split_emits_one_cookie_per_suffix() {
        let mut spec = CookieSpec::new("jwt");
        spec.split = vec!["_hp".to_string(), "_s".to_string()];
        let sc = build_set_cookies("abcd.efgh", &spec, None, 0).unwrap();
        assert_eq!(sc.len(), 2);
        assert!(sc[0].starts_with("jwt_hp=abcd.; "));
        assert!(sc[1].starts_with("jwt_s=efgh; "));
    }

    #[test]
    fn split_partition_is_exact() {
        assert_eq!(split_token("abcdefg", 3).unwrap(), vec!["abc", "def", "g"]);
        assert_eq!(split_token("abc", 3).unwrap(), vec!["a", "b", "c"]);
        assert_eq!(split_token("abcdefg", 1).unwrap(), vec!["abcdefg"]);
    }

    #[test]
    fn split_rejects_short_tokens() {
        assert!(split_token("ab", 3).is_err());
        // ceil(5 / 4) = 2 leaves only three fragments
        assert!(split_token("abcde", 4).is_err());
        assert!(split_token("abc", 0).is_err());
    }

    #[test]
    fn clear_cookies_cover_every_fragment() {
        let mut spec = CookieSpec::new("jwt");
        spec.split = vec!["_a".to_string(), "_b".to_string()];
        let sc = build_clear_cookies(&spec);
        assert_eq!(sc.len(), 2);
        assert!(sc.iter().all(|c| c.contains("Max-Age=0")));
        assert!(sc[1].starts_with("jwt_b=; "));
    }

    #[test]
    fn samesite_parses_case_insensitively() {
        assert_eq!("STRICT".parse::<SameSite>().unwrap(), SameSite::Strict);
        assert_eq!("none".parse::<SameSite>().unwrap(), SameSite::None);
        assert!("sometimes".parse::<SameSite>().is_err());
    }
}
