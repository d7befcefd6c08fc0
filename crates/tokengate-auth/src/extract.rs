//! Token extraction from inbound requests.

use std::collections::BTreeMap;

use tracing::debug;

/// What an extractor can read from a request.
///
/// Header lookups are expected to be case-insensitive.
pub trait TokenRequest {
    /// First value of a header.
    fn header(&self, name: &str) -> Option<&str>;
    /// Value of a cookie.
    fn cookie(&self, name: &str) -> Option<&str>;
    /// Value of a query-string parameter.
    fn query(&self, name: &str) -> Option<&str>;
}

/// Owned request parts, enough to run the extractor chain.
#[derive(Debug, Clone, Default)]
pub struct RequestParts {
    headers: BTreeMap<String, String>,
    cookies: BTreeMap<String, String>,
    query: BTreeMap<String, String>,
}

impl RequestParts {
    /// Empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header. A `Cookie` header is also parsed into cookies.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        if name.eq_ignore_ascii_case("cookie") {
            for (k, v) in parse_cookie_header(&value) {
                self.cookies.entry(k).or_insert(v);
            }
        }
        self.headers
            .entry(name.to_ascii_lowercase())
            .or_insert(value);
        self
    }

    /// Add a cookie.
    #[must_use]
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Add a query parameter (already decoded).
    #[must_use]
    pub fn with_query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Parse a raw (form-urlencoded) query string. The first occurrence of a name wins.
    #[must_use]
    pub fn with_query_string(mut self, query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
            self.query.entry(k.into_owned()).or_insert(v.into_owned());
        }
        self
    }
}

impl TokenRequest for RequestParts {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}

fn parse_cookie_header(value: &str) -> impl Iterator<Item = (String, String)> + '_ {
    value.split(';').filter_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        let k = k.trim();
        if k.is_empty() {
            return None;
        }
        let v = v.trim().trim_matches('"');
        Some((k.to_string(), v.to_string()))
    })
}

/// Where a token was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// Authorization-style header.
    Header,
    /// Single cookie.
    Cookie,
    /// Query-string parameter.
    Query,
    /// Several cookies concatenated in declared order.
    SplitCookie,
}

/// A token found on a request. Immutable once extracted.
#[derive(Clone, PartialEq, Eq)]
pub struct RawToken {
    value: String,
    source: TokenSource,
}

impl RawToken {
    /// Wrap a token value.
    pub fn new(value: impl Into<String>, source: TokenSource) -> Self {
        Self {
            value: value.into(),
            source,
        }
    }

    /// The compact token.
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Where it came from.
    pub fn source(&self) -> TokenSource {
        self.source
    }
}

impl std::fmt::Debug for RawToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawToken")
            .field("source", &self.source)
            .field("len", &self.value.len())
            .finish()
    }
}

/// One extraction strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extractor {
    /// `<name>: <prefix> <token>`.
    AuthorizationHeader {
        /// Header name.
        name: String,
        /// Required scheme prefix, compared case-insensitively. Empty takes the whole value.
        prefix: String,
    },
    /// A single cookie, read verbatim.
    Cookie {
        /// Cookie name.
        name: String,
    },
    /// A query-string parameter.
    QueryParameter {
        /// Parameter name.
        name: String,
    },
    /// Several cookies concatenated in order. Any missing fragment fails.
    SplitCookie {
        /// Cookie names in reassembly order.
        cookies: Vec<String>,
    },
}

impl Extractor {
    /// `Authorization: Bearer <token>`.
    pub fn authorization_header() -> Self {
        Extractor::AuthorizationHeader {
            name: "Authorization".to_string(),
            prefix: "Bearer".to_string(),
        }
    }

    /// Cookie named `BEARER`.
    pub fn cookie() -> Self {
        Extractor::Cookie {
            name: "BEARER".to_string(),
        }
    }

    /// Query parameter named `bearer`.
    pub fn query_parameter() -> Self {
        Extractor::QueryParameter {
            name: "bearer".to_string(),
        }
    }

    /// Split cookie over `cookies`, in order.
    pub fn split_cookie<I, S>(cookies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Extractor::SplitCookie {
            cookies: cookies.into_iter().map(Into::into).collect(),
        }
    }

    /// Try this extractor alone.
    pub fn extract<R: TokenRequest + ?Sized>(&self, request: &R) -> Option<RawToken> {
        match self {
            Extractor::AuthorizationHeader { name, prefix } => {
                let value = request.header(name)?;
                let token = if prefix.is_empty() {
                    value.trim()
                } else {
                    let mut parts = value.split(' ');
                    let (scheme, token) = (parts.next()?, parts.next()?);
                    if parts.next().is_some() || !scheme.eq_ignore_ascii_case(prefix) {
                        return None;
                    }
                    token
                };
                non_empty(token).map(|t| RawToken::new(t, TokenSource::Header))
            }
            Extractor::Cookie { name } => {
                non_empty(request.cookie(name)?).map(|t| RawToken::new(t, TokenSource::Cookie))
            }
            Extractor::QueryParameter { name } => {
                non_empty(request.query(name)?).map(|t| RawToken::new(t, TokenSource::Query))
            }
            Extractor::SplitCookie { cookies } => {
                if cookies.is_empty() {
                    return None;
                }
                let mut token = String::new();
                for name in cookies {
                    token.push_str(non_empty(request.cookie(name)?)?);
                }
                Some(RawToken::new(token, TokenSource::SplitCookie))
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Extractor::AuthorizationHeader { .. } => "authorization_header",
            Extractor::Cookie { .. } => "cookie",
            Extractor::QueryParameter { .. } => "query_parameter",
            Extractor::SplitCookie { .. } => "split_cookie",
        }
    }
}

fn non_empty(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}

/// Ordered extractors; the first one that finds a token wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorChain {
    extractors: Vec<Extractor>,
}

impl ExtractorChain {
    /// Chain trying `extractors` in the given order.
    pub fn new(extractors: Vec<Extractor>) -> Self {
        Self { extractors }
    }

    /// The extractors, in precedence order.
    pub fn extractors(&self) -> &[Extractor] {
        &self.extractors
    }

    /// First token found, or `None`.
    pub fn extract<R: TokenRequest + ?Sized>(&self, request: &R) -> Option<RawToken> {
        self.extractors.iter().find_map(|extractor| {
            let token = extractor.extract(request)?;
            debug!(extractor = extractor.kind(), "token extracted");
            Some(token)
        })
    }
}

impl Default for ExtractorChain {
    /// Authorization header only.
    fn default() -> Self {
        Self::new(vec![Extractor::authorization_header()])
    }
}
