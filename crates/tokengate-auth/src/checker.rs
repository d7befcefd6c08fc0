//! Header and claim checkers.
//!
//! Checkers are resolved by name once, when a policy is built, and then run
//! in order against a claim set (or a protected header, which has the same
//! shape). The first violation stops the run.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::{Error, Result};

/// A JSON object: token claims or a protected header.
pub type ClaimSet = Map<String, Value>;

/// Inputs shared by every checker of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckContext {
    /// Current time, unix seconds.
    pub now: u64,
    /// Tolerance for time-bound checks, seconds.
    pub clock_skew: u64,
}

/// A failed check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// The named checker rejected the values.
    Failed {
        /// Checker name.
        checker: String,
    },
    /// A required member is absent.
    Missing {
        /// Checker name.
        checker: String,
        /// Name of the absent member.
        claim: String,
    },
}

impl Violation {
    /// Name of the checker that failed.
    pub fn checker(&self) -> &str {
        match self {
            Violation::Failed { checker } | Violation::Missing { checker, .. } => checker,
        }
    }
}

/// User-supplied check, registered by name in a [`CheckerRegistry`].
pub trait Check: Send + Sync + fmt::Debug {
    /// Return `true` when `values` are acceptable.
    fn check(&self, values: &ClaimSet, ctx: &CheckContext) -> bool;
}

/// A resolved checker.
#[derive(Debug, Clone)]
pub enum Checker {
    /// `exp` must not be older than `now - skew`.
    Expiration {
        /// Accept values without `exp`.
        allow_no_expiration: bool,
    },
    /// `iat` must not be later than `now + skew`.
    IssuedAt,
    /// `nbf` must not be later than `now + skew`.
    NotBefore,
    /// Every listed claim must be present.
    MandatoryClaims(Vec<String>),
    /// Every listed header member must be present.
    HeaderPresence(Vec<String>),
    /// A registered custom check.
    Custom {
        /// Registration name.
        name: String,
        /// Implementation.
        check: Arc<dyn Check>,
    },
}

impl Checker {
    /// Registry name of the expiration checker.
    pub const EXPIRATION: &'static str = "exp_with_clock_skew";
    /// Registry name of the issued-at checker.
    pub const ISSUED_AT: &'static str = "iat_with_clock_skew";
    /// Registry name of the not-before checker.
    pub const NOT_BEFORE: &'static str = "nbf_with_clock_skew";
    /// `header:<member>` requires `<member>` in the checked object.
    pub const PRESENCE_PREFIX: &'static str = "header:";

    /// Name reported on violation.
    pub fn name(&self) -> &str {
        match self {
            Checker::Expiration { .. } => Self::EXPIRATION,
            Checker::IssuedAt => Self::ISSUED_AT,
            Checker::NotBefore => Self::NOT_BEFORE,
            Checker::MandatoryClaims(_) => "mandatory_claims",
            Checker::HeaderPresence(_) => "header_presence",
            Checker::Custom { name, .. } => name,
        }
    }

    /// Apply the checker.
    pub fn check(&self, values: &ClaimSet, ctx: &CheckContext) -> std::result::Result<(), Violation> {
        let now = i64::try_from(ctx.now).unwrap_or(i64::MAX);
        let skew = i64::try_from(ctx.clock_skew).unwrap_or(i64::MAX);

        let ok = match self {
            Checker::Expiration { allow_no_expiration } => match timestamp(values, "exp") {
                None => *allow_no_expiration,
                Some(Some(exp)) => now <= exp.saturating_add(skew),
                Some(None) => false,
            },
            Checker::IssuedAt => match timestamp(values, "iat") {
                None => true,
                Some(Some(iat)) => iat <= now.saturating_add(skew),
                Some(None) => false,
            },
            Checker::NotBefore => match timestamp(values, "nbf") {
                None => true,
                Some(Some(nbf)) => now >= nbf.saturating_sub(skew),
                Some(None) => false,
            },
            Checker::MandatoryClaims(names) | Checker::HeaderPresence(names) => {
                return match names.iter().find(|n| !values.contains_key(n.as_str())) {
                    Some(missing) => Err(Violation::Missing {
                        checker: self.name().to_string(),
                        claim: missing.clone(),
                    }),
                    None => Ok(()),
                };
            }
            Checker::Custom { check, .. } => check.check(values, ctx),
        };

        if ok {
            Ok(())
        } else {
            Err(Violation::Failed {
                checker: self.name().to_string(),
            })
        }
    }
}

/// `None` if absent, `Some(None)` if present but not a number.
fn timestamp(values: &ClaimSet, name: &str) -> Option<Option<i64>> {
    let value = values.get(name)?;
    #[allow(clippy::cast_possible_truncation)]
    let ts = value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64));
    Some(ts)
}

/// Run `checkers` in order, stopping at the first violation.
pub fn run(
    checkers: &[Checker],
    values: &ClaimSet,
    ctx: &CheckContext,
) -> std::result::Result<(), Violation> {
    checkers.iter().try_for_each(|c| c.check(values, ctx))
}

/// Name → checker table used to resolve configured checker names.
#[derive(Debug, Clone)]
pub struct CheckerRegistry {
    entries: BTreeMap<String, Checker>,
}

impl CheckerRegistry {
    /// Registry with the three time-bound checkers.
    pub fn with_builtins(allow_no_expiration: bool) -> Self {
        let mut entries = BTreeMap::new();
        for checker in [
            Checker::Expiration {
                allow_no_expiration,
            },
            Checker::IssuedAt,
            Checker::NotBefore,
        ] {
            entries.insert(checker.name().to_string(), checker);
        }
        Self { entries }
    }

    /// Register a custom checker, replacing any entry with the same name.
    pub fn register(&mut self, name: impl Into<String>, check: Arc<dyn Check>) {
        let name = name.into();
        self.entries
            .insert(name.clone(), Checker::Custom { name, check });
    }

    /// True if `name` resolves.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Resolve names in order. Unknown names are a configuration error.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Checker>> {
        names.iter().map(|n| self.resolve_one(n.as_ref())).collect()
    }

    fn resolve_one(&self, name: &str) -> Result<Checker> {
        if let Some(member) = name.strip_prefix(Checker::PRESENCE_PREFIX) {
            if member.is_empty() {
                return Err(Error::Config(format!("empty member in checker: {name}")));
            }
            return Ok(Checker::HeaderPresence(vec![member.to_string()]));
        }
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Config(format!("unknown checker: {name}")))
    }
}

impl Default for CheckerRegistry {
    fn default() -> Self {
        Self::with_builtins(false)
    }
}
