//! tokengate-config
//!
//! Loads the TOML configuration of a token gate and turns it into the
//! immutable policies of `tokengate-auth`. Everything is validated here, at
//! startup: unknown checker names, unusable keys, empty allow-lists and
//! unsupported algorithms are reported before any request is served.
//!
//! ```no_run
//! use std::path::Path;
//! use tokengate_config::{TokenGate, load_settings_from_file};
//!
//! # fn demo() -> Result<(), tokengate_config::ConfigError> {
//! let settings = load_settings_from_file(Path::new("tokengate.toml"))?;
//! let gate = TokenGate::from_settings(&settings)?;
//! # let _ = gate;
//! # Ok(()) }
//! ```

#![forbid(unsafe_code)]

mod gate;
mod material;
mod settings;

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

pub use gate::{
    TokenGate, cookie_specs, extractor_chain, issuance_policy, token_responder,
    verification_policy,
};
pub use settings::{
    AuthorizationHeaderSettings, CookieExtractorSettings, CookieSettings, EncoderSettings,
    ExtractorKind, IssuanceEncryptionSettings, IssuanceSettings, QueryParameterSettings,
    Settings, SignatureIssuanceSettings, SignatureVerificationSettings, SplitCookieSettings,
    TokenExtractorSettings, VerificationEncryptionSettings, VerificationSettings,
};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration or key file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid TOML for the settings model.
    #[error("invalid TOML in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A setting has an unusable value.
    #[error("invalid setting `{setting}`: {message}")]
    Invalid { setting: String, message: String },

    /// A policy, key or algorithm was refused while building the gate.
    #[error(transparent)]
    Auth(#[from] tokengate_auth::Error),
}

impl ConfigError {
    pub(crate) fn invalid(setting: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            setting: setting.into(),
            message: message.into(),
        }
    }
}

/// Read and parse a configuration file. Relative `file:` key paths resolve
/// against the file's directory.
pub fn load_settings_from_file(path: &Path) -> Result<Settings, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut settings: Settings = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    settings.base_dir = path.parent().map(Path::to_path_buf);
    debug!(path = %path.display(), "configuration loaded");
    Ok(settings)
}

/// Parse configuration from a string. `file:` paths resolve against the
/// working directory.
pub fn load_settings_from_str(content: &str) -> Result<Settings, ConfigError> {
    toml::from_str(content).map_err(|source| ConfigError::Parse {
        path: PathBuf::from("<inline>"),
        source,
    })
}
