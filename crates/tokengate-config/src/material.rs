//! Key material values: inline or `file:` references, PEM or JWK.

use std::fs;
use std::path::Path;

use tokengate_auth::{Key, KeySet};

use crate::ConfigError;

const FILE_PREFIX: &str = "file:";

/// Inline value, or the content of the file it references.
pub(crate) fn read_value(value: &str, base_dir: Option<&Path>) -> Result<String, ConfigError> {
    let Some(path) = value.strip_prefix(FILE_PREFIX) else {
        return Ok(value.to_string());
    };
    let path = Path::new(path.trim());
    let path = match base_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    };
    fs::read_to_string(&path).map_err(|source| ConfigError::Read { path, source })
}

pub(crate) fn is_pem(value: &str) -> bool {
    value.trim_start().starts_with("-----BEGIN")
}

fn is_json_object(value: &str) -> bool {
    value.trim_start().starts_with('{')
}

/// A JWK, or a PEM key for asymmetric algorithms.
pub(crate) fn jwk_or_pem(value: &str, setting: &str) -> Result<Key, ConfigError> {
    if is_pem(value) {
        Ok(Key::pem(value.trim()))
    } else if is_json_object(value) {
        Ok(Key::from_jwk_json(value)?)
    } else {
        Err(ConfigError::invalid(setting, "expected a JWK or a PEM key"))
    }
}

/// A JWK (JSON object) only.
pub(crate) fn jwk(value: &str, setting: &str) -> Result<Key, ConfigError> {
    if !is_json_object(value) {
        return Err(ConfigError::invalid(setting, "expected a JWK"));
    }
    Ok(Key::from_jwk_json(value)?)
}

/// A non-empty JWK set.
pub(crate) fn keyset(value: &str, setting: &str) -> Result<KeySet, ConfigError> {
    if !is_json_object(value) {
        return Err(ConfigError::invalid(setting, "expected a JWK set"));
    }
    let set = KeySet::from_jwks_json(value)?;
    if set.is_empty() {
        return Err(ConfigError::invalid(setting, "key set is empty"));
    }
    Ok(set)
}
