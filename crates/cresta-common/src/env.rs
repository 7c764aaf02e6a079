//! Environment-string parsing utilities.
//!
//! The launcher deals with environment variables in two textual forms: the
//! `KEY=VALUE` strings found in OCI image configurations and the host
//! environment, and comma-separated `key=value` lists used by CLI options
//! such as `--mount`.

use std::collections::HashMap;

use crate::error::{CrestaError, CrestaResult};

/// Split a `KEY=VALUE` string into its key and value.
///
/// # Errors
///
/// Returns [`CrestaError::InvalidArgument`] if the string contains no `=`.
pub fn parse_environment_variable(variable: &str) -> CrestaResult<(String, String)> {
    variable
        .split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| CrestaError::InvalidArgument {
            message: format!("failed to parse environment variable \"{variable}\": expected '='"),
        })
}

/// Convert a slice of `KEY=VALUE` strings into a key-unique map.
///
/// Later entries override earlier ones with the same key, matching the
/// semantics of an environment block.
///
/// # Errors
///
/// Returns [`CrestaError::InvalidArgument`] if any entry contains no `=`.
pub fn parse_environment_variables(variables: &[String]) -> CrestaResult<HashMap<String, String>> {
    let mut map = HashMap::new();
    for variable in variables {
        let (key, value) = parse_environment_variable(variable)?;
        map.insert(key, value);
    }
    Ok(map)
}

/// Parse a list of key-value pairs into a key-unique map.
///
/// Pairs are separated by `pair_separator`, keys and values by
/// `kv_separator`. A pair without a key-value separator produces an entry
/// with an empty value (e.g. `readonly` in a `--mount` list).
///
/// # Errors
///
/// Returns [`CrestaError::InvalidArgument`] on an empty key, an empty value
/// after the key-value separator, a duplicated key, or a trailing pair
/// separator.
pub fn parse_key_value_list(
    list: &str,
    pair_separator: char,
    kv_separator: char,
) -> CrestaResult<HashMap<String, String>> {
    let mut map = HashMap::new();

    if list.is_empty() {
        return Ok(map);
    }
    if list.ends_with(pair_separator) {
        return Err(malformed_list(list, "list terminated with pair separator"));
    }

    for pair in list.split(pair_separator) {
        if pair.is_empty() {
            return Err(malformed_list(list, "found empty key"));
        }

        let (key, value) = match pair.split_once(kv_separator) {
            Some((key, value)) => {
                if value.is_empty() {
                    return Err(malformed_list(list, "found empty value"));
                }
                (key, value)
            }
            None => (pair, ""),
        };

        if key.is_empty() {
            return Err(malformed_list(list, "found empty key"));
        }
        if map.insert(key.to_string(), value.to_string()).is_some() {
            return Err(malformed_list(list, "found duplicated key"));
        }
    }

    Ok(map)
}

fn malformed_list(list: &str, reason: &str) -> CrestaError {
    CrestaError::InvalidArgument {
        message: format!("malformed list of key-value pairs \"{list}\": {reason}"),
    }
}

/// Split a separator-delimited string into its non-empty entries.
#[must_use]
pub fn split_string_list(list: &str, separator: char) -> Vec<String> {
    list.split(separator)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}
