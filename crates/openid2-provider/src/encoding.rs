//! OpenID message encodings
//!
//! A protocol message is a flat [`Params`] map. This module maps it to and
//! from the two transport forms OpenID 2.0 uses: `openid.`-prefixed HTTP
//! form/query parameters and the newline-delimited key-value body of direct
//! responses.

use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;

/// OpenID 2.0 protocol namespace.
pub const NAMESPACE: &str = "http://specs.openid.net/auth/2.0";

/// Prefix carried by every OpenID field in HTTP requests and redirects.
pub const HTTP_PREFIX: &str = "openid.";

/// Flat parameter map of a single protocol message.
///
/// Ordered so every encoding of a message is deterministic.
pub type Params = BTreeMap<String, String>;

/// Key-value body decoding error.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid key-value line {0:?}")]
pub struct KeyValueError(pub String);

/// Extract OpenID fields from decoded HTTP pairs.
///
/// Only `openid.`-prefixed keys are kept, with the prefix removed. When a key
/// repeats, the first value wins.
pub fn parse_http<I, K, V>(pairs: I) -> Params
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let mut params = Params::new();
    for (key, value) in pairs {
        if let Some(name) = key.as_ref().strip_prefix(HTTP_PREFIX) {
            params
                .entry(name.to_string())
                .or_insert_with(|| value.into());
        }
    }
    params
}

/// Extract OpenID fields from an `application/x-www-form-urlencoded` string.
pub fn parse_query(query: &str) -> Params {
    parse_http(url::form_urlencoded::parse(query.as_bytes()).into_owned())
}

/// Add `params` to the query of `url` under the `openid.` prefix.
///
/// Existing query pairs with the same name are replaced; unrelated pairs are
/// preserved.
pub fn encode_http(url: &mut Url, params: &Params) {
    let existing: Vec<(String, String)> = url
        .query_pairs()
        .into_owned()
        .filter(|(key, _)| {
            key.strip_prefix(HTTP_PREFIX)
                .map_or(true, |name| !params.contains_key(name))
        })
        .collect();

    let mut query = url.query_pairs_mut();
    query.clear();
    for (key, value) in &existing {
        query.append_pair(key, value);
    }
    for (key, value) in params {
        query.append_pair(&format!("{}{}", HTTP_PREFIX, key), value);
    }
}

/// Write a single `key:value\n` line.
pub fn write_key_value_pair(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push(':');
    out.push_str(value);
    out.push('\n');
}

/// Encode `params` as a key-value form body.
pub fn encode_key_value(params: &Params) -> String {
    let mut body = String::new();
    for (key, value) in params {
        write_key_value_pair(&mut body, key, value);
    }
    body
}

/// Decode a key-value form body.
///
/// Blank lines are skipped. Values may contain `:`; only the first one
/// separates the key.
pub fn parse_key_value(body: &str) -> Result<Params, KeyValueError> {
    let mut params = Params::new();
    for line in body.lines().filter(|line| !line.is_empty()) {
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| KeyValueError(line.to_string()))?;
        params.insert(key.to_string(), value.to_string());
    }
    Ok(params)
}
