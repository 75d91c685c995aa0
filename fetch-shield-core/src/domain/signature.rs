//! Canonical request keys.
//!
//! Two requests are "the same call" iff their [`SignatureKey`]s are equal. The
//! key is a SHA-256 digest over a canonical rendering of the request:
//!
//! - the method, upper-case;
//! - the URL with scheme and host lower-cased, default port and fragment
//!   dropped, and the query string removed; a URL that does not parse as
//!   absolute (a bare path such as `/messages`) is kept as trimmed text minus
//!   any fragment. Relative URLs are keyed as written and never resolved
//!   against a transport's base URL, so `/messages` and
//!   `http://127.0.0.1:3068/messages` are different calls;
//! - every query pair, from the URL and from [`Request::query`], sorted by
//!   key then value, so `?x=1&y=2` and `?y=2&x=1` produce the same key;
//! - the JSON body with object keys sorted and no insignificant whitespace.
//!
//! Request options never contribute. Only request content is hashed, so keys
//! are stable across process restarts.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

use super::request::Request;

/// Fixed-size key identifying a logical request.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignatureKey([u8; 32]);

impl SignatureKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Leading 12 hex characters, enough to tell keys apart in logs.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for SignatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for SignatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignatureKey({})", self.short())
    }
}

/// The canonical rendering a [`SignatureKey`] is hashed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRequest {
    pub method: String,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: Option<String>,
}

impl CanonicalRequest {
    pub fn from_request(request: &Request) -> Self {
        let (url, mut query) = split_url(request.url());
        query.extend(request.query().iter().cloned());
        query.sort();

        Self {
            method: request.method().as_str().to_string(),
            url,
            query,
            body: request.body().map(canonical_json),
        }
    }

    pub fn digest(&self) -> SignatureKey {
        let mut hasher = Sha256::new();
        absorb(&mut hasher, b'M', self.method.as_bytes());
        absorb(&mut hasher, b'U', self.url.as_bytes());
        hasher.update((self.query.len() as u64).to_be_bytes());
        for (key, value) in &self.query {
            absorb(&mut hasher, b'K', key.as_bytes());
            absorb(&mut hasher, b'V', value.as_bytes());
        }
        match &self.body {
            Some(body) => absorb(&mut hasher, b'B', body.as_bytes()),
            None => hasher.update([b'-']),
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        SignatureKey(bytes)
    }
}

/// Computes request signatures.
pub struct RequestSignature;

impl RequestSignature {
    pub fn compute(request: &Request) -> SignatureKey {
        CanonicalRequest::from_request(request).digest()
    }
}

/// Shorthand for [`RequestSignature::compute`].
pub fn signature(request: &Request) -> SignatureKey {
    RequestSignature::compute(request)
}

fn absorb(hasher: &mut Sha256, tag: u8, bytes: &[u8]) {
    hasher.update([tag]);
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

fn split_url(raw: &str) -> (String, Vec<(String, String)>) {
    let trimmed = raw.trim();
    match Url::parse(trimmed) {
        Ok(mut url) => {
            let pairs = url
                .query_pairs()
                .map(|(key, value)| (key.into_owned(), value.into_owned()))
                .collect();
            url.set_query(None);
            url.set_fragment(None);
            (url.to_string(), pairs)
        }
        Err(_) => {
            let without_fragment = trimmed.split('#').next().unwrap_or(trimmed);
            match without_fragment.split_once('?') {
                Some((path, query)) => (
                    path.to_string(),
                    url::form_urlencoded::parse(query.as_bytes())
                        .into_owned()
                        .collect(),
                ),
                None => (without_fragment.to_string(), Vec::new()),
            }
        }
    }
}

fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (index, (key, value)) in entries.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::request::HttpMethod;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let value = json!({"b": 1, "a": {"d": [1, {"z": null, "y": "x"}], "c": true}});
        assert_eq!(
            canonical_json(&value),
            r#"{"a":{"c":true,"d":[1,{"y":"x","z":null}]},"b":1}"#
        );
    }

    #[test]
    fn test_split_url_relative_path() {
        let (url, query) = split_url("  /messages?y=2&x=1#top ");
        assert_eq!(url, "/messages");
        assert_eq!(
            query,
            vec![
                ("y".to_string(), "2".to_string()),
                ("x".to_string(), "1".to_string())
            ]
        );
    }

    #[test]
    fn test_split_url_absolute_normalizes_host_and_port() {
        let (url, query) = split_url("HTTP://Example.COM:80/messages?x=1#frag");
        assert_eq!(url, "http://example.com/messages");
        assert_eq!(query, vec![("x".to_string(), "1".to_string())]);
    }

    #[test]
    fn test_body_absence_differs_from_null() {
        let without = Request::builder(HttpMethod::Post, "/items").build();
        let with_null = Request::builder(HttpMethod::Post, "/items")
            .json(Value::Null)
            .build();
        assert_ne!(signature(&without), signature(&with_null));
    }

    #[test]
    fn test_short_is_prefix_of_hex() {
        let key = signature(&Request::get("/").build());
        assert_eq!(key.short().len(), 12);
        assert!(key.to_hex().starts_with(&key.short()));
    }
}
