use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::Url;

use crate::errors::ImageLoadError;

// everything outside the characters allowed in a URL query gets encoded,
// including '%', so an already encoded URL is encoded a second time
const QUERY_ALLOWED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b'-')
    .remove(b'.')
    .remove(b'/')
    .remove(b':')
    .remove(b';')
    .remove(b'=')
    .remove(b'?')
    .remove(b'@')
    .remove(b'_')
    .remove(b'~');

/// Percent-encoded form of a caller supplied URL, used both as the cache key
/// and as the address that is fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedUrl {
    key: String,
    url: Url,
}

impl NormalizedUrl {
    pub fn parse(raw: &str) -> Result<Self, ImageLoadError> {
        if raw.is_empty() {
            return Err(ImageLoadError::InvalidUrl(raw.into()));
        }

        let key = normalize_key(raw);
        let url = Url::parse(&key).map_err(|_| ImageLoadError::InvalidUrl(raw.into()))?;

        Ok(Self { key, url })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

pub fn normalize_key(raw: &str) -> String {
    utf8_percent_encode(raw, QUERY_ALLOWED).to_string()
}
