//! Azure Storage Shared Key signing for the bodyless container calls that
//! `object_store` doesn't cover.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::header::HeaderMap;
use reqwest::{Method, Url};
use sha2::Sha256;

use super::StorageError;

type HmacSha256 = Hmac<Sha256>;

/// Headers that take a fixed slot in the string-to-sign, in order. `Date` is
/// always empty because requests carry `x-ms-date` instead.
const STANDARD_HEADERS: [&str; 11] = [
    "content-encoding",
    "content-language",
    "content-length",
    "content-md5",
    "content-type",
    "date",
    "if-modified-since",
    "if-match",
    "if-none-match",
    "if-unmodified-since",
    "range",
];

pub(super) struct SharedKey {
    account: String,
    key: String,
}

impl SharedKey {
    pub fn new(account: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            key: key.into(),
        }
    }

    /// Value for the `Authorization` header. The key is only decoded here, so
    /// a malformed key fails the first request rather than construction.
    pub fn authorization(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
    ) -> Result<String, StorageError> {
        let key = STANDARD
            .decode(self.key.trim())
            .map_err(|err| StorageError::Credentials(format!("account key is not base64: {err}")))?;

        let mut mac = HmacSha256::new_from_slice(&key)
            .map_err(|err| StorageError::Credentials(err.to_string()))?;

        let to_sign = string_to_sign(&self.account, method, url, headers);
        mac.update(to_sign.as_bytes());

        let signature = STANDARD.encode(mac.finalize().into_bytes());

        Ok(format!("SharedKey {}:{}", self.account, signature))
    }
}

fn string_to_sign(account: &str, method: &Method, url: &Url, headers: &HeaderMap) -> String {
    let mut out = String::from(method.as_str());

    for name in STANDARD_HEADERS {
        out.push('\n');

        match (name, header_str(headers, name)) {
            ("date", _) => (),
            // zero length is signed as an empty string
            ("content-length", "0") => (),
            (_, value) => out.push_str(value),
        }
    }

    out.push('\n');
    out.push_str(&canonicalized_headers(headers));
    out.push_str(&canonicalized_resource(account, url));

    out
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

fn canonicalized_headers(headers: &HeaderMap) -> String {
    let ms_headers: BTreeMap<&str, &str> = headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with("x-ms-"))
        .map(|(name, value)| (name.as_str(), value.to_str().unwrap_or_default().trim()))
        .collect();

    ms_headers
        .into_iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect()
}

fn canonicalized_resource(account: &str, url: &Url) -> String {
    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (name, value) in url.query_pairs() {
        params
            .entry(name.to_lowercase())
            .or_default()
            .push(value.into_owned());
    }

    let mut out = format!("/{}{}", account, url.path());

    for (name, mut values) in params {
        values.sort();
        out.push_str(&format!("\n{}:{}", name, values.join(",")));
    }

    out
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;

    const ACCOUNT: &str = "devstoreaccount1";
    const KEY: &str =
        "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

    fn dated_headers(date: &'static str, version: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-ms-version", HeaderValue::from_static(version));
        headers.insert("x-ms-date", HeaderValue::from_static(date));
        headers
    }

    // worked example from the "Authorize with Shared Key" page of the Azure
    // Storage REST reference
    #[test]
    fn matches_documented_container_metadata_example() {
        let url = Url::parse(
            "http://127.0.0.1:10000/myaccount/mycontainer?restype=container&comp=metadata&timeout=20",
        )
        .unwrap();
        let headers = dated_headers("Sun, 11 Oct 2009 21:49:13 GMT", "2009-09-19");

        let out = string_to_sign("myaccount", &Method::GET, &url, &headers);

        assert_eq!(
            out,
            "GET\n\n\n\n\n\n\n\n\n\n\n\n\
             x-ms-date:Sun, 11 Oct 2009 21:49:13 GMT\n\
             x-ms-version:2009-09-19\n\
             /myaccount/myaccount/mycontainer\n\
             comp:metadata\n\
             restype:container\n\
             timeout:20"
        );
    }

    #[test]
    fn zero_content_length_is_left_empty() {
        let url = Url::parse("https://acct.blob.core.windows.net/c?restype=container").unwrap();
        let mut headers = dated_headers("Mon, 19 Oct 2026 10:00:00 GMT", "2021-08-06");
        headers.insert("content-length", HeaderValue::from_static("0"));

        let out = string_to_sign("acct", &Method::PUT, &url, &headers);

        assert!(out.starts_with("PUT\n\n\n\n\n\n\n\n\n\n\n\nx-ms-date:"), "{out}");
    }

    // HMAC-SHA256 over the string-to-sign with the well known Azurite
    // development key, computed outside this crate
    #[test]
    fn signs_create_container_with_emulator_key() {
        let url =
            Url::parse("http://127.0.0.1:10000/devstoreaccount1/mycontainer?restype=container")
                .unwrap();
        let headers = dated_headers("Mon, 19 Oct 2026 10:00:00 GMT", "2021-08-06");

        let auth = SharedKey::new(ACCOUNT, KEY)
            .authorization(&Method::PUT, &url, &headers)
            .unwrap();

        assert_eq!(
            auth,
            "SharedKey devstoreaccount1:t+2iYFASjxR2nfZ7U4lHrEy0AJKdnI8DWmNodWYWOLY="
        );
    }

    #[test]
    fn query_parameters_are_sorted_and_lowercased() {
        let url = Url::parse(
            "https://acct.blob.core.windows.net/c?restype=container&COMP=list&include=b&include=a",
        )
        .unwrap();

        assert_eq!(
            canonicalized_resource("acct", &url),
            "/acct/c\ncomp:list\ninclude:a,b\nrestype:container"
        );
    }

    #[test]
    fn malformed_key_fails_at_signing_time() {
        let url = Url::parse("https://acct.blob.core.windows.net/c").unwrap();
        let key = SharedKey::new("acct", "not base64 at all!");

        let err = key
            .authorization(&Method::PUT, &url, &HeaderMap::new())
            .unwrap_err();

        assert!(matches!(err, StorageError::Credentials(_)));
    }
}
