//! Request construction: URL and query composition, header merging and body
//! encoding.
//!
//! # Design
//! `build_request` either returns a complete `RequestDescriptor` or a
//! `ConstructionError`, never both. A bad URL leaves nothing to describe, so
//! `InvalidUrl` carries only the original string. A body that fails to encode
//! still has a well-formed URL, method, headers and timeout; `InvalidBody`
//! keeps that bodyless descriptor so callers can inspect what would have been
//! sent.

use std::collections::HashMap;

use url::Url;

use crate::body::RequestBody;
use crate::config::Config;
use crate::error::{BodyError, NetworkError};
use crate::http::{Headers, Method, RequestDescriptor};

/// Call-site inputs for a request. Unset fields fall back to the defaults.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    /// Query items appended to the URL. Order on the wire is unspecified.
    pub parameters: HashMap<String, String>,
    pub body: RequestBody,
    /// Merged over the configured defaults; a name present in both keeps the
    /// call-site value only.
    pub headers: Headers,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Why a request could not be built.
#[derive(Debug)]
pub enum ConstructionError {
    /// The URL did not parse. No request content exists.
    InvalidUrl(String),
    /// Everything but the body was built; `request.body` is always `None`.
    InvalidBody {
        request: RequestDescriptor,
        cause: BodyError,
    },
}

impl ConstructionError {
    /// The bodyless request, when the failure happened after URL parsing.
    pub fn partial_request(&self) -> Option<&RequestDescriptor> {
        match self {
            ConstructionError::InvalidUrl(_) => None,
            ConstructionError::InvalidBody { request, .. } => Some(request),
        }
    }
}

impl From<ConstructionError> for NetworkError {
    fn from(err: ConstructionError) -> Self {
        match err {
            ConstructionError::InvalidUrl(raw) => NetworkError::InvalidUrl(raw),
            ConstructionError::InvalidBody { cause, .. } => NetworkError::InvalidBody(cause),
        }
    }
}

/// Compose a descriptor from the configured defaults and call-site options.
pub fn build_request(
    config: &Config,
    url: &str,
    options: &RequestOptions,
) -> Result<RequestDescriptor, ConstructionError> {
    let url = compose_url(url, &options.parameters)?;

    let mut request = RequestDescriptor {
        url,
        method: options.method,
        headers: config.headers.clone(),
        body: None,
        timeout: config.timeout,
    };

    let encoded = match options.body.encode() {
        Ok(encoded) => encoded,
        Err(cause) => {
            merge_headers(&mut request.headers, &options.headers);
            return Err(ConstructionError::InvalidBody { request, cause });
        }
    };

    if let Some(encoded) = encoded {
        if let Some(content_type) = encoded.content_type {
            request.headers.insert("Content-Type", content_type);
        }
        request.body = Some(encoded.bytes);
    }
    merge_headers(&mut request.headers, &options.headers);

    Ok(request)
}

fn compose_url(raw: &str, parameters: &HashMap<String, String>) -> Result<Url, ConstructionError> {
    let mut url = Url::parse(raw).map_err(|_| ConstructionError::InvalidUrl(raw.to_string()))?;
    if !parameters.is_empty() {
        url.query_pairs_mut().extend_pairs(parameters.iter());
    }
    Ok(url)
}

/// Every name set at the call site replaces the defaults for that name;
/// repeated call-site values are all kept.
fn merge_headers(target: &mut Headers, call_site: &Headers) {
    for (name, _) in call_site.iter() {
        target.remove(name);
    }
    for (name, value) in call_site.iter() {
        target.append(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use bytes::Bytes;
    use serde_json::json;

    use crate::form::{FormData, FormValue};

    fn config() -> Config {
        Config::default()
    }

    #[test]
    fn plain_get_uses_defaults() {
        let req = build_request(&config(), "https://api.example.com/items", &RequestOptions::new())
            .unwrap();
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.url.as_str(), "https://api.example.com/items");
        assert!(req.body.is_none());
        assert_eq!(req.timeout, Duration::from_secs(60));
        assert_eq!(req.headers.get("accept"), Some("application/json"));
    }

    #[test]
    fn parameters_become_query_items() {
        let options = RequestOptions::new()
            .parameter("q", "rust lang")
            .parameter("page", "2")
            .parameter("page", "3");
        let req = build_request(&config(), "https://example.com/search", &options).unwrap();
        let mut pairs: Vec<(String, String)> = req.url.query_pairs().into_owned().collect();
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                ("page".to_string(), "3".to_string()),
                ("q".to_string(), "rust lang".to_string()),
            ]
        );
    }

    #[test]
    fn parameters_extend_an_existing_query() {
        let options = RequestOptions::new().parameter("b", "2");
        let req = build_request(&config(), "https://example.com/x?a=1", &options).unwrap();
        assert_eq!(req.url.query(), Some("a=1&b=2"));
    }

    #[test]
    fn malformed_url_keeps_original_string() {
        for raw in ["not a url", "http://exa mple.com", "", "http://[::1"] {
            let err = build_request(&config(), raw, &RequestOptions::new()).unwrap_err();
            assert!(matches!(&err, ConstructionError::InvalidUrl(s) if s == raw), "{raw}");
            assert!(err.partial_request().is_none());
        }
    }

    #[test]
    fn call_site_headers_replace_defaults() {
        let options = RequestOptions::new()
            .header("ACCEPT", "text/plain")
            .header("X-Trace", "1");
        let req = build_request(&config(), "https://example.com", &options).unwrap();
        assert_eq!(req.headers.get_all("accept").collect::<Vec<_>>(), vec!["text/plain"]);
        assert_eq!(req.headers.get("x-trace"), Some("1"));
    }

    #[test]
    fn repeated_call_site_headers_all_survive() {
        let mut options = RequestOptions::new();
        options.headers.append("Accept", "text/html");
        options.headers.append("accept", "text/plain");
        let req = build_request(&config(), "https://example.com", &options).unwrap();
        assert_eq!(
            req.headers.get_all("accept").collect::<Vec<_>>(),
            vec!["text/html", "text/plain"]
        );
    }

    #[test]
    fn json_body_sets_content_type() {
        let map = match json!({"a": 1}) {
            serde_json::Value::Object(m) => m,
            _ => unreachable!(),
        };
        let options = RequestOptions::new()
            .method(Method::Post)
            .body(RequestBody::Json(Some(map)));
        let req = build_request(&config(), "https://example.com", &options).unwrap();
        assert_eq!(req.headers.get("content-type"), Some("application/json"));
        assert_eq!(req.body, Some(Bytes::from_static(b"{\"a\":1}")));
    }

    #[test]
    fn explicit_content_type_wins_over_body_default() {
        let options = RequestOptions::new()
            .body(RequestBody::Raw(Bytes::from_static(b"<x/>")))
            .header("Content-Type", "application/xml");
        let req = build_request(&config(), "https://example.com", &options).unwrap();
        assert_eq!(req.headers.get("content-type"), Some("application/xml"));
    }

    #[test]
    fn unreadable_form_file_keeps_request_shape() {
        let mut form = FormData::new();
        form.insert("upload".into(), FormValue::File("/no/such/file.png".into()));
        let options = RequestOptions::new()
            .method(Method::Post)
            .body(RequestBody::Form(form))
            .header("X-Trace", "abc");
        let err = build_request(&config(), "https://example.com/upload", &options).unwrap_err();
        let partial = err.partial_request().expect("shape survives body failure");
        assert_eq!(partial.method, Method::Post);
        assert_eq!(partial.url.as_str(), "https://example.com/upload");
        assert_eq!(partial.headers.get("x-trace"), Some("abc"));
        assert!(partial.body.is_none());
        assert!(matches!(NetworkError::from(err), NetworkError::InvalidBody(_)));
    }

    #[test]
    fn timeout_comes_from_config() {
        let config = Config {
            timeout: Duration::from_secs(3),
            ..Config::default()
        };
        let req = build_request(&config, "https://example.com", &RequestOptions::new()).unwrap();
        assert_eq!(req.timeout, Duration::from_secs(3));
    }
}
