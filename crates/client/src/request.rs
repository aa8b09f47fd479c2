//! Logical call to concrete request descriptor

use reqwest::Method;
use serde_json::Value;
use tillgrid_domain::{ApiError, Result};
use url::Url;
use uuid::Uuid;

/// Concrete, transport-ready request description.
///
/// Immutable once handed to the transport; the transport materializes a
/// fresh network request from it on every attempt.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RequestDescriptor {
    /// First value for `name`, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Builds request descriptors for logical calls against one base URL.
///
/// Pure: no side effects, no I/O. Credential attachment happens here so the
/// transport never needs to know where tokens come from.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    base_url: String,
}

impl RequestBuilder {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url)
            .map_err(|err| ApiError::Config(format!("invalid base url {base_url:?}: {err}")))?;
        Ok(Self { base_url })
    }

    /// Build a descriptor for a JSON call.
    ///
    /// Merges the `Content-Type: application/json` default with
    /// caller-supplied headers; the caller wins on conflict. Attaches the
    /// bearer credential when one is present and a fresh `X-Request-Id`.
    pub fn build(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        headers: Vec<(String, String)>,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Result<RequestDescriptor> {
        let url = self.url_for(path, query)?;
        let has_content_type =
            headers.iter().any(|(key, _)| key.eq_ignore_ascii_case("content-type"));

        let mut merged = Vec::with_capacity(headers.len() + 3);
        if !has_content_type {
            merged.push(("Content-Type".to_string(), "application/json".to_string()));
        }
        merged.extend(headers);
        Self::attach_common(&mut merged, token);

        Ok(RequestDescriptor { method, url, headers: merged, body })
    }

    /// Build a descriptor for a multipart call.
    ///
    /// No JSON content-type default; the multipart boundary header is set by
    /// the transport when the form is attached. Credential attachment is the
    /// same as for JSON calls.
    pub fn build_multipart(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
    ) -> Result<RequestDescriptor> {
        let url = self.url_for(path, &[])?;
        let mut headers = Vec::with_capacity(2);
        Self::attach_common(&mut headers, token);

        Ok(RequestDescriptor { method, url, headers, body: None })
    }

    fn url_for(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|err| ApiError::Config(format!("invalid request path {path:?}: {err}")))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn attach_common(headers: &mut Vec<(String, String)>, token: Option<&str>) {
        if let Some(token) = token {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }
        headers.push(("X-Request-Id".to_string(), Uuid::new_v4().to_string()));
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn builder() -> RequestBuilder {
        RequestBuilder::new("https://api.tillgrid.test/v1").unwrap()
    }

    #[test]
    fn applies_json_content_type_default() {
        let descriptor = builder()
            .build(Method::GET, "/products", &[], Vec::new(), None, None)
            .unwrap();

        assert_eq!(descriptor.header("content-type"), Some("application/json"));
        assert_eq!(descriptor.url.as_str(), "https://api.tillgrid.test/v1/products");
    }

    #[test]
    fn caller_supplied_content_type_wins() {
        let descriptor = builder()
            .build(
                Method::POST,
                "/import",
                &[],
                vec![("Content-Type".to_string(), "text/csv".to_string())],
                None,
                None,
            )
            .unwrap();

        assert_eq!(descriptor.header("content-type"), Some("text/csv"));
        assert_eq!(
            descriptor.headers.iter().filter(|(k, _)| k.eq_ignore_ascii_case("content-type")).count(),
            1
        );
    }

    #[test]
    fn attaches_bearer_when_token_present() {
        let with_token = builder()
            .build(Method::GET, "/products", &[], Vec::new(), None, Some("tok-1"))
            .unwrap();
        assert_eq!(with_token.header("authorization"), Some("Bearer tok-1"));

        // no credential is not an error at this layer
        let without_token =
            builder().build(Method::GET, "/products", &[], Vec::new(), None, None).unwrap();
        assert_eq!(without_token.header("authorization"), None);
    }

    #[test]
    fn appends_query_pairs() {
        let descriptor = builder()
            .build(Method::GET, "/orders", &[("page", "2"), ("status", "open")], Vec::new(), None, None)
            .unwrap();

        assert_eq!(
            descriptor.url.as_str(),
            "https://api.tillgrid.test/v1/orders?page=2&status=open"
        );
    }

    #[test]
    fn each_call_gets_a_fresh_request_id() {
        let first = builder().build(Method::GET, "/a", &[], Vec::new(), None, None).unwrap();
        let second = builder().build(Method::GET, "/a", &[], Vec::new(), None, None).unwrap();

        let first_id = first.header("x-request-id").unwrap().to_string();
        let second_id = second.header("x-request-id").unwrap().to_string();
        assert_ne!(first_id, second_id);
    }

    #[test]
    fn multipart_build_skips_json_default() {
        let descriptor =
            builder().build_multipart(Method::POST, "/receipts/upload", Some("tok-2")).unwrap();

        assert_eq!(descriptor.header("content-type"), None);
        assert_eq!(descriptor.header("authorization"), Some("Bearer tok-2"));
        assert!(descriptor.body.is_none());
    }

    #[test]
    fn rejects_invalid_base_url() {
        let result = RequestBuilder::new("not a url");
        assert!(matches!(result, Err(ApiError::Config(_))));
    }

    #[test]
    fn body_passes_through_untouched() {
        let body = json!({"price": 15});
        let descriptor = builder()
            .build(Method::PUT, "/products/1", &[], Vec::new(), Some(body.clone()), None)
            .unwrap();
        assert_eq!(descriptor.body, Some(body));
    }
}
