use std::time::Duration;

use bytes::Bytes;

/// One request as issued by a scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: http::Method,
    pub url: String,
    /// Header names are matched case-insensitively.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    /// Overrides the client's default request timeout.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: http::Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Bytes::new(),
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(http::Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(http::Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(http::Method::PUT, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(http::Method::DELETE, url)
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Serializes `payload` as the body and sets `content-type: application/json` unless a
    /// content type is already present.
    #[must_use]
    pub fn json(mut self, payload: &serde_json::Value) -> Self {
        if self.header_value("content-type").is_none() {
            self.headers
                .push(("content-type".to_string(), "application/json".to_string()));
        }
        self.body = Bytes::from(payload.to_string());
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The body parsed as JSON, if it is JSON.
    pub fn json_body(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
    /// Lowercased header names; repeated headers are joined with ", ".
    pub headers: Vec<(String, String)>,
    /// Estimated HTTP/1.1 bytes on the wire for the request.
    pub bytes_sent: u64,
    /// Estimated HTTP/1.1 bytes on the wire for the response.
    pub bytes_received: u64,
}

impl HttpResponse {
    pub fn body_utf8(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_sets_content_type_once() {
        let req = HttpRequest::post("http://localhost/api/users")
            .header("Content-Type", "application/vnd.api+json")
            .json(&serde_json::json!({"name": "morpheus"}));
        assert_eq!(req.headers.len(), 1);
        assert_eq!(
            req.header_value("content-type"),
            Some("application/vnd.api+json")
        );
        assert_eq!(
            req.json_body(),
            Some(serde_json::json!({"name": "morpheus"}))
        );
    }

    #[test]
    fn response_helpers() {
        let res = HttpResponse {
            status: 201,
            body: Bytes::from_static(br#"{"id":"7"}"#),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            bytes_sent: 0,
            bytes_received: 0,
        };
        assert_eq!(res.header("Content-Type"), Some("application/json"));
        assert_eq!(res.json(), Some(serde_json::json!({"id": "7"})));
        assert_eq!(res.body_utf8(), Some(r#"{"id":"7"}"#));
    }
}
