//! HTTP/1.1 framing estimates used for `data_sent` / `data_received`.
//!
//! The client makes `host`, `content-length` and `user-agent` explicit before sending, so the
//! request estimate counts exactly the headers that go out.

use super::{Error, HttpRequest, Result};

const HTTP11: &str = "HTTP/1.1";
const CRLF: u64 = 2;

pub(crate) struct Target {
    pub(crate) uri: hyper::Uri,
    pub(crate) host: Option<String>,
}

/// Parses and validates the request URL.
pub(crate) fn target(url: &str) -> Result<Target> {
    let parsed = url::Url::parse(url).map_err(|_| Error::InvalidUrl(url.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::UnsupportedScheme(url.to_string()));
    }
    let uri = url
        .parse::<hyper::Uri>()
        .map_err(|_| Error::InvalidUrl(url.to_string()))?;

    // `Url::port` is None when the port is the scheme default.
    let host = parsed.host_str().map(|host| match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    });
    Ok(Target { uri, host })
}

pub(crate) fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

/// Headers the client adds when the scenario did not set them.
pub(crate) fn implicit_headers(
    headers: &[(String, String)],
    host: Option<&str>,
    body_len: usize,
    user_agent: &str,
) -> Vec<(&'static str, String)> {
    let mut out = Vec::new();
    if !has_header(headers, "host")
        && let Some(host) = host
    {
        out.push(("host", host.to_string()));
    }
    if body_len != 0 && !has_header(headers, "content-length") {
        out.push(("content-length", body_len.to_string()));
    }
    if !user_agent.is_empty() && !has_header(headers, "user-agent") {
        out.push(("user-agent", user_agent.to_string()));
    }
    out
}

/// Best-effort byte count of `req` on an HTTP/1.1 connection: request line, headers, blank
/// line and body.
pub fn estimate_request_bytes(req: &HttpRequest, user_agent: &str) -> Result<u64> {
    let target = target(&req.url)?;
    let implicit = implicit_headers(
        &req.headers,
        target.host.as_deref(),
        req.body.len(),
        user_agent,
    );
    Ok(request_bytes(req, &target.uri, &implicit))
}

pub(crate) fn request_bytes(
    req: &HttpRequest,
    uri: &hyper::Uri,
    implicit: &[(&'static str, String)],
) -> u64 {
    let path = uri.path_and_query().map_or("/", |p| p.as_str());
    // "METHOD SP path SP HTTP/1.1 CRLF"
    let line = (req.method.as_str().len() + 1 + path.len() + 1 + HTTP11.len()) as u64 + CRLF;

    let explicit: u64 = req
        .headers
        .iter()
        .map(|(k, v)| header_bytes(k.len(), v.len()))
        .sum();
    let added: u64 = implicit
        .iter()
        .map(|(k, v)| header_bytes(k.len(), v.len()))
        .sum();

    line.saturating_add(explicit)
        .saturating_add(added)
        .saturating_add(CRLF)
        .saturating_add(req.body.len() as u64)
}

pub(crate) fn response_head_bytes(
    version: http::Version,
    status: http::StatusCode,
    headers: &http::HeaderMap,
) -> u64 {
    let version = match version {
        http::Version::HTTP_10 => "HTTP/1.0",
        http::Version::HTTP_2 => "HTTP/2",
        http::Version::HTTP_3 => "HTTP/3",
        _ => HTTP11,
    };
    // "HTTP/1.1 SP 200 CRLF", reason phrase ignored.
    let line = (version.len() + 1 + status.as_str().len()) as u64 + CRLF;
    let fields: u64 = headers
        .iter()
        .map(|(name, value)| header_bytes(name.as_str().len(), value.as_bytes().len()))
        .sum();
    line.saturating_add(fields).saturating_add(CRLF)
}

fn header_bytes(name_len: usize, value_len: usize) -> u64 {
    // "name: value CRLF"
    (name_len + 2 + value_len) as u64 + CRLF
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_estimate_counts_implicit_headers() {
        let req = HttpRequest::post("http://localhost:8080/api/users").body("{}");
        // POST /api/users HTTP/1.1\r\n          26
        // host: localhost:8080\r\n              22
        // content-length: 2\r\n                 19
        // \r\n{}                                 4
        let bytes = estimate_request_bytes(&req, "").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(bytes, 26 + 22 + 19 + 4);
    }

    #[test]
    fn default_port_is_not_in_host() {
        let t = target("https://reqres.in/api/users/2").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(t.host.as_deref(), Some("reqres.in"));
        let t = target("http://reqres.in:8443/").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(t.host.as_deref(), Some("reqres.in:8443"));
    }

    #[test]
    fn non_http_schemes_are_rejected() {
        assert!(matches!(
            target("ftp://example.com/file"),
            Err(Error::UnsupportedScheme(_))
        ));
        assert!(matches!(target("not a url"), Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn response_head_estimate() {
        let mut headers = http::HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
        // "HTTP/1.1 201\r\n" 14 + "content-type: application/json\r\n" 32 + "\r\n" 2
        assert_eq!(
            response_head_bytes(http::Version::HTTP_11, http::StatusCode::CREATED, &headers),
            14 + 32 + 2
        );
    }
}
