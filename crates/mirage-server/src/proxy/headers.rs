//! Header helpers shared by the proxy and the mock response builder.
//!
//! Header names and values coming from environment files are dynamic, so the
//! setters report invalid input instead of panicking.

use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use once_cell::sync::Lazy;
use regex::Regex;

/// Headers that describe a single connection and are never forwarded.
pub static HOP_BY_HOP: [HeaderName; 8] = [
    HeaderName::from_static("connection"),
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-authenticate"),
    HeaderName::from_static("proxy-authorization"),
    HeaderName::from_static("te"),
    HeaderName::from_static("trailer"),
    HeaderName::from_static("transfer-encoding"),
    HeaderName::from_static("upgrade"),
];

static SECURE_ATTRIBUTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i);\s*secure\b").expect("valid secure attribute regex"));

pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(name)
}

/// Remove the `Secure` attribute from a `Set-Cookie` value so cookies from an
/// https upstream still reach a plain-http client.
pub fn strip_secure_attribute(cookie: &str) -> String {
    SECURE_ATTRIBUTE.replace_all(cookie, "").into_owned()
}

/// Rewrite every `Set-Cookie` header in place.
pub fn strip_secure_cookies(headers: &mut HeaderMap) {
    let cookies: Vec<HeaderValue> = headers
        .get_all(hyper::header::SET_COOKIE)
        .iter()
        .map(|value| {
            value
                .to_str()
                .ok()
                .and_then(|v| HeaderValue::from_str(&strip_secure_attribute(v)).ok())
                .unwrap_or_else(|| value.clone())
        })
        .collect();
    if cookies.is_empty() {
        return;
    }
    headers.remove(hyper::header::SET_COOKIE);
    for cookie in cookies {
        headers.append(hyper::header::SET_COOKIE, cookie);
    }
}

/// Set a header from dynamic strings. Returns false when either part is not
/// a valid header token.
pub fn set_header_str(headers: &mut HeaderMap, name: &str, value: &str) -> bool {
    match (
        HeaderName::from_bytes(name.trim().as_bytes()),
        HeaderValue::from_str(value),
    ) {
        (Ok(name), Ok(value)) => {
            headers.insert(name, value);
            true
        }
        _ => false,
    }
}

/// Append a header from dynamic strings, keeping existing values.
pub fn append_header_str(headers: &mut HeaderMap, name: &str, value: &str) -> bool {
    match (
        HeaderName::from_bytes(name.trim().as_bytes()),
        HeaderValue::from_str(value),
    ) {
        (Ok(name), Ok(value)) => {
            headers.append(name, value);
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hop_by_hop() {
        assert!(is_hop_by_hop(&HeaderName::from_static("connection")));
        assert!(is_hop_by_hop(&HeaderName::from_static("transfer-encoding")));
        assert!(!is_hop_by_hop(&HeaderName::from_static("content-type")));
    }

    #[test]
    fn test_strip_secure_attribute() {
        assert_eq!(
            strip_secure_attribute("sid=1; Path=/; Secure; HttpOnly"),
            "sid=1; Path=/; HttpOnly"
        );
        assert_eq!(strip_secure_attribute("sid=1;secure"), "sid=1");
        assert_eq!(strip_secure_attribute("sid=1; SecureFlag=x"), "sid=1; SecureFlag=x");
    }

    #[test]
    fn test_strip_secure_cookies_keeps_every_cookie() {
        let mut headers = HeaderMap::new();
        headers.append("set-cookie", HeaderValue::from_static("a=1; Secure"));
        headers.append("set-cookie", HeaderValue::from_static("b=2"));
        strip_secure_cookies(&mut headers);
        let cookies: Vec<&str> = headers
            .get_all("set-cookie")
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
    }

    #[test]
    fn test_set_header_str() {
        let mut headers = HeaderMap::new();
        assert!(set_header_str(&mut headers, "X-Custom", "yes"));
        assert!(set_header_str(&mut headers, "X-Custom", "again"));
        assert_eq!(headers.get_all("x-custom").iter().count(), 1);
        assert_eq!(headers["x-custom"], "again");
        assert!(!set_header_str(&mut headers, "X-Custom", "bad\nvalue"));
        assert!(!set_header_str(&mut headers, "bad header", "v"));
    }

    #[test]
    fn test_append_header_str() {
        let mut headers = HeaderMap::new();
        assert!(append_header_str(&mut headers, "x-a", "1"));
        assert!(append_header_str(&mut headers, "x-a", "2"));
        assert_eq!(headers.get_all("x-a").iter().count(), 2);
    }
}
