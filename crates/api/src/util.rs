//! Small header-extraction helpers shared by the tenant-context middleware and the
//! `/graphql` and `/flush` handlers, so none of them re-implement header parsing.

use axum::http::HeaderMap;

pub fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name)?.to_str().ok().map(str::to_string)
}

pub fn header_flag(headers: &HeaderMap, name: &str) -> bool {
    headers.contains_key(name)
}

pub fn header_list(headers: &HeaderMap, name: &str) -> Option<Vec<String>> {
    let raw = header_str(headers, name)?;
    Some(
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    )
}

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = header_str(headers, "authorization")?;
    value.strip_prefix("Bearer ").map(str::to_string)
}

/// Real client IP, honouring `X-Forwarded-For` only when `trust_proxy` is set — mirrors
/// the teacher's `api_middleware::request_id::extract_client_ip`, narrowed to the one
/// header this gateway actually trusts behind a proxy.
pub fn client_ip(headers: &HeaderMap, trust_proxy: bool) -> Option<String> {
    if trust_proxy {
        if let Some(forwarded) = header_str(headers, "x-forwarded-for") {
            if let Some(first) = forwarded.split(',').next() {
                let ip = first.trim();
                if !ip.is_empty() {
                    return Some(ip.to_string());
                }
            }
        }
    }
    None
}

pub fn wants_html(headers: &HeaderMap) -> bool {
    match header_str(headers, "accept") {
        Some(accept) => accept.contains("text/html") && !accept.contains("application/json"),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_list_splits_and_trims_commas() {
        let mut headers = HeaderMap::new();
        headers.insert("x-schemata", "public, billing ,api".parse().unwrap());
        assert_eq!(
            header_list(&headers, "x-schemata"),
            Some(vec!["public".to_string(), "billing".to_string(), "api".to_string()])
        );
    }

    #[test]
    fn bearer_token_strips_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc123".to_string()));
    }

    #[test]
    fn client_ip_ignored_unless_trust_proxy() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.1, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers, false), None);
        assert_eq!(client_ip(&headers, true), Some("203.0.113.1".to_string()));
    }

    #[test]
    fn wants_html_requires_html_without_json() {
        let mut headers = HeaderMap::new();
        headers.insert("accept", "text/html,application/xhtml+xml".parse().unwrap());
        assert!(wants_html(&headers));

        headers.insert("accept", "application/json".parse().unwrap());
        assert!(!wants_html(&headers));
    }
}
