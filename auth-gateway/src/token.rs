//! Session token minting and extraction from request headers

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use http::header::AUTHORIZATION;
use http::HeaderMap;
use rand::rngs::OsRng;
use rand::RngCore;

/// Custom header carrying the raw session token
pub const SESSION_TOKEN_HEADER: &str = "x-session-token";

const TOKEN_BYTES: usize = 32;

/// 256 random bits, base64url without padding
pub fn mint_session_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Pull the session token from `X-Session-Token` or `Authorization: Bearer`.
///
/// The custom header wins when both are present. Empty values are ignored.
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get(SESSION_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|token| !token.is_empty())
    {
        return Some(token.to_string());
    }

    let authorization = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = authorization.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_minted_tokens_are_unique_and_url_safe() {
        let a = mint_session_token();
        let b = mint_session_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_custom_header_takes_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-bearer"));
        assert_eq!(extract_session_token(&headers).as_deref(), Some("from-bearer"));

        headers.insert(SESSION_TOKEN_HEADER, HeaderValue::from_static("from-custom"));
        assert_eq!(extract_session_token(&headers).as_deref(), Some("from-custom"));
    }

    #[test]
    fn test_rejects_other_schemes_and_empty_values() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic YWxpY2U6cHc="));
        assert_eq!(extract_session_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer   "));
        assert_eq!(extract_session_token(&headers), None);

        headers.insert(SESSION_TOKEN_HEADER, HeaderValue::from_static(""));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer abc"));
        assert_eq!(extract_session_token(&headers).as_deref(), Some("abc"));
    }
}
