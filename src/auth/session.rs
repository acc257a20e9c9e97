use axum::http::{header, HeaderMap};

pub const SESSION_COOKIE: &str = "scribe_session";

/// Site-wide, script-inaccessible cookie carrying the session token.
pub fn session_cookie(token: &str, max_age_secs: i64) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE, token, max_age_secs
    )
}

pub fn clear_session_cookie() -> String {
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", SESSION_COOKIE)
}

/// Bearer token from the session cookie, falling back to `Authorization: Bearer`.
pub fn extract_session_token(headers: &HeaderMap) -> Option<&str> {
    cookie_value(headers, SESSION_COOKIE)
        .filter(|v| !v.is_empty())
        .or_else(|| bearer_token(headers))
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == name {
                Some(val)
            } else {
                None
            }
        })
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn session_cookie_is_http_only_and_site_wide() {
        let cookie = session_cookie("tok", 2_592_000);
        assert!(cookie.starts_with("scribe_session=tok;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Max-Age=2592000"));
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        assert!(clear_session_cookie().contains("Max-Age=0"));
    }

    #[test]
    fn extracts_token_among_other_cookies() {
        let h = headers(&[(header::COOKIE, "theme=dark; scribe_session=abc.def; lang=en")]);
        assert_eq!(extract_session_token(&h), Some("abc.def"));
    }

    #[test]
    fn falls_back_to_bearer_header() {
        let h = headers(&[(header::AUTHORIZATION, "Bearer abc.def")]);
        assert_eq!(extract_session_token(&h), Some("abc.def"));
    }

    #[test]
    fn empty_cookie_counts_as_absent() {
        let h = headers(&[(header::COOKIE, "scribe_session=")]);
        assert_eq!(extract_session_token(&h), None);
    }

    #[test]
    fn no_credentials_yields_none() {
        let h = headers(&[(header::COOKIE, "theme=dark")]);
        assert_eq!(extract_session_token(&h), None);
        assert_eq!(extract_session_token(&HeaderMap::new()), None);
    }
}
