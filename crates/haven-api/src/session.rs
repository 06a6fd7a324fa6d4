//! Cookie-based chat sessions.
//!
//! A session is an opaque id kept in a cookie. New ids are the current time
//! in fractional Unix seconds. Cookies are not signed.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;

/// Longest cookie value accepted as a session id.
const MAX_SESSION_ID_LEN: usize = 128;

/// The session a request belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    /// True when the id was minted for this request and the client has not
    /// seen it yet.
    pub is_new: bool,
}

impl Session {
    /// Session from the request cookie, or a freshly minted one.
    pub fn resolve(jar: &CookieJar, cookie_name: &str) -> Self {
        match read_session_id(jar, cookie_name) {
            Some(id) => Self { id, is_new: false },
            None => Self {
                id: new_session_id(),
                is_new: true,
            },
        }
    }

    /// Add the session cookie to `jar` if the client lacks it.
    pub fn persist(&self, jar: CookieJar, cookie_name: &str) -> CookieJar {
        if self.is_new {
            jar.add(session_cookie(cookie_name, &self.id))
        } else {
            jar
        }
    }
}

/// Session id from the request cookies, if present and well formed.
pub fn read_session_id(jar: &CookieJar, cookie_name: &str) -> Option<String> {
    jar.get(cookie_name)
        .map(|cookie| cookie.value_trimmed())
        .filter(|value| is_valid_session_id(value))
        .map(str::to_string)
}

/// New session id: current time as fractional Unix seconds.
pub fn new_session_id() -> String {
    let now = Utc::now();
    format!("{}.{:06}", now.timestamp(), now.timestamp_subsec_micros())
}

/// Session cookie scoped to the whole site and hidden from scripts.
pub fn session_cookie(cookie_name: &str, session_id: &str) -> Cookie<'static> {
    Cookie::build((cookie_name.to_string(), session_id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

fn is_valid_session_id(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_SESSION_ID_LEN
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

#[cfg(test)]
mod tests {
    use axum::http::header::{COOKIE, SET_COOKIE};
    use axum::http::{HeaderMap, HeaderValue};
    use axum::response::IntoResponse;

    use super::*;

    fn jar_with_cookie(cookie: &str) -> CookieJar {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(cookie).unwrap());
        CookieJar::from_headers(&headers)
    }

    fn set_cookie_headers(jar: CookieJar) -> Vec<String> {
        jar.into_response()
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_reads_named_cookie_among_others() {
        let jar = jar_with_cookie("theme=dark; chat_session=1718000000.123456; lang=en");
        assert_eq!(
            read_session_id(&jar, "chat_session").as_deref(),
            Some("1718000000.123456")
        );
    }

    #[test]
    fn test_quoted_cookie_value() {
        let jar = jar_with_cookie(r#"chat_session="abc""#);
        assert_eq!(read_session_id(&jar, "chat_session").as_deref(), Some("abc"));
    }

    #[test]
    fn test_missing_cookie() {
        assert!(read_session_id(&CookieJar::new(), "chat_session").is_none());
        let jar = jar_with_cookie("theme=dark");
        assert!(read_session_id(&jar, "chat_session").is_none());
    }

    #[test]
    fn test_malformed_session_id_ignored() {
        let jar = jar_with_cookie("chat_session=<script>");
        assert!(read_session_id(&jar, "chat_session").is_none());
        let jar = jar_with_cookie("chat_session=");
        assert!(read_session_id(&jar, "chat_session").is_none());
        let jar = jar_with_cookie(&format!("chat_session={}", "a".repeat(129)));
        assert!(read_session_id(&jar, "chat_session").is_none());
    }

    #[test]
    fn test_new_session_id_is_fractional_seconds() {
        let id = new_session_id();
        let (secs, micros) = id.split_once('.').unwrap();
        assert!(secs.parse::<i64>().unwrap() > 1_600_000_000);
        assert_eq!(micros.len(), 6);
        assert!(is_valid_session_id(&id));
    }

    #[test]
    fn test_resolve_prefers_existing_cookie() {
        let session = Session::resolve(&jar_with_cookie("chat_session=abc"), "chat_session");
        assert_eq!(session.id, "abc");
        assert!(!session.is_new);

        let fresh = Session::resolve(&CookieJar::new(), "chat_session");
        assert!(fresh.is_new);
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("chat_session", "abc");
        assert_eq!(cookie.name(), "chat_session");
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
    }

    #[test]
    fn test_persist_sets_cookie_only_for_new_sessions() {
        let request_jar = jar_with_cookie("chat_session=abc");
        let existing = Session {
            id: "abc".to_string(),
            is_new: false,
        };
        assert!(set_cookie_headers(existing.persist(request_jar, "chat_session")).is_empty());

        let fresh = Session {
            id: "1718000000.000001".to_string(),
            is_new: true,
        };
        let headers = set_cookie_headers(fresh.persist(CookieJar::new(), "chat_session"));
        assert_eq!(headers.len(), 1);
        assert!(headers[0].starts_with("chat_session=1718000000.000001"));
        assert!(headers[0].contains("HttpOnly"));
        assert!(headers[0].contains("SameSite=Lax"));
        assert!(headers[0].contains("Path=/"));
    }
}
