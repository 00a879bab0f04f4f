//! Session cookie helpers.

use axum::http::{header, HeaderMap, HeaderValue};
use std::time::Duration;

/// Names, lifetimes and flags for the two session cookies.
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub access_name: String,
    pub refresh_name: String,
    pub access_max_age: Duration,
    pub refresh_max_age: Duration,
    pub secure: bool,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            access_name: "accessToken".to_string(),
            refresh_name: "refreshToken".to_string(),
            access_max_age: Duration::from_secs(15 * 60),
            refresh_max_age: Duration::from_secs(7 * 24 * 60 * 60),
            secure: false,
        }
    }
}

impl CookieSettings {
    /// `Set-Cookie` values for a freshly issued pair.
    pub fn issue(&self, access: &str, refresh: &str) -> [String; 2] {
        [
            session_cookie(&self.access_name, access, self.access_max_age, self.secure),
            session_cookie(&self.refresh_name, refresh, self.refresh_max_age, self.secure),
        ]
    }

    /// `Set-Cookie` values that remove both session cookies.
    pub fn clear(&self) -> [String; 2] {
        [
            expired_cookie(&self.access_name, self.secure),
            expired_cookie(&self.refresh_name, self.secure),
        ]
    }

    pub fn access_token<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        read_cookie(headers, &self.access_name)
    }

    pub fn refresh_token<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        read_cookie(headers, &self.refresh_name)
    }
}

/// Find a cookie value across every `Cookie` header. Empty values count as absent.
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

pub fn session_cookie(name: &str, value: &str, max_age: Duration, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
        name,
        value,
        max_age.as_secs()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn expired_cookie(name: &str, secure: bool) -> String {
    session_cookie(name, "", Duration::ZERO, secure)
}

/// Replace (or add) one cookie in the request's `Cookie` header.
pub fn replace_request_cookie(headers: &mut HeaderMap, name: &str, value: &str) {
    let mut pairs: Vec<String> = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .filter(|pair| pair.split_once('=').map(|(k, _)| k) != Some(name))
        .map(str::to_string)
        .collect();
    pairs.push(format!("{}={}", name, value));

    headers.remove(header::COOKIE);
    if let Ok(value) = HeaderValue::from_str(&pairs.join("; ")) {
        headers.insert(header::COOKIE, value);
    }
}
