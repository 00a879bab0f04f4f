//! Thin reqwest wrapper for a running portal.
//!
//! Redirects are never followed: the gate's 303 and its `Set-Cookie` headers
//! are exactly what `campus fetch` reports.

use anyhow::{bail, Context, Result};
use reqwest::{header, redirect, Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

/// Raw outcome of one page request.
#[derive(Debug, Serialize)]
pub struct PageResponse {
    pub status: u16,
    pub location: Option<String>,
    pub set_cookies: Vec<String>,
    pub body: Option<serde_json::Value>,
}

impl PageResponse {
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    /// Every cookie the server set was an expiry.
    pub fn cleared_session(&self) -> bool {
        !self.set_cookies.is_empty() && self.set_cookies.iter().all(|c| c.contains("Max-Age=0"))
    }
}

pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .redirect(redirect::Policy::none())
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, path: &str, cookie: Option<&str>) -> Result<Response> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.http.get(&url);
        if let Some(cookie) = cookie {
            req = req.header(header::COOKIE, cookie);
        }
        req.send().await.with_context(|| format!("GET {}", url))
    }

    /// GET a JSON endpoint that must answer 2xx.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self.get(path, None).await?;
        if !resp.status().is_success() {
            let status = resp.status();
            bail!("{} answered {}: {}", path, status, resp.text().await.unwrap_or_default());
        }
        resp.json().await.with_context(|| format!("decoding {}", path))
    }

    /// GET a page as a session and keep whatever came back.
    pub async fn get_page(&self, path: &str, cookie: Option<&str>) -> Result<PageResponse> {
        let resp = self.get(path, cookie).await?;
        let headers = resp.headers();

        let status = resp.status().as_u16();
        let location = headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let set_cookies = headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok().map(str::to_owned))
            .collect();

        let body = resp
            .text()
            .await
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok());

        Ok(PageResponse {
            status,
            location,
            set_cookies,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(status: u16, cookies: &[&str]) -> PageResponse {
        PageResponse {
            status,
            location: None,
            set_cookies: cookies.iter().map(|c| c.to_string()).collect(),
            body: None,
        }
    }

    #[test]
    fn test_cleared_session_needs_only_expiries() {
        assert!(page(303, &["accessToken=; Max-Age=0", "refreshToken=; Max-Age=0"]).cleared_session());
        assert!(!page(303, &["accessToken=new; Max-Age=900"]).cleared_session());
        assert!(!page(303, &[]).cleared_session());
    }

    #[test]
    fn test_redirect_range() {
        assert!(page(303, &[]).is_redirect());
        assert!(!page(200, &[]).is_redirect());
        assert!(!page(404, &[]).is_redirect());
    }
}
