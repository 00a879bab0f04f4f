//! Page fetch command.
//!
//! Requests a path with session cookies and shows whether the gate served it,
//! sent the caller home, or logged it out.

use anyhow::Result;
use clap::Args;

use crate::client::ApiClient;
use crate::commands::config;
use crate::output::{self, OutputFormat, Tone};

#[derive(Args)]
pub struct FetchArgs {
    /// Request path, e.g. /list/students/s-1
    path: String,

    /// Access token
    #[arg(long)]
    access: Option<String>,

    /// Refresh token
    #[arg(long)]
    refresh: Option<String>,

    /// Raw Cookie header; overrides --access and --refresh
    #[arg(long)]
    cookie: Option<String>,
}

impl FetchArgs {
    fn cookie_header(&self) -> Option<String> {
        if let Some(cookie) = &self.cookie {
            return Some(cookie.clone());
        }

        let access_name = config::load_value(config::ConfigKey::AccessCookie).unwrap_or_else(|| "accessToken".into());
        let refresh_name = config::load_value(config::ConfigKey::RefreshCookie).unwrap_or_else(|| "refreshToken".into());

        let parts: Vec<String> = [(access_name, &self.access), (refresh_name, &self.refresh)]
            .into_iter()
            .filter_map(|(name, value)| value.as_ref().map(|v| format!("{}={}", name, v)))
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }
}

pub async fn execute(args: FetchArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let cookie = args.cookie_header();
    let page = client.get_page(&args.path, cookie.as_deref()).await?;

    match format {
        OutputFormat::Table => {
            output::section(&format!("GET {}", args.path));
            output::field("Status", &page.status.to_string());
            if let Some(location) = &page.location {
                output::field("Location", location);
            }
            for cookie in &page.set_cookies {
                output::field("Set-Cookie", cookie);
            }

            if page.is_redirect() {
                if page.cleared_session() {
                    output::say(Tone::Warn, "Session cleared by the server");
                } else if !page.set_cookies.is_empty() {
                    output::say(Tone::Info, "Session refreshed during redirect");
                }
            } else if let Some(body) = &page.body {
                println!();
                output::document(body, format)?;
            }
        }
        _ => output::document(&page, format)?,
    }

    Ok(())
}
