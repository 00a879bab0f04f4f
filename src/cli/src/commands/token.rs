//! Session token commands.
//!
//! Issues access/refresh pairs signed with the server secret and verifies
//! tokens the same way the access gate does.

use anyhow::{Context, Result};
use campus_core::auth::{Role, TokenError, TokenKeys};
use campus_core::config::AuthConfig;
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::output::{self, OutputFormat, Tone};

#[derive(Args)]
pub struct KeyArgs {
    /// Token signing secret
    #[arg(long, env = "CAMPUS__AUTH__JWT_SECRET", hide_env_values = true)]
    secret: String,

    /// Token issuer
    #[arg(long, default_value = "campus")]
    issuer: String,
}

impl KeyArgs {
    fn auth_config(&self) -> AuthConfig {
        let mut auth = AuthConfig::with_secret(self.secret.clone());
        auth.issuer = self.issuer.clone();
        auth
    }

    fn keys(&self) -> Result<TokenKeys> {
        TokenKeys::new(&self.secret, self.auth_config().token_settings())
            .context("Failed to build signing keys")
    }
}

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Issue an access/refresh pair
    Issue {
        /// Subject id (student, teacher, parent, or admin id)
        subject: String,

        /// Role claim
        #[arg(short, long)]
        role: Role,

        #[command(flatten)]
        keys: KeyArgs,
    },

    /// Verify a token and show its claims
    Inspect {
        /// Encoded token
        token: String,

        /// Verify as a refresh token
        #[arg(long)]
        refresh: bool,

        #[command(flatten)]
        keys: KeyArgs,
    },
}

#[derive(Debug, Serialize)]
struct IssuedPair {
    subject: String,
    role: Role,
    access_token: String,
    access_expires_at: String,
    refresh_token: String,
    refresh_expires_at: String,
    cookie_header: String,
}

#[derive(Debug, Serialize)]
struct Inspection {
    valid: bool,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    claims: Option<serde_json::Value>,
}

fn failure_label(error: &TokenError) -> &'static str {
    match error {
        TokenError::Malformed(_) => "malformed",
        TokenError::SignatureInvalid => "signature_invalid",
        TokenError::Expired => "expired",
        TokenError::Signing(_) => "signing",
    }
}

pub fn execute(cmd: TokenCommands, format: OutputFormat) -> Result<()> {
    match cmd {
        TokenCommands::Issue { subject, role, keys } => {
            let cookies = keys.auth_config().cookie_settings();
            let pair = keys.keys()?.issue_pair(&subject, role)?;

            let issued = IssuedPair {
                cookie_header: format!(
                    "{}={}; {}={}",
                    cookies.access_name, pair.access.token, cookies.refresh_name, pair.refresh.token
                ),
                subject,
                role,
                access_token: pair.access.token,
                access_expires_at: pair.access.expires_at.to_rfc3339(),
                refresh_token: pair.refresh.token,
                refresh_expires_at: pair.refresh.expires_at.to_rfc3339(),
            };

            match format {
                OutputFormat::Table => {
                    output::section("Issued Session");
                    output::field("Subject", &issued.subject);
                    output::field("Role", issued.role.as_str());
                    output::field("Landing", issued.role.landing_path());
                    output::field("Access expires", &issued.access_expires_at);
                    output::field("Refresh expires", &issued.refresh_expires_at);
                    println!();
                    println!("Cookie: {}", issued.cookie_header);
                }
                _ => output::document(&issued, format)?,
            }
        }

        TokenCommands::Inspect { token, refresh, keys } => {
            let keys = keys.keys()?;
            let kind = if refresh { "refresh" } else { "access" };

            let verified = if refresh {
                keys.verify_refresh(&token)
                    .and_then(|c| serde_json::to_value(c).map_err(|e| TokenError::Malformed(e.to_string())))
            } else {
                keys.verify_access(&token)
                    .and_then(|c| serde_json::to_value(c).map_err(|e| TokenError::Malformed(e.to_string())))
            };

            let inspection = match verified {
                Ok(claims) => Inspection {
                    valid: true,
                    kind,
                    failure: None,
                    claims: Some(claims),
                },
                Err(e) => Inspection {
                    valid: false,
                    kind,
                    failure: Some(failure_label(&e)),
                    claims: None,
                },
            };

            match format {
                OutputFormat::Table => {
                    output::section("Token");
                    output::field("Kind", inspection.kind);
                    match (&inspection.claims, inspection.failure) {
                        (Some(claims), _) => {
                            if let Some(map) = claims.as_object() {
                                for (key, value) in map {
                                    let value = value
                                        .as_str()
                                        .map(str::to_string)
                                        .unwrap_or_else(|| value.to_string());
                                    output::field(key, &value);
                                }
                            }
                            output::say(Tone::Ok, "Token is valid");
                        }
                        (None, Some(failure)) => {
                            output::say(Tone::Warn, format!("Token rejected: {}", failure));
                        }
                        (None, None) => {}
                    }
                }
                _ => output::document(&inspection, format)?,
            }
        }
    }

    Ok(())
}
