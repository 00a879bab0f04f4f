//! Route table commands.
//!
//! Evaluates paths against the built-in school route table without a server.

use anyhow::Result;
use campus_core::auth::{normalize_path, Role, RouteDecision, RouteTable, UnmatchedRoutePolicy};
use clap::Subcommand;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat, Tone};

#[derive(Subcommand)]
pub enum RouteCommands {
    /// List route rules in match order
    List,

    /// Show what the gate decides for a role on a path
    Check {
        /// Request path, e.g. /list/teachers
        path: String,

        /// Caller role; every role when omitted
        #[arg(short, long)]
        role: Option<Role>,

        /// Send callers home on paths no rule matches
        #[arg(long)]
        redirect_unmatched: bool,
    },
}

#[derive(Debug, Serialize, Tabled)]
struct RuleRow {
    #[tabled(rename = "#")]
    order: usize,
    #[tabled(rename = "Pattern")]
    pattern: String,
    #[tabled(rename = "Roles")]
    roles: String,
}

#[derive(Debug, Serialize, Tabled)]
struct DecisionRow {
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Rule")]
    rule: String,
    #[tabled(rename = "Decision")]
    decision: String,
}

fn describe(decision: RouteDecision) -> String {
    match decision {
        RouteDecision::Allowed => "allowed".to_string(),
        RouteDecision::AllowedUnmatched => "allowed (no rule)".to_string(),
        RouteDecision::RedirectHome(role) => format!("redirect {}", role.landing_path()),
    }
}

pub fn execute(cmd: RouteCommands, format: OutputFormat) -> Result<()> {
    match cmd {
        RouteCommands::List => {
            let table = RouteTable::school_default();
            let rows: Vec<RuleRow> = table
                .rules()
                .iter()
                .enumerate()
                .map(|(i, rule)| RuleRow {
                    order: i + 1,
                    pattern: rule.pattern.as_str().to_string(),
                    roles: rule
                        .allowed
                        .iter()
                        .map(|r| r.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                })
                .collect();
            output::rows(&rows, format)?;
        }

        RouteCommands::Check {
            path,
            role,
            redirect_unmatched,
        } => {
            let policy = if redirect_unmatched {
                UnmatchedRoutePolicy::RedirectHome
            } else {
                UnmatchedRoutePolicy::Allow
            };
            let table = RouteTable::school_default().with_unmatched_policy(policy);
            let decoded = normalize_path(&path);
            let undecodable = decoded.is_none();
            let shown = decoded.unwrap_or_else(|| path.clone());
            let rule = table
                .find(&path)
                .map(|r| r.pattern.as_str().to_string())
                .unwrap_or_else(|| "-".to_string());

            let roles = match role {
                Some(role) => vec![role],
                None => Role::ALL.to_vec(),
            };

            let rows: Vec<DecisionRow> = roles
                .into_iter()
                .map(|role| DecisionRow {
                    role: role.as_str().to_string(),
                    path: shown.clone(),
                    rule: rule.clone(),
                    decision: describe(table.authorize(&path, role)),
                })
                .collect();

            if matches!(format, OutputFormat::Table) && undecodable {
                output::say(Tone::Warn, "Path does not decode cleanly; the gate sends every role home");
            } else if matches!(format, OutputFormat::Table) && rule == "-" && !redirect_unmatched {
                output::say(Tone::Info, "No rule matches this path; the gate lets it through");
            }
            output::rows(&rows, format)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_names_the_landing_page() {
        assert_eq!(describe(RouteDecision::Allowed), "allowed");
        assert_eq!(describe(RouteDecision::RedirectHome(Role::Parent)), "redirect /parent");
    }
}
