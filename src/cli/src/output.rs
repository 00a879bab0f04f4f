//! Terminal rendering.
//!
//! `--output table` is for people; `json` and `yaml` dump the same data for
//! scripts. Status lines always go to the terminal regardless of format.

use anyhow::{Context, Result};
use clap::ValueEnum;
use colored::{ColoredString, Colorize};
use serde::Serialize;
use std::fmt::Display;
use tabled::{
    settings::{object::Columns, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}

/// Prefix of a one-line status message.
#[derive(Debug, Clone, Copy)]
pub enum Tone {
    Ok,
    Info,
    Warn,
    Fail,
}

impl Tone {
    fn tag(self) -> ColoredString {
        match self {
            Self::Ok => "ok".green().bold(),
            Self::Info => "info".blue().bold(),
            Self::Warn => "warn".yellow().bold(),
            Self::Fail => "fail".red().bold(),
        }
    }
}

pub fn say(tone: Tone, message: impl Display) {
    match tone {
        Tone::Fail => eprintln!("{:>5} {}", tone.tag(), message),
        _ => println!("{:>5} {}", tone.tag(), message),
    }
}

pub fn section(title: &str) {
    println!("\n{}\n", title.bold().underline());
}

pub fn field(key: &str, value: impl Display) {
    println!("  {:<16} {}", format!("{}:", key).cyan(), value);
}

/// Rows as a rounded table, or as a serialized list.
pub fn rows<T: Tabled + Serialize>(rows: &[T], format: OutputFormat) -> Result<()> {
    if format != OutputFormat::Table {
        return document(rows, format);
    }
    if rows.is_empty() {
        println!("{}", "(none)".dimmed());
        return Ok(());
    }

    let mut table = Table::new(rows);
    table
        .with(Style::rounded())
        .with(Modify::new(Columns::first()).with(Alignment::left()));
    println!("{}", table);
    Ok(())
}

/// A serialized value. Table mode falls back to pretty JSON.
pub fn document<T: Serialize + ?Sized>(value: &T, format: OutputFormat) -> Result<()> {
    let text = match format {
        OutputFormat::Yaml => serde_yaml::to_string(value).context("YAML encoding failed")?,
        OutputFormat::Table | OutputFormat::Json => {
            serde_json::to_string_pretty(value).context("JSON encoding failed")? + "\n"
        }
    };
    print!("{}", text);
    Ok(())
}
