use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// A command result: serialized as a whole for JSON, shown as labelled
/// rows otherwise.
pub struct Report<'a, T> {
    pub title: &'a str,
    pub value: &'a T,
    pub rows: Vec<(&'static str, String)>,
}

impl<'a, T: Serialize> Report<'a, T> {
    pub fn new(title: &'a str, value: &'a T) -> Self {
        Self {
            title,
            value,
            rows: Vec::new(),
        }
    }

    pub fn row(mut self, label: &'static str, value: impl ToString) -> Self {
        self.rows.push((label, value.to_string()));
        self
    }

    pub fn print(&self, format: OutputFormat) {
        match format {
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string(self.value).unwrap_or_else(|_| "{}".to_string())
                );
            }
            OutputFormat::Table => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(vec![self.title.to_uppercase(), String::new()]);
                for (label, value) in &self.rows {
                    table.add_row(vec![label.to_string(), value.clone()]);
                }
                println!("{table}");
            }
            OutputFormat::Pretty => {
                let fields = self
                    .rows
                    .iter()
                    .map(|(label, value)| format!("{}={}", label.replace(' ', "_"), value))
                    .collect::<Vec<_>>()
                    .join(" ");
                println!("{}: {}", self.title, fields);
            }
        }
    }
}

/// Status column text: the device status, or why there is none.
pub fn status_text(status: Option<u8>) -> String {
    match status {
        Some(0) => "0 (ok)".to_string(),
        Some(code) => format!("{code} (failure)"),
        None => "none".to_string(),
    }
}
