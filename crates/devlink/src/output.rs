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

/// A command result printable in every output format.
pub trait Record: Serialize {
    /// Field/value pairs for the table and pretty formats.
    fn rows(&self) -> Vec<(&'static str, String)>;
}

pub fn print_record<R: Record>(record: &R, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (field, value) in record.rows() {
                table.add_row(vec![field.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let line: Vec<String> = record
                .rows()
                .into_iter()
                .map(|(field, value)| format!("{field}={value}"))
                .collect();
            println!("{}", line.join(" "));
        }
    }
}

/// Printable form of metadata: text when it is UTF-8 up to its zero padding.
pub fn metadata_preview(metadata: &[u8]) -> String {
    let end = metadata
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |last| last + 1);
    match std::str::from_utf8(&metadata[..end]) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {end} bytes>"),
    }
}
