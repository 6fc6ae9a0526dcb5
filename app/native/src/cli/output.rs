//! CLI output formatting utilities.
//!
//! Recorded events are printed either as a rounded table or as JSON lines.

use std::io::{self, Write};

use colored::Colorize;
use tabled::settings::object::Columns;
use tabled::settings::{Alignment, Modify, Style};
use tabled::{Table, Tabled};

use crate::config::OutputFormat;
use crate::replay::EventRecord;

/// Maximum width of a value column before truncation.
const MAX_VALUE_WIDTH: usize = 40;

/// Row for the event table.
#[derive(Tabled)]
struct EventRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Event")]
    kind: String,
    #[tabled(rename = "Origin")]
    origin: String,
    #[tabled(rename = "Object")]
    object: String,
    #[tabled(rename = "Old")]
    old: String,
    #[tabled(rename = "New")]
    new: String,
}

/// Formats the origin of an event with color.
pub fn format_origin(external: bool) -> String {
    if external { "external".yellow().to_string() } else { "internal".green().to_string() }
}

/// Formats an optional JSON value compactly.
fn format_value(value: Option<&serde_json::Value>) -> String {
    match value {
        None => "-".dimmed().to_string(),
        Some(serde_json::Value::Null) => "none".dimmed().to_string(),
        Some(serde_json::Value::String(text)) => truncate(text, MAX_VALUE_WIDTH),
        Some(other) => truncate(&other.to_string(), MAX_VALUE_WIDTH),
    }
}

/// Truncates a string to the specified maximum length.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// Renders recorded events as a table.
#[must_use]
pub fn render_table(records: &[EventRecord]) -> String {
    let rows: Vec<EventRow> = records
        .iter()
        .enumerate()
        .map(|(index, record)| EventRow {
            index: index + 1,
            kind: record.kind.as_str().to_string(),
            origin: format_origin(record.external),
            object: record.object.to_string(),
            old: format_value(record.old.as_ref()),
            new: format_value(record.new.as_ref()),
        })
        .collect();

    Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::first()).with(Alignment::right()))
        .to_string()
}

/// Writes recorded events in the requested format.
///
/// # Errors
///
/// Returns an error if writing to `out` or serializing a record fails.
pub fn write_records<W: Write>(
    out: &mut W,
    records: &[EventRecord],
    format: OutputFormat,
) -> io::Result<()> {
    match format {
        OutputFormat::Table => {
            if records.is_empty() {
                writeln!(out, "{}", "No events published.".dimmed())
            } else {
                writeln!(out, "{}", render_table(records))
            }
        }
        OutputFormat::Json => {
            for record in records {
                serde_json::to_writer(&mut *out, record)?;
                writeln!(out)?;
            }
            Ok(())
        }
    }
}
