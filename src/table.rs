//! Generic CRUD commands over any known table.
//!
//! `saf table list|show|add|update|delete` work on raw records through the
//! [`RecordStore`] trait, so they behave the same on either backend. Table
//! names are checked against [`crate::migrate::TABLES`] before the store is
//! touched.

use std::io::{BufRead, Write};

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::Value;

use crate::migrate::{is_known_table, TABLES};
use crate::models::Record;
use crate::output::{cell, truncate, OutputFormat};
use crate::store::{ListQuery, RecordStore};
use crate::validation::validate_version_prefix;

const LIST_COLUMNS: usize = 5;
const LIST_WIDTH: usize = 15;

/// Fail unless `table` is a known table.
pub fn check_table(table: &str) -> Result<()> {
    if !is_known_table(table) {
        bail!(
            "Unknown table: \"{}\". Valid tables: {}",
            table,
            TABLES.join(", ")
        );
    }
    Ok(())
}

/// Parse a `key=value` filter argument.
pub fn parse_filter(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid filter '{}': expected key=value", s))?;
    let key = s[..pos].trim();
    if key.is_empty() {
        return Err(format!("invalid filter '{}': empty key", s));
    }
    Ok((key.to_string(), s[pos + 1..].to_string()))
}

/// Parse `--data` into a record. Only JSON objects are accepted.
pub fn parse_data(data: &str) -> Result<Record> {
    let value: Value = serde_json::from_str(data).context("Invalid JSON data")?;
    match value {
        Value::Object(map) => Ok(map),
        _ => bail!("Data must be a JSON object"),
    }
}

/// Reject `v`-prefixed versions before they reach the store.
fn check_version(record: &Record) -> Result<()> {
    if let Some(version) = record.get("version").and_then(Value::as_str) {
        if !version.is_empty() {
            validate_version_prefix(version).map_err(anyhow::Error::msg)?;
        }
    }
    Ok(())
}

pub fn format_table_list(records: &[Record], table: &str, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(records)?),
        OutputFormat::Quiet => Ok(records
            .iter()
            .map(|r| cell(r.get("id")))
            .collect::<Vec<_>>()
            .join("\n")),
        OutputFormat::Text => {
            let Some(first) = records.first() else {
                return Ok("No records found".to_string());
            };
            let keys: Vec<&String> = first.keys().take(LIST_COLUMNS).collect();

            let mut lines = vec![
                format!("{} ({} records)", table, records.len()),
                "─".repeat(60),
                keys.iter()
                    .map(|k| format!("{:<width$}", k, width = LIST_WIDTH))
                    .collect::<Vec<_>>()
                    .join(" "),
                "─".repeat(60),
            ];
            for record in records {
                let row: Vec<String> = keys
                    .iter()
                    .map(|k| {
                        let text: String = cell(record.get(k.as_str()))
                            .chars()
                            .take(LIST_WIDTH - 1)
                            .collect();
                        format!("{:<width$}", text, width = LIST_WIDTH)
                    })
                    .collect();
                lines.push(row.join(" ").trim_end().to_string());
            }
            Ok(lines.join("\n"))
        }
    }
}

pub fn format_table_record(record: &Record, table: &str, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(record)?),
        OutputFormat::Quiet => Ok(cell(record.get("id"))),
        OutputFormat::Text => {
            let mut lines = vec![table.to_string(), "─".repeat(40)];
            for (key, value) in record {
                lines.push(format!("{:<20} {}", key, truncate(&cell(Some(value)), 100)));
            }
            Ok(lines.join("\n"))
        }
    }
}

fn print(text: &str) {
    if !text.is_empty() {
        println!("{}", text);
    }
}

pub async fn run_table_list(
    store: &dyn RecordStore,
    table: &str,
    query: &ListQuery,
    format: OutputFormat,
) -> Result<()> {
    check_table(table)?;
    let records = store.get_list(table, query).await?;
    print(&format_table_list(&records, table, format)?);
    Ok(())
}

pub async fn run_table_show(
    store: &dyn RecordStore,
    table: &str,
    id: &str,
    format: OutputFormat,
) -> Result<()> {
    check_table(table)?;
    let record = store.get_one(table, id).await?;
    print(&format_table_record(&record, table, format)?);
    Ok(())
}

pub async fn run_table_add(
    store: &dyn RecordStore,
    table: &str,
    data: &str,
    format: OutputFormat,
) -> Result<()> {
    check_table(table)?;
    let fields = parse_data(data)?;
    check_version(&fields)?;

    let record = store.create(table, &fields).await?;
    tracing::info!(table, id = %cell(record.get("id")), "record created");

    match format {
        OutputFormat::Text => println!("Created {} record: {}", table, cell(record.get("id"))),
        _ => print(&format_table_record(&record, table, format)?),
    }
    Ok(())
}

pub async fn run_table_update(
    store: &dyn RecordStore,
    table: &str,
    id: &str,
    data: &str,
    format: OutputFormat,
) -> Result<()> {
    check_table(table)?;
    let fields = parse_data(data)?;
    if fields.is_empty() {
        bail!("No fields to update");
    }
    check_version(&fields)?;

    let record = store.update(table, id, &fields).await?;

    match format {
        OutputFormat::Text => println!("Updated {} record: {}", table, id),
        _ => print(&format_table_record(&record, table, format)?),
    }
    Ok(())
}

/// JSON result of `table delete`.
#[derive(Debug, Serialize)]
struct Deleted<'a> {
    success: bool,
    deleted: &'a str,
}

/// Ask on the terminal. Only called when stdin is a TTY.
fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{} [y/N] ", prompt);
    std::io::stderr().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

pub async fn run_table_delete(
    store: &dyn RecordStore,
    table: &str,
    id: &str,
    yes: bool,
    format: OutputFormat,
) -> Result<()> {
    check_table(table)?;

    if !yes {
        let interactive = format.is_text() && atty::is(atty::Stream::Stdin);
        if !interactive {
            bail!("Use --yes to confirm deletion");
        }
        if !confirm(&format!("Delete {} record {}?", table, id))? {
            println!("Aborted.");
            return Ok(());
        }
    }

    store.delete(table, id).await?;

    match format {
        OutputFormat::Json => format.print_json(&Deleted {
            success: true,
            deleted: id,
        })?,
        OutputFormat::Quiet => println!("{}", id),
        OutputFormat::Text => println!("Deleted {} record: {}", table, id),
    }
    Ok(())
}
