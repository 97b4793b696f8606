use std::fmt::Write as _;
use std::time::UNIX_EPOCH;

use tabula_core::contacts::Contact;
use tabula_core::health::HealthReport;
use tabula_core::history::HistoryEntry;
use tabula_core::normalizer::RenderedResult;
use tabula_core::schema_model::{SchemaSnapshot, TableSchema};

const HISTORY_PREVIEW_CHARS: usize = 60;
const MAX_CELL_WIDTH: usize = 40;

pub fn result(rendered: &RenderedResult) -> String {
    match rendered {
        RenderedResult::Error(message) => format!("error: {message}"),
        RenderedResult::Acknowledgement {
            message,
            rows_affected,
        } => match rows_affected {
            Some(count) => format!("{message} ({count} rows affected)"),
            None => message.clone(),
        },
        RenderedResult::Table {
            columns,
            rows,
            total_rows,
            rows_affected,
        } => {
            if columns.is_empty() {
                return "(0 rows)".to_string();
            }
            let mut out = grid(columns, rows);
            if rendered.is_truncated() {
                let _ = write!(out, "\n(showing {} of {total_rows} rows)", rows.len());
            } else {
                let _ = write!(out, "\n({total_rows} rows)");
            }
            if let Some(count) = rows_affected {
                let _ = write!(out, " {count} rows affected");
            }
            out
        }
    }
}

pub fn contacts(contacts: &[Contact], active_search: Option<&str>) -> String {
    let heading = match active_search {
        Some(text) => format!("{} contacts matching \"{text}\"", contacts.len()),
        None => format!("{} contacts", contacts.len()),
    };
    if contacts.is_empty() {
        return heading;
    }

    let columns = ["id", "name", "email", "phone", "company"].map(str::to_string);
    let rows = contacts
        .iter()
        .map(|contact| {
            vec![
                contact.id.to_string(),
                contact.name.clone(),
                contact.email.clone(),
                contact.phone.clone().unwrap_or_default(),
                contact.company.clone().unwrap_or_default(),
            ]
        })
        .collect::<Vec<_>>();
    format!("{heading}\n{}", grid(&columns, &rows))
}

pub fn contact(contact: &Contact) -> String {
    let optional = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
    format!(
        "#{}  {}\n  email:   {}\n  phone:   {}\n  address: {}\n  company: {}\n  created: {}",
        contact.id,
        contact.name,
        contact.email,
        optional(&contact.phone),
        optional(&contact.address),
        optional(&contact.company),
        optional(&contact.created_at),
    )
}

pub fn tables(snapshot: &SchemaSnapshot, selected: Option<&str>) -> String {
    if snapshot.tables().is_empty() {
        return "no tables".to_string();
    }
    snapshot
        .tables()
        .iter()
        .map(|table| {
            let marker = if Some(table.name.as_str()) == selected { "*" } else { " " };
            format!(
                "{marker} {} ({} columns, {} indexes)",
                table.name,
                table.columns.len(),
                table.indexes.len()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn table(table: &TableSchema) -> String {
    let columns = ["column", "type", "key", "nullable"].map(str::to_string);
    let rows = table
        .columns
        .iter()
        .map(|column| {
            let key = if column.is_primary {
                "PK"
            } else if column.is_unique {
                "UNIQUE"
            } else {
                ""
            };
            vec![
                column.name.clone(),
                column.data_type.clone(),
                key.to_string(),
                if column.nullable { "yes" } else { "no" }.to_string(),
            ]
        })
        .collect::<Vec<_>>();

    let mut out = format!("table {}\n{}", table.name, grid(&columns, &rows));
    if table.indexes.is_empty() {
        out.push_str("\nno indexes");
    } else {
        out.push_str("\nindexes:");
        for index in &table.indexes {
            let _ = write!(out, "\n  {} on {}", index.name, index.column_name);
        }
    }
    out
}

pub fn history(entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return "no history".to_string();
    }
    entries
        .iter()
        .enumerate()
        .map(|(position, entry)| {
            let outcome = if entry.result.is_success() { "ok " } else { "err" };
            format!(
                "{:>3}. [{outcome}] {}  {}",
                position + 1,
                entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                entry.preview(HISTORY_PREVIEW_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn samples(samples: &[&str]) -> String {
    samples
        .iter()
        .enumerate()
        .map(|(position, sample)| format!("{:>3}. {sample}", position + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn health(report: &HealthReport) -> String {
    let mut out = format!("engine {}", report.status.label());
    if let Some(latency) = report.last_latency {
        let _ = write!(out, " ({} ms)", latency.as_millis());
    }
    if let Some(checked_at) = report
        .last_checked_at
        .and_then(|at| at.duration_since(UNIX_EPOCH).ok())
    {
        let _ = write!(out, ", checked at unix {}", checked_at.as_secs());
    }
    out
}

fn grid(columns: &[String], rows: &[Vec<String>]) -> String {
    let mut widths = columns
        .iter()
        .map(|column| column.chars().count().min(MAX_CELL_WIDTH))
        .collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count().min(MAX_CELL_WIDTH));
        }
    }

    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", clip(cell), width = *width))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };
    let separator = widths
        .iter()
        .map(|width| "-".repeat(*width))
        .collect::<Vec<_>>()
        .join("-+-");

    let mut out = line(columns);
    out.push('\n');
    out.push_str(&separator);
    for row in rows {
        out.push('\n');
        out.push_str(&line(row.as_slice()));
    }
    out
}

fn clip(cell: &str) -> String {
    if cell.chars().count() <= MAX_CELL_WIDTH {
        return cell.to_string();
    }
    let mut clipped = cell.chars().take(MAX_CELL_WIDTH - 3).collect::<String>();
    clipped.push_str("...");
    clipped
}
