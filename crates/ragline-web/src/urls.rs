//! URL list loading.
//!
//! Two formats are accepted: a CSV file whose header row has a `URL` column,
//! or a plain list with one URL per line. Blank lines and lines starting
//! with `#` are ignored in both. CSV fields may be quoted, and quoted fields
//! may contain commas.

use std::path::Path;

use tracing::info;

use ragline_core::error::{RaglineError, Result};

/// Read corpus identifiers from `path`, preserving file order.
pub fn load_identifiers(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        RaglineError::Config(format!("cannot read URL list {}: {}", path.display(), e))
    })?;
    let identifiers = parse_identifiers(&content)?;
    info!(
        path = %path.display(),
        count = identifiers.len(),
        "Loaded corpus identifiers"
    );
    Ok(identifiers)
}

fn parse_identifiers(content: &str) -> Result<Vec<String>> {
    let mut lines = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'));

    let Some(first) = lines.next() else {
        return Ok(Vec::new());
    };

    let header = read_header(first)?;
    let url_column = header.iter().position(|h| h.eq_ignore_ascii_case("url"));

    match url_column {
        Some(column) => read_csv_column(content, column),
        None if header.len() > 1 => Err(RaglineError::Config(
            "CSV URL list has no URL column".to_string(),
        )),
        None => Ok(std::iter::once(first)
            .chain(lines)
            .map(str::to_string)
            .collect()),
    }
}

fn csv_reader(content: &str, has_headers: bool) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .has_headers(has_headers)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes())
}

fn csv_error(e: csv::Error) -> RaglineError {
    RaglineError::Config(format!("malformed CSV URL list: {}", e))
}

/// Fields of the first meaningful row.
fn read_header(line: &str) -> Result<Vec<String>> {
    let mut reader = csv_reader(line, false);
    match reader.records().next() {
        Some(record) => Ok(record
            .map_err(csv_error)?
            .iter()
            .map(str::to_string)
            .collect()),
        None => Ok(Vec::new()),
    }
}

/// Values of `column` for every data row, skipping empty cells.
fn read_csv_column(content: &str, column: usize) -> Result<Vec<String>> {
    let mut reader = csv_reader(content.trim_start(), true);
    let mut identifiers = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(csv_error)?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        match record.get(column) {
            Some("") => {}
            Some(value) => identifiers.push(value.to_string()),
            None => {
                return Err(RaglineError::Config(format!(
                    "URL list row {} has no column {}",
                    row + 1,
                    column + 1
                )));
            }
        }
    }
    Ok(identifiers)
}
