// src/core/remote/grid.rs

//! Conversion between raw 2-D grids (row 0 = headers) and keyed records,
//! plus A1-notation helpers for addressing ranges.

use crate::core::model::{KeySelector, Record};

/// A raw grid as returned by the remote store. Rows may be ragged.
pub type Grid = Vec<Vec<String>>;

/// Converts a grid into records by mapping cell positions onto `headers`.
/// Row 0 is skipped as the header row; missing cells become empty strings.
pub fn grid_to_records(grid: &[Vec<String>], headers: &[String]) -> Vec<Record> {
    if grid.len() < 2 {
        return Vec::new();
    }
    grid[1..]
        .iter()
        .map(|row| {
            headers
                .iter()
                .enumerate()
                .map(|(i, header)| (header.clone(), row.get(i).cloned().unwrap_or_default()))
                .collect()
        })
        .collect()
}

/// Lays a record out in `headers` order. Missing fields are written empty,
/// fields not in `headers` are dropped.
pub fn record_to_row(headers: &[String], record: &Record) -> Vec<String> {
    headers
        .iter()
        .map(|h| record.get(h).cloned().unwrap_or_default())
        .collect()
}

/// The grid's own header row, or `fallback` when the grid is empty.
pub fn header_row(grid: &[Vec<String>], fallback: &[String]) -> Vec<String> {
    match grid.first() {
        Some(row) if !row.is_empty() => row.clone(),
        _ => fallback.to_vec(),
    }
}

/// Finds the grid index of the first data row whose key cell equals the key
/// value exactly. With `skip_empty`, empty cells never match.
pub fn find_key_row(
    grid: &[Vec<String>],
    headers: &[String],
    key: &KeySelector,
    skip_empty: bool,
) -> Option<usize> {
    let column = headers.iter().position(|h| *h == key.field)?;
    grid.iter()
        .enumerate()
        .skip(1)
        .find(|(_, row)| {
            let cell = row.get(column).map(String::as_str).unwrap_or("");
            if skip_empty && cell.is_empty() {
                return false;
            }
            cell == key.value
        })
        .map(|(index, _)| index)
}

/// Merges `patch` into `row` by header position. The row is padded to the
/// header width first. Returns the patch fields that had no matching header.
pub fn merge_patch(row: &mut Vec<String>, headers: &[String], patch: &Record) -> Vec<String> {
    if row.len() < headers.len() {
        row.resize(headers.len(), String::new());
    }
    let mut ignored = Vec::new();
    for (field, value) in patch {
        match headers.iter().position(|h| h == field) {
            Some(column) => row[column] = value.clone(),
            None => ignored.push(field.clone()),
        }
    }
    ignored
}

/// Zero-based column index to its letter name: 0 -> A, 25 -> Z, 26 -> AA.
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Quotes a sheet title for A1 notation, doubling embedded single quotes.
pub fn quote_title(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

/// Whole-column range covering `width` columns, e.g. `'Tasks'!A:L`.
pub fn a1_columns(title: &str, width: usize) -> String {
    format!(
        "{}!A:{}",
        quote_title(title),
        column_letter(width.saturating_sub(1))
    )
}

/// Single-row range for the zero-based grid row, e.g. `'Tasks'!A3:L3`.
pub fn a1_row(title: &str, row_index: usize, width: usize) -> String {
    let n = row_index + 1;
    format!(
        "{}!A{n}:{}{n}",
        quote_title(title),
        column_letter(width.saturating_sub(1))
    )
}
