//! Fixed-width table slicing

use std::sync::OnceLock;

use regex::Regex;

use super::{TableParseError, TelemetryRecord};

/// A header label followed by the spaces padding it to the next column
fn header_token() -> &'static Regex {
    static HEADER_TOKEN: OnceLock<Regex> = OnceLock::new();
    HEADER_TOKEN.get_or_init(|| Regex::new(r"[^ ]+ +").expect("header token pattern is valid"))
}

/// Infer column start offsets (in characters) from a header line.
///
/// The first column starts at 0; each further start is the cumulative width
/// of the padded labels before it. The last label has no padding after the
/// header is right-trimmed, so it only contributes its start.
pub fn infer_columns(header: &str) -> Vec<usize> {
    let mut columns = vec![0];
    for m in header_token().find_iter(header.trim_end()) {
        let width = m.as_str().chars().count();
        columns.push(columns[columns.len() - 1] + width);
    }
    columns
}

/// Cut cell `index` out of `line` using the inferred column starts.
///
/// Cells wider than their header label spill into a neighbour, so the cut is
/// nudged by one character: the left edge moves left when the character
/// before it is not a space, and an interior right edge moves left when the
/// character before it is not a space. The last column runs to the end of
/// the line.
pub fn slice_cell(line: &str, columns: &[usize], index: usize) -> String {
    let chars: Vec<char> = line.chars().collect();
    let len = chars.len();

    let mut start = columns.get(index).copied().unwrap_or(len).min(len);
    if start > 0 && chars[start - 1] != ' ' {
        start -= 1;
    }

    let end = match columns.get(index + 1) {
        Some(&next) => {
            let mut end = next.min(len);
            if end > 0 && chars[end - 1] != ' ' {
                end -= 1;
            }
            end
        }
        None => len,
    };

    if start >= end {
        return String::new();
    }
    chars[start..end].iter().collect::<String>().trim().to_string()
}

/// Parse a whole table into records keyed by the header's cell names.
///
/// Line 0 is the header. Blank lines are skipped; every other line yields a
/// record, with cells as text.
pub fn parse_table(payload: &str) -> Result<Vec<TelemetryRecord>, TableParseError> {
    let mut lines = payload.split('\n');
    let header = lines.next().unwrap_or_default();
    if header.trim().is_empty() {
        return Err(TableParseError::new("empty header line", payload));
    }

    let columns = infer_columns(header);
    let names: Vec<String> = (0..columns.len())
        .map(|i| slice_cell(header, &columns, i))
        .collect();

    let records = lines
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            names
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), slice_cell(line, &columns, i)))
                .collect::<TelemetryRecord>()
        })
        .collect::<Vec<_>>();

    Ok(records)
}
