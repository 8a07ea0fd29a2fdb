//! Text rendering of the result log.

use crate::formatter::DisplayRecord;
use crate::labels::HEADER;
use crate::session::ResultLog;

pub const CAPTION: &str = "Toxicity Classifier";

/// Renders the log as a bordered table under [`HEADER`].
///
/// Returns an empty string while the log is empty, so nothing is shown
/// before the first classification. Cells are looked up by lowercased
/// column name; labels without a column are dropped.
pub fn render_table(log: &ResultLog) -> String {
    if log.is_empty() {
        return String::new();
    }

    let rows: Vec<Vec<&str>> = log.iter().map(row_cells).collect();
    let mut widths: Vec<usize> = HEADER.iter().map(|column| display_width(column)).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(display_width(cell));
        }
    }

    let separator = separator_line(&widths);
    let mut out = String::new();
    out.push_str(CAPTION);
    out.push('\n');
    out.push_str(&separator);
    out.push_str(&format_row(&HEADER, &widths));
    out.push_str(&separator);
    for row in &rows {
        out.push_str(&format_row(row.as_slice(), &widths));
    }
    out.push_str(&separator);
    out
}

/// One JSON object per record, newline separated.
pub fn render_json_lines(log: &ResultLog) -> Result<String, serde_json::Error> {
    let mut out = String::new();
    for record in log.iter() {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    Ok(out)
}

fn row_cells(record: &DisplayRecord) -> Vec<&str> {
    HEADER
        .iter()
        .map(|column| record.get(column).unwrap_or(""))
        .collect()
}

// Variation selectors take no terminal cell; good enough for the glyphs we print.
fn display_width(cell: &str) -> usize {
    cell.chars()
        .filter(|c| !('\u{FE00}'..='\u{FE0F}').contains(c))
        .count()
}

fn separator_line(widths: &[usize]) -> String {
    let mut line = String::from("+");
    for width in widths {
        line.push_str(&"-".repeat(width + 2));
        line.push('+');
    }
    line.push('\n');
    line
}

fn format_row<S: AsRef<str>>(cells: &[S], widths: &[usize]) -> String {
    let mut line = String::from("|");
    for (cell, width) in cells.iter().zip(widths) {
        let cell = cell.as_ref();
        let padding = width - display_width(cell);
        let left = padding / 2;
        line.push(' ');
        line.push_str(&" ".repeat(left));
        line.push_str(cell);
        line.push_str(&" ".repeat(padding - left));
        line.push_str(" |");
    }
    line.push('\n');
    line
}
