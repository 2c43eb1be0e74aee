//! Text formatting for the ranked view.
//!
//! Turns a snapshot into at most `max_rows` lines of at most `max_cols`
//! characters each; the caller owns screen clearing and cursor placement.

use crate::hist::RankedEntry;

/// Width of the comm column, matching the kernel's 16-byte task name.
const COMM_WIDTH: usize = 16;
const DSO_WIDTH: usize = 24;

#[allow(clippy::cast_precision_loss)]
pub fn format_entries(
    entries: &[RankedEntry],
    total_period: u64,
    max_rows: usize,
    max_cols: usize,
) -> Vec<String> {
    entries
        .iter()
        .take(max_rows)
        .map(|entry| {
            let pct = if total_period > 0 {
                entry.weight as f64 / total_period as f64 * 100.0
            } else {
                0.0
            };
            let dso = entry.key.module.as_deref().unwrap_or("[unknown]");
            let line = format!(
                "{pct:>7.2}%  {weight:>14}  {comm:<cw$}  {dso:<dw$}  {symbol}",
                weight = entry.weight,
                comm = entry.key.comm,
                symbol = entry.key.symbol,
                cw = COMM_WIDTH,
                dw = DSO_WIDTH,
            );
            truncate_columns(line, max_cols)
        })
        .collect()
}

fn truncate_columns(line: String, max_cols: usize) -> String {
    if line.chars().count() <= max_cols {
        line
    } else {
        line.chars().take(max_cols).collect()
    }
}
