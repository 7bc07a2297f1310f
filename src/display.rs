//! Console tables and number formatting.
use chrono::{DateTime, Utc};
use colored::Colorize;
use tabled::{
    builder::Builder,
    settings::{
        object::{Columns, Rows},
        Alignment, Modify, Panel as TitlePanel, Style,
    },
    Table,
};

use crate::favorites::format_change;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

/// Rounded table with a title spanning every column and a header row.
///
/// Short rows are padded with blank cells. Cells may carry ANSI colors;
/// widths are measured in display columns on the plain text.
pub fn titled_table(title: &str, columns: &[(&str, Align)], rows: Vec<Vec<String>>) -> Table {
    let mut builder = Builder::default();
    builder.push_record(columns.iter().map(|(header, _)| header.blue().bold().to_string()));
    for mut row in rows {
        row.resize(columns.len(), String::new());
        builder.push_record(row);
    }
    let mut table = builder.build();
    for (i, (_, align)) in columns.iter().enumerate() {
        if *align == Align::Right {
            table.with(Modify::new(Columns::single(i)).with(Alignment::right()));
        }
    }
    with_title(table, title)
}

/// Label/value block under a title. `rows` holds two cells per record.
pub fn panel(title: &str, rows: Builder) -> Table {
    with_title(rows.build(), title)
}

fn with_title(mut table: Table, title: &str) -> Table {
    table
        .with(TitlePanel::header(title.bold().to_string()))
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .with(Style::rounded());
    table
}

/// Groups the integer part in thousands: 1234567.891 -> "1,234,567.89".
pub fn format_number(value: f64, decimals: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let text = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, fr)) => (i, Some(fr)),
        None => (text.as_str(), None),
    };
    let mut grouped = String::new();
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if value < 0.0 && text.chars().any(|c| c.is_ascii_digit() && c != '0') {
        "-"
    } else {
        ""
    };
    match frac_part {
        Some(fr) => format!("{}{}.{}", sign, grouped, fr),
        None => format!("{}{}", sign, grouped),
    }
}

/// "$1,234.56"
pub fn format_usd(value: f64) -> String {
    format!("${}", format_number(value, 2))
}

/// Dollar price with enough decimals to show sub-cent tokens.
pub fn format_price(value: f64) -> String {
    if value.abs() >= 1.0 || value == 0.0 {
        return format_usd(value);
    }
    let text = format!("{:.10}", value);
    let trimmed = text.trim_end_matches('0');
    format!("${}", trimmed)
}

/// Colored percentage, green when not negative.
pub fn change_cell(change: f64) -> String {
    let text = format_change(change);
    if change >= 0.0 {
        text.green().to_string()
    } else {
        text.red().to_string()
    }
}

/// Placeholder for values the upstream did not report.
pub fn not_available() -> String {
    "N/A".bright_black().to_string()
}

/// Raw integer amount scaled down by token decimals.
pub fn scale_amount(raw: &str, decimals: &str) -> Option<f64> {
    let raw: f64 = raw.trim().parse().ok()?;
    let decimals: i32 = decimals.trim().parse().ok()?;
    Some(raw / 10f64.powi(decimals))
}

/// "0x1234...abcd"
pub fn short_address(address: &str) -> String {
    if address.len() <= 14 || !address.is_ascii() {
        return address.to_string();
    }
    format!("{}...{}", &address[..6], &address[address.len() - 4..])
}

/// Unix seconds (as returned by the explorers) to a UTC date and time.
pub fn format_timestamp(seconds: &str) -> String {
    seconds
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(|s| DateTime::<Utc>::from_timestamp(s, 0))
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| seconds.to_string())
}

/// "h24" -> "24h", "m5" -> "5m".
pub fn timeframe_label(frame: &str) -> String {
    let mut chars = frame.chars();
    match chars.next() {
        Some(unit) => format!("{}{}", chars.as_str(), unit),
        None => String::new(),
    }
}

pub fn print_error(message: &str) {
    println!("{}", message.red().bold());
}

pub fn print_warning(message: &str) {
    println!("{}", message.yellow());
}

pub fn print_success(message: &str) {
    println!("{}", message.green().bold());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thousands_grouping() {
        assert_eq!(format_number(1234567.891, 2), "1,234,567.89");
        assert_eq!(format_number(999.0, 0), "999");
        assert_eq!(format_number(-1000.5, 1), "-1,000.5");
        assert_eq!(format_number(-0.001, 2), "0.00");
        assert_eq!(format_usd(0.0), "$0.00");
    }

    #[test]
    fn small_prices_keep_precision() {
        assert_eq!(format_price(0.00001234), "$0.00001234");
        assert_eq!(format_price(1520.456), "$1,520.46");
    }

    #[test]
    fn amounts_and_addresses() {
        assert_eq!(scale_amount("1500000", "6"), Some(1.5));
        assert_eq!(scale_amount("abc", "6"), None);
        assert_eq!(
            short_address("0x6982508145454ce325ddbe47a25d4ec3d2311933"),
            "0x6982...1933"
        );
        assert_eq!(short_address("0xABC"), "0xABC");
        assert_eq!(format_timestamp("1700000000"), "2023-11-14 22:13");
        assert_eq!(format_timestamp("soon"), "soon");
        assert_eq!(timeframe_label("h24"), "24h");
    }

    #[test]
    fn table_pads_and_aligns_columns() {
        colored::control::set_override(false);
        let table = titled_table(
            "Volume",
            &[("Time Frame", Align::Left), ("USD", Align::Right)],
            vec![
                vec!["24h".to_string(), "$1,000.00".to_string()],
                vec!["5m".to_string()],
            ],
        );
        let text = table.to_string();
        assert!(text.starts_with('╭'));
        assert!(text.lines().nth(1).unwrap().contains("Volume"));
        assert!(text.contains(&format!("│ {:<10} │ {:>9} │", "Time Frame", "USD")));
        assert!(text.contains(&format!("│ {:<10} │ {:>9} │", "24h", "$1,000.00")));
        assert!(text.contains(&format!("│ {:<10} │ {:>9} │", "5m", "")));
    }

    #[test]
    fn wide_glyphs_keep_borders_aligned() {
        colored::control::set_override(false);
        let mut rows = Builder::default();
        rows.push_record(["Name".to_string(), "🐸 PEPE 佩佩".to_string()]);
        rows.push_record(["Symbol".to_string(), "$PEPE".to_string()]);
        rows.push_record(["Change".to_string(), change_cell(10.0)]);
        let text = panel("Token Information", rows).to_string();
        let line = |needle: &str| text.lines().find(|l| l.contains(needle)).unwrap();

        // The frog and both ideographs take two columns each.
        assert_eq!(line("PEPE 佩佩").chars().count() + 3, line("$PEPE").chars().count());
        assert_eq!(line("$PEPE").chars().count(), line("Token Information").chars().count());
        assert!(line("+10.00%").starts_with("│ Change"));
    }
}
