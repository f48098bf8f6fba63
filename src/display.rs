//! # Console Formatting
//!
//! Human-readable sizes, column wrapping and labels for the integer
//! dictionaries the widget API returns.

use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::time::Duration;

const SIZE_UNITS: [&str; 5] = ["B", "kB", "MB", "GB", "TB"];

/// Format a byte count, e.g. `1536` -> `1.5 kB`
pub fn readable_file_size(size: u64) -> String {
    if size == 0 {
        return "0 B".to_string();
    }

    let exponent = ((size as f64).ln() / 1024f64.ln()).floor() as usize;
    let exponent = exponent.min(SIZE_UNITS.len() - 1);
    let scaled = size as f64 / 1024f64.powi(exponent as i32);

    let formatted = format!("{:.2}", scaled);
    let formatted = formatted.trim_end_matches('0').trim_end_matches('.');

    format!("{} {}", formatted, SIZE_UNITS[exponent])
}

fn char_width(ch: char) -> usize {
    if (ch as u32) > 0xff {
        2
    } else {
        1
    }
}

fn text_width(text: &str) -> usize {
    text.chars().map(char_width).sum()
}

/// Hard-wrap `text` every `width` columns; non-Latin-1 characters take two columns
pub fn wrap_output(text: &str, width: usize) -> String {
    let width = width.max(1);
    let mut wrapped = String::with_capacity(text.len() + text.len() / width);
    let mut column = 0;

    for ch in text.chars() {
        if column >= width {
            wrapped.push('\n');
            column = 0;
        }
        wrapped.push(ch);
        column += char_width(ch);
    }

    wrapped
}

/// `my-widget` -> `myWidget`
pub fn kebab_to_camel(text: &str) -> String {
    let mut camel = String::with_capacity(text.len());
    let mut chars = text.chars();

    while let Some(ch) = chars.next() {
        if ch == '-' {
            match chars.next() {
                Some(next) => camel.extend(next.to_uppercase()),
                None => camel.push(ch),
            }
        } else {
            camel.push(ch);
        }
    }

    camel
}

/// Integer dictionaries used by package and release records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dict {
    ReleaseStatus,
    WidgetStatus,
    PackageType,
    ReleaseType,
}

impl Dict {
    /// Dictionary for a package-details key, if the key is an enum
    pub fn for_key(key: &str) -> Option<Self> {
        match key {
            "status" => Some(Dict::WidgetStatus),
            "packageType" => Some(Dict::PackageType),
            "releaseType" => Some(Dict::ReleaseType),
            _ => None,
        }
    }

    fn labels(self) -> &'static [&'static str] {
        match self {
            Dict::ReleaseStatus => &["Wait Review", "Pass Review", "Reject"],
            Dict::WidgetStatus => &["Develop", "Banned", "Unpublished", "Online", "Offline"],
            Dict::PackageType => &["Third Party", "Official"],
            Dict::ReleaseType => &["Space", "Global"],
        }
    }

    /// Label for `value`; unknown values render verbatim
    pub fn translate(self, value: &Value) -> String {
        value
            .as_u64()
            .and_then(|index| self.labels().get(index as usize))
            .map(|label| label.to_string())
            .unwrap_or_else(|| plain(value))
    }
}

/// Render rows under a header and a rule line.
///
/// Cells may contain newlines; a row is as tall as its tallest cell.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|header| text_width(header)).collect();
    for row in rows {
        for (index, cell) in row.iter().enumerate().take(widths.len()) {
            for line in cell.lines() {
                widths[index] = widths[index].max(text_width(line));
            }
        }
    }

    let format_line = |cells: &[&str]| -> String {
        let mut line = String::new();
        for (index, width) in widths.iter().enumerate() {
            let cell = cells.get(index).copied().unwrap_or("");
            line.push(' ');
            line.push_str(cell);
            line.push_str(&" ".repeat(width.saturating_sub(text_width(cell))));
        }
        line.trim_end().to_string()
    };

    let rules: Vec<String> = widths.iter().map(|width| "─".repeat(*width)).collect();
    let rules: Vec<&str> = rules.iter().map(String::as_str).collect();
    let mut output = vec![format_line(headers), format_line(&rules)];

    for row in rows {
        let cells: Vec<Vec<&str>> = row.iter().map(|cell| cell.lines().collect()).collect();
        let height = cells.iter().map(Vec::len).max().unwrap_or(0).max(1);
        for line_index in 0..height {
            let line: Vec<&str> = cells
                .iter()
                .map(|lines| lines.get(line_index).copied().unwrap_or(""))
                .collect();
            output.push(format_line(&line));
        }
    }

    output.join("\n")
}

/// Ticking spinner for a long step; finish it with `finish_and_clear`
pub fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Render a JSON value without quotes around strings
pub fn plain(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
