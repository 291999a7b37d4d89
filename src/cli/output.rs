//! Output formatting utilities for the CLI.

use comfy_table::{presets, Attribute, Cell, ContentArrangement, Table};
use serde::Serialize;

pub trait CommandOutput: Serialize {
    fn to_human(&self) -> String;
    fn to_json(&self) -> serde_json::Value;
}

pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&result.to_json()).unwrap_or_default());
    } else {
        println!("{}", result.to_human());
    }
}

/// Truncate a string to a maximum length, appending "..." if truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// Table with the CLI's common styling and a bold header row.
pub fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            header
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        );
    table
}

/// Titled bullet list, or nothing when `items` is empty.
pub fn section(title: &str, items: &[String]) -> Option<String> {
    if items.is_empty() {
        return None;
    }
    let mut lines = vec![format!("{title}:")];
    lines.extend(items.iter().map(|item| format!("  - {item}")));
    Some(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer string", 10), "a much ...");
    }

    #[test]
    fn test_section() {
        assert!(section("Warnings", &[]).is_none());
        let rendered = section("Warnings", &["one".to_string(), "two".to_string()]).unwrap();
        assert_eq!(rendered, "Warnings:\n  - one\n  - two");
    }

    #[test]
    fn test_table_has_header() {
        let mut t = table(&["Agent", "Status"]);
        t.add_row(vec!["quality", "healthy"]);
        let rendered = t.to_string();
        assert!(rendered.contains("Agent"));
        assert!(rendered.contains("quality"));
    }
}
