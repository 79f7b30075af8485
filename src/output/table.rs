//! Plain-text rendering of query outcomes. The exact layout is part of the
//! service contract: the dashboard fronting this API parses it.

use serde_json::Value;

use crate::store::QueryOutcome;

pub fn format_result(outcome: &QueryOutcome) -> String {
    let result = match outcome {
        QueryOutcome::Error { error } => return format!("Error: {error}"),
        QueryOutcome::Table(result) => result,
    };
    if result.rows.is_empty() {
        return "No results found.".to_string();
    }

    let mut lines = Vec::with_capacity(result.rows.len() + 2);
    if !result.columns.is_empty() {
        lines.push(result.columns.join(" | "));
        lines.push("-|-".repeat(result.columns.len()));
    }
    for row in &result.rows {
        lines.push(
            row.iter()
                .map(display_value)
                .collect::<Vec<_>>()
                .join(" | "),
        );
    }
    lines.join("\n")
}

/// Stringify a single cell. Strings print bare (no quotes), integers without
/// a decimal point, reals in their shortest round-trip form.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
