//! Chart advisor: decides whether a question wants a picture and what shape
//! it should take. Rendering lives in [`render`]; the decision logic here is
//! pure so it can be tested without touching the filesystem.

pub mod render;

use serde::Serialize;
use serde_json::Value;

const CHART_KEYWORDS: [&str; 5] = ["show", "visualize", "chart", "plot", "graph"];

pub fn chart_needed(question: &str) -> bool {
    let lowered = question.to_lowercase();
    CHART_KEYWORDS
        .iter()
        .any(|keyword| lowered.contains(keyword))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Line,
    Bar,
}

#[derive(Debug, Clone)]
pub struct ChartSpec {
    pub kind: ChartKind,
    /// (x label, raw y) pairs; y is converted to a number at render time.
    pub points: Vec<(String, Value)>,
}

/// Best-effort shape inference. Two-field rows are (x, y) pairs and become a
/// line chart when the question reads temporal, a bar chart otherwise. Wider
/// rows keep only their first two fields and default to bars. Rows narrower
/// than two fields have nothing to plot.
pub fn infer_chart(rows: &[Vec<Value>], question: &str) -> Option<ChartSpec> {
    let first = rows.first()?;
    if first.len() < 2 {
        return None;
    }
    let kind = if first.len() == 2 {
        let lowered = question.to_lowercase();
        if lowered.contains("over time") || lowered.contains("date") {
            ChartKind::Line
        } else {
            ChartKind::Bar
        }
    } else {
        ChartKind::Bar
    };
    let points = rows
        .iter()
        .map(|row| {
            let x = row
                .first()
                .map(crate::output::table::display_value)
                .unwrap_or_default();
            let y = row.get(1).cloned().unwrap_or(Value::Null);
            (x, y)
        })
        .collect();
    Some(ChartSpec { kind, points })
}
