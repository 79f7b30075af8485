use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use plotters::prelude::*;
use serde_json::Value;

use crate::chart::{ChartKind, ChartSpec};

const CHART_SIZE: (u32, u32) = (1000, 600);
const CHART_TITLE: &str = "Chart";

/// Render the chart as a PNG at `path`, overwriting any previous chart.
/// Concurrent callers race last-writer-wins on the output file.
pub fn render_chart(spec: &ChartSpec, path: &Path) -> Result<PathBuf> {
    let points = numeric_points(spec)?;
    if points.is_empty() {
        return Err(anyhow!("no plottable points"));
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let y_top = points
        .iter()
        .map(|(_, y)| *y)
        .fold(0.0_f64, f64::max)
        .max(f64::MIN_POSITIVE)
        * 1.1;
    let x_range = -0.5_f64..(points.len() as f64 - 0.5);

    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| anyhow!("failed clearing chart canvas: {e}"))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(CHART_TITLE, ("sans-serif", 28))
        .margin(16)
        .x_label_area_size(80)
        .y_label_area_size(64)
        .build_cartesian_2d(x_range, 0.0_f64..y_top)
        .map_err(|e| anyhow!("failed building chart axes: {e}"))?;

    let labels: Vec<String> = points.iter().map(|(label, _)| label.clone()).collect();
    let label_style = ("sans-serif", 13)
        .into_font()
        .transform(FontTransform::Rotate90);
    chart
        .configure_mesh()
        .x_labels(labels.len().min(24))
        .x_label_formatter(&|x| tick_label(&labels, *x))
        .x_label_style(label_style)
        .x_desc("x")
        .y_desc("y")
        .draw()
        .map_err(|e| anyhow!("failed drawing chart mesh: {e}"))?;

    match spec.kind {
        ChartKind::Line => {
            chart
                .draw_series(LineSeries::new(
                    points.iter().enumerate().map(|(i, (_, y))| (i as f64, *y)),
                    &BLUE,
                ))
                .map_err(|e| anyhow!("failed drawing line series: {e}"))?;
            chart
                .draw_series(points.iter().enumerate().map(|(i, (_, y))| {
                    Circle::new((i as f64, *y), 4, BLUE.filled())
                }))
                .map_err(|e| anyhow!("failed drawing line markers: {e}"))?;
        }
        ChartKind::Bar => {
            chart
                .draw_series(points.iter().enumerate().map(|(i, (_, y))| {
                    let x = i as f64;
                    Rectangle::new([(x - 0.35, 0.0), (x + 0.35, *y)], BLUE.filled())
                }))
                .map_err(|e| anyhow!("failed drawing bars: {e}"))?;
        }
    }

    root.present()
        .map_err(|e| anyhow!("failed writing chart to {}: {e}", path.display()))?;
    Ok(path.to_path_buf())
}

fn tick_label(labels: &[String], x: f64) -> String {
    let idx = x.round();
    // Suppress the fractional ticks plotters inserts between categories.
    if (x - idx).abs() > 0.01 || idx < 0.0 {
        return String::new();
    }
    labels.get(idx as usize).cloned().unwrap_or_default()
}

fn numeric_points(spec: &ChartSpec) -> Result<Vec<(String, f64)>> {
    spec.points
        .iter()
        .map(|(label, raw)| {
            let y = value_to_f64(raw)
                .ok_or_else(|| anyhow!("non-numeric y value for {label:?}: {raw}"))?;
            Ok((label.clone(), y))
        })
        .collect()
}

fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::infer_chart;
    use serde_json::json;

    #[test]
    fn renders_line_chart_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.png");
        let rows = vec![
            vec![json!("2024-01-01"), json!(100)],
            vec![json!("2024-01-02"), json!(150)],
        ];
        let spec = infer_chart(&rows, "show ad sales over time").unwrap();
        let written = render_chart(&spec, &path).unwrap();
        assert_eq!(written, path);
        assert!(path.metadata().unwrap().len() > 0);
    }

    #[test]
    fn renders_bar_chart_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.png");
        let rows = vec![vec![json!(1), json!(10)], vec![json!(2), json!(20)]];
        let spec = infer_chart(&rows, "plot impressions by product").unwrap();
        render_chart(&spec, &path).unwrap();
        // A second render must replace, not fail on, the existing file.
        render_chart(&spec, &path).unwrap();
        assert!(path.metadata().unwrap().len() > 0);
    }

    #[test]
    fn non_numeric_y_is_a_render_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.png");
        let rows = vec![vec![json!("A"), json!("not a number")]];
        let spec = infer_chart(&rows, "chart eligibility").unwrap();
        assert!(render_chart(&spec, &path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn numeric_strings_are_accepted_as_y() {
        assert_eq!(value_to_f64(&json!("3.5")), Some(3.5));
        assert_eq!(value_to_f64(&json!(7)), Some(7.0));
        assert_eq!(value_to_f64(&Value::Null), None);
    }
}
