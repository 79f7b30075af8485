//! The ask pipeline: question -> SQL -> rows -> text answer, with an
//! optional chart on the side. This is the one path shared by the CLI and
//! the HTTP server.

use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, warn};

use crate::chart::render::render_chart;
use crate::chart::{chart_needed, infer_chart};
use crate::config::Config;
use crate::output::table::format_result;
use crate::store::{MetricsStore, QueryOutcome};
use crate::synthesizer::QuerySynthesizer;

#[derive(Debug, Clone, Serialize)]
pub struct AskOutcome {
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<PathBuf>,
}

/// Full pipeline: answer text plus a chart when the question asks for one
/// and the rows have a plottable shape.
pub async fn ask(
    synthesizer: &QuerySynthesizer,
    config: &Config,
    question: &str,
) -> Result<AskOutcome> {
    let outcome = run_query(synthesizer, config, question).await?;
    let answer = format_result(&outcome);
    let chart = maybe_chart(config, &outcome, question);
    Ok(AskOutcome { answer, chart })
}

/// Answer text only; the streaming endpoint never produces charts.
pub async fn ask_text(
    synthesizer: &QuerySynthesizer,
    config: &Config,
    question: &str,
) -> Result<String> {
    let outcome = run_query(synthesizer, config, question).await?;
    Ok(format_result(&outcome))
}

async fn run_query(
    synthesizer: &QuerySynthesizer,
    config: &Config,
    question: &str,
) -> Result<QueryOutcome> {
    let sql = synthesizer.question_to_sql(question).await?;
    debug!(%sql, "executing synthesized query");
    let store = MetricsStore::open(&config.resolved_db_path())?;
    Ok(store.query(&sql))
}

fn maybe_chart(config: &Config, outcome: &QueryOutcome, question: &str) -> Option<PathBuf> {
    if !chart_needed(question) {
        return None;
    }
    let QueryOutcome::Table(result) = outcome else {
        return None;
    };
    if result.rows.is_empty() {
        return None;
    }
    let spec = infer_chart(&result.rows, question)?;
    match render_chart(&spec, &config.resolved_chart_path()) {
        Ok(path) => Some(path),
        Err(err) => {
            // A failed chart degrades the response, it does not fail it.
            warn!("chart rendering failed: {err:#}");
            None
        }
    }
}
