//! Question-to-SQL synthesis. Remote mode delegates to a completion backend
//! primed with the table catalog; fallback mode answers from an ordered
//! keyword-rule chain so the service stays usable without network access.

pub mod llm;

use anyhow::{bail, Result};
use tracing::debug;

use crate::config::{LlmConfig, LlmMode};
use crate::schema;
use crate::synthesizer::llm::{CompletionBackend, GeminiBackend};

/// Ordered (keyword, template) rules; first match wins. Matching is
/// case-insensitive substring containment on the question.
const FALLBACK_RULES: &[(&str, &str)] = &[
    (
        "total sales",
        "SELECT SUM(total_sales) FROM total_sales_metrics;",
    ),
    (
        "roas",
        "SELECT ROUND(SUM(ad_sales) / NULLIF(SUM(ad_spend), 0), 2) AS RoAS FROM ad_sales_metrics;",
    ),
    (
        "highest cpc",
        "SELECT item_id, ROUND(ad_spend / NULLIF(clicks, 0), 2) AS CPC FROM ad_sales_metrics ORDER BY CPC DESC LIMIT 1;",
    ),
];

/// Harmless sentinel for questions no rule understands.
const DEFAULT_SQL: &str = "SELECT 1;";

pub struct QuerySynthesizer {
    backend: Option<Box<dyn CompletionBackend>>,
}

impl QuerySynthesizer {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        match config.mode {
            LlmMode::Remote => {
                let Some(api_key) = config.resolved_api_key() else {
                    bail!(
                        "llm mode is \"remote\" but no API key is configured \
                         (set [llm] api_key or the {} environment variable)",
                        crate::config::API_KEY_ENV
                    );
                };
                let backend = GeminiBackend::new(config, api_key)?;
                Ok(Self {
                    backend: Some(Box::new(backend)),
                })
            }
            LlmMode::Fallback => Ok(Self { backend: None }),
        }
    }

    /// Keyword-rule-only synthesizer, independent of any config.
    pub fn fallback_only() -> Self {
        Self { backend: None }
    }

    pub fn with_backend(backend: Box<dyn CompletionBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// Translate a free-text question into a SQL string. The returned SQL is
    /// not validated; the executor reports whatever the database thinks of it.
    pub async fn question_to_sql(&self, question: &str) -> Result<String> {
        if let Some(backend) = &self.backend {
            let prompt = build_prompt(question);
            let completion = backend.complete(&prompt).await?;
            let sql = clean_sql(&completion);
            debug!(%sql, "completion backend produced query");
            return Ok(sql);
        }
        Ok(fallback_sql(question).to_string())
    }
}

pub fn fallback_sql(question: &str) -> &'static str {
    let lowered = question.to_lowercase();
    FALLBACK_RULES
        .iter()
        .find(|(keyword, _)| lowered.contains(keyword))
        .map(|(_, template)| *template)
        .unwrap_or(DEFAULT_SQL)
}

pub fn build_prompt(question: &str) -> String {
    format!(
        "You are a data analyst assistant.\n{}Task: Convert this question into a SQL query.\nQuestion: {}\n",
        schema::prompt_block(),
        question
    )
}

/// Strip the Markdown code fences completion models like to wrap SQL in.
/// Idempotent: cleaning already-clean SQL is a no-op.
pub fn clean_sql(sql: &str) -> String {
    let mut rest = sql.trim();
    let fenced_sql = rest
        .get(..6)
        .map(|prefix| prefix.eq_ignore_ascii_case("```sql"))
        .unwrap_or(false);
    if fenced_sql {
        rest = rest[6..].trim_start();
    } else if let Some(stripped) = rest.strip_prefix("```") {
        rest = stripped;
    }
    if let Some(stripped) = rest.strip_suffix("```") {
        rest = stripped;
    }
    rest.trim().to_string()
}
