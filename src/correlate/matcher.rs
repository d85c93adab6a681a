use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::info;

use crate::catalog::EndpointCatalog;
use crate::llm::LlmApi;
use crate::models::{EndpointDescription, MergedRecord, StepMatch};

static MATCH_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"step:\s*(.+?)\s*\|\s*URL:\s*(https?://[^|\s]+)\s*\|\s*definition:\s*(.+)")
        .expect("valid match template")
});

/// Matches whose definition is this sentinel are navigation-only steps
/// the service could not tie to an endpoint.
const NO_MATCH_SENTINEL: &str = "none";

/// Aligns free-text test-case steps with catalog endpoints through a
/// single reasoning-service call.
pub struct StepCorrelator<'a, M: LlmApi> {
    llm: &'a M,
    catalog: &'a EndpointCatalog,
}

impl<'a, M: LlmApi> StepCorrelator<'a, M> {
    pub fn new(llm: &'a M, catalog: &'a EndpointCatalog) -> Self {
        Self { llm, catalog }
    }

    /// Correlate the narrative against the catalog. Returns the grouped
    /// per-endpoint records; an empty result means no step exercised any
    /// cataloged endpoint. The one service call here is fatal on failure.
    pub async fn correlate(&self, narrative: &str) -> Result<Vec<MergedRecord>> {
        let records = self.catalog.scan()?;
        let prompt = build_prompt(&records, narrative);
        let reply = self
            .llm
            .complete(&prompt)
            .await
            .context("correlation call failed")?;

        let matches = parse_matches(&reply);
        info!(matches = matches.len(), "parsed correlation reply");
        self.reconcile(&matches)
    }

    /// Re-scan the catalog's raw rows for each matched URL and fold every
    /// step sharing a URL into one record carrying that row's glossaries.
    fn reconcile(&self, matches: &[StepMatch]) -> Result<Vec<MergedRecord>> {
        if matches.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self.catalog.raw_rows()?;
        let mut merged = Vec::new();
        for row in &rows {
            let hit = matches
                .iter()
                .any(|m| row.iter().any(|cell| cell == &m.url));
            if !hit {
                continue;
            }
            let url = row.first().cloned().unwrap_or_default();
            let steps: Vec<String> = matches
                .iter()
                .filter(|m| m.url == url)
                .map(|m| m.step.clone())
                .collect();
            if steps.is_empty() {
                continue;
            }
            merged.push(MergedRecord {
                url,
                request_fields: row.get(2).cloned().unwrap_or_default(),
                response_fields: row.get(3).cloned().unwrap_or_default(),
                steps,
            });
        }
        Ok(merged)
    }
}

/// Extract every line of the reply matching the step/URL/definition
/// template. Non-conforming lines are skipped silently; sentinel
/// definitions and duplicate (step, URL) pairs are discarded.
pub fn parse_matches(reply: &str) -> Vec<StepMatch> {
    let mut seen = HashSet::new();
    let mut matches = Vec::new();
    for caps in MATCH_LINE.captures_iter(reply) {
        let step = caps[1].trim().to_string();
        let url = caps[2].trim().to_string();
        let definition = caps[3].trim().to_string();
        if definition == NO_MATCH_SENTINEL {
            continue;
        }
        if seen.insert((step.clone(), url.clone())) {
            matches.push(StepMatch {
                step,
                url,
                definition,
            });
        }
    }
    matches
}

/// Record that correlation found no endpoint usage at all.
pub fn write_no_match_marker(path: &Path) -> Result<()> {
    let content = format!("no api use!\nrecorded at {}\n", chrono::Utc::now().to_rfc3339());
    std::fs::write(path, content).with_context(|| format!("write marker {}", path.display()))
}

fn build_prompt(records: &[EndpointDescription], narrative: &str) -> String {
    let definitions: Vec<&str> = records.iter().map(|r| r.definition.as_str()).collect();
    let urls: Vec<&str> = records.iter().map(|r| r.url.as_str()).collect();

    let mut prompt = String::new();
    prompt.push_str("#Endpoint data#:\n");
    prompt.push_str(&format!(
        "data: {{\n  \"definitions\": {definitions:?},\n  \"urls\": {urls:?}\n}}\n\n"
    ));
    prompt.push_str("#Test narrative#:\n");
    prompt.push_str(narrative);
    prompt.push_str("\n\n");
    prompt.push_str(
        "#Rules#:\n\
         1. Read the narrative and find sentences describing an action close in meaning to one of the definitions.\n\
         2. Pick the matching entry of 'urls', making sure it fits the step.\n\
         3. Match each step to at most one endpoint, without repeats.\n\
         4. Note that verifying an expected result may also call an endpoint.\n\
         5. Return one line per matched step and skip steps that only navigate the UI.\n\
         6. Follow the return format exactly.\n\n",
    );
    prompt.push_str(
        "#Return format#:\n\
         one line per matched step:\n\
         step:<step text> | URL:<endpoint url> | definition:<endpoint definition>\n\n",
    );
    prompt.push_str(
        "#Example#:\n\
         step:1. open the assessment list | URL:https://svc/api/list | definition:Fetches the assessment list\n",
    );
    prompt
}
