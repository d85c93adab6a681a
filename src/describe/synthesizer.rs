use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use tracing::{info, warn};

use crate::catalog::{EndpointCatalog, EndpointGroup};
use crate::describe::flatten::{flatten_paths, strip_values};
use crate::llm::{LlmApi, LlmError};
use crate::models::EndpointDescription;
use crate::normalize::parse_loose;

static DEFINITION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)Definition:(.*?)Request fields:").expect("valid pattern"));
static REQUEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Request fields:(.*?)Response fields:").expect("valid pattern")
});
static RESPONSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)Response fields:(.*)").expect("valid pattern"));

/// Prompt strategy for one endpoint: full payload first, structure-only
/// skeleton after a size-limit rejection, then give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Full,
    StructureOnly,
}

/// Asks the reasoning service to describe each endpoint group and appends
/// the parsed descriptions to the catalog.
pub struct DescriptionSynthesizer<'a, M: LlmApi> {
    llm: &'a M,
    catalog: &'a EndpointCatalog,
}

impl<'a, M: LlmApi> DescriptionSynthesizer<'a, M> {
    pub fn new(llm: &'a M, catalog: &'a EndpointCatalog) -> Self {
        Self { llm, catalog }
    }

    /// Describe every group. Endpoints whose call fails are skipped with
    /// a diagnostic; the count of catalog rows written is returned.
    pub async fn describe_all(&self, groups: &[EndpointGroup]) -> Result<usize> {
        let mut written = 0;
        for group in groups {
            match self.describe_group(group).await {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(err) => warn!(url = %group.url, error = %err, "skipping endpoint"),
            }
        }
        Ok(written)
    }

    /// Describe one group, retrying once with a structure-only prompt
    /// when the service rejects the full payload as oversized. Returns
    /// whether a catalog row was written.
    async fn describe_group(&self, group: &EndpointGroup) -> Result<bool> {
        let mut attempt = Attempt::Full;
        loop {
            let prompt = build_prompt(group, attempt);
            match self.llm.complete(&prompt).await {
                Ok(reply) => {
                    let (definition, request_fields, response_fields) = parse_reply(&reply);
                    if definition.is_empty() && request_fields.is_empty() && response_fields.is_empty()
                    {
                        return Ok(false);
                    }
                    self.catalog.append(&EndpointDescription {
                        url: group.url.clone(),
                        definition,
                        request_fields,
                        response_fields,
                    })?;
                    return Ok(true);
                }
                Err(LlmError::ContextLength(_)) if attempt == Attempt::Full => {
                    info!(url = %group.url, "prompt over the context window, retrying structure-only");
                    attempt = Attempt::StructureOnly;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

/// Split a reply into its three labeled sections. A missing section
/// yields an empty string rather than an error.
pub fn parse_reply(reply: &str) -> (String, String, String) {
    let capture = |re: &Regex| {
        re.captures(reply)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default()
    };
    (
        capture(&DEFINITION_RE),
        capture(&REQUEST_RE),
        capture(&RESPONSE_RE),
    )
}

fn build_prompt(group: &EndpointGroup, attempt: Attempt) -> String {
    let (requests, responses) = match attempt {
        Attempt::Full => (
            render_samples(&group.requests),
            render_samples(&group.responses),
        ),
        Attempt::StructureOnly => (
            render_skeletons(&group.requests),
            render_skeletons(&group.responses),
        ),
    };

    let mut prompt = String::new();
    prompt.push_str("#Endpoint capture#:```\n");
    prompt.push_str(&format!("URL: {}\n", group.url));
    prompt.push_str(&format!("request: {requests}\n"));
    prompt.push_str(&format!("response: {responses}\n"));
    prompt.push_str("```\n");
    prompt.push_str(
        "#Rules#:\n\
         1. Read the endpoint capture carefully.\n\
         2. Summarize what the endpoint does in a single concise sentence.\n\
         3. Work out what each request body field means.\n\
         4. Work out what each response body field means.\n\
         5. Answer tersely, ignoring field values.\n\
         6. Answer with the three labeled sections below, in order, and nothing else.\n",
    );
    prompt.push_str(
        "#Return format#:\n\
         Definition: one sentence describing the endpoint's purpose\n\
         Request fields: field name (meaning), repeated per field, without values\n\
         Response fields: field name (meaning), repeated per field, without values\n",
    );
    prompt.push_str(
        "#Example#:\n\
         Definition: Fetches the assessment list for a wellness scene\n\
         Request fields: scene (scene identifier), version (client version), channel (distribution channel)\n\
         Response fields: code (status code), msg (status message), entryList (assessments with title, cost and link)\n",
    );
    prompt
}

/// Render every sample as a flattened `"path": value` enumeration, with
/// the sample index as the root of each path. Unparsable samples are kept
/// as opaque leaves.
fn render_samples(samples: &[String]) -> String {
    let mut items = Vec::new();
    for (i, raw) in samples.iter().enumerate() {
        let prefix = format!("[{i}]");
        match parse_loose(raw) {
            Some(value) => items.extend(flatten_paths(&value, &prefix)),
            None if raw.trim().is_empty() => {}
            None => items.push(format!("\"{prefix}\": {}", raw.trim())),
        }
    }
    format!("[{}]", items.join(", "))
}

/// Render only the nested shape of each parsable sample; unparsable
/// samples are dropped.
fn render_skeletons(samples: &[String]) -> String {
    let mut items = Vec::new();
    for raw in samples {
        let Some(value) = parse_loose(raw) else {
            continue;
        };
        items.push(strip_values(&value).to_string());
    }
    format!("[{}]", items.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedLlm;
    use tempfile::TempDir;

    const REPLY: &str = "Definition: Fetches the assessment list\n\
                         Request fields: scene (scene identifier)\n\
                         Response fields: code (status code), msg (status message)";

    fn group(url: &str) -> EndpointGroup {
        EndpointGroup {
            url: url.to_string(),
            requests: vec![r#"{"scene": "health"}"#.to_string()],
            responses: vec![r#"{"code": 0, "msg": "ok", "data": {"items": [1]}}"#.to_string()],
        }
    }

    #[test]
    fn reply_sections_are_split_and_trimmed() {
        let (definition, request_fields, response_fields) = parse_reply(REPLY);
        assert_eq!(definition, "Fetches the assessment list");
        assert_eq!(request_fields, "scene (scene identifier)");
        assert_eq!(response_fields, "code (status code), msg (status message)");
    }

    #[test]
    fn missing_sections_become_empty_strings() {
        let (definition, request_fields, response_fields) =
            parse_reply("Request fields: a (b)\nResponse fields: c (d)");
        assert_eq!(definition, "");
        assert_eq!(request_fields, "a (b)");
        assert_eq!(response_fields, "c (d)");
    }

    #[test]
    fn full_prompt_enumerates_leaf_paths() {
        let prompt = build_prompt(&group("https://svc/api/a"), Attempt::Full);
        assert!(prompt.contains("URL: https://svc/api/a"));
        assert!(prompt.contains("\"[0].scene\": health"));
        assert!(prompt.contains("\"[0].data.items[0]\": 1"));
    }

    #[test]
    fn structure_only_prompt_has_no_leaf_values() {
        let prompt = build_prompt(&group("https://svc/api/a"), Attempt::StructureOnly);
        assert!(!prompt.contains("health"));
        assert!(!prompt.contains("\"code\""));
        assert!(prompt.contains(r#"{"data":{"items":[]}}"#));
    }

    #[tokio::test]
    async fn oversized_prompt_retries_once_with_skeleton() {
        let dir = TempDir::new().unwrap();
        let catalog = EndpointCatalog::new(dir.path().join("describe.csv"));
        let llm = ScriptedLlm::new(vec![
            Err(LlmError::ContextLength("too big".to_string())),
            Ok(REPLY.to_string()),
        ]);

        let synthesizer = DescriptionSynthesizer::new(&llm, &catalog);
        let written = synthesizer.describe_all(&[group("https://svc/api/a")]).await.unwrap();

        assert_eq!(written, 1);
        assert_eq!(llm.calls(), 2);
        assert!(llm.prompt(0).contains("\"[0].scene\": health"));
        assert!(!llm.prompt(1).contains("health"));
        assert_eq!(catalog.scan().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn service_failure_skips_the_endpoint() {
        let dir = TempDir::new().unwrap();
        let catalog = EndpointCatalog::new(dir.path().join("describe.csv"));
        let llm = ScriptedLlm::new(vec![
            Err(LlmError::Api("quota".to_string())),
            Ok(REPLY.to_string()),
        ]);

        let synthesizer = DescriptionSynthesizer::new(&llm, &catalog);
        let groups = [group("https://svc/api/a"), group("https://svc/api/b")];
        let written = synthesizer.describe_all(&groups).await.unwrap();

        assert_eq!(written, 1);
        let records = catalog.scan().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, "https://svc/api/b");
    }

    #[tokio::test]
    async fn blank_reply_writes_no_row() {
        let dir = TempDir::new().unwrap();
        let catalog = EndpointCatalog::new(dir.path().join("describe.csv"));
        let llm = ScriptedLlm::new(vec![Ok("nothing useful here".to_string())]);

        let synthesizer = DescriptionSynthesizer::new(&llm, &catalog);
        let written = synthesizer.describe_all(&[group("https://svc/api/a")]).await.unwrap();

        assert_eq!(written, 0);
        assert!(!catalog.path().exists());
    }
}
