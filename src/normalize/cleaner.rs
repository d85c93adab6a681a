use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use reqwest::Url;
use serde_json::Value;
use tracing::warn;

use crate::models::LogRecord;
use crate::normalize::relaxed::parse_loose;

/// Extensions that mark a URL as a static asset rather than an API call.
const STATIC_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".svg", ".gif", ".bmp", ".tiff", ".ico", ".mp4", ".avi", ".mov",
    ".wmv", ".mp3", ".wav", ".aac", ".ogg", ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".csv",
    ".html", ".css", ".js", ".zip", ".rar", ".tar", ".gz", ".xml",
];

/// Stringified payload values longer than this are dropped from their
/// dict so downstream prompts stay bounded.
const FIELD_SIZE_CAP: usize = 7000;

/// Which parts of a record the cleaner rewrites. The URL query strip
/// always runs; the field-size cap only runs in payload-cleaning modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanMode {
    UrlOnly,
    PayloadOnly,
    UrlAndPayload,
}

impl CleanMode {
    fn caps_payload(self) -> bool {
        matches!(self, CleanMode::PayloadOnly | CleanMode::UrlAndPayload)
    }
}

/// Filters a raw traffic capture down to in-scope API calls and rewrites
/// each row into flat payload columns. Produces two tables: an origin
/// table keeping row numbers and timestamps, and a cleaned table without
/// them.
pub struct LogNormalizer {
    input_file: PathBuf,
    origin_file: PathBuf,
    cleaned_file: PathBuf,
    domain: String,
    mode: CleanMode,
}

impl LogNormalizer {
    pub fn new(
        input_file: impl Into<PathBuf>,
        origin_file: impl Into<PathBuf>,
        cleaned_file: impl Into<PathBuf>,
        domain: impl Into<String>,
        mode: CleanMode,
    ) -> Self {
        Self {
            input_file: input_file.into(),
            origin_file: origin_file.into(),
            cleaned_file: cleaned_file.into(),
            domain: domain.into(),
            mode,
        }
    }

    /// Run the full normalization pass, overwrite both output tables and
    /// return the cleaned rows.
    pub fn process(&self) -> Result<Vec<LogRecord>> {
        let mut reader = csv::Reader::from_path(&self.input_file)
            .with_context(|| format!("open raw log {}", self.input_file.display()))?;
        let headers = reader.headers()?.clone();
        let column = |name: &str| headers.iter().position(|h| h == name);

        let url_idx = column("URL").context("raw log has no URL column")?;
        let request_idx = column("Request").context("raw log has no Request column")?;
        let response_idx = column("Response").context("raw log has no Response column")?;
        let method_idx = column("Method");
        let started_idx = column("Started Date");

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            let raw_url = row.get(url_idx).unwrap_or("");
            let Some(url) = self.keep_url(raw_url) else {
                continue;
            };

            let request_cell = row.get(request_idx).unwrap_or("");
            let response_cell = row.get(response_idx).unwrap_or("");
            let (envelope_method, mut request) = extract_request(request_cell);
            let mut response = extract_response(response_cell);
            let method = envelope_method
                .or_else(|| {
                    method_idx
                        .and_then(|i| row.get(i))
                        .filter(|m| !m.is_empty())
                        .map(str::to_string)
                })
                .unwrap_or_default();

            if self.mode.caps_payload() {
                request = cap_fields(&request);
                response = cap_fields(&response);
            }

            records.push(LogRecord {
                url,
                method,
                request,
                response,
                started_at: started_idx
                    .and_then(|i| row.get(i))
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            });
        }

        self.write_origin(&records)?;
        self.write_cleaned(&records)?;
        Ok(records)
    }

    /// Apply the asset and host filters, returning the query-stripped URL
    /// for rows that stay in scope.
    fn keep_url(&self, raw: &str) -> Option<String> {
        let mut url = Url::parse(raw).ok()?;
        url.set_query(None);
        if is_static_asset(&url) || !self.host_matches(&url) {
            return None;
        }
        Some(url.to_string())
    }

    fn host_matches(&self, url: &Url) -> bool {
        url.host_str()
            .is_some_and(|h| h == self.domain || h.ends_with(&format!(".{}", self.domain)))
    }

    fn write_origin(&self, records: &[LogRecord]) -> Result<()> {
        let has_started = records.iter().any(|r| r.started_at.is_some());
        let mut writer = csv::Writer::from_path(&self.origin_file)
            .with_context(|| format!("create {}", self.origin_file.display()))?;

        let mut header = vec!["Number", "URL", "Method", "Request", "Response"];
        if has_started {
            header.push("Started Date");
        }
        writer.write_record(&header)?;

        for (i, record) in records.iter().enumerate() {
            let number = (i + 1).to_string();
            let mut row = vec![
                number.as_str(),
                record.url.as_str(),
                record.method.as_str(),
                record.request.as_str(),
                record.response.as_str(),
            ];
            if has_started {
                row.push(record.started_at.as_deref().unwrap_or(""));
            }
            writer.write_record(&row)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn write_cleaned(&self, records: &[LogRecord]) -> Result<()> {
        let mut writer = csv::Writer::from_path(&self.cleaned_file)
            .with_context(|| format!("create {}", self.cleaned_file.display()))?;
        writer.write_record(["URL", "Method", "Request", "Response"])?;
        for record in records {
            writer.write_record([
                record.url.as_str(),
                record.method.as_str(),
                record.request.as_str(),
                record.response.as_str(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Read a previously written cleaned table back into memory.
pub fn read_cleaned(path: &Path) -> Result<Vec<LogRecord>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("open cleaned log {}", path.display()))?;
    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        records.push(LogRecord {
            url: row.get(0).unwrap_or("").to_string(),
            method: row.get(1).unwrap_or("").to_string(),
            request: row.get(2).unwrap_or("").to_string(),
            response: row.get(3).unwrap_or("").to_string(),
            started_at: None,
        });
    }
    Ok(records)
}

fn is_static_asset(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    STATIC_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Unwrap a request capture envelope into its method and posted body.
/// Cells that already hold a bare payload pass through unchanged.
fn extract_request(cell: &str) -> (Option<String>, String) {
    if cell.trim().is_empty() {
        return (None, String::new());
    }
    match parse_loose(cell) {
        Some(value) if value.get("postData").is_some() || value.get("method").is_some() => {
            let method = value
                .get("method")
                .and_then(Value::as_str)
                .map(str::to_string);
            let body = value
                .pointer("/postData/text")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            (method, body)
        }
        Some(_) => (None, cell.to_string()),
        None => {
            warn!(cell = %truncate(cell), "unparsable request envelope, dropping payload");
            (None, String::new())
        }
    }
}

/// Unwrap a response capture envelope into its body text.
fn extract_response(cell: &str) -> String {
    if cell.trim().is_empty() {
        return String::new();
    }
    match parse_loose(cell) {
        Some(value) if value.get("content").is_some_and(Value::is_object) => value
            .pointer("/content/text")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        Some(_) => cell.to_string(),
        None => {
            warn!(cell = %truncate(cell), "unparsable response envelope, dropping payload");
            String::new()
        }
    }
}

/// Drop oversized keys from a dict-valued payload. Non-dict payloads are
/// left alone.
fn cap_fields(cell: &str) -> String {
    if cell.is_empty() {
        return String::new();
    }
    let Some(Value::Object(map)) = parse_loose(cell) else {
        return cell.to_string();
    };
    let kept: serde_json::Map<String, Value> = map
        .into_iter()
        .filter(|(_, v)| stringified_len(v) <= FIELD_SIZE_CAP)
        .collect();
    Value::Object(kept).to_string()
}

fn stringified_len(value: &Value) -> usize {
    match value {
        Value::String(s) => s.chars().count(),
        other => other.to_string().chars().count(),
    }
}

fn truncate(cell: &str) -> &str {
    let end = cell
        .char_indices()
        .nth(120)
        .map(|(i, _)| i)
        .unwrap_or(cell.len());
    &cell[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_raw(dir: &TempDir, rows: &[[&str; 5]]) -> PathBuf {
        let path = dir.path().join("output.csv");
        let mut writer = csv::Writer::from_path(&path).unwrap();
        writer
            .write_record(["URL", "Request", "Response", "Headers", "Started Date"])
            .unwrap();
        for row in rows {
            writer.write_record(row).unwrap();
        }
        writer.flush().unwrap();
        path
    }

    fn normalizer(dir: &TempDir, input: &Path) -> LogNormalizer {
        LogNormalizer::new(
            input,
            dir.path().join("origin.csv"),
            dir.path().join("cleaned.csv"),
            "svc.example.com",
            CleanMode::UrlAndPayload,
        )
    }

    const REQUEST_ENVELOPE: &str =
        r#"{"method": "POST", "headers": [], "postData": {"text": "{\"scene\": \"health\"}"}}"#;
    const RESPONSE_ENVELOPE: &str =
        r#"{"status": 200, "content": {"text": "{\"code\": 0, \"msg\": \"ok\"}"}}"#;

    #[test]
    fn static_assets_and_foreign_hosts_are_dropped() {
        let dir = TempDir::new().unwrap();
        let input = write_raw(
            &dir,
            &[
                [
                    "https://svc.example.com/static/logo.png?v=2",
                    REQUEST_ENVELOPE,
                    RESPONSE_ENVELOPE,
                    "{}",
                    "",
                ],
                [
                    "https://tracker.other.com/api/hit",
                    REQUEST_ENVELOPE,
                    RESPONSE_ENVELOPE,
                    "{}",
                    "",
                ],
                [
                    "https://svc.example.com/api/list?page=1",
                    REQUEST_ENVELOPE,
                    RESPONSE_ENVELOPE,
                    "{}",
                    "",
                ],
            ],
        );
        let records = normalizer(&dir, &input).process().unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, "https://svc.example.com/api/list");
    }

    #[test]
    fn retained_urls_have_no_query() {
        let dir = TempDir::new().unwrap();
        let input = write_raw(
            &dir,
            &[[
                "https://svc.example.com/api/list?page=1&size=20",
                REQUEST_ENVELOPE,
                RESPONSE_ENVELOPE,
                "{}",
                "",
            ]],
        );
        let records = normalizer(&dir, &input).process().unwrap();
        assert!(records.iter().all(|r| !r.url.contains('?')));
    }

    #[test]
    fn envelopes_are_unwrapped() {
        let dir = TempDir::new().unwrap();
        let input = write_raw(
            &dir,
            &[[
                "https://svc.example.com/api/list",
                REQUEST_ENVELOPE,
                RESPONSE_ENVELOPE,
                "{}",
                "2024-05-01 10:00:00",
            ]],
        );
        let records = normalizer(&dir, &input).process().unwrap();

        assert_eq!(records[0].method, "POST");
        assert_eq!(records[0].request, r#"{"scene":"health"}"#);
        assert_eq!(records[0].response, r#"{"code":0,"msg":"ok"}"#);
        assert_eq!(records[0].started_at.as_deref(), Some("2024-05-01 10:00:00"));
    }

    #[test]
    fn malformed_payloads_degrade_to_empty() {
        let dir = TempDir::new().unwrap();
        let input = write_raw(
            &dir,
            &[[
                "https://svc.example.com/api/list",
                "not an envelope {{{",
                "also broken }}}",
                "{}",
                "",
            ]],
        );
        let records = normalizer(&dir, &input).process().unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].request, "");
        assert_eq!(records[0].response, "");
    }

    #[test]
    fn oversized_fields_are_capped() {
        let dir = TempDir::new().unwrap();
        let huge = "x".repeat(FIELD_SIZE_CAP + 1);
        let request = format!(
            r#"{{"method": "POST", "postData": {{"text": "{{\"blob\": \"{huge}\", \"scene\": \"health\"}}"}}}}"#
        );
        let input = write_raw(
            &dir,
            &[[
                "https://svc.example.com/api/list",
                &request,
                RESPONSE_ENVELOPE,
                "{}",
                "",
            ]],
        );
        let records = normalizer(&dir, &input).process().unwrap();

        assert!(!records[0].request.contains("blob"));
        assert!(records[0].request.contains("scene"));
    }

    #[test]
    fn rerunning_on_cleaned_output_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let input = write_raw(
            &dir,
            &[
                [
                    "https://svc.example.com/api/list?page=1",
                    REQUEST_ENVELOPE,
                    RESPONSE_ENVELOPE,
                    "{}",
                    "",
                ],
                [
                    "https://svc.example.com/api/detail",
                    REQUEST_ENVELOPE,
                    RESPONSE_ENVELOPE,
                    "{}",
                    "",
                ],
            ],
        );
        normalizer(&dir, &input).process().unwrap();
        let first = std::fs::read_to_string(dir.path().join("cleaned.csv")).unwrap();

        let second_pass = LogNormalizer::new(
            dir.path().join("cleaned.csv"),
            dir.path().join("origin2.csv"),
            dir.path().join("cleaned2.csv"),
            "svc.example.com",
            CleanMode::UrlAndPayload,
        );
        second_pass.process().unwrap();
        let second = std::fs::read_to_string(dir.path().join("cleaned2.csv")).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn origin_table_is_numbered_from_one() {
        let dir = TempDir::new().unwrap();
        let input = write_raw(
            &dir,
            &[
                [
                    "https://svc.example.com/api/a",
                    REQUEST_ENVELOPE,
                    RESPONSE_ENVELOPE,
                    "{}",
                    "",
                ],
                [
                    "https://svc.example.com/api/b",
                    REQUEST_ENVELOPE,
                    RESPONSE_ENVELOPE,
                    "{}",
                    "",
                ],
            ],
        );
        normalizer(&dir, &input).process().unwrap();

        let origin = std::fs::read_to_string(dir.path().join("origin.csv")).unwrap();
        let mut lines = origin.lines();
        assert!(lines.next().unwrap().starts_with("Number,URL,Method"));
        assert!(lines.next().unwrap().starts_with("1,"));
        assert!(lines.next().unwrap().starts_with("2,"));
    }
}
