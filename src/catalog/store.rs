use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::models::EndpointDescription;

pub const CATALOG_HEADER: [&str; 4] = ["URL", "Definition", "Request Fields", "Response Fields"];

/// Append-only store of synthesized endpoint descriptions. The file
/// persists across runs; duplicate URLs are tolerated and never merged,
/// so readers see rows in append order.
pub struct EndpointCatalog {
    path: PathBuf,
}

impl EndpointCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row, writing the header only when the file is new.
    pub fn append(&self, record: &EndpointDescription) -> Result<()> {
        let is_new = !self.path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open catalog {}", self.path.display()))?;
        let mut writer = csv::Writer::from_writer(file);

        if is_new {
            writer.write_record(CATALOG_HEADER)?;
        }
        writer.write_record([
            record.url.as_str(),
            record.definition.as_str(),
            record.request_fields.as_str(),
            record.response_fields.as_str(),
        ])?;
        writer.flush()?;
        Ok(())
    }

    /// All records in append order.
    pub fn scan(&self) -> Result<Vec<EndpointDescription>> {
        let mut reader = csv::Reader::from_path(&self.path)
            .with_context(|| format!("open catalog {}", self.path.display()))?;
        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            records.push(EndpointDescription {
                url: row.get(0).unwrap_or("").to_string(),
                definition: row.get(1).unwrap_or("").to_string(),
                request_fields: row.get(2).unwrap_or("").to_string(),
                response_fields: row.get(3).unwrap_or("").to_string(),
            });
        }
        Ok(records)
    }

    /// Raw rows with every cell as text, for literal-value lookups.
    pub fn raw_rows(&self) -> Result<Vec<Vec<String>>> {
        let mut reader = csv::Reader::from_path(&self.path)
            .with_context(|| format!("open catalog {}", self.path.display()))?;
        let mut rows = Vec::new();
        for row in reader.records() {
            let row = row?;
            rows.push(row.iter().map(str::to_string).collect());
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn description(url: &str) -> EndpointDescription {
        EndpointDescription {
            url: url.to_string(),
            definition: "Fetches the assessment list".to_string(),
            request_fields: "scene (scene identifier)".to_string(),
            response_fields: "code (status code)".to_string(),
        }
    }

    #[test]
    fn header_is_written_once() {
        let dir = TempDir::new().unwrap();
        let catalog = EndpointCatalog::new(dir.path().join("describe.csv"));

        catalog.append(&description("https://svc/api/a")).unwrap();
        catalog.append(&description("https://svc/api/b")).unwrap();

        let content = std::fs::read_to_string(catalog.path()).unwrap();
        assert_eq!(content.matches("URL,Definition").count(), 1);
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn duplicate_urls_stay_as_independent_rows() {
        let dir = TempDir::new().unwrap();
        let catalog = EndpointCatalog::new(dir.path().join("describe.csv"));

        catalog.append(&description("https://svc/api/a")).unwrap();
        catalog.append(&description("https://svc/api/a")).unwrap();

        let records = catalog.scan().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].url, records[1].url);
    }

    #[test]
    fn raw_rows_exclude_the_header() {
        let dir = TempDir::new().unwrap();
        let catalog = EndpointCatalog::new(dir.path().join("describe.csv"));
        catalog.append(&description("https://svc/api/a")).unwrap();

        let rows = catalog.raw_rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "https://svc/api/a");
        assert_eq!(rows[0].len(), 4);
    }
}
