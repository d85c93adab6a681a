use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use crate::catalog::{EndpointCatalog, group_by_endpoint};
use crate::correlate::{StepCorrelator, write_merged, write_no_match_marker};
use crate::describe::DescriptionSynthesizer;
use crate::llm::LlmApi;
use crate::models::LogRecord;
use crate::normalize::{CleanMode, LogNormalizer, read_cleaned};

/// File layout of one data directory.
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn input(&self) -> PathBuf {
        self.root.join("output.csv")
    }

    pub fn origin(&self) -> PathBuf {
        self.root.join("origin.csv")
    }

    pub fn cleaned(&self) -> PathBuf {
        self.root.join("cleaned.csv")
    }

    pub fn catalog(&self) -> PathBuf {
        self.root.join("describe.csv")
    }

    pub fn merged(&self) -> PathBuf {
        self.root.join("merged.csv")
    }

    pub fn no_match_marker(&self) -> PathBuf {
        self.root.join("no_api.txt")
    }

    pub fn narrative(&self) -> PathBuf {
        self.root.join("testcase.txt")
    }
}

/// Drives the stages of one pipeline run over a single data directory.
/// Stages can run separately; the catalog's append semantics make
/// re-running the describe stage resumable.
pub struct Workflow<'a, M: LlmApi> {
    llm: &'a M,
    dir: DataDir,
}

impl<'a, M: LlmApi> Workflow<'a, M> {
    pub fn new(llm: &'a M, dir: DataDir) -> Self {
        Self { llm, dir }
    }

    /// Normalize the raw capture into the origin and cleaned tables.
    pub fn clean(&self, domain: &str, mode: CleanMode) -> Result<Vec<LogRecord>> {
        let normalizer = LogNormalizer::new(
            self.dir.input(),
            self.dir.origin(),
            self.dir.cleaned(),
            domain,
            mode,
        );
        let records = normalizer.process()?;
        println!(
            "cleaned {} rows into {}",
            records.len(),
            self.dir.cleaned().display()
        );
        Ok(records)
    }

    /// Group the cleaned rows by endpoint and synthesize a catalog row
    /// for each group.
    pub async fn describe(&self, records: &[LogRecord]) -> Result<usize> {
        let groups = group_by_endpoint(records);
        info!(groups = groups.len(), "grouped cleaned log by endpoint");

        let catalog = EndpointCatalog::new(self.dir.catalog());
        let synthesizer = DescriptionSynthesizer::new(self.llm, &catalog);
        let written = synthesizer.describe_all(&groups).await?;
        println!(
            "described {written} of {} endpoints into {}",
            groups.len(),
            self.dir.catalog().display()
        );
        Ok(written)
    }

    /// Describe from the cleaned table on disk, for standalone runs.
    pub async fn describe_cleaned(&self) -> Result<usize> {
        let records = read_cleaned(&self.dir.cleaned())?;
        self.describe(&records).await
    }

    /// Correlate the test narrative against the catalog and write the
    /// merged mapping. Returns false when nothing matched.
    pub async fn correlate(&self) -> Result<bool> {
        let narrative_path = self.dir.narrative();
        let narrative = std::fs::read_to_string(&narrative_path)
            .with_context(|| format!("read narrative {}", narrative_path.display()))?;

        let catalog = EndpointCatalog::new(self.dir.catalog());
        let correlator = StepCorrelator::new(self.llm, &catalog);
        let merged = correlator.correlate(&narrative).await?;

        if merged.is_empty() {
            write_no_match_marker(&self.dir.no_match_marker())?;
            println!("no api use!");
            return Ok(false);
        }
        write_merged(&self.dir.merged(), &merged)?;
        println!(
            "merged {} endpoints into {}",
            merged.len(),
            self.dir.merged().display()
        );
        Ok(true)
    }

    /// Full run: clean, describe, correlate.
    pub async fn run(&self, domain: &str, mode: CleanMode) -> Result<bool> {
        let records = self.clean(domain, mode)?;
        self.describe(&records).await?;
        self.correlate().await
    }
}
