use std::path::Path;

use anyhow::{Context, Result};

use crate::models::MergedRecord;

pub const MERGED_HEADER: [&str; 4] = ["URL", "Request Fields", "Response Fields", "Steps"];

/// Overwrite the merge output with one row per endpoint. The step list is
/// serialized as an ordered JSON array inside a single cell.
pub fn write_merged(path: &Path, records: &[MergedRecord]) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    writer.write_record(MERGED_HEADER)?;
    for record in records {
        let steps = serde_json::to_string(&record.steps)?;
        writer.write_record([
            record.url.as_str(),
            record.request_fields.as_str(),
            record.response_fields.as_str(),
            steps.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
