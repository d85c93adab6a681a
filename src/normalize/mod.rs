mod cleaner;
mod relaxed;

pub use cleaner::{CleanMode, LogNormalizer, read_cleaned};
pub use relaxed::{parse_loose, repair_quotes};
