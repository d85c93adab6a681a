mod matcher;
mod merge;

pub use matcher::{StepCorrelator, parse_matches, write_no_match_marker};
pub use merge::{MERGED_HEADER, write_merged};
