mod flatten;
mod synthesizer;

pub use flatten::{flatten_paths, strip_values};
pub use synthesizer::{DescriptionSynthesizer, parse_reply};
