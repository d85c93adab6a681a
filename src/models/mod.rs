mod records;

pub use records::{EndpointDescription, LogRecord, MergedRecord, StepMatch};
