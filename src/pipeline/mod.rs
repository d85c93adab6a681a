mod workflow;

pub use workflow::{DataDir, Workflow};
