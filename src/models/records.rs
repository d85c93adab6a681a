use serde::{Deserialize, Serialize};

/// One captured HTTP exchange after normalization. The URL carries no
/// query component; request/response hold the inner payload text only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub url: String,
    pub method: String,
    pub request: String,
    pub response: String,
    pub started_at: Option<String>,
}

/// One synthesized catalog row for a distinct endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDescription {
    pub url: String,
    pub definition: String,
    pub request_fields: String,
    pub response_fields: String,
}

/// One narrative step the reasoning service aligned to an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepMatch {
    pub step: String,
    pub url: String,
    pub definition: String,
}

/// Final joined output: one endpoint with every step that exercises it.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRecord {
    pub url: String,
    pub request_fields: String,
    pub response_fields: String,
    pub steps: Vec<String>,
}
