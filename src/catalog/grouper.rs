use std::collections::HashMap;

use crate::models::LogRecord;

/// All payload samples observed for one endpoint, in capture order.
/// Groups are never empty; repeated calls contribute extra samples.
#[derive(Debug, Clone)]
pub struct EndpointGroup {
    pub url: String,
    pub requests: Vec<String>,
    pub responses: Vec<String>,
}

/// Partition cleaned records by URL, preserving record order inside each
/// group and first-observation order across groups. Every record lands in
/// exactly one group.
pub fn group_by_endpoint(records: &[LogRecord]) -> Vec<EndpointGroup> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, EndpointGroup> = HashMap::new();

    for record in records {
        let group = groups.entry(record.url.clone()).or_insert_with(|| {
            order.push(record.url.clone());
            EndpointGroup {
                url: record.url.clone(),
                requests: Vec::new(),
                responses: Vec::new(),
            }
        });
        group.requests.push(record.request.clone());
        group.responses.push(record.response.clone());
    }

    order
        .into_iter()
        .filter_map(|url| groups.remove(&url))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(url: &str, request: &str) -> LogRecord {
        LogRecord {
            url: url.to_string(),
            method: "POST".to_string(),
            request: request.to_string(),
            response: format!("resp-{request}"),
            started_at: None,
        }
    }

    #[test]
    fn grouping_covers_every_record_exactly_once() {
        let records = vec![
            record("https://svc/api/a", "r1"),
            record("https://svc/api/b", "r2"),
            record("https://svc/api/a", "r3"),
        ];
        let groups = group_by_endpoint(&records);

        let total: usize = groups.iter().map(|g| g.requests.len()).sum();
        assert_eq!(total, records.len());

        let urls: Vec<&str> = groups.iter().map(|g| g.url.as_str()).collect();
        assert_eq!(urls, ["https://svc/api/a", "https://svc/api/b"]);
    }

    #[test]
    fn sample_order_is_preserved_within_a_group() {
        let records = vec![
            record("https://svc/api/a", "first"),
            record("https://svc/api/b", "other"),
            record("https://svc/api/a", "second"),
        ];
        let groups = group_by_endpoint(&records);

        assert_eq!(groups[0].requests, ["first", "second"]);
        assert_eq!(groups[0].responses, ["resp-first", "resp-second"]);
    }
}
