//! NPI enrichment against the public NPPES registry.
//!
//! Each physician with a first name, last name and postal code gets one
//! registry lookup. Failures are absorbed per record and leave the NPI empty.

use std::future::Future;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use physdir_model::PhysicianRecord;
use serde::Deserialize;
use thiserror::Error;

/// Errors from a single registry lookup. Never surfaced past `enrich`.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("NPI request failed: {0}")]
    Transport(String),

    #[error("NPI registry returned HTTP {0}")]
    Status(u16),

    #[error("Malformed NPI response: {0}")]
    Malformed(String),
}

/// Registry lookup keyed by name and postal code.
pub trait NpiLookup {
    /// Return the matching NPI numbers in registry order.
    fn lookup(
        &self,
        first_name: &str,
        last_name: &str,
        postal_code: &str,
    ) -> impl Future<Output = Result<Vec<String>, EnrichmentError>> + Send;
}

/// NPPES API configuration.
#[derive(Debug, Clone)]
pub struct NppesConfig {
    pub base_url: String,
    /// API version query parameter
    pub version: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for NppesConfig {
    fn default() -> Self {
        Self {
            base_url: "https://npiregistry.cms.hhs.gov/api/".to_string(),
            version: "2.1".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
struct NppesResponse {
    #[serde(default)]
    results: Vec<NppesResult>,
}

#[derive(Debug, Deserialize)]
struct NppesResult {
    #[serde(default)]
    number: serde_json::Value,
}

/// Extract NPI numbers from a registry response body.
pub fn parse_numbers(body: &str) -> Result<Vec<String>, EnrichmentError> {
    let response: NppesResponse =
        serde_json::from_str(body).map_err(|e| EnrichmentError::Malformed(e.to_string()))?;

    Ok(response
        .results
        .into_iter()
        .filter_map(|result| match result.number {
            serde_json::Value::String(s) => Some(s.trim().to_string()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|number| !number.is_empty())
        .collect())
}

/// NPPES registry client.
pub struct NppesClient {
    config: NppesConfig,
    client: reqwest::Client,
}

impl NppesClient {
    pub fn new(config: NppesConfig) -> Result<Self, EnrichmentError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EnrichmentError::Transport(e.to_string()))?;

        Ok(Self { config, client })
    }
}

impl NpiLookup for NppesClient {
    async fn lookup(
        &self,
        first_name: &str,
        last_name: &str,
        postal_code: &str,
    ) -> Result<Vec<String>, EnrichmentError> {
        let response = self
            .client
            .get(&self.config.base_url)
            .query(&[
                ("version", self.config.version.as_str()),
                ("first_name", first_name),
                ("last_name", last_name),
                ("postal_code", postal_code),
            ])
            .send()
            .await
            .map_err(|e| EnrichmentError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrichmentError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| EnrichmentError::Transport(e.to_string()))?;
        parse_numbers(&body)
    }
}

/// Attach NPI numbers to every record.
///
/// Up to `concurrency` lookups run at once; output order matches input order.
/// Records without a full lookup key, and records whose lookup fails, get an
/// empty NPI.
pub async fn enrich<L: NpiLookup>(
    records: Vec<PhysicianRecord>,
    lookup: &L,
    concurrency: usize,
) -> Vec<PhysicianRecord> {
    let total = records.len();
    let enriched: Vec<PhysicianRecord> = stream::iter(records)
        .map(move |mut record| async move {
            record.npi = Some(lookup_npi(lookup, &record).await);
            record
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let matched = enriched
        .iter()
        .filter(|r| r.npi.as_deref().is_some_and(|npi| !npi.is_empty()))
        .count();
    tracing::info!(total, matched, "NPI enrichment finished");

    enriched
}

async fn lookup_npi<L: NpiLookup>(lookup: &L, record: &PhysicianRecord) -> String {
    if !record.has_lookup_key() {
        return String::new();
    }

    match lookup
        .lookup(&record.first_name, &record.last_name, &record.postal_code)
        .await
    {
        Ok(numbers) => numbers.join(", "),
        Err(e) => {
            tracing::debug!(
                first_name = %record.first_name,
                last_name = %record.last_name,
                error = %e,
                "NPI lookup failed"
            );
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingLookup {
        calls: Mutex<Vec<String>>,
    }

    impl NpiLookup for RecordingLookup {
        async fn lookup(
            &self,
            first_name: &str,
            last_name: &str,
            postal_code: &str,
        ) -> Result<Vec<String>, EnrichmentError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{} {} {}", first_name, last_name, postal_code));
            if last_name == "Missing" {
                return Err(EnrichmentError::Status(500));
            }
            Ok(vec!["111".to_string(), "222".to_string()])
        }
    }

    /// Later records answer sooner, to check ordering.
    struct SlowFirstLookup;

    impl NpiLookup for SlowFirstLookup {
        async fn lookup(
            &self,
            first_name: &str,
            _last_name: &str,
            _postal_code: &str,
        ) -> Result<Vec<String>, EnrichmentError> {
            let index: u64 = first_name.trim_start_matches("Doc").parse().unwrap();
            tokio::time::sleep(Duration::from_millis(20 - index * 4)).await;
            Ok(vec![index.to_string()])
        }
    }

    fn record(first: &str, last: &str, postal: &str) -> PhysicianRecord {
        let mut record = PhysicianRecord::new(first, last);
        record.postal_code = postal.to_string();
        record
    }

    #[tokio::test]
    async fn test_enrich_joins_numbers() {
        let lookup = RecordingLookup::default();
        let records = enrich(vec![record("Jane", "Smith", "10001")], &lookup, 1).await;

        assert_eq!(records[0].npi.as_deref(), Some("111, 222"));
        assert_eq!(*lookup.calls.lock().unwrap(), vec!["Jane Smith 10001"]);
    }

    #[tokio::test]
    async fn test_enrich_skips_incomplete_key() {
        let lookup = RecordingLookup::default();
        let records = enrich(
            vec![record("Jane", "Smith", ""), record("Madonna", "", "10001")],
            &lookup,
            2,
        )
        .await;

        assert!(lookup.calls.lock().unwrap().is_empty());
        assert!(records.iter().all(|r| r.npi.as_deref() == Some("")));
    }

    #[tokio::test]
    async fn test_enrich_failure_is_silent() {
        let lookup = RecordingLookup::default();
        let records = enrich(
            vec![
                record("Ann", "Missing", "02115"),
                record("Bob", "Jones", "02115"),
            ],
            &lookup,
            2,
        )
        .await;

        assert_eq!(records[0].npi.as_deref(), Some(""));
        assert_eq!(records[1].npi.as_deref(), Some("111, 222"));
    }

    #[tokio::test]
    async fn test_enrich_preserves_order() {
        let records = (0..5).map(|i| record(&format!("Doc{}", i), "X", "1")).collect();
        let enriched = enrich(records, &SlowFirstLookup, 5).await;

        let npis: Vec<_> = enriched.iter().map(|r| r.npi.clone().unwrap()).collect();
        assert_eq!(npis, vec!["0", "1", "2", "3", "4"]);
    }

    #[test]
    fn test_parse_numbers() {
        let body = r#"{"result_count": 3, "results": [{"number": "1234567890"}, {"number": 1987654321}, {"number": ""}, {}]}"#;
        assert_eq!(
            parse_numbers(body).unwrap(),
            vec!["1234567890", "1987654321"]
        );

        let errors = r#"{"Errors": [{"description": "No valid search criteria"}]}"#;
        assert!(parse_numbers(errors).unwrap().is_empty());

        assert!(matches!(
            parse_numbers("not json"),
            Err(EnrichmentError::Malformed(_))
        ));
    }
}
