//! Upstream search client.
//!
//! Provides the `Upstream` trait and its Medifind implementation. The
//! pagination driver only sees the trait, so tests can substitute an
//! in-memory upstream.

use std::future::Future;
use std::time::Duration;

use physdir_model::{PageResult, SearchQuery};
use physdir_normalize::normalize_value;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::Serialize;
use thiserror::Error;

/// Errors from a single upstream page request.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Upstream request failed: {0}")]
    Transient(String),

    #[error("Upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed upstream response: {0}")]
    Malformed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl UpstreamError {
    /// Only transport failures and timeouts are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// A paged physician search source.
pub trait Upstream {
    /// Fetch one 1-based page of normalized results.
    fn fetch_page(
        &self,
        query: &SearchQuery,
        page: u32,
        page_size: u32,
    ) -> impl Future<Output = Result<PageResult, UpstreamError>> + Send;

    /// Get the upstream name for logging.
    fn name(&self) -> &'static str;
}

/// Medifind client configuration.
#[derive(Debug, Clone)]
pub struct MedifindConfig {
    /// Condition search endpoint
    pub api_url: String,
    /// Site origin sent with every request
    pub origin: String,
    pub user_agent: String,
    /// Optional bearer token for the `Authorization` header
    pub bearer_token: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for MedifindConfig {
    fn default() -> Self {
        Self {
            api_url: "https://www.medifind.com/api/search/doctors/conditionSearch".to_string(),
            origin: "https://www.medifind.com".to_string(),
            user_agent: concat!("physdir/", env!("CARGO_PKG_VERSION")).to_string(),
            bearer_token: None,
            timeout_secs: 30,
        }
    }
}

/// JSON body of a condition search request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest<'a> {
    pub specialty: &'a [String],
    pub project_id: u64,
    pub radius: Option<u32>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub country: Option<&'a str>,
    pub state: Option<&'a str>,
    pub fidelity: u32,
    pub size: u32,
    pub page: u32,
    pub gender: Option<&'a str>,
    pub doctor_years_experience: u32,
    pub languages: &'a [String],
    pub doctor_tier: &'a [String],
    pub sort: &'a str,
    #[serde(rename = "type")]
    pub search_type: &'static str,
    pub show_featured_cards: bool,
    pub telemedicine: bool,
    pub accepts_new_patients: bool,
    pub appointment_assist_opt_in: bool,
}

/// Build the request body for one page.
pub fn build_request(query: &SearchQuery, page: u32, page_size: u32) -> SearchRequest<'_> {
    SearchRequest {
        specialty: &query.specialties,
        project_id: query.condition_id,
        radius: query.radius,
        lat: query.lat,
        lon: query.lon,
        country: query.country.as_deref(),
        state: query.state.as_deref(),
        fidelity: query.fidelity,
        size: page_size,
        page,
        gender: query.gender.as_deref(),
        doctor_years_experience: query.min_years_experience,
        languages: &query.languages,
        doctor_tier: &query.doctor_tiers,
        sort: &query.sort,
        search_type: "conditionSearch",
        show_featured_cards: query.show_featured_cards,
        telemedicine: query.telemedicine,
        accepts_new_patients: query.accepts_new_patients,
        appointment_assist_opt_in: query.appointment_assist_opt_in,
    }
}

/// Parse a condition search response body into a page.
///
/// A missing `results` array is an empty page; a missing `totalResults`
/// falls back to the number of records on the page.
pub fn parse_response(body: &str) -> Result<PageResult, UpstreamError> {
    let mut json: serde_json::Value =
        serde_json::from_str(body).map_err(|e| UpstreamError::Malformed(e.to_string()))?;

    let object = json
        .as_object_mut()
        .ok_or_else(|| UpstreamError::Malformed("Response is not a JSON object".to_string()))?;

    let raw_results = match object.remove("results") {
        Some(serde_json::Value::Array(results)) => results,
        _ => Vec::new(),
    };
    let page_record_count = raw_results.len();
    let records: Vec<_> = raw_results.into_iter().map(normalize_value).collect();

    let total_available = object
        .get("totalResults")
        .and_then(|t| {
            t.as_u64()
                .or_else(|| t.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                .or_else(|| t.as_str().and_then(|s| s.trim().parse().ok()))
        })
        .unwrap_or(page_record_count as u64);

    Ok(PageResult {
        records,
        total_available,
        page_record_count,
    })
}

/// Medifind condition search client.
pub struct MedifindClient {
    config: MedifindConfig,
    client: reqwest::Client,
}

impl MedifindClient {
    /// Create a new client. Headers and timeout are fixed at construction.
    pub fn new(config: MedifindConfig) -> Result<Self, UpstreamError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(header::ORIGIN, header_value(&config.origin)?);
        headers.insert(header::REFERER, header_value(&format!("{}/", config.origin))?);

        if let Some(token) = &config.bearer_token {
            let mut value = header_value(&format!("Bearer {}", token))?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| UpstreamError::InvalidRequest(e.to_string()))?;

        Ok(Self { config, client })
    }
}

fn header_value(value: &str) -> Result<HeaderValue, UpstreamError> {
    HeaderValue::from_str(value).map_err(|e| UpstreamError::InvalidRequest(e.to_string()))
}

impl Upstream for MedifindClient {
    async fn fetch_page(
        &self,
        query: &SearchQuery,
        page: u32,
        page_size: u32,
    ) -> Result<PageResult, UpstreamError> {
        if page == 0 || page_size == 0 {
            return Err(UpstreamError::InvalidRequest(format!(
                "page and page size must be at least 1 (got page {}, size {})",
                page, page_size
            )));
        }

        let body = build_request(query, page, page_size);

        tracing::debug!(
            condition_id = query.condition_id,
            page,
            page_size,
            "Requesting upstream page"
        );

        let response = self
            .client
            .post(&self.config.api_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::Transient(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| UpstreamError::Transient(e.to_string()))?;

        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        parse_response(&text)
    }

    fn name(&self) -> &'static str {
        "medifind"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request() {
        let query = SearchQuery::new(3766).with_specialties(vec!["hematology-oncology".into()]);
        let json = serde_json::to_value(build_request(&query, 2, 50)).unwrap();

        assert_eq!(json["projectId"], 3766);
        assert_eq!(json["page"], 2);
        assert_eq!(json["size"], 50);
        assert_eq!(json["sort"], "relevance");
        assert_eq!(json["type"], "conditionSearch");
        assert_eq!(json["specialty"][0], "hematology-oncology");
        assert_eq!(json["showFeaturedCards"], true);
        assert_eq!(json["acceptsNewPatients"], false);
        assert!(json["lat"].is_null());
        assert!(json["gender"].is_null());
        assert_eq!(json["doctorYearsExperience"], 0);
    }

    #[test]
    fn test_parse_response() {
        let body = r#"{"results": [{"name": "Jane Smith", "score": 80}, {"name": "Madonna"}], "totalResults": 45}"#;
        let page = parse_response(body).unwrap();

        assert_eq!(page.page_record_count, 2);
        assert_eq!(page.total_available, 45);
        assert_eq!(page.records[0].last_name, "Smith");
        assert_eq!(page.records[0].tier.label(), "Elite");
        assert_eq!(page.records[1].first_name, "Madonna");
    }

    #[test]
    fn test_parse_response_fallbacks() {
        let page = parse_response(r#"{"results": [{}, {}, {}]}"#).unwrap();
        assert_eq!(page.total_available, 3);

        let page = parse_response(r#"{"results": null, "totalResults": "12"}"#).unwrap();
        assert!(page.is_empty());
        assert_eq!(page.total_available, 12);

        let page = parse_response(r#"{"results": {"name": "Jane Smith"}, "totalResults": 1}"#).unwrap();
        assert!(page.is_empty());
        assert_eq!(page.total_available, 1);
    }

    #[test]
    fn test_parse_response_malformed() {
        assert!(matches!(
            parse_response("<html>blocked</html>"),
            Err(UpstreamError::Malformed(_))
        ));
        assert!(matches!(
            parse_response("[1, 2]"),
            Err(UpstreamError::Malformed(_))
        ));
    }

    #[test]
    fn test_retryable() {
        assert!(UpstreamError::Transient("timeout".into()).is_retryable());
        assert!(!UpstreamError::Status {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!UpstreamError::Malformed("x".into()).is_retryable());
    }

    #[tokio::test]
    async fn test_rejects_page_zero() {
        let client = MedifindClient::new(MedifindConfig::default()).unwrap();
        let result = client.fetch_page(&SearchQuery::new(1), 0, 20).await;
        assert!(matches!(result, Err(UpstreamError::InvalidRequest(_))));
    }
}
