//! Core domain model for the physician directory harvester.
//!
//! This crate defines the fundamental types used throughout the system:
//! - `PhysicianRecord`: one flattened physician row
//! - `Tier`: categorical label derived from the ranking score
//! - `SearchQuery`: condition search parameters sent upstream
//! - `PageResult` / `Dataset`: one page and the accumulated result set

use serde::{Deserialize, Serialize};

/// Country assumed when the upstream does not report one.
pub const DEFAULT_COUNTRY: &str = "USA";

/// Base URL for public physician profiles.
pub const PROFILE_BASE_URL: &str = "https://www.medifind.com/doctors";

/// Physician tier derived from the upstream ranking score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Score in `[0, 26)`
    Experienced,
    /// Score in `[30, 50)`
    Advanced,
    /// Score in `[50, 75)`
    Distinguished,
    /// Score in `[75, 100]`
    Elite,
    /// Score outside every band, including the `[26, 30)` gap
    Unranked,
}

impl Default for Tier {
    fn default() -> Self {
        Self::Unranked
    }
}

impl Tier {
    /// Classify a score. Bands are half-open except the top one.
    pub fn from_score(score: f64) -> Self {
        // NaN fails every comparison and falls through to Unranked.
        if (0.0..26.0).contains(&score) {
            Self::Experienced
        } else if (30.0..50.0).contains(&score) {
            Self::Advanced
        } else if (50.0..75.0).contains(&score) {
            Self::Distinguished
        } else if (75.0..=100.0).contains(&score) {
            Self::Elite
        } else {
            Self::Unranked
        }
    }

    /// Display label; empty for unranked scores.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Experienced => "Experienced",
            Self::Advanced => "Advanced",
            Self::Distinguished => "Distinguished",
            Self::Elite => "Elite",
            Self::Unranked => "",
        }
    }
}

impl From<&str> for Tier {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "experienced" => Self::Experienced,
            "advanced" => Self::Advanced,
            "distinguished" => Self::Distinguished,
            "elite" => Self::Elite,
            _ => Self::Unranked,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A normalized physician record.
///
/// Every field has a total default: absence upstream maps to an empty
/// string, empty list or zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicianRecord {
    /// Upstream person identifier
    pub person_id: String,
    /// Upstream doctor identifier (integers rendered in decimal)
    pub doctor_id: String,

    pub first_name: String,
    pub last_name: String,

    /// Professional title (MD, DO, ...)
    pub title: String,
    pub specialties: Vec<String>,
    pub hospital_affiliations: Vec<String>,
    /// Primary practice organization name
    pub primary_organization: String,

    pub address_line1: String,
    pub postal_code: String,
    pub city: String,
    /// State or province code
    pub state: String,
    pub country: String,

    /// Reported sex from the demographics block
    pub sex: String,

    pub years_of_experience: u32,
    pub publication_count: u32,
    pub clinical_trial_count: u32,
    pub patient_volume: u64,
    pub rating: f64,
    pub review_count: u64,
    pub rank_score: f64,
    pub score: f64,

    /// Derived from `score`
    pub tier: Tier,

    pub phone: String,
    pub website: String,
    pub biography: String,
    pub languages: Vec<String>,
    pub insurance_plans: Vec<String>,

    /// Comma-joined NPI numbers; `None` until enrichment has run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub npi: Option<String>,
}

impl PhysicianRecord {
    /// Create a minimal record for testing.
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            country: DEFAULT_COUNTRY.to_string(),
            ..Default::default()
        }
    }

    /// First and last name joined, trimmed.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Public profile URL, empty when the doctor id is unknown.
    pub fn profile_url(&self) -> String {
        if self.doctor_id.is_empty() {
            String::new()
        } else {
            format!("{}/{}", PROFILE_BASE_URL, self.doctor_id)
        }
    }

    /// Whether the record carries enough data for an NPI lookup.
    pub fn has_lookup_key(&self) -> bool {
        !self.first_name.is_empty() && !self.last_name.is_empty() && !self.postal_code.is_empty()
    }
}

/// Query parameters for a condition search.
///
/// Everything except `condition_id` and `sort` defaults to a neutral value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Upstream condition (project) identifier
    pub condition_id: u64,

    /// Specialty slugs to restrict to
    #[serde(default)]
    pub specialties: Vec<String>,

    /// Sort mode
    #[serde(default = "default_sort")]
    pub sort: String,

    /// Search fidelity level
    #[serde(default = "default_fidelity")]
    pub fidelity: u32,

    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub doctor_tiers: Vec<String>,
    #[serde(default)]
    pub min_years_experience: u32,

    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub radius: Option<u32>,

    #[serde(default = "default_true")]
    pub show_featured_cards: bool,
    #[serde(default)]
    pub telemedicine: bool,
    #[serde(default)]
    pub accepts_new_patients: bool,
    #[serde(default)]
    pub appointment_assist_opt_in: bool,
}

fn default_sort() -> String {
    "relevance".to_string()
}

fn default_fidelity() -> u32 {
    6
}

fn default_true() -> bool {
    true
}

impl SearchQuery {
    pub fn new(condition_id: u64) -> Self {
        Self {
            condition_id,
            specialties: Vec::new(),
            sort: default_sort(),
            fidelity: default_fidelity(),
            languages: Vec::new(),
            doctor_tiers: Vec::new(),
            min_years_experience: 0,
            country: None,
            state: None,
            gender: None,
            lat: None,
            lon: None,
            radius: None,
            show_featured_cards: true,
            telemedicine: false,
            accepts_new_patients: false,
            appointment_assist_opt_in: false,
        }
    }

    pub fn with_specialties(mut self, specialties: Vec<String>) -> Self {
        self.specialties = specialties;
        self
    }

    pub fn with_sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = sort.into();
        self
    }
}

/// One page of normalized results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    pub records: Vec<PhysicianRecord>,
    /// Total matches reported by the upstream for the whole query
    pub total_available: u64,
    /// Number of raw records the page contained
    pub page_record_count: usize,
}

impl PageResult {
    pub fn new(records: Vec<PhysicianRecord>, total_available: u64) -> Self {
        let page_record_count = records.len();
        Self {
            records,
            total_available,
            page_record_count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Records accumulated across every page of one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub records: Vec<PhysicianRecord>,
    pub total_available: u64,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether NPI enrichment has been applied to any record.
    pub fn is_enriched(&self) -> bool {
        self.records.iter().any(|r| r.npi.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_bands() {
        assert_eq!(Tier::from_score(0.0), Tier::Experienced);
        assert_eq!(Tier::from_score(25.99), Tier::Experienced);
        assert_eq!(Tier::from_score(30.0), Tier::Advanced);
        assert_eq!(Tier::from_score(49.9), Tier::Advanced);
        assert_eq!(Tier::from_score(50.0), Tier::Distinguished);
        assert_eq!(Tier::from_score(74.99), Tier::Distinguished);
        assert_eq!(Tier::from_score(75.0), Tier::Elite);
        assert_eq!(Tier::from_score(100.0), Tier::Elite);
    }

    #[test]
    fn test_tier_gap_and_out_of_range() {
        assert_eq!(Tier::from_score(26.0), Tier::Unranked);
        assert_eq!(Tier::from_score(29.99), Tier::Unranked);
        assert_eq!(Tier::from_score(-0.01), Tier::Unranked);
        assert_eq!(Tier::from_score(100.01), Tier::Unranked);
        assert_eq!(Tier::from_score(f64::NAN), Tier::Unranked);
        assert_eq!(Tier::Unranked.label(), "");
    }

    #[test]
    fn test_tier_from_str() {
        assert_eq!(Tier::from("Elite"), Tier::Elite);
        assert_eq!(Tier::from("advanced"), Tier::Advanced);
        assert_eq!(Tier::from(""), Tier::Unranked);
    }

    #[test]
    fn test_profile_url() {
        let mut record = PhysicianRecord::new("Jane", "Smith");
        assert_eq!(record.profile_url(), "");
        record.doctor_id = "42".to_string();
        assert_eq!(record.profile_url(), "https://www.medifind.com/doctors/42");
    }

    #[test]
    fn test_lookup_key() {
        let mut record = PhysicianRecord::new("Jane", "Smith");
        assert!(!record.has_lookup_key());
        record.postal_code = "10001".to_string();
        assert!(record.has_lookup_key());
    }

    #[test]
    fn test_query_defaults() {
        let query = SearchQuery::new(3766);
        assert_eq!(query.sort, "relevance");
        assert!(query.specialties.is_empty());
        assert!(query.show_featured_cards);
        assert!(!query.telemedicine);

        let parsed: SearchQuery = serde_json::from_str(r#"{"condition_id": 12}"#).unwrap();
        assert_eq!(parsed.sort, "relevance");
        assert_eq!(parsed.fidelity, 6);

        let query = SearchQuery::new(3766)
            .with_specialties(vec!["oncology".into()])
            .with_sort("rank");
        assert_eq!(query.sort, "rank");
        assert_eq!(query.specialties, vec!["oncology".to_string()]);
    }

    #[test]
    fn test_record_serialization() {
        let record = PhysicianRecord::new("Jane", "Smith");
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("npi"));
        let parsed: PhysicianRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.full_name(), "Jane Smith");
        assert_eq!(parsed.country, "USA");
    }
}
