//! Record normalization for upstream physician search results.
//!
//! The upstream feed is loosely typed: the same field can arrive as a
//! string, a list of strings, a list of objects or a nested object. Every
//! field is first decoded into the [`Loose`] sum type, which accepts any JSON
//! value, and then flattened by exhaustive matching. `normalize` is total.

use std::collections::BTreeMap;

use physdir_model::{PhysicianRecord, Tier, DEFAULT_COUNTRY};
use serde::Deserialize;

/// Any JSON value, decoded without failing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Loose {
    #[default]
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    List(Vec<Loose>),
    Object(BTreeMap<String, Loose>),
}

static NULL: Loose = Loose::Null;

impl Loose {
    /// Look up a key on an object; anything else yields `Null`.
    pub fn get(&self, key: &str) -> &Loose {
        match self {
            Self::Object(map) => map.get(key).unwrap_or(&NULL),
            _ => &NULL,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Scalar rendered as text. Containers and null are empty.
    pub fn text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => n.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Null | Self::List(_) | Self::Object(_) => String::new(),
        }
    }

    /// Numeric value; numeric strings are parsed, everything else is 0.
    pub fn number(&self) -> f64 {
        let value = match self {
            Self::Number(n) => n.as_f64().unwrap_or(0.0),
            Self::Text(s) => s.trim().parse::<f64>().unwrap_or(0.0),
            Self::Null | Self::Bool(_) | Self::List(_) | Self::Object(_) => 0.0,
        };
        if value.is_finite() {
            value
        } else {
            0.0
        }
    }

    /// Non-negative integer, truncated.
    pub fn count(&self) -> u64 {
        let value = self.number();
        if value > 0.0 {
            value.trunc() as u64
        } else {
            0
        }
    }

    pub fn count_u32(&self) -> u32 {
        self.count().min(u32::MAX as u64) as u32
    }

    /// Names from a list whose elements are strings or objects with `name`.
    /// Non-list input yields an empty list.
    pub fn list_names(&self) -> Vec<String> {
        match self {
            Self::List(items) => items
                .iter()
                .map(Loose::element_name)
                .filter(|name| !name.is_empty())
                .collect(),
            Self::Null | Self::Bool(_) | Self::Number(_) | Self::Text(_) | Self::Object(_) => {
                Vec::new()
            }
        }
    }

    /// Like [`Loose::list_names`], additionally accepting a single string.
    pub fn names(&self) -> Vec<String> {
        match self {
            Self::Text(s) if !s.trim().is_empty() => vec![s.clone()],
            _ => self.list_names(),
        }
    }

    fn element_name(&self) -> String {
        match self {
            Self::Object(_) => self.get("name").text(),
            Self::Text(_) | Self::Number(_) => self.text(),
            Self::Null | Self::Bool(_) | Self::List(_) => String::new(),
        }
    }
}

/// One upstream physician object, decoded field by field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawPhysician {
    pub person_id: Loose,
    pub id: Loose,
    pub name: Loose,
    pub title: Loose,
    pub specialties: Loose,
    pub specialty: Loose,
    pub affiliations: Loose,
    pub hospitals: Loose,
    pub primary_org_name: Loose,
    pub address: Loose,
    pub address_line1: Loose,
    pub postal_code: Loose,
    pub city: Loose,
    pub state_province_code: Loose,
    pub state: Loose,
    pub country: Loose,
    pub demographics: Loose,
    pub years_of_experience: Loose,
    pub publication_count: Loose,
    pub clinical_trial_count: Loose,
    pub patient_volume: Loose,
    pub rating: Loose,
    pub review_count: Loose,
    pub rank_score: Loose,
    pub score: Loose,
    pub phone: Loose,
    pub website: Loose,
    pub biography: Loose,
    pub languages: Loose,
    pub insurance_plans: Loose,
}

impl RawPhysician {
    /// Decode a JSON value. Non-object values decode to an empty record.
    pub fn from_value(value: serde_json::Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }
}

/// Split a full name: first token, then the remaining tokens joined by one space.
pub fn split_name(full_name: &str) -> (String, String) {
    let mut tokens = full_name.split_whitespace();
    let first = tokens.next().unwrap_or_default().to_string();
    let last = tokens.collect::<Vec<_>>().join(" ");
    (first, last)
}

/// Flatten hospital affiliations.
///
/// Accepts a string, a list, or an object carrying a `practice` list or a
/// `name`.
pub fn affiliation_names(value: &Loose) -> Vec<String> {
    match value {
        Loose::Object(_) => {
            let practice = value.get("practice");
            if practice.is_null() {
                value.get("name").names()
            } else {
                practice.names()
            }
        }
        Loose::Null | Loose::Bool(_) | Loose::Number(_) | Loose::Text(_) | Loose::List(_) => {
            value.names()
        }
    }
}

/// First non-empty text among the candidates.
fn first_text(candidates: &[&Loose]) -> String {
    candidates
        .iter()
        .map(|value| value.text())
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}

/// Map one raw upstream record into a flat physician record.
pub fn normalize(raw: &RawPhysician) -> PhysicianRecord {
    let (first_name, last_name) = split_name(&raw.name.text());

    let mut specialties = raw.specialties.names();
    if specialties.is_empty() {
        specialties = raw.specialty.names();
    }

    let mut hospital_affiliations = affiliation_names(&raw.affiliations);
    if hospital_affiliations.is_empty() {
        hospital_affiliations = affiliation_names(&raw.hospitals);
    }

    let address = &raw.address;
    let country = first_text(&[address.get("country"), &raw.country]);
    let score = raw.score.number();

    PhysicianRecord {
        person_id: raw.person_id.text(),
        doctor_id: raw.id.text(),
        first_name,
        last_name,
        title: raw.title.text(),
        specialties,
        hospital_affiliations,
        primary_organization: raw.primary_org_name.text(),
        address_line1: first_text(&[address.get("addressLine1"), &raw.address_line1]),
        postal_code: first_text(&[address.get("postalCode"), &raw.postal_code]),
        city: first_text(&[address.get("city"), &raw.city]),
        state: first_text(&[
            address.get("stateProvinceCode"),
            address.get("state"),
            &raw.state_province_code,
            &raw.state,
        ]),
        country: if country.is_empty() {
            DEFAULT_COUNTRY.to_string()
        } else {
            country
        },
        sex: raw.demographics.get("sex").text(),
        years_of_experience: raw.years_of_experience.count_u32(),
        publication_count: raw.publication_count.count_u32(),
        clinical_trial_count: raw.clinical_trial_count.count_u32(),
        patient_volume: raw.patient_volume.count(),
        rating: raw.rating.number(),
        review_count: raw.review_count.count(),
        rank_score: raw.rank_score.number(),
        score,
        tier: Tier::from_score(score),
        phone: raw.phone.text(),
        website: raw.website.text(),
        biography: raw.biography.text(),
        languages: raw.languages.list_names(),
        insurance_plans: raw.insurance_plans.list_names(),
        npi: None,
    }
}

/// Decode and normalize a JSON value in one step.
pub fn normalize_value(value: serde_json::Value) -> PhysicianRecord {
    normalize(&RawPhysician::from_value(value))
}
