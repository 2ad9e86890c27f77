//! Export and presentation of physician datasets.
//!
//! Produces the CSV table, applies the interactive filters (state, minimum
//! experience, minimum publications) and computes the summary statistics and
//! text profiles shown by the CLI.

use std::collections::HashMap;
use std::io;

use physdir_model::PhysicianRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// CSV columns in output order. `NPI` is appended when enrichment ran.
pub const COLUMNS: [&str; 29] = [
    "Person ID",
    "Doctor ID",
    "First Name",
    "Last Name",
    "Title",
    "Specialties",
    "Hospital Affiliations",
    "Primary Organization",
    "Address Line",
    "Postal Code",
    "City",
    "State",
    "Country",
    "Sex",
    "Years of Experience",
    "Publications",
    "Clinical Trials",
    "Patient Volume",
    "Rating",
    "Review Count",
    "Rank Score",
    "Score",
    "Tier",
    "Phone",
    "Website",
    "Biography",
    "Languages",
    "Insurance Plans",
    "Profile URL",
];

pub const NPI_COLUMN: &str = "NPI";

/// Header row for the given column set.
pub fn header(include_npi: bool) -> Vec<&'static str> {
    let mut columns = COLUMNS.to_vec();
    if include_npi {
        columns.push(NPI_COLUMN);
    }
    columns
}

/// One CSV row, in [`COLUMNS`] order.
pub fn row(record: &PhysicianRecord, include_npi: bool) -> Vec<String> {
    let mut fields = vec![
        record.person_id.clone(),
        record.doctor_id.clone(),
        record.first_name.clone(),
        record.last_name.clone(),
        record.title.clone(),
        record.specialties.join(", "),
        record.hospital_affiliations.join(", "),
        record.primary_organization.clone(),
        record.address_line1.clone(),
        record.postal_code.clone(),
        record.city.clone(),
        record.state.clone(),
        record.country.clone(),
        record.sex.clone(),
        record.years_of_experience.to_string(),
        record.publication_count.to_string(),
        record.clinical_trial_count.to_string(),
        record.patient_volume.to_string(),
        record.rating.to_string(),
        record.review_count.to_string(),
        record.rank_score.to_string(),
        record.score.to_string(),
        record.tier.label().to_string(),
        record.phone.clone(),
        record.website.clone(),
        record.biography.clone(),
        record.languages.join(", "),
        record.insurance_plans.join(", "),
        record.profile_url(),
    ];
    if include_npi {
        fields.push(record.npi.clone().unwrap_or_default());
    }
    fields
}

/// Write records as CSV. The NPI column is included when any record was enriched.
pub fn write_csv<W: io::Write>(records: &[PhysicianRecord], writer: W) -> Result<(), ExportError> {
    let include_npi = records.iter().any(|r| r.npi.is_some());
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer.write_record(header(include_npi))?;
    for record in records {
        csv_writer.write_record(row(record, include_npi))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Render records as a CSV string.
pub fn to_csv_string(records: &[PhysicianRecord]) -> Result<String, ExportError> {
    let mut buffer = Vec::new();
    write_csv(records, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Dataset filters. Defaults keep every record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordFilter {
    /// Exact state code; `None` keeps all states
    pub state: Option<String>,
    pub min_experience: u32,
    pub min_publications: u32,
}

impl RecordFilter {
    pub fn matches(&self, record: &PhysicianRecord) -> bool {
        if let Some(state) = &self.state {
            if &record.state != state {
                return false;
            }
        }
        record.years_of_experience >= self.min_experience
            && record.publication_count >= self.min_publications
    }

    pub fn apply<'a>(&self, records: &'a [PhysicianRecord]) -> Vec<&'a PhysicianRecord> {
        records.iter().filter(|r| self.matches(r)).collect()
    }
}

/// Headline statistics over a set of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub average_experience: f64,
    pub total_publications: u64,
    pub average_rating: f64,
    /// Most common states, descending by count, ties by name
    pub top_states: Vec<(String, usize)>,
}

impl Summary {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a PhysicianRecord>) -> Self {
        let mut total = 0usize;
        let mut experience = 0u64;
        let mut total_publications = 0u64;
        let mut rating = 0.0_f64;
        let mut states: HashMap<&str, usize> = HashMap::new();

        for record in records {
            total += 1;
            experience += record.years_of_experience as u64;
            total_publications += record.publication_count as u64;
            rating += record.rating;
            if !record.state.is_empty() {
                *states.entry(record.state.as_str()).or_default() += 1;
            }
        }

        let mut top_states: Vec<(String, usize)> = states
            .into_iter()
            .map(|(state, count)| (state.to_string(), count))
            .collect();
        top_states.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_states.truncate(10);

        let divisor = total.max(1) as f64;
        Self {
            total,
            average_experience: experience as f64 / divisor,
            total_publications,
            average_rating: rating / divisor,
            top_states,
        }
    }
}

/// Multi-line text profile of one physician.
pub fn describe(record: &PhysicianRecord) -> String {
    let mut lines = vec![
        format!("Name: {}", record.full_name()),
        format!("Title: {}", record.title),
        format!("Specialty: {}", record.specialties.join(", ")),
        format!("Location: {}, {}", record.city, record.state),
        format!(
            "Hospital/Affiliation: {}",
            record.hospital_affiliations.join(", ")
        ),
    ];
    if !record.phone.is_empty() {
        lines.push(format!("Phone: {}", record.phone));
    }
    if !record.website.is_empty() {
        lines.push(format!("Website: {}", record.website));
    }
    lines.push(format!(
        "Experience: {} years | Publications: {} | Clinical Trials: {}",
        record.years_of_experience, record.publication_count, record.clinical_trial_count
    ));
    lines.push(format!(
        "Rating: {:.1} ({} reviews) | Score: {:.2} | Tier: {}",
        record.rating,
        record.review_count,
        record.score,
        if record.tier.label().is_empty() {
            "-"
        } else {
            record.tier.label()
        }
    ));
    if let Some(npi) = record.npi.as_deref().filter(|n| !n.is_empty()) {
        lines.push(format!("NPI: {}", npi));
    }
    let profile = record.profile_url();
    if !profile.is_empty() {
        lines.push(format!("Profile: {}", profile));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use physdir_model::Tier;
    use pretty_assertions::assert_eq;

    fn make_record(first: &str, state: &str, years: u32, pubs: u32, rating: f64) -> PhysicianRecord {
        let mut record = PhysicianRecord::new(first, "Doe");
        record.state = state.to_string();
        record.years_of_experience = years;
        record.publication_count = pubs;
        record.rating = rating;
        record
    }

    #[test]
    fn test_csv_header_without_npi() {
        let csv = to_csv_string(&[make_record("Jane", "NY", 10, 5, 4.5)]).unwrap();
        let mut lines = csv.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("Person ID,Doctor ID,First Name,Last Name,Title"));
        assert!(header.ends_with("Insurance Plans,Profile URL"));
        assert_eq!(lines.count(), 1);
    }

    #[test]
    fn test_csv_npi_column_when_enriched() {
        let mut record = make_record("Jane", "NY", 10, 5, 4.5);
        record.npi = Some("111, 222".to_string());
        let csv = to_csv_string(&[record, make_record("Bob", "MA", 1, 0, 0.0)]).unwrap();
        let lines: Vec<_> = csv.lines().collect();

        assert!(lines[0].ends_with(",NPI"));
        assert!(lines[1].ends_with(",\"111, 222\""));
        assert!(lines[2].ends_with(","));
    }

    #[test]
    fn test_row_lists_and_tier() {
        let mut record = make_record("Jane", "NY", 10, 5, 4.5);
        record.specialties = vec!["Oncology".into(), "Surgery".into()];
        record.tier = Tier::Elite;
        record.doctor_id = "7".into();
        let fields = row(&record, false);

        assert_eq!(fields.len(), COLUMNS.len());
        assert_eq!(fields[5], "Oncology, Surgery");
        assert_eq!(fields[22], "Elite");
        assert_eq!(fields[28], "https://www.medifind.com/doctors/7");
    }

    #[test]
    fn test_filter() {
        let records = vec![
            make_record("A", "NY", 10, 5, 4.0),
            make_record("B", "NY", 2, 50, 4.0),
            make_record("C", "MA", 20, 50, 4.0),
        ];

        assert_eq!(RecordFilter::default().apply(&records).len(), 3);

        let filter = RecordFilter {
            state: Some("NY".into()),
            min_experience: 5,
            min_publications: 0,
        };
        let kept: Vec<_> = filter.apply(&records).iter().map(|r| r.first_name.clone()).collect();
        assert_eq!(kept, vec!["A"]);

        let filter = RecordFilter {
            state: None,
            min_experience: 0,
            min_publications: 50,
        };
        assert_eq!(filter.apply(&records).len(), 2);
    }

    #[test]
    fn test_summary() {
        let records = vec![
            make_record("A", "NY", 10, 5, 4.0),
            make_record("B", "NY", 20, 15, 5.0),
            make_record("C", "MA", 30, 0, 3.0),
        ];
        let summary = Summary::from_records(&records);

        assert_eq!(summary.total, 3);
        assert_eq!(summary.average_experience, 20.0);
        assert_eq!(summary.total_publications, 20);
        assert_eq!(summary.average_rating, 4.0);
        assert_eq!(
            summary.top_states,
            vec![("NY".to_string(), 2), ("MA".to_string(), 1)]
        );
    }

    #[test]
    fn test_summary_empty() {
        let summary = Summary::from_records(&Vec::<PhysicianRecord>::new());
        assert_eq!(summary, Summary::default());
    }

    #[test]
    fn test_describe() {
        let mut record = make_record("Jane", "NY", 10, 5, 4.5);
        record.city = "New York".into();
        record.npi = Some("111".into());
        let text = describe(&record);

        assert!(text.contains("Name: Jane Doe"));
        assert!(text.contains("Location: New York, NY"));
        assert!(text.contains("NPI: 111"));
        assert!(!text.contains("Profile:"));
    }
}
