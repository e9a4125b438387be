//! Interpretation of opaque filter criteria against catalog records.
//!
//! - blank values are ignored
//! - `minX` / `maxX` are inclusive numeric bounds on attribute `x`
//! - `region`, `district` and `neighborhood` test the region path; `region`
//!   matches a name at any level
//! - any other key is an equality test on the attribute's textual form
//!
//! A record without a constrained attribute never matches.

use scene::filters::FilterCriteria;
use serde_json::Value;

use crate::record::ListingRecord;

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Min { attr: String, bound: Option<f64> },
    Max { attr: String, bound: Option<f64> },
    AnyRegionLevel(String),
    District(String),
    Neighborhood(String),
    Equals { attr: String, value: String },
}

/// Filter criteria compiled once per query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListingFilter {
    predicates: Vec<Predicate>,
}

impl ListingFilter {
    pub fn new(criteria: &FilterCriteria) -> Self {
        let predicates = criteria
            .active()
            .map(|(key, value)| {
                let value = value.trim();
                if let Some(attr) = bound_attr(key, "min") {
                    Predicate::Min {
                        attr,
                        bound: value.parse().ok(),
                    }
                } else if let Some(attr) = bound_attr(key, "max") {
                    Predicate::Max {
                        attr,
                        bound: value.parse().ok(),
                    }
                } else {
                    match key {
                        "region" => Predicate::AnyRegionLevel(value.to_string()),
                        "district" => Predicate::District(value.to_string()),
                        "neighborhood" => Predicate::Neighborhood(value.to_string()),
                        _ => Predicate::Equals {
                            attr: key.to_string(),
                            value: value.to_string(),
                        },
                    }
                }
            })
            .collect();
        Self { predicates }
    }

    /// Matches every record.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_unconstrained(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn matches(&self, record: &ListingRecord) -> bool {
        self.predicates.iter().all(|p| p.matches(record))
    }
}

impl Predicate {
    fn matches(&self, record: &ListingRecord) -> bool {
        match self {
            // An unparsable bound matches nothing.
            Predicate::Min { attr, bound } => bound
                .zip(numeric(record, attr))
                .is_some_and(|(bound, v)| v >= bound),
            Predicate::Max { attr, bound } => bound
                .zip(numeric(record, attr))
                .is_some_and(|(bound, v)| v <= bound),
            Predicate::AnyRegionLevel(name) => record.region.names().any(|n| n == name),
            Predicate::District(name) => record.region.district.as_deref() == Some(name),
            Predicate::Neighborhood(name) => record.region.neighborhood.as_deref() == Some(name),
            Predicate::Equals { attr, value } => {
                textual(record.attributes.get(attr)).is_some_and(|text| text == *value)
            }
        }
    }
}

/// `minPrice` -> `price` for prefix `min`.
fn bound_attr(key: &str, prefix: &str) -> Option<String> {
    let rest = key.strip_prefix(prefix)?;
    let mut chars = rest.chars();
    let first = chars.next()?;
    if !first.is_ascii_uppercase() {
        return None;
    }
    Some(first.to_ascii_lowercase().to_string() + chars.as_str())
}

fn numeric(record: &ListingRecord, attr: &str) -> Option<f64> {
    match record.attributes.get(attr)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn textual(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
