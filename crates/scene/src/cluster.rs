use foundation::bounds::LatLng;
use serde::{Deserialize, Serialize};

/// One aggregated region returned by a cluster query.
///
/// Wire form: `{"name": .., "count": .., "lat": .., "lng": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterCell {
    #[serde(rename = "name")]
    pub label: String,
    pub count: u64,
    #[serde(flatten)]
    pub centroid: LatLng,
}

impl ClusterCell {
    pub fn new(label: impl Into<String>, count: u64, centroid: LatLng) -> Self {
        Self {
            label: label.into(),
            count,
            centroid,
        }
    }
}

/// Level of the administrative hierarchy records are grouped by.
///
/// Ordered coarse to fine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Region,
    District,
    Neighborhood,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Region => "region",
            Granularity::District => "district",
            Granularity::Neighborhood => "neighborhood",
        }
    }
}
