use foundation::bounds::LatLng;
use scene::cluster::Granularity;
use scene::point::PointRecord;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Position of a listing in the administrative hierarchy. Any level may be
/// unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegionPath {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neighborhood: Option<String>,
}

impl RegionPath {
    pub fn new(region: &str, district: &str, neighborhood: &str) -> Self {
        let named = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Self {
            region: named(region),
            district: named(district),
            neighborhood: named(neighborhood),
        }
    }

    pub fn level(&self, granularity: Granularity) -> Option<&str> {
        match granularity {
            Granularity::Region => self.region.as_deref(),
            Granularity::District => self.district.as_deref(),
            Granularity::Neighborhood => self.neighborhood.as_deref(),
        }
    }

    /// The path cut off below `granularity`.
    pub fn truncated(&self, granularity: Granularity) -> RegionPath {
        RegionPath {
            region: self.region.clone(),
            district: (granularity >= Granularity::District)
                .then(|| self.district.clone())
                .flatten(),
            neighborhood: (granularity >= Granularity::Neighborhood)
                .then(|| self.neighborhood.clone())
                .flatten(),
        }
    }

    /// Most specific known name, if any.
    pub fn leaf(&self) -> Option<&str> {
        self.neighborhood
            .as_deref()
            .or(self.district.as_deref())
            .or(self.region.as_deref())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        [&self.region, &self.district, &self.neighborhood]
            .into_iter()
            .filter_map(|n| n.as_deref())
    }
}

/// A listing as held by the catalog.
///
/// Wire form is flat: `{id, latitude, longitude, region?, district?,
/// neighborhood?, ...attributes}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireListing", into = "WireListing")]
pub struct ListingRecord {
    pub id: String,
    pub location: LatLng,
    pub region: RegionPath,
    pub attributes: Map<String, Value>,
}

impl ListingRecord {
    pub fn new(id: impl Into<String>, location: LatLng, region: RegionPath) -> Self {
        Self {
            id: id.into(),
            location,
            region,
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Marker payload for pointwise responses; the region path travels as
    /// ordinary attributes.
    pub fn to_point(&self) -> PointRecord {
        let mut attributes = self.attributes.clone();
        for (key, name) in [
            ("region", &self.region.region),
            ("district", &self.region.district),
            ("neighborhood", &self.region.neighborhood),
        ] {
            if let Some(name) = name {
                attributes.insert(key.to_string(), Value::String(name.clone()));
            }
        }
        PointRecord {
            id: self.id.clone(),
            location: self.location,
            attributes,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireListing {
    id: String,
    latitude: f64,
    longitude: f64,
    #[serde(flatten)]
    region: RegionPath,
    #[serde(flatten)]
    attributes: Map<String, Value>,
}

impl From<WireListing> for ListingRecord {
    fn from(w: WireListing) -> Self {
        Self {
            id: w.id,
            location: LatLng::new(w.latitude, w.longitude),
            region: w.region,
            attributes: w.attributes,
        }
    }
}

impl From<ListingRecord> for WireListing {
    fn from(r: ListingRecord) -> Self {
        Self {
            id: r.id,
            latitude: r.location.lat,
            longitude: r.location.lng,
            region: r.region,
            attributes: r.attributes,
        }
    }
}
