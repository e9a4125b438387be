use foundation::bounds::LatLng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One located listing returned by a pointwise query.
///
/// `attributes` (title, category, pricing, badges, ...) are carried through
/// untouched. Wire form flattens them next to `id`, `latitude` and `longitude`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WirePoint", into = "WirePoint")]
pub struct PointRecord {
    pub id: String,
    pub location: LatLng,
    pub attributes: Map<String, Value>,
}

impl PointRecord {
    pub fn new(id: impl Into<String>, location: LatLng) -> Self {
        Self {
            id: id.into(),
            location,
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

#[derive(Serialize, Deserialize)]
struct WirePoint {
    id: String,
    latitude: f64,
    longitude: f64,
    #[serde(flatten)]
    attributes: Map<String, Value>,
}

impl From<WirePoint> for PointRecord {
    fn from(w: WirePoint) -> Self {
        Self {
            id: w.id,
            location: LatLng::new(w.latitude, w.longitude),
            attributes: w.attributes,
        }
    }
}

impl From<PointRecord> for WirePoint {
    fn from(p: PointRecord) -> Self {
        Self {
            id: p.id,
            latitude: p.location.lat,
            longitude: p.location.lng,
            attributes: p.attributes,
        }
    }
}
