//! Wire contract for viewport-driven listing queries.
//!
//! One endpoint serves both query modes:
//! - `mode=clusters&zoom=Z` → JSON array of `{name, count, lat, lng}`
//! - `mode=markers&swLat&swLng&neLat&neLng` → JSON array of
//!   `{id, latitude, longitude, ...attributes}`
//!
//! Every other query parameter is a filter field and is forwarded untouched.
//! The same encoder/decoder is used by the client transport and the server.

use std::collections::BTreeMap;

use foundation::bounds::{BoundsError, GeoBounds, LatLng};
use scene::cluster::ClusterCell;
use scene::display::DisplaySet;
use scene::filters::FilterCriteria;
use scene::lod::QueryMode;
use scene::point::PointRecord;
use scene::viewport::Viewport;

/// Path of the map query endpoint, relative to the service root.
pub const MAP_QUERY_PATH: &str = "/api/listings/map";

pub const PARAM_MODE: &str = "mode";
pub const PARAM_ZOOM: &str = "zoom";
pub const PARAM_SW_LAT: &str = "swLat";
pub const PARAM_SW_LNG: &str = "swLng";
pub const PARAM_NE_LAT: &str = "neLat";
pub const PARAM_NE_LNG: &str = "neLng";

const RESERVED: [&str; 6] = [
    PARAM_MODE,
    PARAM_ZOOM,
    PARAM_SW_LAT,
    PARAM_SW_LNG,
    PARAM_NE_LAT,
    PARAM_NE_LNG,
];

#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    MissingParam(&'static str),
    InvalidParam { name: &'static str, value: String },
    UnknownMode(String),
    InvalidBounds(BoundsError),
    Body(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::MissingParam(name) => write!(f, "missing query parameter `{name}`"),
            ProtocolError::InvalidParam { name, value } => {
                write!(f, "invalid value for `{name}`: {value:?}")
            }
            ProtocolError::UnknownMode(mode) => {
                write!(f, "unknown mode {mode:?} (expected `clusters` or `markers`)")
            }
            ProtocolError::InvalidBounds(e) => write!(f, "invalid bounding box: {e}"),
            ProtocolError::Body(msg) => write!(f, "malformed response body: {msg}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// A single map query as sent over the wire.
///
/// `bounds` is set for pointwise queries, `zoom_level` for cluster queries.
#[derive(Debug, Clone, PartialEq)]
pub struct MapQuery {
    pub mode: QueryMode,
    pub bounds: Option<GeoBounds>,
    pub zoom_level: Option<i32>,
    pub filters: FilterCriteria,
}

impl MapQuery {
    pub fn clusters(zoom_level: i32, filters: FilterCriteria) -> Self {
        Self {
            mode: QueryMode::Clustered,
            bounds: None,
            zoom_level: Some(zoom_level),
            filters,
        }
    }

    pub fn markers(bounds: GeoBounds, filters: FilterCriteria) -> Self {
        Self {
            mode: QueryMode::Pointwise,
            bounds: Some(bounds),
            zoom_level: None,
            filters,
        }
    }

    pub fn for_viewport(viewport: &Viewport, filters: FilterCriteria, mode: QueryMode) -> Self {
        match mode {
            QueryMode::Clustered => Self::clusters(viewport.zoom_level(), filters),
            QueryMode::Pointwise => Self::markers(viewport.bounds(), filters),
        }
    }

    /// Encodes the query as URL query pairs.
    ///
    /// Ordering contract: `mode` first, then mode parameters, then filter
    /// fields in key order. Blank filter values are omitted, as are filter
    /// keys that collide with a protocol parameter.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![(PARAM_MODE.to_string(), self.mode.as_wire_str().to_string())];
        match self.mode {
            QueryMode::Clustered => {
                if let Some(zoom) = self.zoom_level {
                    pairs.push((PARAM_ZOOM.to_string(), zoom.to_string()));
                }
            }
            QueryMode::Pointwise => {
                if let Some(b) = self.bounds {
                    let (sw, ne) = (b.south_west(), b.north_east());
                    pairs.push((PARAM_SW_LAT.to_string(), sw.lat.to_string()));
                    pairs.push((PARAM_SW_LNG.to_string(), sw.lng.to_string()));
                    pairs.push((PARAM_NE_LAT.to_string(), ne.lat.to_string()));
                    pairs.push((PARAM_NE_LNG.to_string(), ne.lng.to_string()));
                }
            }
        }
        pairs.extend(
            self.filters
                .active()
                .filter(|(k, _)| !RESERVED.contains(k))
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );
        pairs
    }

    /// Decodes URL query pairs. Unknown keys become filter fields.
    pub fn from_query_pairs<I>(pairs: I) -> Result<Self, ProtocolError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut params: BTreeMap<String, String> = pairs.into_iter().collect();
        let mode_raw = params
            .remove(PARAM_MODE)
            .ok_or(ProtocolError::MissingParam(PARAM_MODE))?;
        let mode = QueryMode::from_wire_str(&mode_raw)
            .ok_or_else(|| ProtocolError::UnknownMode(mode_raw.clone()))?;

        let zoom_level = params
            .remove(PARAM_ZOOM)
            .map(|raw| parse_param::<i32>(PARAM_ZOOM, &raw))
            .transpose()?;

        let corners = [PARAM_SW_LAT, PARAM_SW_LNG, PARAM_NE_LAT, PARAM_NE_LNG]
            .map(|name| (name, params.remove(name)));

        let mut query = Self {
            mode,
            bounds: None,
            zoom_level,
            filters: params.into_iter().collect(),
        };

        match mode {
            QueryMode::Clustered => {
                if query.zoom_level.is_none() {
                    return Err(ProtocolError::MissingParam(PARAM_ZOOM));
                }
            }
            QueryMode::Pointwise => {
                let mut values = [0.0f64; 4];
                for (slot, (name, raw)) in values.iter_mut().zip(corners) {
                    let raw = raw.ok_or(ProtocolError::MissingParam(name))?;
                    *slot = parse_param::<f64>(name, &raw)?;
                }
                let [sw_lat, sw_lng, ne_lat, ne_lng] = values;
                let bounds =
                    GeoBounds::new(LatLng::new(sw_lat, sw_lng), LatLng::new(ne_lat, ne_lng))
                        .map_err(ProtocolError::InvalidBounds)?;
                query.bounds = Some(bounds);
            }
        }

        Ok(query)
    }
}

fn parse_param<T: std::str::FromStr>(name: &'static str, raw: &str) -> Result<T, ProtocolError> {
    raw.trim().parse::<T>().map_err(|_| ProtocolError::InvalidParam {
        name,
        value: raw.to_string(),
    })
}

/// Decodes a response body for a query issued in `mode`.
///
/// Cells with a zero count are dropped; they carry nothing to draw.
pub fn decode_response(mode: QueryMode, body: &[u8]) -> Result<DisplaySet, ProtocolError> {
    match mode {
        QueryMode::Clustered => {
            let mut cells: Vec<ClusterCell> =
                serde_json::from_slice(body).map_err(|e| ProtocolError::Body(e.to_string()))?;
            cells.retain(|c| c.count > 0);
            Ok(DisplaySet::clusters(cells))
        }
        QueryMode::Pointwise => {
            let points: Vec<PointRecord> =
                serde_json::from_slice(body).map_err(|e| ProtocolError::Body(e.to_string()))?;
            Ok(DisplaySet::points(points))
        }
    }
}
