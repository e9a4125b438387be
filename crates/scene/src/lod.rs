//! Level-of-detail policy: which query to issue for a zoom level, how finely
//! to group clusters, and where a cluster drill-down lands.
//!
//! Zoom bands with the default policy (smaller level = more zoomed in):
//!
//! | level      | mode      | cluster granularity |
//! |------------|-----------|---------------------|
//! | `<= 5`     | pointwise | -                   |
//! | `6..=7`    | clustered | neighborhood        |
//! | `8..=9`    | clustered | district            |
//! | `>= 10`    | clustered | region              |

use foundation::bounds::{BoundsError, GeoBounds};
use serde::{Deserialize, Serialize};

use crate::cluster::{ClusterCell, Granularity};
use crate::viewport::Viewport;

/// Highest zoom level still served pointwise by the default policy.
pub const CLUSTER_THRESHOLD_LEVEL: i32 = 5;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryMode {
    #[serde(rename = "clusters")]
    Clustered,
    #[serde(rename = "markers")]
    Pointwise,
}

impl QueryMode {
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            QueryMode::Clustered => "clusters",
            QueryMode::Pointwise => "markers",
        }
    }

    pub fn from_wire_str(s: &str) -> Option<Self> {
        match s {
            "clusters" => Some(QueryMode::Clustered),
            "markers" => Some(QueryMode::Pointwise),
            _ => None,
        }
    }
}

/// Mode for `zoom_level` under the default policy.
pub fn select_mode(zoom_level: i32) -> QueryMode {
    LodPolicy::default().select_mode(zoom_level)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LodPolicyError {
    Unordered {
        marker_max_level: i32,
        neighborhood_max_level: i32,
        district_max_level: i32,
    },
    MinLevelAboveMarkers {
        min_level: i32,
        marker_max_level: i32,
    },
}

impl std::fmt::Display for LodPolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LodPolicyError::Unordered {
                marker_max_level,
                neighborhood_max_level,
                district_max_level,
            } => write!(
                f,
                "zoom bands must increase: markers<={marker_max_level} \
                 neighborhood<={neighborhood_max_level} district<={district_max_level}"
            ),
            LodPolicyError::MinLevelAboveMarkers {
                min_level,
                marker_max_level,
            } => write!(
                f,
                "min_level={min_level} must not exceed marker_max_level={marker_max_level}"
            ),
        }
    }
}

impl std::error::Error for LodPolicyError {}

#[derive(Debug, Clone, PartialEq)]
pub enum DrillDownError {
    /// No viewport has been reported yet.
    NoViewport,
    /// The current level is already the most detailed one.
    AtFinestLevel { level: i32 },
    Bounds(BoundsError),
}

impl std::fmt::Display for DrillDownError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DrillDownError::NoViewport => write!(f, "no viewport to drill down from"),
            DrillDownError::AtFinestLevel { level } => {
                write!(f, "zoom level {level} has no finer level to drill into")
            }
            DrillDownError::Bounds(e) => write!(f, "drill-down viewport invalid: {e}"),
        }
    }
}

impl std::error::Error for DrillDownError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DrillDownError::Bounds(e) => Some(e),
            _ => None,
        }
    }
}

/// Zoom band boundaries. These are tuning constants, not derived values.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodPolicy {
    /// Levels `<=` this are served pointwise.
    pub marker_max_level: i32,
    /// Clustered levels `<=` this group by neighborhood.
    pub neighborhood_max_level: i32,
    /// Clustered levels `<=` this group by district; above it, by region.
    pub district_max_level: i32,
    /// Most detailed level the map supports.
    pub min_level: i32,
}

impl Default for LodPolicy {
    fn default() -> Self {
        Self {
            marker_max_level: CLUSTER_THRESHOLD_LEVEL,
            neighborhood_max_level: 7,
            district_max_level: 9,
            min_level: 1,
        }
    }
}

impl LodPolicy {
    pub fn validate(self) -> Result<Self, LodPolicyError> {
        if !(self.marker_max_level < self.neighborhood_max_level
            && self.neighborhood_max_level < self.district_max_level)
        {
            return Err(LodPolicyError::Unordered {
                marker_max_level: self.marker_max_level,
                neighborhood_max_level: self.neighborhood_max_level,
                district_max_level: self.district_max_level,
            });
        }
        if self.min_level > self.marker_max_level {
            return Err(LodPolicyError::MinLevelAboveMarkers {
                min_level: self.min_level,
                marker_max_level: self.marker_max_level,
            });
        }
        Ok(self)
    }

    pub fn select_mode(&self, zoom_level: i32) -> QueryMode {
        if zoom_level <= self.marker_max_level {
            QueryMode::Pointwise
        } else {
            QueryMode::Clustered
        }
    }

    /// Cluster granularity for `zoom_level`, `None` inside the pointwise band.
    pub fn granularity_for(&self, zoom_level: i32) -> Option<Granularity> {
        if zoom_level <= self.marker_max_level {
            None
        } else if zoom_level <= self.neighborhood_max_level {
            Some(Granularity::Neighborhood)
        } else if zoom_level <= self.district_max_level {
            Some(Granularity::District)
        } else {
            Some(Granularity::Region)
        }
    }

    /// Like [`Self::granularity_for`], but serves the pointwise band at the
    /// finest cluster granularity.
    pub fn cluster_granularity(&self, zoom_level: i32) -> Granularity {
        self.granularity_for(zoom_level)
            .unwrap_or(Granularity::Neighborhood)
    }

    /// Target level when drilling into a cluster shown at `zoom_level`.
    ///
    /// Region clusters open at the neighborhood level; finer clusters open
    /// directly at the marker level. Below that the map steps one level in.
    /// The target is always strictly below `zoom_level` and never below
    /// `min_level`; `None` when no such level exists.
    pub fn drill_down_level(&self, zoom_level: i32) -> Option<i32> {
        let target = match self.granularity_for(zoom_level) {
            Some(Granularity::Region) => self.neighborhood_max_level,
            Some(Granularity::District | Granularity::Neighborhood) => self.marker_max_level,
            None => zoom_level.saturating_sub(1),
        };
        (target < zoom_level && target >= self.min_level).then_some(target)
    }

    /// New viewport centered on `cell.centroid` at the drill-down level.
    ///
    /// The current viewport's extent is scaled by `2^(target - current)`, so
    /// the on-screen aspect is kept.
    pub fn drill_down(
        &self,
        current: &Viewport,
        cell: &ClusterCell,
    ) -> Result<Viewport, DrillDownError> {
        let from = current.zoom_level();
        let to = self
            .drill_down_level(from)
            .ok_or(DrillDownError::AtFinestLevel { level: from })?;
        let scale = 2f64.powi(to.saturating_sub(from));
        let bounds = current.bounds();
        let next = GeoBounds::around(
            cell.centroid,
            bounds.lat_span() / 2.0 * scale,
            bounds.lng_span() / 2.0 * scale,
        )
        .map_err(DrillDownError::Bounds)?;
        Ok(Viewport::new(next, to))
    }
}
