use serde::{Deserialize, Serialize};

/// A WGS84 coordinate in decimal degrees.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }

    pub fn in_range(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }

    fn clamped(self) -> Self {
        Self {
            lat: self.lat.clamp(-90.0, 90.0),
            lng: self.lng.clamp(-180.0, 180.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundsError {
    NonFinite,
    OutOfRange(LatLng),
    Inverted { south_west: LatLng, north_east: LatLng },
    /// Zero-area rectangle where an area is required.
    Degenerate,
}

impl std::fmt::Display for BoundsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoundsError::NonFinite => write!(f, "bounds contain a non-finite coordinate"),
            BoundsError::OutOfRange(p) => {
                write!(f, "coordinate out of range: lat={} lng={}", p.lat, p.lng)
            }
            BoundsError::Inverted {
                south_west,
                north_east,
            } => write!(
                f,
                "inverted bounds: sw=({}, {}) ne=({}, {})",
                south_west.lat, south_west.lng, north_east.lat, north_east.lng
            ),
            BoundsError::Degenerate => write!(f, "bounds have zero area"),
        }
    }
}

impl std::error::Error for BoundsError {}

/// Geographic bounding rectangle.
///
/// Invariants (enforced by every constructor):
/// - both corners are finite and inside the WGS84 coordinate range
/// - `south_west.lat <= north_east.lat` and `south_west.lng <= north_east.lng`
///
/// Longitude wraparound across the antimeridian is not modeled.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GeoBounds {
    south_west: LatLng,
    north_east: LatLng,
}

impl GeoBounds {
    pub fn new(south_west: LatLng, north_east: LatLng) -> Result<Self, BoundsError> {
        if !south_west.is_finite() || !north_east.is_finite() {
            return Err(BoundsError::NonFinite);
        }
        for corner in [south_west, north_east] {
            if !corner.in_range() {
                return Err(BoundsError::OutOfRange(corner));
            }
        }
        if south_west.lat > north_east.lat || south_west.lng > north_east.lng {
            return Err(BoundsError::Inverted {
                south_west,
                north_east,
            });
        }
        Ok(Self {
            south_west,
            north_east,
        })
    }

    /// Builds bounds around `center` with the given half extents, clamping the
    /// corners to the valid coordinate range.
    pub fn around(center: LatLng, half_lat: f64, half_lng: f64) -> Result<Self, BoundsError> {
        if !center.is_finite() || !half_lat.is_finite() || !half_lng.is_finite() {
            return Err(BoundsError::NonFinite);
        }
        let (half_lat, half_lng) = (half_lat.abs(), half_lng.abs());
        let south_west = LatLng::new(center.lat - half_lat, center.lng - half_lng).clamped();
        let north_east = LatLng::new(center.lat + half_lat, center.lng + half_lng).clamped();
        Self::new(south_west, north_east)
    }

    pub fn south_west(&self) -> LatLng {
        self.south_west
    }

    pub fn north_east(&self) -> LatLng {
        self.north_east
    }

    pub fn lat_span(&self) -> f64 {
        self.north_east.lat - self.south_west.lat
    }

    pub fn lng_span(&self) -> f64 {
        self.north_east.lng - self.south_west.lng
    }

    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.south_west.lat + self.north_east.lat) / 2.0,
            (self.south_west.lng + self.north_east.lng) / 2.0,
        )
    }

    /// True when the rectangle has zero area.
    pub fn is_degenerate(&self) -> bool {
        self.lat_span() <= 0.0 || self.lng_span() <= 0.0
    }

    pub fn ensure_area(&self) -> Result<(), BoundsError> {
        if self.is_degenerate() {
            return Err(BoundsError::Degenerate);
        }
        Ok(())
    }

    /// Edge-inclusive containment test.
    pub fn contains(&self, p: LatLng) -> bool {
        p.lat >= self.south_west.lat
            && p.lat <= self.north_east.lat
            && p.lng >= self.south_west.lng
            && p.lng <= self.north_east.lng
    }
}
