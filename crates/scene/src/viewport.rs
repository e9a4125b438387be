use foundation::bounds::{BoundsError, GeoBounds, LatLng};

/// Immutable snapshot of the visible map region.
///
/// Zoom levels follow the "map level" convention: a smaller number is more
/// zoomed in (finer detail).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Viewport {
    bounds: GeoBounds,
    zoom_level: i32,
}

impl Viewport {
    pub fn new(bounds: GeoBounds, zoom_level: i32) -> Self {
        Self { bounds, zoom_level }
    }

    /// Validates raw corners as reported by a rendering surface.
    pub fn from_corners(
        south_west: LatLng,
        north_east: LatLng,
        zoom_level: i32,
    ) -> Result<Self, BoundsError> {
        Ok(Self::new(GeoBounds::new(south_west, north_east)?, zoom_level))
    }

    pub fn bounds(&self) -> GeoBounds {
        self.bounds
    }

    pub fn zoom_level(&self) -> i32 {
        self.zoom_level
    }

    pub fn center(&self) -> LatLng {
        self.bounds.center()
    }
}
