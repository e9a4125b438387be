/// Step scale mapping a cluster count to a marker circle diameter (pixels).
///
/// Buckets are checked from the largest threshold down; counts below every
/// threshold get `base`. Thresholds are descending and diameters
/// non-increasing, so the scale never shrinks as the count grows.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CircleScale {
    steps: [(u64, u32); 3],
    base: u32,
}

impl CircleScale {
    pub const DEFAULT: CircleScale = CircleScale {
        steps: [(1000, 42), (100, 38), (10, 32)],
        base: 28,
    };

    pub fn diameter_for(&self, count: u64) -> u32 {
        self.steps
            .iter()
            .find(|(threshold, _)| count >= *threshold)
            .map(|(_, diameter)| *diameter)
            .unwrap_or(self.base)
    }
}

impl Default for CircleScale {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Circle diameter for a cluster of `count` records, using the default scale.
pub fn size_for(count: u64) -> u32 {
    CircleScale::DEFAULT.diameter_for(count)
}
