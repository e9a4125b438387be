use serde::{Deserialize, Serialize};

/// Monotonic identifier for a viewport/filter query.
///
/// Larger values are newer. Generations start at 1; `Generation::ZERO` is
/// never issued and only marks "nothing yet".
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Generation(pub u64);

impl Generation {
    pub const ZERO: Generation = Generation(0);

    pub fn next(self) -> Self {
        Generation(self.0.saturating_add(1))
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "g{}", self.0)
    }
}
