use foundation::ids::Generation;

/// Issues strictly increasing generations.
#[derive(Debug, Default)]
pub struct GenerationClock {
    last: Generation,
}

impl GenerationClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_issued(&self) -> Generation {
        self.last
    }

    pub fn issue(&mut self) -> Generation {
        self.last = self.last.next();
        self.last
    }
}

/// Latest-wins admission for results that may complete out of order.
///
/// A result for generation `N` is admitted iff no result for a generation
/// `>= N` has been admitted before.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ApplyGate {
    applied: Option<Generation>,
}

impl ApplyGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_applied(&self) -> Option<Generation> {
        self.applied
    }

    pub fn would_admit(&self, generation: Generation) -> bool {
        self.applied.is_none_or(|applied| generation > applied)
    }

    /// Returns `true` and records `generation` if it is newer than anything
    /// admitted so far.
    pub fn admit(&mut self, generation: Generation) -> bool {
        if !self.would_admit(generation) {
            return false;
        }
        self.applied = Some(generation);
        true
    }
}
