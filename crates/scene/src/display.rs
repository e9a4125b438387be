use std::sync::Arc;

use foundation::ids::Generation;
use runtime::generation::ApplyGate;

use crate::cluster::ClusterCell;
use crate::point::PointRecord;
use crate::selection::SelectionState;

/// The result set currently drawn by the map.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum DisplaySet {
    #[default]
    Empty,
    Clusters(Arc<[ClusterCell]>),
    Points(Arc<[PointRecord]>),
}

impl DisplaySet {
    pub fn clusters(cells: Vec<ClusterCell>) -> Self {
        DisplaySet::Clusters(cells.into())
    }

    pub fn points(records: Vec<PointRecord>) -> Self {
        DisplaySet::Points(records.into())
    }

    pub fn len(&self) -> usize {
        match self {
            DisplaySet::Empty => 0,
            DisplaySet::Clusters(c) => c.len(),
            DisplaySet::Points(p) => p.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_clusters(&self) -> Option<&[ClusterCell]> {
        match self {
            DisplaySet::Clusters(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_points(&self) -> Option<&[PointRecord]> {
        match self {
            DisplaySet::Points(p) => Some(p),
            _ => None,
        }
    }

    pub fn contains_record(&self, id: &str) -> bool {
        self.as_points()
            .is_some_and(|points| points.iter().any(|p| p.id == id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    /// The id is not part of the displayed pointwise set.
    NotDisplayed(String),
}

impl std::fmt::Display for SelectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionError::NotDisplayed(id) => write!(f, "record {id} is not displayed"),
        }
    }
}

impl std::error::Error for SelectionError {}

/// Immutable snapshot of everything the rendering surface reads.
///
/// Snapshots are never mutated in place: transitions return a new snapshot
/// and leave the old one valid for readers still holding it.
///
/// Ordering contract:
/// - `applied` only succeeds for a generation newer than every generation
///   applied before it.
/// - A successful `applied` always yields an empty selection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplaySnapshot {
    gate: ApplyGate,
    set: DisplaySet,
    selection: SelectionState,
}

impl DisplaySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generation of the result set on display, if any was applied.
    pub fn generation(&self) -> Option<Generation> {
        self.gate.last_applied()
    }

    pub fn set(&self) -> &DisplaySet {
        &self.set
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    /// Successor snapshot showing `set`, or `None` if `generation` is stale.
    pub fn applied(&self, generation: Generation, set: DisplaySet) -> Option<Self> {
        let mut gate = self.gate;
        if !gate.admit(generation) {
            return None;
        }
        Some(Self {
            gate,
            set,
            selection: SelectionState::new(),
        })
    }

    /// Successor snapshot with `id` opened, or with the selection cleared
    /// when `id` is `None`.
    pub fn with_selection(&self, id: Option<&str>) -> Result<Self, SelectionError> {
        let selection = match id {
            None => SelectionState::new(),
            Some(id) if self.set.contains_record(id) => SelectionState::selected(id),
            Some(id) => return Err(SelectionError::NotDisplayed(id.to_string())),
        };
        Ok(Self {
            gate: self.gate,
            set: self.set.clone(),
            selection,
        })
    }
}
