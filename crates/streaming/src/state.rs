use std::sync::Arc;

use foundation::ids::Generation;
use scene::display::{DisplaySet, DisplaySnapshot, SelectionError};
use tokio::sync::watch;

/// Serialization point for everything the map draws.
///
/// Writers go through [`DisplayCell::apply`] and [`DisplayCell::select`];
/// each transition is computed and published under the watch channel's lock,
/// so the generation check and the write cannot interleave with another
/// writer. Readers get immutable snapshots.
#[derive(Debug)]
pub struct DisplayCell {
    tx: watch::Sender<Arc<DisplaySnapshot>>,
}

impl Default for DisplayCell {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(DisplaySnapshot::new()));
        Self { tx }
    }

    pub fn snapshot(&self) -> Arc<DisplaySnapshot> {
        Arc::clone(&self.tx.borrow())
    }

    /// Receiver notified after every published transition.
    pub fn subscribe(&self) -> watch::Receiver<Arc<DisplaySnapshot>> {
        self.tx.subscribe()
    }

    /// Publishes `set` for `generation`. Returns `false` (and leaves the
    /// display untouched) if an equal or newer generation is already shown.
    pub fn apply(&self, generation: Generation, set: DisplaySet) -> bool {
        self.tx
            .send_if_modified(|current| match current.applied(generation, set) {
                Some(next) => {
                    *current = Arc::new(next);
                    true
                }
                None => false,
            })
    }

    /// Opens `id` for detail display, or clears the selection for `None`.
    pub fn select(&self, id: Option<&str>) -> Result<(), SelectionError> {
        let mut outcome = Ok(());
        self.tx
            .send_if_modified(|current| match current.with_selection(id) {
                Ok(next) if next == **current => false,
                Ok(next) => {
                    *current = Arc::new(next);
                    true
                }
                Err(e) => {
                    outcome = Err(e);
                    false
                }
            });
        outcome
    }
}
