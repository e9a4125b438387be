/// Which single record, if any, is opened for detail display.
///
/// Selection is reset whenever a new result set is applied; see
/// [`crate::display::DisplaySnapshot::applied`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    selected_id: Option<String>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(id: impl Into<String>) -> Self {
        Self {
            selected_id: Some(id.into()),
        }
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected_id.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.selected_id.is_none()
    }
}
