//! Row identity and structural dependency.

use serde::{Deserialize, Serialize};

/// Identity of one row plus the parent it structurally depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowMetadata {
    /// Unique key of the row within its migration type.
    pub id: i64,
    /// Parent row id, `None` for a root.
    pub parent_id: Option<i64>,
}

impl RowMetadata {
    pub fn new(id: i64, parent_id: Option<i64>) -> Self {
        Self { id, parent_id }
    }

    /// A row without a parent.
    pub fn root(id: i64) -> Self {
        Self::new(id, None)
    }

    /// A row that depends on `parent_id`.
    pub fn child(id: i64, parent_id: i64) -> Self {
        Self::new(id, Some(parent_id))
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}
