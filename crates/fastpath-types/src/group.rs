//! Per-group settings consulted by the eligibility gate.

use serde::{Deserialize, Serialize};

/// Settings of the chat group a turn belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSettings {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// `Some(false)` opts the group out of the fast path.
    #[serde(default)]
    pub fast_path: Option<bool>,
}

impl GroupSettings {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn opts_out(&self) -> bool {
        self.fast_path == Some(false)
    }
}
