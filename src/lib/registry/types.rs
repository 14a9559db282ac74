use std::fmt;

use serde::{Deserialize, Serialize};

pub const DELETED: &str = "deleted";
pub const ALREADY_DELETED: &str = "already deleted";

/// Result of a removal that tolerates the resource being gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionOutcome {
    #[serde(rename = "deleted")]
    Deleted,
    #[serde(rename = "already deleted")]
    AlreadyDeleted,
}

impl DeletionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionOutcome::Deleted => DELETED,
            DeletionOutcome::AlreadyDeleted => ALREADY_DELETED,
        }
    }
}

impl fmt::Display for DeletionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
