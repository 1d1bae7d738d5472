//! Approval levels of the two-step invoice validation.

use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalLevel {
    Level1,
    Level2,
}

impl ApprovalLevel {
    pub fn as_number(self) -> u8 {
        match self {
            ApprovalLevel::Level1 => 1,
            ApprovalLevel::Level2 => 2,
        }
    }
}

impl core::fmt::Display for ApprovalLevel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "level {}", self.as_number())
    }
}
