use serde::{Deserialize, Serialize};

/// Collection holding one record per visitor.
pub const VISITORS: &str = "User";

/// Field of a visitor record that holds its visit count.
pub const VISIT_COUNT_FIELD: &str = "visitor";

/// Per-visitor tally stored at `User/<storage key>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorRecord {
    /// The visitor's storage key (address without dots)
    pub ip: String,
    #[serde(rename = "visitor")]
    pub visit_count: i64,
}
