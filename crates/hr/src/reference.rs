//! HR reference data kept as tenant records rather than aggregates.

use serde::{Deserialize, Serialize};

use atelier_core::DomainResult;
use atelier_core::error::{normalize_code, optional_text, required_text};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPosition {
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub department: Option<String>,
}

impl JobPosition {
    pub fn new(code: &str, title: &str, department: Option<&str>) -> DomainResult<Self> {
        Ok(Self {
            code: normalize_code(code, "code")?,
            title: required_text(title, "title")?,
            department: optional_text(department),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveType {
    pub code: String,
    pub label: String,
    pub paid: bool,
}

impl LeaveType {
    pub fn new(code: &str, label: &str, paid: bool) -> DomainResult<Self> {
        Ok(Self {
            code: normalize_code(code, "code")?,
            label: required_text(label, "label")?,
            paid,
        })
    }
}

/// Leave types seeded the first time a tenant lists them.
pub fn default_leave_types() -> Vec<LeaveType> {
    [
        ("CP", "Paid leave", true),
        ("RTT", "Reduced working time", true),
        ("SICK", "Sick leave", true),
        ("UNPAID", "Unpaid leave", false),
    ]
    .into_iter()
    .map(|(code, label, paid)| LeaveType {
        code: code.to_string(),
        label: label.to_string(),
        paid,
    })
    .collect()
}
