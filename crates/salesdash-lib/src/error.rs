//! Fatal session errors. Everything else (bad cells, missing optional columns, empty
//! filter results) is absorbed where it happens and never surfaces as an error.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::schema::Field;

/// A required field that no candidate column name matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingField {
    pub field: Field,
    /// Column names that were looked for, in priority order
    pub candidates: Vec<String>,
}

impl fmt::Display for MissingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.candidates.is_empty() {
            write!(f, "{}", self.field)
        } else {
            write!(
                f,
                "{} (looked for: {})",
                self.field,
                self.candidates.join(", ")
            )
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("data file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("data file {} contains no rows", .0.display())]
    EmptyFile(PathBuf),

    #[error("required column(s) missing: {}", join_missing(.0))]
    MissingFields(Vec<MissingField>),
}

fn join_missing(fields: &[MissingField]) -> String {
    fields
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
