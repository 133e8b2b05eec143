//! Errors raised while reconciling and applying entity types

use std::fmt;

use serde::Serialize;

use crate::snapshot::SnapshotError;
use crate::sync::logic::dependency_graph::SequenceError;

/// Kind of mutation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// One failed create/update/delete, kept for the final report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationFailure {
    pub entity_type: String,
    pub operation: OperationKind,
    pub ids: Vec<String>,
    pub message: String,
}

impl fmt::Display for OperationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}]: {}",
            self.operation.label(),
            self.entity_type,
            self.ids.join(", "),
            self.message
        )
    }
}

/// Errors that stop (or fail) one entity type
#[derive(Debug)]
pub enum ApplyError {
    /// Remote collection could not be read; nothing was changed
    Fetch { entity_type: String, message: String },
    /// New entities could not be ordered; nothing was created
    Sequence {
        entity_type: String,
        error: SequenceError,
    },
    /// The user declined a destructive schema change
    DestructiveChangeRejected { entity_type: String },
    /// Local snapshot could not be loaded
    Snapshot(SnapshotError),
    /// Some operations failed after retries; the rest were applied
    Operations {
        entity_type: String,
        failures: Vec<OperationFailure>,
    },
    /// Schema diff or apply request failed
    Schema { message: String },
}

impl ApplyError {
    pub fn entity_type(&self) -> &str {
        match self {
            Self::Fetch { entity_type, .. }
            | Self::Sequence { entity_type, .. }
            | Self::DestructiveChangeRejected { entity_type }
            | Self::Operations { entity_type, .. } => entity_type,
            Self::Snapshot(_) => "snapshot",
            Self::Schema { .. } => "schema",
        }
    }
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch {
                entity_type,
                message,
            } => write!(f, "Failed to fetch {}: {}", entity_type, message),
            Self::Sequence { entity_type, error } => {
                write!(f, "Cannot order new {}: {}", entity_type, error)
            }
            Self::DestructiveChangeRejected { entity_type } => {
                write!(f, "Destructive changes to {} were rejected", entity_type)
            }
            Self::Snapshot(err) => write!(f, "{}", err),
            Self::Operations {
                entity_type,
                failures,
            } => write!(
                f,
                "{} operation(s) failed for {}",
                failures.len(),
                entity_type
            ),
            Self::Schema { message } => write!(f, "Schema sync failed: {}", message),
        }
    }
}

impl std::error::Error for ApplyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Sequence { error, .. } => Some(error),
            Self::Snapshot(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SnapshotError> for ApplyError {
    fn from(err: SnapshotError) -> Self {
        Self::Snapshot(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::logic::dependency_graph::CycleError;

    #[test]
    fn test_failure_display() {
        let failure = OperationFailure {
            entity_type: "flows".to_string(),
            operation: OperationKind::Create,
            ids: vec!["f1".to_string()],
            message: "409 Conflict".to_string(),
        };
        assert_eq!(failure.to_string(), "create flows [f1]: 409 Conflict");
    }

    #[test]
    fn test_sequence_error_names_nodes() {
        let err = ApplyError::Sequence {
            entity_type: "operations".to_string(),
            error: SequenceError::Cycle(CycleError {
                nodes: vec!["a".to_string(), "b".to_string()],
            }),
        };
        assert_eq!(err.entity_type(), "operations");
        assert!(err.to_string().contains("a, b"));
    }
}
