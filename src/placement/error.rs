use serde_json::json;

/// Terminal failures of an optimization run.
///
/// Everything the engine can recover from (unknown survey ids, unmatched
/// requests) is handled in place and never reaches this type.
#[derive(Debug, thiserror::Error)]
pub enum PlacementError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("class list {class_list_id} changed since it was loaded (expected version {expected})")]
    Conflict { class_list_id: String, expected: i64 },

    #[error("failed to persist classes: {0}")]
    Persistence(String),

    #[error(transparent)]
    Database(#[from] rusqlite::Error),
}

impl PlacementError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Stable machine-readable kind for the IPC error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidInput(_) => "invalid_input",
            Self::Conflict { .. } => "conflict",
            Self::Persistence(_) => "persistence_failed",
            Self::Database(_) => "db_query_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Conflict {
                class_list_id,
                expected,
            } => Some(json!({ "classListId": class_list_id, "expectedVersion": expected })),
            _ => None,
        }
    }
}
