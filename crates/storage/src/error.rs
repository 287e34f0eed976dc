use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Not found")]
    NotFound,

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store write failed: {0}")]
    StoreWrite(String),

    #[error("Batch of {size} writes exceeds the store limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    #[error("Invalid stored record {id}: {reason}")]
    InvalidRecord { id: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Export error: {0}")]
    Export(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            StorageError::Database(sqlx::Error::Database(e))
                if e.code().as_deref() == Some("23505")
        ) || matches!(self, StorageError::ConstraintViolation(_))
    }

    /// True for every failure that means a write did not reach the store.
    pub fn is_write_failure(&self) -> bool {
        matches!(
            self,
            StorageError::Database(_)
                | StorageError::StoreWrite(_)
                | StorageError::BatchTooLarge { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_violation_counts_as_unique_violation() {
        let err = StorageError::ConstraintViolation("vote already exists".to_string());
        assert!(err.is_unique_violation());
        assert!(!err.is_write_failure());
    }

    #[test]
    fn test_batch_too_large_message() {
        let err = StorageError::BatchTooLarge {
            size: 401,
            limit: 400,
        };
        assert!(err.is_write_failure());
        assert_eq!(
            err.to_string(),
            "Batch of 401 writes exceeds the store limit of 400"
        );
    }
}
