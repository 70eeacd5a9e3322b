/// Storage-layer error taxonomy.
///
/// `Store` methods return `anyhow::Result`; this enum is the typed form new
/// code migrates toward as modules are converted, and the helpers below are
/// the classification points the API layer relies on today.
///
/// # Examples
///
/// ```rust
/// use sambaza_storage::error::StorageError;
///
/// let err = StorageError::NotFound {
///     entity: "campaign",
///     id: "cmp-99".to_string(),
/// };
/// assert!(err.to_string().contains("campaign"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A required record was not found in the database.
    #[error("Storage: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: String },

    /// An insert hit a UNIQUE index (duplicate phone, service code, ...).
    #[error("Storage: duplicate {entity}")]
    Duplicate { entity: &'static str },

    /// An underlying SeaORM / database error.
    #[error("Storage: database error: {0}")]
    Db(#[from] sea_orm::DbErr),

    /// JSON serialization or deserialization failure (e.g. *_json columns).
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic storage error for cases not covered by other variants.
    #[error("Storage: {0}")]
    Other(String),
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// SQLite 在 UNIQUE 索引冲突时的报错文案特征。
/// API 层据此把写入失败映射为 409，而不是笼统的 500。
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.to_string().contains("UNIQUE constraint")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_matches_sqlite_wording() {
        let err = anyhow::anyhow!("UNIQUE constraint failed: contacts.user_id, contacts.phone");
        assert!(is_unique_violation(&err));
        assert!(!is_unique_violation(&anyhow::anyhow!("disk I/O error")));
    }

    #[test]
    fn variants_render_entity_names() {
        let err = StorageError::Duplicate { entity: "contact" };
        assert!(err.to_string().contains("contact"));
    }
}
