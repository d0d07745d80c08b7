use lorekeep_core::PersistenceError;

/// Sorts driver failures into the shared taxonomy. Pool and transport
/// problems mean the database is unreachable.
pub(crate) fn map_sqlx_error(error: sqlx::Error) -> PersistenceError {
    match error {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            PersistenceError::Connectivity(error.to_string())
        }
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) => PersistenceError::Connectivity(error.to_string()),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            PersistenceError::InvalidData(error.to_string())
        }
        other => PersistenceError::Store(other.to_string()),
    }
}
