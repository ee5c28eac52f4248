//! Counter store adapters.

pub mod postgres;
pub mod quarantine;

pub use postgres::PostgresCounterStore;
pub use quarantine::PostgresQuarantine;
pub use stockroom_numbering::InMemoryCounterStore;

use stockroom_numbering::CounterStoreError;

/// Map sqlx errors onto the counter store error model.
///
/// | SQLx error                                | `CounterStoreError` |
/// |-------------------------------------------|---------------------|
/// | pool timeout / closed, I/O, TLS, protocol | `Unavailable`       |
/// | anything else                             | `Storage`           |
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> CounterStoreError {
    if is_connectivity(&err) {
        CounterStoreError::Unavailable(format!("{operation}: {err}"))
    } else {
        CounterStoreError::Storage(format!("{operation}: {err}"))
    }
}

pub(crate) fn is_connectivity(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::WorkerCrashed
    )
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

pub(crate) fn to_db_seq(
    key: &stockroom_core::SequenceKey,
    seq: u64,
) -> Result<i64, CounterStoreError> {
    i64::try_from(seq).map_err(|_| CounterStoreError::Exhausted(key.clone()))
}

pub(crate) fn from_db_seq(seq: i64) -> Result<u64, CounterStoreError> {
    u64::try_from(seq)
        .map_err(|_| CounterStoreError::Storage(format!("negative counter value {seq}")))
}
