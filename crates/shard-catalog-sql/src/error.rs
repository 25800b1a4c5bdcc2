/// Whether a storage fault is safe to retry as a whole operation (§4.7) or
/// must be surfaced to the caller immediately.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FaultClass {
    /// Connectivity, deadlock, lock timeout, or throttling: retrying the
    /// whole operation is expected to make progress.
    Transient,
    /// Constraint violation, not-found, or any other fault that retrying
    /// cannot fix.
    Permanent,
}

/// Classifies a `sqlx::Error` returned by a GSM or LSM scope. Mirrors the
/// Postgres `SQLSTATE` class codes: class `08` (connection), `40` (deadlock
/// or transaction rollback) and a throttling code raised by this catalog's
/// own rate limiting are transient; everything else is permanent.
pub fn classify(err: &sqlx::Error) -> FaultClass {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            FaultClass::Transient
        }
        sqlx::Error::Database(db_err) => match db_err.code() {
            Some(code) if code.starts_with("08") => FaultClass::Transient,
            Some(code) if code == "40001" || code == "40P01" => FaultClass::Transient,
            Some(code) if code == "55P03" => FaultClass::Transient, // lock_not_available
            Some(code) if code == "57014" => FaultClass::Transient, // statement canceled (timeout)
            Some(code) if code == "53400" => FaultClass::Transient, // configuration limit exceeded (throttling)
            _ => FaultClass::Permanent,
        },
        _ => FaultClass::Permanent,
    }
}

pub fn is_transient(err: &sqlx::Error) -> bool {
    classify(err) == FaultClass::Transient
}
