use thiserror::Error;

/// Final failure of a wrapped transaction.
///
/// `E` is the store's error type. Either variant means the transaction was
/// rolled back.
#[derive(Debug, Error)]
pub enum TxError<E> {
    /// Every attempt hit a transient lock error.
    #[error("transaction `{name}` still locked after {attempts} attempts: {error}")]
    Exhausted { name: String, attempts: u32, error: E },
    /// A non-transient error; not retried past the attempt that raised it.
    #[error("transaction `{name}` failed: {error}")]
    Fatal { name: String, attempts: u32, error: E },
}

impl<E> TxError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            TxError::Exhausted { attempts, .. } | TxError::Fatal { attempts, .. } => *attempts,
        }
    }

    /// Retries performed before giving up.
    pub fn retry_count(&self) -> u32 {
        self.attempts().saturating_sub(1)
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, TxError::Exhausted { .. })
    }

    pub fn name(&self) -> &str {
        match self {
            TxError::Exhausted { name, .. } | TxError::Fatal { name, .. } => name,
        }
    }

    /// The store error from the last attempt.
    pub fn into_inner(self) -> E {
        match self {
            TxError::Exhausted { error, .. } | TxError::Fatal { error, .. } => error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_reports_attempts() {
        let err = TxError::Exhausted {
            name: "zones.save".into(),
            attempts: 4,
            error: "database is locked".to_string(),
        };
        assert_eq!(err.retry_count(), 3);
        assert!(err.is_exhausted());
        assert_eq!(
            err.to_string(),
            "transaction `zones.save` still locked after 4 attempts: database is locked"
        );
    }

    #[test]
    fn fatal_keeps_store_error() {
        let err = TxError::Fatal {
            name: "devices.insert".into(),
            attempts: 1,
            error: "UNIQUE constraint failed".to_string(),
        };
        assert_eq!(err.retry_count(), 0);
        assert_eq!(err.name(), "devices.insert");
        assert_eq!(err.into_inner(), "UNIQUE constraint failed");
    }
}
