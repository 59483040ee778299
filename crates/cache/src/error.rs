use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("unknown cache namespace: {0}")]
    UnknownNamespace(String),
    #[error("cache namespace already registered: {0}")]
    DuplicateNamespace(String),
    #[error("invalid cache namespace config: {0}")]
    InvalidConfig(String),
}

/// Failure of [`CacheManager::get_or_set`](crate::CacheManager::get_or_set).
#[derive(Debug, Error)]
pub enum GetOrSetError<E> {
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// `compute` failed; nothing was stored.
    #[error("cache compute failed: {0}")]
    Compute(E),
}

impl<E> GetOrSetError<E> {
    /// The compute error, if that is what happened.
    pub fn into_compute(self) -> Option<E> {
        match self {
            GetOrSetError::Compute(err) => Some(err),
            GetOrSetError::Cache(_) => None,
        }
    }
}
