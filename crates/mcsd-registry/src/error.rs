//! Errors raised while managing providers and directories.

use mcsd_core::CoreError;
use mcsd_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Fetch(#[from] CoreError),

    #[error("provider not found: {0}")]
    ProviderNotFound(String),
}
