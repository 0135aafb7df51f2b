//! # mcsd-storage
//!
//! Persistence traits for the directory synchronizer's own state: the
//! directory registry (C7) and the per-resource namespacing map the
//! adjacency builder and transaction assembler read and write (C4/C6).
//!
//! This crate defines the contract only. [`crate::memory`] provides an
//! in-memory implementation for tests; `mcsd-db-postgres` provides the
//! production Postgres-backed one.

mod error;
pub mod memory;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use traits::{DirectoryStore, ResourceMapStore};
pub use types::{
    Directory, DirectoryOrigin, Provider, ProviderDirectoryLink, ResourceMapKey, ResourceMapRow,
};

pub type StorageResult<T> = Result<T, StorageError>;

pub mod prelude {
    pub use crate::error::{ErrorCategory, StorageError};
    pub use crate::traits::{DirectoryStore, ResourceMapStore};
    pub use crate::types::{
        Directory, DirectoryOrigin, Provider, ProviderDirectoryLink, ResourceMapKey, ResourceMapRow,
    };
    pub use crate::StorageResult;
}
