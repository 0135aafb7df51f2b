//! Directory Registry (C7): tracks which directories exist, where they came
//! from (a provider catalog or a manual add), and reconciles that catalog
//! against storage on each refresh.

mod catalog;
mod error;
mod registry;

pub use catalog::{CatalogEntry, ClientProviderCatalogFetcher, ProviderCatalogFetcher};
pub use error::RegistryError;
pub use registry::{DirectoryCleanupHook, DirectoryRegistry, NoopCleanupHook, RefreshOutcome};
