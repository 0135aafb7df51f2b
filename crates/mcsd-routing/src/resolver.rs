//! Seam over single-resource GETs against the local, already-synced FHIR
//! store — the capability mapper's only upstream dependency.

use async_trait::async_trait;
use mcsd_client::FhirClient;
use mcsd_core::{CoreError, DirectoryResourceType, DomainResource};

#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch_one(
        &self,
        resource_type: DirectoryResourceType,
        id: &str,
    ) -> Result<DomainResource, CoreError>;
}

pub struct ClientResourceFetcher<'a> {
    pub client: &'a FhirClient,
}

#[async_trait]
impl ResourceFetcher for ClientResourceFetcher<'_> {
    async fn fetch_one(
        &self,
        resource_type: DirectoryResourceType,
        id: &str,
    ) -> Result<DomainResource, CoreError> {
        self.client.get_resource_by_id(resource_type, id).await
    }
}
